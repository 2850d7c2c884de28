//! Content references produced by the upload backends.
//!
//! A reference is stored on-chain (as the token URI) and inside metadata
//! documents as a plain string. The tag prefix says which backend holds the
//! bytes:
//!
//! | stored form        | variant                |
//! |--------------------|------------------------|
//! | `jsonbin_<id>`     | [`ContentReference::PinningService`] |
//! | `gist_<id>`        | [`ContentReference::PasteService`]   |
//! | `blob_<id>`        | [`ContentReference::LocalBlob`]      |
//! | anything else      | [`ContentReference::RawHash`]        |
//!
//! An `ipfs://` scheme prefix is stripped before the tag is inspected, so
//! `ipfs://jsonbin_abc` and `jsonbin_abc` name the same content.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const PINNING_PREFIX: &str = "jsonbin_";
pub const PASTE_PREFIX: &str = "gist_";
pub const LOCAL_BLOB_PREFIX: &str = "blob_";
pub const IPFS_SCHEME: &str = "ipfs://";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentReference {
    PinningService { id: String },
    PasteService { id: String },
    LocalBlob { id: String },
    RawHash { hash: String },
}

impl ContentReference {
    /// Parse a stored reference. Empty input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let body = trimmed.strip_prefix(IPFS_SCHEME).unwrap_or(trimmed);
        if body.is_empty() {
            return None;
        }
        let reference = if let Some(id) = body.strip_prefix(PINNING_PREFIX) {
            Self::PinningService { id: id.to_string() }
        } else if let Some(id) = body.strip_prefix(PASTE_PREFIX) {
            Self::PasteService { id: id.to_string() }
        } else if let Some(id) = body.strip_prefix(LOCAL_BLOB_PREFIX) {
            Self::LocalBlob { id: id.to_string() }
        } else {
            Self::RawHash {
                hash: body.to_string(),
            }
        };
        Some(reference)
    }

    /// Backend label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PinningService { .. } => "pinning-service",
            Self::PasteService { .. } => "paste-service",
            Self::LocalBlob { .. } => "local-blob",
            Self::RawHash { .. } => "raw-hash",
        }
    }

    /// `ipfs://` form written into metadata documents.
    pub fn to_ipfs_uri(&self) -> String {
        format!("{IPFS_SCHEME}{self}")
    }

    /// Hash with any `/path` suffix removed. `None` for tagged references.
    pub fn root_hash(&self) -> Option<&str> {
        match self {
            Self::RawHash { hash } => hash.split('/').next(),
            _ => None,
        }
    }
}

impl fmt::Display for ContentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PinningService { id } => write!(f, "{PINNING_PREFIX}{id}"),
            Self::PasteService { id } => write!(f, "{PASTE_PREFIX}{id}"),
            Self::LocalBlob { id } => write!(f, "{LOCAL_BLOB_PREFIX}{id}"),
            Self::RawHash { hash } => f.write_str(hash),
        }
    }
}

impl Serialize for ContentReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).ok_or_else(|| serde::de::Error::custom("empty content reference"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_forms() {
        assert_eq!(
            ContentReference::parse("jsonbin_65ab"),
            Some(ContentReference::PinningService { id: "65ab".into() })
        );
        assert_eq!(
            ContentReference::parse("gist_f00d"),
            Some(ContentReference::PasteService { id: "f00d".into() })
        );
        assert_eq!(
            ContentReference::parse("blob_1700_x1"),
            Some(ContentReference::LocalBlob { id: "1700_x1".into() })
        );
        assert_eq!(
            ContentReference::parse("QmHash"),
            Some(ContentReference::RawHash { hash: "QmHash".into() })
        );
    }

    #[test]
    fn test_ipfs_scheme_stripped_before_tag() {
        assert_eq!(
            ContentReference::parse("ipfs://jsonbin_65ab"),
            ContentReference::parse("jsonbin_65ab")
        );
        assert_eq!(
            ContentReference::parse("ipfs://QmHash/meta.json").unwrap().root_hash(),
            Some("QmHash")
        );
    }

    #[test]
    fn test_empty_is_none() {
        assert_eq!(ContentReference::parse(""), None);
        assert_eq!(ContentReference::parse("   "), None);
        assert_eq!(ContentReference::parse("ipfs://"), None);
    }

    #[test]
    fn test_stored_form_round_trips() {
        for raw in ["jsonbin_1", "gist_2", "blob_3_abc", "bafyhash"] {
            let parsed = ContentReference::parse(raw).unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
        let blob = ContentReference::LocalBlob { id: "9".into() };
        assert_eq!(blob.to_ipfs_uri(), "ipfs://blob_9");
    }
}
