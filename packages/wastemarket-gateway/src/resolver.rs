//! Content reference → fetchable URL.

use std::sync::Arc;
use tracing::{debug, warn};
use wastemarket_types::ContentReference;

use crate::config::Config;
use crate::kv_store::{blob_key, BlobRecord, KeyValueStore};

const ID_PLACEHOLDER: &str = "{id}";

/// Maps stored references to URLs. Only local blobs touch the store.
pub struct ContentResolver {
    pinning_template: String,
    paste_template: String,
    gateways: Vec<String>,
    store: Arc<dyn KeyValueStore>,
}

impl ContentResolver {
    pub fn new(config: &Config, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            pinning_template: config.pinning_read_template.clone(),
            paste_template: config.paste_read_template.clone(),
            gateways: config.ipfs_gateways.clone(),
            store,
        }
    }

    /// Primary URL for a reference; empty string when there is none.
    pub fn resolve(&self, reference: Option<&ContentReference>) -> String {
        let Some(reference) = reference else {
            return String::new();
        };
        match reference {
            ContentReference::PinningService { id } => {
                self.pinning_template.replace(ID_PLACEHOLDER, id)
            }
            ContentReference::PasteService { id } => {
                self.paste_template.replace(ID_PLACEHOLDER, id)
            }
            ContentReference::LocalBlob { id } => self.local_blob_url(id),
            ContentReference::RawHash { hash } => match self.gateways.first() {
                Some(gateway) => format!("{gateway}{hash}"),
                None => String::new(),
            },
        }
    }

    /// [`Self::resolve`] on a stored string.
    pub fn resolve_str(&self, raw: &str) -> String {
        self.resolve(ContentReference::parse(raw).as_ref())
    }

    /// Every candidate URL in preference order. Raw hashes expand to one URL
    /// per gateway, with any path suffix dropped.
    pub fn resolve_all(&self, raw: &str) -> Vec<String> {
        match ContentReference::parse(raw) {
            Some(reference @ ContentReference::RawHash { .. }) => {
                let root = reference.root_hash().unwrap_or_default();
                self.gateways.iter().map(|g| format!("{g}{root}")).collect()
            }
            Some(reference) => {
                let url = self.resolve(Some(&reference));
                if url.is_empty() {
                    Vec::new()
                } else {
                    vec![url]
                }
            }
            None => Vec::new(),
        }
    }

    fn local_blob_url(&self, id: &str) -> String {
        let raw = match self.store.get(&blob_key(id)) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(id, "No local blob record");
                return String::new();
            }
            Err(e) => {
                warn!(id, error = %e, "Local blob lookup failed");
                return String::new();
            }
        };
        match serde_json::from_str::<BlobRecord>(&raw) {
            Ok(record) => record.url,
            Err(e) => {
                warn!(id, error = %e, "Unparseable local blob record");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::MemoryStore;

    fn resolver() -> (ContentResolver, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ContentResolver::new(&Config::default(), store.clone()), store)
    }

    #[test]
    fn test_empty_reference_is_empty_url() {
        let (r, _) = resolver();
        assert_eq!(r.resolve(None), "");
        assert_eq!(r.resolve_str(""), "");
        assert!(r.resolve_all("").is_empty());
    }

    #[test]
    fn test_tagged_references_use_templates() {
        let (r, _) = resolver();
        assert_eq!(
            r.resolve_str("jsonbin_65ab"),
            "https://api.jsonbin.io/v3/b/65ab/latest"
        );
        assert_eq!(
            r.resolve_str("ipfs://gist_f00d"),
            "https://gist.githubusercontent.com/anonymous/f00d/raw"
        );
    }

    #[test]
    fn test_raw_hash_uses_first_gateway() {
        let (r, _) = resolver();
        assert_eq!(
            r.resolve_str("ipfs://QmHash"),
            "https://gateway.pinata.cloud/ipfs/QmHash"
        );
        assert_eq!(r.resolve_str("QmHash"), r.resolve_str("QmHash"));
    }

    #[test]
    fn test_resolve_all_lists_gateways_in_order() {
        let (r, _) = resolver();
        assert_eq!(
            r.resolve_all("ipfs://QmHash/metadata.json"),
            vec![
                "https://gateway.pinata.cloud/ipfs/QmHash",
                "https://cloudflare-ipfs.com/ipfs/QmHash",
                "https://ipfs.io/ipfs/QmHash",
            ]
        );
        assert_eq!(r.resolve_all("jsonbin_1").len(), 1);
    }

    #[test]
    fn test_local_blob_lookup() {
        let (r, store) = resolver();
        assert_eq!(r.resolve_str("blob_missing"), "");

        store.set("blob_bad", "not json").unwrap();
        assert_eq!(r.resolve_str("blob_bad"), "");
        assert!(r.resolve_all("blob_bad").is_empty());

        let record = BlobRecord {
            url: "file:///data/blobs/1_abc".into(),
            name: "photo.png".into(),
            content_type: "image/png".into(),
            size: 3,
            timestamp: 1,
        };
        store
            .set("blob_1_abc", &serde_json::to_string(&record).unwrap())
            .unwrap();
        assert_eq!(r.resolve_str("blob_1_abc"), "file:///data/blobs/1_abc");
    }
}
