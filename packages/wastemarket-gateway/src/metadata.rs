//! Off-chain metadata retrieval.

use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use wastemarket_types::TokenMetadata;

/// Fetches and parses a metadata document from a resolved URL.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<TokenMetadata, crate::Error>;
}

/// HTTP(S) via reqwest, `file://` from local disk.
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
}

impl HttpMetadataFetcher {
    pub fn new(timeout: Duration) -> Result<Self, crate::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn read_bytes(&self, url: &str) -> Result<Vec<u8>, crate::Error> {
        let parsed = url::Url::parse(url)
            .map_err(|e| crate::Error::Metadata(format!("bad metadata url {url}: {e}")))?;
        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| crate::Error::Metadata(format!("bad file url {url}")))?;
            return tokio::fs::read(&path)
                .await
                .map_err(|e| crate::Error::Metadata(format!("{}: {e}", path.display())));
        }

        let resp = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| crate::Error::Metadata(format!("GET {url}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(crate::Error::Metadata(format!("GET {url}: HTTP {status}")));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| crate::Error::Metadata(format!("GET {url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, url: &str) -> Result<TokenMetadata, crate::Error> {
        if url.is_empty() {
            return Err(crate::Error::Metadata("no metadata url".into()));
        }
        let bytes = self.read_bytes(url).await?;
        debug!(url, len = bytes.len(), "Fetched metadata");
        decode_document(&bytes)
    }
}

/// Parse a metadata body, unwrapping the envelopes content stores add: a
/// `{"record": …}` read wrapper and the `{name,type,size,data}` stored-file
/// document whose `data` is the base64 of the real body.
pub fn decode_document(bytes: &[u8]) -> Result<TokenMetadata, crate::Error> {
    let mut value: Value = serde_json::from_slice(bytes)
        .map_err(|e| crate::Error::Metadata(format!("invalid metadata json: {e}")))?;

    let record = value
        .get_mut("record")
        .filter(|r| r.is_object())
        .map(Value::take);
    if let Some(record) = record {
        value = record;
    }
    if let Some(encoded) = stored_file_payload(&value).map(str::to_owned) {
        let inner = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| crate::Error::Metadata(format!("invalid stored payload: {e}")))?;
        value = serde_json::from_slice(&inner)
            .map_err(|e| crate::Error::Metadata(format!("invalid stored metadata: {e}")))?;
    }
    if !value.is_object() {
        return Err(crate::Error::Metadata("metadata is not a JSON object".into()));
    }
    serde_json::from_value(value).map_err(|e| crate::Error::Metadata(e.to_string()))
}

fn stored_file_payload(value: &Value) -> Option<&str> {
    let content_type = value.get("type")?.as_str()?;
    if !content_type.contains("json") {
        return None;
    }
    value.get("data")?.as_str()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// URL → document map; unknown URLs fail.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub(crate) docs: HashMap<String, TokenMetadata>,
    }

    #[async_trait]
    impl MetadataFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<TokenMetadata, crate::Error> {
            self.docs
                .get(url)
                .cloned()
                .ok_or_else(|| crate::Error::Metadata(format!("GET {url}: HTTP 404")))
        }
    }

    #[test]
    fn test_plain_document() {
        let meta = decode_document(br#"{"name":"Plastic","properties":{"weight":2}}"#).unwrap();
        assert_eq!(meta.name, "Plastic");
        assert_eq!(meta.properties.weight, "2");
    }

    #[test]
    fn test_record_envelope_and_stored_file() {
        let inner = br#"{"name":"Glass","image":"ipfs://jsonbin_img"}"#;
        let encoded = base64::engine::general_purpose::STANDARD.encode(inner);
        let body = serde_json::json!({
            "record": {
                "name": "metadata.json",
                "type": "application/json",
                "size": inner.len(),
                "data": encoded,
                "timestamp": 1
            },
            "metadata": {"id": "65ab"}
        });
        let meta = decode_document(body.to_string().as_bytes()).unwrap();
        assert_eq!(meta.name, "Glass");
        assert_eq!(meta.image, "ipfs://jsonbin_img");
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(decode_document(b"[]").is_err());
        assert!(decode_document(b"<html></html>").is_err());
    }

    #[tokio::test]
    async fn test_file_url_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.json");
        std::fs::write(&path, br#"{"name":"Metal"}"#).unwrap();
        let url = url::Url::from_file_path(&path).unwrap();

        let fetcher = HttpMetadataFetcher::new(Duration::from_secs(1)).unwrap();
        let meta = fetcher.fetch(url.as_str()).await.unwrap();
        assert_eq!(meta.name, "Metal");
        assert!(fetcher.fetch("").await.is_err());
    }
}
