//! Content upload with a fixed fallback order: pinning service, paste
//! service, then local blob storage.

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use wastemarket_types::{Attribute, ContentReference, TokenMetadata, WasteProperties};

use crate::kv_store::{blob_key, meta_key, BlobMeta, BlobRecord, KeyValueStore};
use crate::metrics::METRICS;
use crate::now_ms;
use crate::resolver::ContentResolver;

/// Bytes to store, with the name and MIME type the caller gave them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Self-describing JSON document the remote stores hold.
fn stored_document(file: &UploadFile, timestamp: u64) -> Value {
    json!({
        "name": file.name,
        "type": file.content_type,
        "size": file.size(),
        "data": base64::engine::general_purpose::STANDARD.encode(&file.bytes),
        "timestamp": timestamp,
    })
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, crate::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| crate::Error::Config(format!("Failed to build HTTP client: {e}")))
}

#[async_trait]
pub trait UploadBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this backend should be tried for `file`.
    fn accepts(&self, _file: &UploadFile) -> bool {
        true
    }

    async fn store(&self, file: &UploadFile) -> Result<ContentReference, crate::Error>;
}

/// JSONBin-style pinning store: `POST` a document, read back `metadata.id`.
pub struct JsonBinBackend {
    client: reqwest::Client,
    upload_url: String,
    size_limit: u64,
}

impl JsonBinBackend {
    pub fn new(
        upload_url: &str,
        size_limit: u64,
        timeout: Duration,
    ) -> Result<Self, crate::Error> {
        Ok(Self {
            client: http_client(timeout)?,
            upload_url: upload_url.to_string(),
            size_limit,
        })
    }
}

#[async_trait]
impl UploadBackend for JsonBinBackend {
    fn name(&self) -> &'static str {
        "pinning-service"
    }

    fn accepts(&self, file: &UploadFile) -> bool {
        file.size() < self.size_limit
    }

    async fn store(&self, file: &UploadFile) -> Result<ContentReference, crate::Error> {
        let body = stored_document(file, now_ms());
        let resp = self
            .client
            .post(&self.upload_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| crate::Error::Upload(format!("pinning service: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(crate::Error::Upload(format!("pinning service: HTTP {status}")));
        }
        let result: Value = resp
            .json()
            .await
            .map_err(|e| crate::Error::Upload(format!("pinning service: {e}")))?;
        let id = result
            .pointer("/metadata/id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| crate::Error::Upload("pinning service: no metadata.id".into()))?;
        Ok(ContentReference::PinningService { id: id.to_string() })
    }
}

/// Public paste store (gist API): one JSON file per upload.
pub struct GistBackend {
    client: reqwest::Client,
    upload_url: String,
    size_limit: u64,
}

impl GistBackend {
    pub fn new(
        upload_url: &str,
        size_limit: u64,
        timeout: Duration,
    ) -> Result<Self, crate::Error> {
        Ok(Self {
            client: http_client(timeout)?,
            upload_url: upload_url.to_string(),
            size_limit,
        })
    }
}

#[async_trait]
impl UploadBackend for GistBackend {
    fn name(&self) -> &'static str {
        "paste-service"
    }

    fn accepts(&self, file: &UploadFile) -> bool {
        file.size() < self.size_limit
    }

    async fn store(&self, file: &UploadFile) -> Result<ContentReference, crate::Error> {
        let ts = now_ms();
        let content = stored_document(file, ts).to_string();
        let mut files = serde_json::Map::new();
        files.insert(format!("file_{ts}.json"), json!({ "content": content }));
        let body = json!({ "public": true, "files": files });

        let resp = self
            .client
            .post(&self.upload_url)
            // The gist API rejects requests without a user agent.
            .header(reqwest::header::USER_AGENT, "wastemarket-gateway")
            .json(&body)
            .send()
            .await
            .map_err(|e| crate::Error::Upload(format!("paste service: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(crate::Error::Upload(format!("paste service: HTTP {status}")));
        }
        let result: Value = resp
            .json()
            .await
            .map_err(|e| crate::Error::Upload(format!("paste service: {e}")))?;
        let id = result
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| crate::Error::Upload("paste service: no id".into()))?;
        Ok(ContentReference::PasteService { id: id.to_string() })
    }
}

/// Bytes on local disk, indexed in the key-value store.
pub struct LocalBlobBackend {
    dir: PathBuf,
    store: Arc<dyn KeyValueStore>,
}

impl LocalBlobBackend {
    pub fn new(dir: PathBuf, store: Arc<dyn KeyValueStore>) -> Self {
        Self { dir, store }
    }

    fn new_id(timestamp: u64) -> String {
        use rand::Rng;
        format!("{timestamp}_{:08x}", rand::thread_rng().gen::<u32>())
    }
}

#[async_trait]
impl UploadBackend for LocalBlobBackend {
    fn name(&self) -> &'static str {
        "local-blob"
    }

    async fn store(&self, file: &UploadFile) -> Result<ContentReference, crate::Error> {
        let timestamp = now_ms();
        let id = Self::new_id(timestamp);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| crate::Error::Storage(format!("Failed to create blob directory: {e}")))?;
        let dir = tokio::fs::canonicalize(&self.dir)
            .await
            .map_err(|e| crate::Error::Storage(format!("Failed to resolve blob directory: {e}")))?;
        let path = dir.join(&id);
        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|e| crate::Error::Storage(format!("Failed to write blob: {e}")))?;
        let url = url::Url::from_file_path(&path)
            .map_err(|_| crate::Error::Storage(format!("No file url for {}", path.display())))?;

        let record = BlobRecord {
            url: url.to_string(),
            name: file.name.clone(),
            content_type: file.content_type.clone(),
            size: file.size(),
            timestamp,
        };
        let meta = BlobMeta {
            name: file.name.clone(),
            content_type: file.content_type.clone(),
            size: file.size(),
            timestamp,
            storage: "blob".into(),
        };
        let entries = [
            (blob_key(&id), encode_record(&record)?),
            (meta_key(&id), encode_record(&meta)?),
        ];
        // `FileStore` persists on every set with blocking fs calls.
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            entries
                .iter()
                .try_for_each(|(key, value)| store.set(key, value))
        })
        .await
        .map_err(|e| crate::Error::Storage(format!("Blob index task failed: {e}")))??;

        debug!(id = %id, path = %path.display(), "Blob written");
        Ok(ContentReference::LocalBlob { id })
    }
}

fn encode_record<T: Serialize>(record: &T) -> Result<String, crate::Error> {
    serde_json::to_string(record)
        .map_err(|e| crate::Error::Storage(format!("Failed to encode record: {e}")))
}

/// Result of [`UploadChain::upload_metadata`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpload {
    /// `ipfs://<reference>`.
    pub url: String,
    pub data: TokenMetadata,
    /// Resolved URL of the metadata document.
    pub gateway: String,
}

/// Result of [`UploadChain::upload_nft_content`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NftContent {
    pub image_reference: ContentReference,
    pub image_url: String,
    pub metadata_reference: ContentReference,
    #[serde(flatten)]
    pub metadata: MetadataUpload,
}

/// Descriptive fields of a waste item, as entered by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WasteForm {
    pub name: String,
    pub description: String,
    pub country: String,
    pub collection_point: String,
    pub weight: String,
    pub price: String,
}

/// Tries each backend in order; the first success wins.
pub struct UploadChain {
    backends: Vec<Box<dyn UploadBackend>>,
    resolver: Arc<ContentResolver>,
    site_url: String,
}

impl UploadChain {
    pub fn new(
        backends: Vec<Box<dyn UploadBackend>>,
        resolver: Arc<ContentResolver>,
        site_url: &str,
    ) -> Self {
        Self {
            backends,
            resolver,
            site_url: site_url.to_string(),
        }
    }

    /// Store `file`, returning the reference of the first backend that took it.
    pub async fn store(&self, file: &UploadFile) -> Result<ContentReference, crate::Error> {
        let mut last_error = None;
        for backend in &self.backends {
            if !backend.accepts(file) {
                debug!(backend = backend.name(), size = file.size(), "Backend skipped");
                continue;
            }
            match backend.store(file).await {
                Ok(reference) => {
                    record_upload(&reference);
                    info!(
                        backend = backend.name(),
                        reference = %reference,
                        size = file.size(),
                        "Content stored"
                    );
                    return Ok(reference);
                }
                Err(e) => {
                    METRICS.upload_backend_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        backend = backend.name(),
                        error = %e,
                        "Upload backend failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(crate::Error::Storage(match last_error {
            Some(e) => format!("content storage exhausted: {e}"),
            None => "content storage exhausted: no backend accepted the file".into(),
        }))
    }

    /// Store a metadata document whose `image` points at `image_ref`.
    pub async fn upload_metadata(
        &self,
        metadata: TokenMetadata,
        image_ref: &ContentReference,
    ) -> Result<MetadataUpload, crate::Error> {
        let data = TokenMetadata {
            image: image_ref.to_ipfs_uri(),
            timestamp: Some(now_ms()),
            ..metadata
        };
        let body = serde_json::to_vec_pretty(&data)
            .map_err(|e| crate::Error::Upload(format!("Failed to encode metadata: {e}")))?;
        let file = UploadFile::new("metadata.json", "application/json", body);
        let reference = self.store(&file).await?;
        Ok(MetadataUpload {
            url: reference.to_ipfs_uri(),
            gateway: self.resolver.resolve(Some(&reference)),
            data,
        })
    }

    /// Store the image, then the waste metadata that points at it.
    pub async fn upload_nft_content(
        &self,
        form: &WasteForm,
        image: &UploadFile,
    ) -> Result<NftContent, crate::Error> {
        let image_reference = self.store(image).await?;
        let image_url = self.resolver.resolve(Some(&image_reference));

        let metadata = self
            .upload_metadata(waste_metadata(form, &self.site_url), &image_reference)
            .await?;
        let metadata_reference = ContentReference::parse(&metadata.url)
            .ok_or_else(|| crate::Error::Upload("empty metadata reference".into()))?;

        let mut metadata = metadata;
        metadata.data.image_url = image_url.clone();
        Ok(NftContent {
            image_reference,
            image_url,
            metadata_reference,
            metadata,
        })
    }
}

fn record_upload(reference: &ContentReference) {
    let counter = match reference {
        ContentReference::PinningService { .. } => &METRICS.uploads_pinning,
        ContentReference::PasteService { .. } => &METRICS.uploads_paste,
        _ => &METRICS.uploads_local_blob,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

fn waste_metadata(form: &WasteForm, site_url: &str) -> TokenMetadata {
    let attribute = |trait_type: &str, value: &str| Attribute {
        trait_type: trait_type.to_string(),
        value: Value::String(value.to_string()),
    };
    TokenMetadata {
        name: form.name.clone(),
        description: form.description.clone(),
        external_url: site_url.to_string(),
        background_color: "00FF00".into(),
        properties: WasteProperties {
            country: form.country.clone(),
            collection_point: form.collection_point.clone(),
            weight: form.weight.clone(),
            price: form.price.clone(),
        },
        attributes: vec![
            attribute("Country", &form.country),
            attribute("Collection Point", &form.collection_point),
            attribute("Weight", &form.weight),
            attribute("Price", &form.price),
        ],
        ..Default::default()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use crate::kv_store::MemoryStore;
    use std::sync::Mutex;

    /// Backend that always fails, counting attempts.
    pub(crate) struct DownBackend {
        pub(crate) attempts: Arc<Mutex<u32>>,
        limit: u64,
    }

    impl DownBackend {
        pub(crate) fn new(limit: u64) -> Self {
            Self {
                attempts: Arc::new(Mutex::new(0)),
                limit,
            }
        }
    }

    #[async_trait]
    impl UploadBackend for DownBackend {
        fn name(&self) -> &'static str {
            "down"
        }

        fn accepts(&self, file: &UploadFile) -> bool {
            file.size() < self.limit
        }

        async fn store(&self, _file: &UploadFile) -> Result<ContentReference, crate::Error> {
            *self.attempts.lock().unwrap() += 1;
            Err(crate::Error::Upload("HTTP 503".into()))
        }
    }

    /// Backend that hands out sequential pinning ids.
    pub(crate) struct PinningBackend {
        next: Mutex<u32>,
    }

    impl PinningBackend {
        pub(crate) fn new() -> Self {
            Self { next: Mutex::new(1) }
        }
    }

    #[async_trait]
    impl UploadBackend for PinningBackend {
        fn name(&self) -> &'static str {
            "pinning-service"
        }

        async fn store(&self, _file: &UploadFile) -> Result<ContentReference, crate::Error> {
            let mut next = self.next.lock().unwrap();
            let id = format!("bin{next}");
            *next += 1;
            Ok(ContentReference::PinningService { id })
        }
    }

    pub(crate) fn resolver(store: Arc<MemoryStore>) -> Arc<ContentResolver> {
        Arc::new(ContentResolver::new(&Config::default(), store))
    }

    fn image() -> UploadFile {
        UploadFile::new("bottle.png", "image/png", vec![1, 2, 3])
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let down = DownBackend::new(u64::MAX);
        let attempts = down.attempts.clone();
        let chain = UploadChain::new(
            vec![
                Box::new(down),
                Box::new(PinningBackend::new()),
                Box::new(LocalBlobBackend::new(dir.path().into(), store.clone())),
            ],
            resolver(store.clone()),
            "http://localhost:3000",
        );
        let reference = chain.store(&image()).await.unwrap();
        assert_eq!(reference, ContentReference::PinningService { id: "bin1".into() });
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remote_failures_fall_through_to_local_blob() {
        let store = Arc::new(MemoryStore::new());
        let dir = tempfile::tempdir().unwrap();
        let chain = UploadChain::new(
            vec![
                Box::new(DownBackend::new(1024 * 1024)),
                Box::new(DownBackend::new(1024 * 1024)),
                Box::new(LocalBlobBackend::new(dir.path().into(), store.clone())),
            ],
            resolver(store.clone()),
            "http://localhost:3000",
        );
        let reference = chain.store(&image()).await.unwrap();
        let ContentReference::LocalBlob { id } = &reference else {
            panic!("expected local blob, got {reference:?}");
        };

        let record: BlobRecord =
            serde_json::from_str(&store.get(&format!("blob_{id}")).unwrap().unwrap()).unwrap();
        assert_eq!(record.name, "bottle.png");
        assert_eq!(record.size, 3);
        let meta: BlobMeta =
            serde_json::from_str(&store.get(&format!("meta_{id}")).unwrap().unwrap()).unwrap();
        assert_eq!(meta.storage, "blob");

        let path = url::Url::parse(&record.url).unwrap().to_file_path().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), vec![1, 2, 3]);
    }

    fn gated_chain(
        dir: &std::path::Path,
        store: Arc<MemoryStore>,
    ) -> (UploadChain, [Arc<Mutex<u32>>; 2]) {
        let limit = Config::default().paste_size_limit;
        let pinning = DownBackend::new(limit);
        let paste = DownBackend::new(limit);
        let attempts = [pinning.attempts.clone(), paste.attempts.clone()];
        let chain = UploadChain::new(
            vec![
                Box::new(pinning),
                Box::new(paste),
                Box::new(LocalBlobBackend::new(dir.into(), store.clone())),
            ],
            resolver(store),
            "http://localhost:3000",
        );
        (chain, attempts)
    }

    #[tokio::test]
    async fn test_large_file_skips_remote_stores() {
        let dir = tempfile::tempdir().unwrap();
        let (chain, attempts) = gated_chain(dir.path(), Arc::new(MemoryStore::new()));
        let big = UploadFile::new("scan.tiff", "image/tiff", vec![0u8; 1024 * 1024]);
        let reference = chain.store(&big).await.unwrap();
        assert_eq!(reference.kind(), "local-blob");
        for counter in &attempts {
            assert_eq!(*counter.lock().unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_file_below_limit_tries_remote_stores() {
        let dir = tempfile::tempdir().unwrap();
        let (chain, attempts) = gated_chain(dir.path(), Arc::new(MemoryStore::new()));
        let file = UploadFile::new("scan.tiff", "image/tiff", vec![0u8; 1024 * 1024 - 1]);
        let reference = chain.store(&file).await.unwrap();
        assert_eq!(reference.kind(), "local-blob");
        for counter in &attempts {
            assert_eq!(*counter.lock().unwrap(), 1);
        }
    }

    #[test]
    fn test_remote_backends_gate_on_size() {
        let timeout = Duration::from_secs(1);
        let limit = 1024 * 1024;
        let pinning = JsonBinBackend::new("https://api.jsonbin.io/v3/b", limit, timeout).unwrap();
        let paste = GistBackend::new("https://api.github.com/gists", limit, timeout).unwrap();
        let at_limit = UploadFile::new("a.bin", "image/png", vec![0u8; 1024 * 1024]);
        let below = UploadFile::new("b.bin", "image/png", vec![0u8; 1024 * 1024 - 1]);
        assert!(!pinning.accepts(&at_limit));
        assert!(!paste.accepts(&at_limit));
        assert!(pinning.accepts(&below));
        assert!(paste.accepts(&below));
    }

    #[tokio::test]
    async fn test_blob_index_persists_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = Arc::new(crate::kv_store::FileStore::open(path.clone()).unwrap());
        let backend = LocalBlobBackend::new(dir.path().join("blobs"), store);
        let ContentReference::LocalBlob { id } = backend.store(&image()).await.unwrap() else {
            panic!("expected local blob");
        };

        let reopened = crate::kv_store::FileStore::open(path).unwrap();
        assert!(reopened.get(&format!("blob_{id}")).unwrap().is_some());
        assert!(reopened.get(&format!("meta_{id}")).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_local_failure_surfaces_storage_error() {
        let store = Arc::new(MemoryStore::new());
        let file = tempfile::NamedTempFile::new().unwrap();
        // A regular file cannot be used as the blob directory.
        let chain = UploadChain::new(
            vec![
                Box::new(DownBackend::new(u64::MAX)),
                Box::new(LocalBlobBackend::new(file.path().into(), store.clone())),
            ],
            resolver(store),
            "http://localhost:3000",
        );
        let err = chain.store(&image()).await.unwrap_err();
        assert!(matches!(err, crate::Error::Storage(_)));
        assert!(err.to_string().contains("content storage exhausted"));
    }

    #[tokio::test]
    async fn test_upload_nft_content_links_image_and_metadata() {
        let store = Arc::new(MemoryStore::new());
        let chain = UploadChain::new(
            vec![Box::new(PinningBackend::new())],
            resolver(store),
            "https://market.example",
        );
        let form = WasteForm {
            name: "Plastic".into(),
            description: "PET bottles".into(),
            country: "Kenya".into(),
            collection_point: "Depot 4".into(),
            weight: "2.5".into(),
            price: "0.1".into(),
        };
        let content = chain.upload_nft_content(&form, &image()).await.unwrap();

        assert_eq!(content.image_reference.to_string(), "jsonbin_bin1");
        assert_eq!(content.image_url, "https://api.jsonbin.io/v3/b/bin1/latest");
        assert_eq!(content.metadata.url, "ipfs://jsonbin_bin2");
        assert_eq!(content.metadata_reference.to_string(), "jsonbin_bin2");
        assert_eq!(content.metadata.gateway, "https://api.jsonbin.io/v3/b/bin2/latest");

        let data = &content.metadata.data;
        assert_eq!(data.image, "ipfs://jsonbin_bin1");
        assert_eq!(data.image_url, content.image_url);
        assert_eq!(data.background_color, "00FF00");
        assert_eq!(data.external_url, "https://market.example");
        assert_eq!(data.properties.collection_point, "Depot 4");
        let traits: Vec<&str> = data.attributes.iter().map(|a| a.trait_type.as_str()).collect();
        assert_eq!(traits, vec!["Country", "Collection Point", "Weight", "Price"]);
        assert!(data.timestamp.is_some());
    }
}
