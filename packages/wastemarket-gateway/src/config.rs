//! Gateway configuration.

use serde::Deserialize;

/// Configuration for the marketplace gateway.
///
/// Loaded from an optional `wastemarket.toml` and `WASTEMARKET_*` environment
/// variables; every field falls back to a Hedera testnet default.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "defaults::rpc_url")]
    pub rpc_url: String,

    #[serde(default = "defaults::fallback_rpc_url")]
    pub fallback_rpc_url: String,

    /// EIP-1193 style endpoint of the user's wallet bridge.
    #[serde(default = "defaults::wallet_rpc_url")]
    pub wallet_rpc_url: String,

    #[serde(default = "defaults::mirror_node_url")]
    pub mirror_node_url: String,

    #[serde(default = "defaults::explorer_url")]
    pub explorer_url: String,

    #[serde(default = "defaults::contract_address")]
    pub contract_address: String,

    /// Hedera `shard.realm.num` id of the marketplace contract.
    #[serde(default = "defaults::contract_id")]
    pub contract_id: String,

    #[serde(default = "defaults::chain_id")]
    pub chain_id: u64,

    #[serde(default = "defaults::gas_limit")]
    pub gas_limit: u64,

    /// Hedera rejects anything below 350 gwei.
    #[serde(default = "defaults::gas_price_gwei")]
    pub gas_price_gwei: u64,

    #[serde(default = "defaults::bind_address")]
    pub bind_address: String,

    /// Root for the key-value store file and local blobs.
    #[serde(default = "defaults::data_dir")]
    pub data_dir: String,

    /// Written as `external_url` into minted metadata.
    #[serde(default = "defaults::site_url")]
    pub site_url: String,

    #[serde(default = "defaults::pinning_upload_url")]
    pub pinning_upload_url: String,

    #[serde(default = "defaults::pinning_read_template")]
    pub pinning_read_template: String,

    #[serde(default = "defaults::paste_upload_url")]
    pub paste_upload_url: String,

    #[serde(default = "defaults::paste_read_template")]
    pub paste_read_template: String,

    #[serde(default = "defaults::ipfs_gateways")]
    pub ipfs_gateways: Vec<String>,

    /// Files at or above this size skip the remote paste stores.
    #[serde(default = "defaults::paste_size_limit")]
    pub paste_size_limit: u64,

    /// Request body cap for `/mint` and `/purchase`. Files travel base64 encoded.
    #[serde(default = "defaults::max_upload_bytes")]
    pub max_upload_bytes: u64,

    #[serde(default = "defaults::http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "defaults::receipt_poll_ms")]
    pub receipt_poll_ms: u64,

    #[serde(default = "defaults::receipt_max_polls")]
    pub receipt_max_polls: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: defaults::rpc_url(),
            fallback_rpc_url: defaults::fallback_rpc_url(),
            wallet_rpc_url: defaults::wallet_rpc_url(),
            mirror_node_url: defaults::mirror_node_url(),
            explorer_url: defaults::explorer_url(),
            contract_address: defaults::contract_address(),
            contract_id: defaults::contract_id(),
            chain_id: defaults::chain_id(),
            gas_limit: defaults::gas_limit(),
            gas_price_gwei: defaults::gas_price_gwei(),
            bind_address: defaults::bind_address(),
            data_dir: defaults::data_dir(),
            site_url: defaults::site_url(),
            pinning_upload_url: defaults::pinning_upload_url(),
            pinning_read_template: defaults::pinning_read_template(),
            paste_upload_url: defaults::paste_upload_url(),
            paste_read_template: defaults::paste_read_template(),
            ipfs_gateways: defaults::ipfs_gateways(),
            paste_size_limit: defaults::paste_size_limit(),
            max_upload_bytes: defaults::max_upload_bytes(),
            http_timeout_secs: defaults::http_timeout_secs(),
            receipt_poll_ms: defaults::receipt_poll_ms(),
            receipt_max_polls: defaults::receipt_max_polls(),
        }
    }
}

impl Config {
    /// Load from `wastemarket.toml` (optional) and `WASTEMARKET_*` env vars.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_with(config::File::with_name("wastemarket").required(false))
    }

    fn load_with<S>(file: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("WASTEMARKET")
                    .list_separator(",")
                    .with_list_parse_key("ipfs_gateways")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn kv_store_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("store.json")
    }

    pub fn blob_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("blobs")
    }
}

mod defaults {
    fn network() -> String {
        std::env::var("WASTEMARKET_NETWORK")
            .or_else(|_| std::env::var("HEDERA_NETWORK"))
            .unwrap_or_else(|_| "testnet".into())
    }

    pub fn rpc_url() -> String {
        if network().contains("mainnet") {
            "https://mainnet.hashio.io/api".into()
        } else {
            "https://testnet.hashio.io/api".into()
        }
    }

    pub fn fallback_rpc_url() -> String {
        if network().contains("mainnet") {
            "https://295.rpc.thirdweb.com".into()
        } else {
            "https://296.rpc.thirdweb.com".into()
        }
    }

    pub fn wallet_rpc_url() -> String {
        "http://127.0.0.1:8546".into()
    }

    pub fn mirror_node_url() -> String {
        if network().contains("mainnet") {
            "https://mainnet.mirrornode.hedera.com/api/v1".into()
        } else {
            "https://testnet.mirrornode.hedera.com/api/v1".into()
        }
    }

    pub fn explorer_url() -> String {
        "https://hashscan.io/testnet".into()
    }

    pub fn contract_address() -> String {
        "0x68eda53448d0ded662a2891064cb7d094c53eccd".into()
    }

    pub fn contract_id() -> String {
        "0.0.6519500".into()
    }

    pub fn chain_id() -> u64 {
        296
    }

    pub fn gas_limit() -> u64 {
        1_000_000
    }

    pub fn gas_price_gwei() -> u64 {
        350
    }

    pub fn bind_address() -> String {
        "0.0.0.0:3050".into()
    }

    pub fn data_dir() -> String {
        "./data".into()
    }

    pub fn site_url() -> String {
        "http://localhost:3000".into()
    }

    pub fn pinning_upload_url() -> String {
        "https://api.jsonbin.io/v3/b".into()
    }

    pub fn pinning_read_template() -> String {
        "https://api.jsonbin.io/v3/b/{id}/latest".into()
    }

    pub fn paste_upload_url() -> String {
        "https://api.github.com/gists".into()
    }

    pub fn paste_read_template() -> String {
        "https://gist.githubusercontent.com/anonymous/{id}/raw".into()
    }

    pub fn ipfs_gateways() -> Vec<String> {
        vec![
            "https://gateway.pinata.cloud/ipfs/".into(),
            "https://cloudflare-ipfs.com/ipfs/".into(),
            "https://ipfs.io/ipfs/".into(),
        ]
    }

    pub fn paste_size_limit() -> u64 {
        1024 * 1024
    }

    pub fn max_upload_bytes() -> u64 {
        32 * 1024 * 1024
    }

    pub fn http_timeout_secs() -> u64 {
        15
    }

    pub fn receipt_poll_ms() -> u64 {
        2_000
    }

    pub fn receipt_max_polls() -> u32 {
        60
    }
}
