//! Application state shared across handlers.

use crate::config::Config;
use crate::kv_store::{FileStore, KeyValueStore};
use crate::market::{default_upload_backends, MarketParts, WasteMarket};
use crate::metadata::HttpMetadataFetcher;
use crate::mirror::MirrorClient;
use crate::query::Listings;
use crate::rpc::RpcClient;
use crate::view_model::ViewModel;
use crate::wallet::RpcWallet;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;
use wastemarket_types::Address;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub rpc: Arc<RpcClient>,
    pub market: WasteMarket,
    pub marketplace_view: Mutex<ViewModel>,
    pub owned_view: Mutex<ViewModel>,
    pub start_time: Instant,
    pub request_count: AtomicU64,
}

impl AppState {
    /// Create application state from configuration.
    pub fn new(config: Config) -> Result<Self, crate::Error> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let rpc = Arc::new(RpcClient::new(
            &config.rpc_url,
            &config.fallback_rpc_url,
            timeout,
        )?);
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(config.kv_store_path())?);
        info!(path = %config.kv_store_path().display(), "Opened key-value store");

        let parts = MarketParts {
            reader: rpc.clone(),
            wallet: Arc::new(RpcWallet::new(&config.wallet_rpc_url, timeout)?),
            mirror: Arc::new(MirrorClient::new(
                &config.mirror_node_url,
                &config.contract_id,
                timeout,
            )?),
            fetcher: Arc::new(HttpMetadataFetcher::new(timeout)?),
            upload_backends: default_upload_backends(&config, store.clone())?,
            store,
        };
        let market = WasteMarket::new(&config, parts)?;
        Ok(Self::with_market(config, rpc, market))
    }

    pub fn with_market(config: Config, rpc: Arc<RpcClient>, market: WasteMarket) -> Self {
        Self {
            config,
            rpc,
            market,
            marketplace_view: Mutex::new(ViewModel::new()),
            owned_view: Mutex::new(ViewModel::new()),
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }

    /// Load marketplace listings through the view-model.
    pub async fn refresh_marketplace(&self) -> Listings {
        let ticket = lock(&self.marketplace_view).begin();
        let listings = self.market.load_listings().await;
        if !lock(&self.marketplace_view).complete(ticket, listings.clone()) {
            info!("Discarded stale marketplace load");
        }
        listings
    }

    /// Load owned items through the view-model.
    pub async fn refresh_owned(&self, owner: Option<Address>) -> Listings {
        let ticket = lock(&self.owned_view).begin();
        let listings = self.market.load_owned_items(owner).await;
        if !lock(&self.owned_view).complete(ticket, listings.clone()) {
            info!("Discarded stale owned-items load");
        }
        listings
    }
}

pub(crate) fn lock(view: &Mutex<ViewModel>) -> std::sync::MutexGuard<'_, ViewModel> {
    view.lock().unwrap_or_else(|e| e.into_inner())
}
