//! # Waste Marketplace Gateway
//!
//! Serves the recycled-waste NFT marketplace: reads listings from the
//! marketplace contract with RPC → wallet → sample fallback, stores images
//! and metadata through a chain of upload backends, and submits mint and
//! purchase transactions through a wallet endpoint.
//!
//! ## Endpoints
//! - `GET /health` - Health check with RPC status
//! - `GET /metrics` - Prometheus metrics
//! - `GET /listings` - Unsold marketplace items
//! - `GET /owned?owner=0x..` - Items owned by an account
//! - `GET /views/{marketplace|owned}` - Last loaded state of a view
//! - `GET /resolve?ref=..` - Fetchable URL for a content reference
//! - `GET /contract/verify` - Contract reachability report
//! - `POST /mint` - Upload content and mint a token
//! - `POST /purchase` - Buy a listed token

pub mod config;
pub mod contract;
mod error;
mod handlers;
pub mod kv_store;
pub mod market;
pub mod metadata;
pub mod metrics;
mod middleware;
pub mod mirror;
pub mod query;
pub mod resolver;
mod response;
mod router;
pub mod rpc;
mod state;
pub mod upload;
pub mod view_model;
pub mod wallet;

pub use config::Config;
pub use error::Error;
pub use market::WasteMarket;
pub use router::create as create_router;
pub use state::AppState;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
