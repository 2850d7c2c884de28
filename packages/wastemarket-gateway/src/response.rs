//! Response types for the gateway API.

use serde::Serialize;

use crate::market::{MintReceipt, PurchaseReceipt};
use crate::query::Listings;
use crate::view_model::LoadState;

/// Response from the listing endpoints.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub listings: Listings,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_id: String,
}

/// Current state of a named view.
#[derive(Serialize)]
pub struct ViewResponse {
    pub view: String,
    #[serde(flatten)]
    pub state: LoadState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintResponse {
    pub success: bool,
    #[serde(flatten)]
    pub receipt: MintReceipt,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub success: bool,
    #[serde(flatten)]
    pub receipt: PurchaseReceipt,
}

/// Response from the health endpoint.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub contract_address: String,
    pub contract_id: String,
    pub chain_id: u64,
    pub uptime_secs: u64,
    pub requests: u64,
    pub active_rpc: String,
    pub failovers: u64,
    pub rpc_status: &'static str,
}
