//! HTTP request handlers.

use crate::metrics::METRICS;
use crate::middleware::RequestId;
use crate::response::{
    HealthResponse, ListingsResponse, MintResponse, PurchaseResponse, ViewResponse,
};
use crate::state::{lock, AppState};
use crate::upload::{UploadFile, WasteForm};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use base64::Engine;
use serde::Deserialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use wastemarket_types::Address;

/// Health check with RPC status.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rpc_status = state.rpc.health_check().await.unwrap_or("unavailable");
    Json(HealthResponse {
        status: rpc_status,
        contract_address: state.config.contract_address.clone(),
        contract_id: state.config.contract_id.clone(),
        chain_id: state.config.chain_id,
        uptime_secs: state.start_time.elapsed().as_secs(),
        requests: state.request_count.load(Ordering::Relaxed),
        active_rpc: state.rpc.active_url().to_string(),
        failovers: state.rpc.failover_count(),
        rpc_status,
    })
}

/// Prometheus metrics in text exposition format.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.render(state.rpc.is_circuit_open()),
    )
}

/// `GET /listings`: unsold items, falling back to samples.
pub async fn listings(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
) -> Json<ListingsResponse> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    info!(req_id = %request_id, "Loading marketplace");
    let listings = state.refresh_marketplace().await;
    Json(ListingsResponse {
        success: true,
        listings,
        request_id,
    })
}

#[derive(Debug, Deserialize)]
pub struct OwnedQuery {
    pub owner: Option<String>,
}

/// `GET /owned?owner=0x..`: items owned by `owner`, or by the wallet account.
pub async fn owned(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Query(query): Query<OwnedQuery>,
) -> Result<Json<ListingsResponse>, crate::Error> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    let owner = query
        .owner
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Address>()
                .map_err(|e| crate::Error::InvalidInput(format!("owner {s}: {e}")))
        })
        .transpose()?;
    info!(req_id = %request_id, owner = ?owner, "Loading owned items");
    let listings = state.refresh_owned(owner).await;
    Ok(Json(ListingsResponse {
        success: true,
        listings,
        request_id,
    }))
}

/// `GET /views/{name}`: last known state of a view without reloading.
pub async fn view(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, crate::Error> {
    let view = match name.as_str() {
        "marketplace" => &state.marketplace_view,
        "owned" => &state.owned_view,
        _ => return Err(crate::Error::InvalidInput(format!("unknown view {name}"))),
    };
    let snapshot = lock(view).state().clone();
    Ok(Json(ViewResponse {
        view: name,
        state: snapshot,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    #[serde(rename = "ref")]
    pub reference: String,
}

/// `GET /resolve?ref=..`: fetchable URL(s) for a stored content reference.
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResolveQuery>,
) -> impl IntoResponse {
    Json(state.market.resolve(&query.reference))
}

/// `GET /contract/verify`
pub async fn verify_contract(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.market.verify_contract().await)
}

/// Uploaded file as sent by the form: base64 bytes, optionally as a data URL.
#[derive(Debug, Deserialize)]
pub struct FilePayload {
    pub name: String,
    #[serde(rename = "type", default)]
    pub content_type: String,
    pub data: String,
}

impl FilePayload {
    fn decode(self) -> Result<UploadFile, crate::Error> {
        let encoded = match self.data.split_once("base64,") {
            Some((_, rest)) => rest,
            None => self.data.as_str(),
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| crate::Error::InvalidInput(format!("file data: {e}")))?;
        let content_type = if self.content_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            self.content_type
        };
        Ok(UploadFile::new(self.name, content_type, bytes))
    }
}

#[derive(Debug, Deserialize)]
pub struct MintRequest {
    #[serde(flatten)]
    pub form: WasteForm,
    pub file: FilePayload,
}

/// `POST /mint`
pub async fn mint(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(request): Json<MintRequest>,
) -> Result<Json<MintResponse>, crate::Error> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    info!(req_id = %request_id, name = %request.form.name, "Minting");
    let file = request.file.decode()?;
    let receipt = state.market.mint(&request.form, &file).await?;
    Ok(Json(MintResponse {
        success: true,
        receipt,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub token_id: u64,
    pub price: String,
}

/// `POST /purchase`
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(request): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, crate::Error> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    info!(req_id = %request_id, token_id = request.token_id, "Purchasing");
    let receipt = state.market.purchase(request.token_id, &request.price).await?;
    Ok(Json(PurchaseResponse {
        success: true,
        receipt,
    }))
}
