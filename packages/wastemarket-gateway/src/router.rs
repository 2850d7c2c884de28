//! HTTP router setup.

use crate::handlers;
use crate::middleware::{api_key_auth, inject_request_id};
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the application router. Write routes sit behind the API key.
pub fn create(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(state.config.max_upload_bytes).unwrap_or(usize::MAX);
    let writes = Router::new()
        .route("/mint", post(handlers::mint))
        .route("/purchase", post(handlers::purchase))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(api_key_auth));

    // The marketplace UI is served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/listings", get(handlers::listings))
        .route("/owned", get(handlers::owned))
        .route("/views/{name}", get(handlers::view))
        .route("/resolve", get(handlers::resolve))
        .route("/contract/verify", get(handlers::verify_contract))
        .merge(writes)
        .layer(from_fn(inject_request_id))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
