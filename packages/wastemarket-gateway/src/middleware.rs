//! Authentication and request correlation middleware.

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::OnceLock;
use subtle::ConstantTimeEq;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// `WASTEMARKET_API_KEY`, read once. `None` leaves write routes open.
static API_KEY: OnceLock<Option<String>> = OnceLock::new();

fn configured_key() -> Option<&'static str> {
    API_KEY
        .get_or_init(|| {
            std::env::var("WASTEMARKET_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
        })
        .as_deref()
}

/// `X-Api-Key`, else the token of `Authorization: Bearer`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header("x-api-key").or_else(|| header("authorization")?.strip_prefix("Bearer "))
}

fn key_matches(presented: Option<&str>, expected: &str) -> bool {
    presented.is_some_and(|key| {
        key.len() == expected.len() && bool::from(key.as_bytes().ct_eq(expected.as_bytes()))
    })
}

/// Guard the write endpoints (mint, purchase).
pub async fn api_key_auth(request: Request, next: Next) -> Response {
    let Some(expected) = configured_key() else {
        return next.run(request).await;
    };
    if key_matches(presented_key(request.headers()), expected) {
        return next.run(request).await;
    }
    let body = serde_json::json!({
        "success": false,
        "error": "Unauthorized: invalid or missing API key"
    });
    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}

fn new_request_id() -> String {
    use rand::Rng;
    format!("wm-{:016x}", rand::thread_rng().gen::<u64>())
}

/// Reuse the caller's `x-request-id` or mint one, expose it to handlers as
/// [`RequestId`], and echo it on the response.
pub async fn inject_request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(new_request_id, str::to_owned);

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Correlation id for log lines, set by [`inject_request_id`].
#[derive(Clone, Debug, Default)]
pub struct RequestId(pub String);
