//! Error types for the gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::fmt;
use wastemarket_types::{describe, CodecError};

/// Gateway error type.
#[derive(Debug)]
pub enum Error {
    /// Configuration error.
    Config(String),
    /// JSON-RPC transport or node error.
    Rpc(String),
    /// Wallet endpoint error (rejected request, wrong chain, etc.).
    Wallet(String),
    /// Mirror node error.
    Mirror(String),
    /// Metadata fetch or parse error.
    Metadata(String),
    /// A remote upload backend failed.
    Upload(String),
    /// Local storage failure. Terminal for the upload chain.
    Storage(String),
    /// Contract returned data that could not be decoded, or reverted.
    Contract(String),
    /// Caller supplied bad input.
    InvalidInput(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "config error: {msg}"),
            Error::Rpc(msg) => write!(f, "rpc error: {msg}"),
            Error::Wallet(msg) => write!(f, "wallet error: {msg}"),
            Error::Mirror(msg) => write!(f, "mirror node error: {msg}"),
            Error::Metadata(msg) => write!(f, "metadata error: {msg}"),
            Error::Upload(msg) => write!(f, "upload error: {msg}"),
            Error::Storage(msg) => write!(f, "storage error: {msg}"),
            Error::Contract(msg) => write!(f, "contract error: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Contract(e.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Config(_) | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Rpc(_) | Error::Mirror(_) | Error::Metadata(_) | Error::Upload(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::Wallet(_) | Error::Contract(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        };
        let message = self.to_string();
        let body = match &self {
            Error::InvalidInput(_) | Error::Config(_) => serde_json::json!({
                "success": false,
                "error": message,
            }),
            _ => serde_json::json!({
                "success": false,
                "error": message,
                "details": describe(&message),
            }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::InvalidInput("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Rpc("x".into()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Storage("x".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Wallet("x".into()).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_display_keeps_classifier_patterns() {
        let err = Error::Wallet("insufficient funds for gas".into());
        assert_eq!(
            wastemarket_types::classify(&err.to_string()),
            wastemarket_types::ErrorCategory::InsufficientBalance
        );
    }
}
