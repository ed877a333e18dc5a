//! HTTP error responses for the authorization routes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ras_pkce_flow::PkceFlowError;
use serde::Serialize;
use tracing::error;

/// Error body sent to the user agent.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: &'static str,
    pub message: String,
    /// Provider diagnostics, only populated when the operator opted in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", "Not found")
    }

    /// Map a flow error, keeping provider payloads out of the body unless `expose_details`.
    pub fn from_flow_error(err: PkceFlowError, expose_details: bool) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if matches!(
            err,
            PkceFlowError::ConfigError(_) | PkceFlowError::StorageError(_)
        ) {
            error!("Authorization flow unavailable: {}", err);
        }

        let mut api_error = Self::new(status, err.error_code(), err.public_message());
        if expose_details {
            if let PkceFlowError::TokenExchangeFailed { payload, .. } = err {
                api_error.details = Some(payload);
            }
        }
        api_error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
