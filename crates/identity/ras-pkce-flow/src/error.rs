//! PKCE flow error types.

use thiserror::Error;

pub type PkceFlowResult<T> = Result<T, PkceFlowError>;

/// Why a callback was rejected before (or instead of) a token exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidStateReason {
    #[error("missing authorization code")]
    MissingCode,

    #[error("missing state parameter")]
    MissingState,

    #[error("no state bound to the caller session")]
    MissingBinding,

    #[error("state does not match the caller session")]
    BindingMismatch,

    #[error("state not found or already consumed")]
    UnknownState,

    #[error("state expired")]
    Expired,
}

#[derive(Debug, Error)]
pub enum PkceFlowError {
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Session store error: {0}")]
    StorageError(String),

    #[error("Invalid state: {0}")]
    InvalidState(InvalidStateReason),

    #[error("Token exchange failed (status {status:?}): {payload}")]
    TokenExchangeFailed {
        /// Provider HTTP status, absent when the request never got a response.
        status: Option<u16>,
        /// Raw provider payload, for operators only.
        payload: String,
    },
}

impl PkceFlowError {
    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            PkceFlowError::InvalidState(_) => 400,
            PkceFlowError::ConfigError(_)
            | PkceFlowError::StorageError(_)
            | PkceFlowError::TokenExchangeFailed { .. } => 500,
        }
    }

    /// Machine-readable error code for response bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            PkceFlowError::ConfigError(_) => "configuration_error",
            PkceFlowError::StorageError(_) => "storage_error",
            PkceFlowError::InvalidState(_) => "invalid_state",
            PkceFlowError::TokenExchangeFailed { .. } => "token_exchange_failed",
        }
    }

    /// Message that is safe to show to the end user.
    ///
    /// Never includes the rejection reason, store details or the provider payload.
    pub fn public_message(&self) -> &'static str {
        match self {
            PkceFlowError::ConfigError(_) | PkceFlowError::StorageError(_) => {
                "Authorization is temporarily unavailable"
            }
            PkceFlowError::InvalidState(_) => "Invalid state or code",
            PkceFlowError::TokenExchangeFailed { .. } => "Token exchange failed",
        }
    }

    pub(crate) fn invalid_state(reason: InvalidStateReason) -> Self {
        PkceFlowError::InvalidState(reason)
    }
}
