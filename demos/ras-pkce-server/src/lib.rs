//! HTTP host for the PKCE authorization flow.
//!
//! Wires [`ras_pkce_flow::PkceFlow`] into an axum router, loads configuration once at
//! start-up and installs logging.

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

pub use config::Config;
pub use error::ApiError;
pub use routes::{AppState, STATE_COOKIE, create_router};
