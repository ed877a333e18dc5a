//! Router for the two flow triggers.
//!
//! `GET {prefix}/auth` starts a flow and answers with a 302 to the provider, binding the
//! state token to the browser with an HTTP-only cookie. `GET {prefix}/callback` checks the
//! returned state against that cookie and the session store, then exchanges the code.

use crate::config::ServerConfig;
use crate::error::ApiError;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use ras_pkce_flow::{CallbackParams, CallerContext, PkceFlow};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Name of the cookie carrying the state token between start and callback.
pub const STATE_COOKIE: &str = "st";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<PkceFlow>,
    pub secure_cookies: bool,
    pub expose_provider_errors: bool,
}

impl AppState {
    pub fn new(flow: Arc<PkceFlow>, server: &ServerConfig) -> Self {
        Self {
            flow,
            secure_cookies: server.secure_cookies,
            expose_provider_errors: server.expose_provider_errors,
        }
    }

    fn state_cookie(&self, state: String, max_age_seconds: u64) -> Cookie<'static> {
        Cookie::build((STATE_COOKIE, state))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(max_age_seconds as i64))
            .build()
    }
}

/// Build the application router
pub fn create_router(state: AppState, route_prefix: &str) -> Router {
    let flow_routes = Router::new()
        .route("/auth", get(start_handler))
        .route("/callback", get(callback_handler));

    Router::new()
        .nest(route_prefix, flow_routes)
        .route("/health", get(health_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler to start the authorization flow
async fn start_handler(State(state): State<AppState>, jar: CookieJar) -> Response {
    match state.flow.start_flow().await {
        Ok(target) => {
            info!("Redirecting to authorization endpoint");
            let cookie = state.state_cookie(target.state, target.expires_in);
            (
                StatusCode::FOUND,
                jar.add(cookie),
                [(header::LOCATION, target.url)],
            )
                .into_response()
        }
        Err(e) => ApiError::from_flow_error(e, state.expose_provider_errors).into_response(),
    }
}

/// Handler for the provider's redirect back
async fn callback_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let bound_state = jar.get(STATE_COOKIE).map(|c| c.value().to_string());

    // The cookie is spent once its flow reaches the callback, whatever the outcome.
    let flow_finished = bound_state.is_some() && bound_state == params.state;
    let jar = if flow_finished {
        jar.remove(Cookie::build(STATE_COOKIE).path("/"))
    } else {
        jar
    };

    let context = CallerContext { bound_state };
    match state.flow.complete_flow(params, &context).await {
        Ok(token) => {
            info!("Authorization callback completed");
            (jar, Json(token)).into_response()
        }
        Err(e) => (jar, ApiError::from_flow_error(e, state.expose_provider_errors)).into_response(),
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn not_found_handler() -> ApiError {
    ApiError::not_found()
}
