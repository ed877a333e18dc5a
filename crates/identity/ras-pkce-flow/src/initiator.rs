//! Flow start: PKCE material, persisted state and the authorization redirect.

use crate::config::PkceFlowConfig;
use crate::error::PkceFlowResult;
use crate::pkce::{PkceChallenge, generate_state_token};
use crate::state::SessionStore;
use crate::types::RedirectTarget;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct FlowInitiator {
    config: Arc<PkceFlowConfig>,
    store: Arc<dyn SessionStore>,
}

impl FlowInitiator {
    pub fn new(config: Arc<PkceFlowConfig>, store: Arc<dyn SessionStore>) -> Self {
        Self { config, store }
    }

    /// Begin a new authorization.
    ///
    /// The state is persisted before the URL is returned; if the store refuses the write
    /// no redirect is produced, since the callback could never be validated.
    pub async fn start_flow(&self) -> PkceFlowResult<RedirectTarget> {
        let mut url = self.config.authorization_url()?;
        let ttl = self.config.state_ttl()?;

        let pkce = PkceChallenge::new();
        let state = generate_state_token();

        if let Err(e) = self
            .store
            .put(&state, &pkce.code_verifier, ttl)
            .await
        {
            error!("Failed to persist flow state: {}", e);
            return Err(e);
        }

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.config.client_id);
            params.append_pair("redirect_uri", &self.config.redirect_uri);
            params.append_pair("scope", &self.config.scope_param());
            params.append_pair("state", &state);
            params.append_pair("code_challenge", &pkce.code_challenge);
            params.append_pair("code_challenge_method", pkce.code_challenge_method);

            for (key, value) in &self.config.extra_auth_params {
                params.append_pair(key, value);
            }
        }

        debug!(
            "Generated authorization URL for endpoint {}",
            self.config.authorization_endpoint
        );
        info!("Started PKCE authorization flow");

        Ok(RedirectTarget {
            url: url.to_string(),
            state,
            expires_in: self.config.state_ttl_seconds,
        })
    }
}
