//! OAuth2 Authorization Code flow with PKCE.
//!
//! The flow runs as two independent request cycles connected only through a
//! [`SessionStore`]:
//!
//! - [`FlowInitiator::start_flow`] generates a verifier, challenge and state token,
//!   persists `state -> verifier` and returns the provider's authorization URL.
//! - [`FlowCompleter::complete_flow`] validates the provider's callback, consumes the
//!   stored state exactly once and exchanges the code through a [`ProviderClient`].
//!
//! [`PkceFlow`] bundles both halves over one configuration.

mod completer;
mod config;
mod error;
mod initiator;
mod pkce;
mod provider;
mod state;
mod types;


use std::sync::Arc;

pub use completer::FlowCompleter;
pub use config::{MAX_STATE_TTL_SECONDS, PkceFlowConfig, RECOMMENDED_MAX_STATE_TTL_SECONDS};
pub use error::{InvalidStateReason, PkceFlowError, PkceFlowResult};
pub use initiator::FlowInitiator;
pub use pkce::{CHALLENGE_METHOD_S256, PkceChallenge, derive_code_challenge, generate_state_token};
pub use provider::{HttpProviderClient, ProviderClient, ProviderResponse, TokenRequest};
pub use state::{FlowState, InMemorySessionStore, SessionStore};
pub use types::{CallbackParams, CallerContext, FlowPhase, RedirectTarget, TokenResult};

/// Both halves of the flow sharing one validated configuration and store.
#[derive(Clone)]
pub struct PkceFlow {
    config: Arc<PkceFlowConfig>,
    store: Arc<dyn SessionStore>,
    initiator: FlowInitiator,
    completer: FlowCompleter,
}

impl PkceFlow {
    /// Build a flow, rejecting an incomplete configuration up front.
    pub fn new(
        config: PkceFlowConfig,
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn ProviderClient>,
    ) -> PkceFlowResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Self {
            initiator: FlowInitiator::new(config.clone(), store.clone()),
            completer: FlowCompleter::new(config.clone(), store.clone(), provider),
            config,
            store,
        })
    }

    /// Build a flow that exchanges codes over HTTP at the configured token endpoint.
    pub fn with_http_provider(
        config: PkceFlowConfig,
        store: Arc<dyn SessionStore>,
    ) -> PkceFlowResult<Self> {
        let provider = Arc::new(HttpProviderClient::from_config(&config)?);
        Self::new(config, store, provider)
    }

    pub fn config(&self) -> &PkceFlowConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub async fn start_flow(&self) -> PkceFlowResult<RedirectTarget> {
        self.initiator.start_flow().await
    }

    pub async fn complete_flow(
        &self,
        params: CallbackParams,
        context: &CallerContext,
    ) -> PkceFlowResult<TokenResult> {
        self.completer.complete_flow(params, context).await
    }
}
