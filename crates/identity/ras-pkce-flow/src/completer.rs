//! Flow completion: callback validation, one-shot state consumption and token exchange.

use crate::config::PkceFlowConfig;
use crate::error::{InvalidStateReason, PkceFlowError, PkceFlowResult};
use crate::provider::{ProviderClient, ProviderResponse, TokenRequest};
use crate::state::SessionStore;
use crate::types::{CallbackParams, CallerContext, FlowPhase, TokenResult};
use std::sync::Arc;
use tracing::{Span, error, info, instrument, warn};

#[derive(Clone)]
pub struct FlowCompleter {
    config: Arc<PkceFlowConfig>,
    store: Arc<dyn SessionStore>,
    provider: Arc<dyn ProviderClient>,
}

impl FlowCompleter {
    pub fn new(
        config: Arc<PkceFlowConfig>,
        store: Arc<dyn SessionStore>,
        provider: Arc<dyn ProviderClient>,
    ) -> Self {
        Self {
            config,
            store,
            provider,
        }
    }

    /// Validate a callback against its stored flow state and exchange the code.
    ///
    /// The stored state is consumed before the exchange is attempted, so a state can
    /// complete at most one exchange whatever its outcome. Nothing is retried.
    #[instrument(name = "complete_flow", skip_all, fields(phase = %FlowPhase::Started))]
    pub async fn complete_flow(
        &self,
        params: CallbackParams,
        context: &CallerContext,
    ) -> PkceFlowResult<TokenResult> {
        if let Some(provider_error) = &params.error {
            warn!(
                "Provider returned error on callback: {}: {}",
                provider_error,
                params
                    .error_description
                    .as_deref()
                    .unwrap_or("No description")
            );
        }

        let code = non_empty(params.code).ok_or_else(|| reject(InvalidStateReason::MissingCode))?;
        let state =
            non_empty(params.state).ok_or_else(|| reject(InvalidStateReason::MissingState))?;

        // Checked before touching the store, so a forged callback cannot burn a genuine flow.
        match context.bound_state.as_deref() {
            Some(bound) if bound != state => {
                return Err(reject(InvalidStateReason::BindingMismatch));
            }
            None if self.config.require_state_binding => {
                return Err(reject(InvalidStateReason::MissingBinding));
            }
            _ => {}
        }

        let flow_state = self
            .store
            .take(&state)
            .await?
            .ok_or_else(|| reject(InvalidStateReason::UnknownState))?;

        // Consumed either way; an expired entry cannot be retried.
        if flow_state.is_expired() {
            return Err(reject(InvalidStateReason::Expired));
        }
        record_phase(FlowPhase::Validated);

        let request = TokenRequest {
            code,
            code_verifier: flow_state.code_verifier,
            redirect_uri: self.config.redirect_uri.clone(),
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
        };

        let response = match self.provider.exchange_code(&request).await {
            Ok(response) => response,
            Err(e) => return Err(fail(e)),
        };
        record_phase(FlowPhase::Exchanged);

        let token = resolve_token_response(response).map_err(fail)?;
        record_phase(FlowPhase::Succeeded);
        info!("Successfully exchanged code for tokens");

        Ok(token)
    }
}

/// Turn the provider's raw answer into a token or a diagnostic failure.
fn resolve_token_response(response: ProviderResponse) -> PkceFlowResult<TokenResult> {
    if !response.is_success() {
        return Err(PkceFlowError::TokenExchangeFailed {
            status: Some(response.status),
            payload: response.body,
        });
    }

    match serde_json::from_str(&response.body)
        .ok()
        .and_then(TokenResult::from_json)
    {
        Some(token) => Ok(token),
        None => Err(PkceFlowError::TokenExchangeFailed {
            status: Some(response.status),
            payload: response.body,
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn reject(reason: InvalidStateReason) -> PkceFlowError {
    warn!("Rejected callback: {}", reason);
    PkceFlowError::invalid_state(reason)
}

fn fail(err: PkceFlowError) -> PkceFlowError {
    record_phase(FlowPhase::Failed);
    if let PkceFlowError::TokenExchangeFailed { status, payload } = &err {
        error!(
            "Token exchange failed (status {:?}): {}",
            status, payload
        );
    }
    err
}

fn record_phase(phase: FlowPhase) {
    Span::current().record("phase", phase.as_str());
}
