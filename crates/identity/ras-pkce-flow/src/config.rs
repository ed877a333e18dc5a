//! PKCE flow configuration.

use crate::error::{PkceFlowError, PkceFlowResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use url::Url;

/// Upper bound recommended for the lifetime of an in-flight authorization.
pub const RECOMMENDED_MAX_STATE_TTL_SECONDS: u64 = 600;

/// Hard upper bound on the state lifetime; longer values are configuration errors.
pub const MAX_STATE_TTL_SECONDS: u64 = 86_400;

/// Static configuration for one provider, resolved once at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkceFlowConfig {
    pub client_id: String,
    /// Present for confidential clients; sent as HTTP Basic credentials on token exchange.
    #[serde(default)]
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    /// Additional parameters to include in the authorization request
    #[serde(default)]
    pub extra_auth_params: BTreeMap<String, String>,
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    /// Require the callback to present the state bound to the caller's session.
    #[serde(default = "default_true")]
    pub require_state_binding: bool,
}

fn default_state_ttl() -> u64 {
    RECOMMENDED_MAX_STATE_TTL_SECONDS
}

fn default_http_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Parameters the flow owns; extra parameters may not override them.
const RESERVED_AUTH_PARAMS: [&str; 7] = [
    "response_type",
    "client_id",
    "redirect_uri",
    "scope",
    "state",
    "code_challenge",
    "code_challenge_method",
];

impl PkceFlowConfig {
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            extra_auth_params: BTreeMap::new(),
            state_ttl_seconds: default_state_ttl(),
            http_timeout_seconds: default_http_timeout(),
            require_state_binding: true,
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_auth_params.insert(key.into(), value.into());
        self
    }

    pub fn with_state_ttl(mut self, seconds: u64) -> Self {
        self.state_ttl_seconds = seconds;
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    pub fn with_state_binding(mut self, required: bool) -> Self {
        self.require_state_binding = required;
        self
    }

    pub fn state_ttl(&self) -> PkceFlowResult<Duration> {
        i64::try_from(self.state_ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                PkceFlowError::ConfigError(format!(
                    "state TTL of {}s is out of range",
                    self.state_ttl_seconds
                ))
            })
    }

    /// Space-delimited `scope` value as sent to the provider.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    /// Check every value the flow needs, so a misconfiguration surfaces before any redirect.
    pub fn validate(&self) -> PkceFlowResult<()> {
        require_non_empty("client_id", &self.client_id)?;
        require_non_empty("redirect_uri", &self.redirect_uri)?;
        require_non_empty("authorization_endpoint", &self.authorization_endpoint)?;
        require_non_empty("token_endpoint", &self.token_endpoint)?;

        if self.scopes.iter().all(|scope| scope.trim().is_empty()) {
            return Err(PkceFlowError::ConfigError(
                "at least one scope is required".to_string(),
            ));
        }

        self.authorization_url()?;
        parse_url("token_endpoint", &self.token_endpoint)?;
        parse_url("redirect_uri", &self.redirect_uri)?;

        if let Some(key) = self
            .extra_auth_params
            .keys()
            .find(|key| RESERVED_AUTH_PARAMS.contains(&key.as_str()))
        {
            return Err(PkceFlowError::ConfigError(format!(
                "extra authorization parameter '{}' is reserved",
                key
            )));
        }

        if self.state_ttl_seconds == 0 {
            return Err(PkceFlowError::ConfigError(
                "state TTL must be positive".to_string(),
            ));
        }
        if self.state_ttl_seconds > MAX_STATE_TTL_SECONDS {
            return Err(PkceFlowError::ConfigError(format!(
                "state TTL of {}s exceeds the maximum of {}s",
                self.state_ttl_seconds, MAX_STATE_TTL_SECONDS
            )));
        }
        if self.state_ttl_seconds > RECOMMENDED_MAX_STATE_TTL_SECONDS {
            warn!(
                "State TTL of {}s exceeds the recommended maximum of {}s",
                self.state_ttl_seconds, RECOMMENDED_MAX_STATE_TTL_SECONDS
            );
        }

        if self.http_timeout_seconds == 0 {
            return Err(PkceFlowError::ConfigError(
                "HTTP timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Authorization endpoint without any flow parameters.
    pub(crate) fn authorization_url(&self) -> PkceFlowResult<Url> {
        require_non_empty("authorization_endpoint", &self.authorization_endpoint)?;
        parse_url("authorization_endpoint", &self.authorization_endpoint)
    }
}

fn require_non_empty(name: &str, value: &str) -> PkceFlowResult<()> {
    if value.trim().is_empty() {
        return Err(PkceFlowError::ConfigError(format!("{} is required", name)));
    }
    Ok(())
}

fn parse_url(name: &str, value: &str) -> PkceFlowResult<Url> {
    Url::parse(value)
        .map_err(|e| PkceFlowError::ConfigError(format!("{} is not a valid URL: {}", name, e)))
}
