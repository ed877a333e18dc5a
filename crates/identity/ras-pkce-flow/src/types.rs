//! PKCE flow protocol types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Where to send the user agent to begin authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectTarget {
    /// Authorization endpoint with every flow parameter appended.
    pub url: String,
    /// The state token persisted for this flow; bind it to the caller's session.
    pub state: String,
    /// Seconds until the persisted state expires.
    pub expires_in: u64,
}

/// Query parameters of the provider's redirect back to us.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn new(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            ..Self::default()
        }
    }
}

/// What the transport layer knows about the caller, independent of the query string.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    /// State token bound to the caller's session when the flow was started.
    pub bound_state: Option<String>,
}

impl CallerContext {
    pub fn bound_to(state: impl Into<String>) -> Self {
        Self {
            bound_state: Some(state.into()),
        }
    }

    pub fn unbound() -> Self {
        Self::default()
    }
}

/// Successful token endpoint response, passed through as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResult {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Provider-specific fields we do not interpret.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TokenResult {
    /// Build a result from a decoded token endpoint body.
    ///
    /// Only a non-empty string `access_token` is required. A known optional field of an
    /// unexpected type stays in `extra` instead of failing the exchange, since the code
    /// behind it has already been spent.
    pub fn from_json(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };

        let access_token = match fields.remove("access_token") {
            Some(Value::String(token)) if !token.is_empty() => token,
            _ => return None,
        };

        let token_type = take_field(&mut fields, "token_type", as_string);
        let expires_in = take_field(&mut fields, "expires_in", |value| match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        let refresh_token = take_field(&mut fields, "refresh_token", as_string);
        let scope = take_field(&mut fields, "scope", as_string);

        Some(Self {
            access_token,
            token_type,
            expires_in,
            refresh_token,
            scope,
            extra: fields.into_iter().collect(),
        })
    }
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

// Nulls are dropped; values that do not convert are left in place.
fn take_field<T>(
    fields: &mut Map<String, Value>,
    key: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    match fields.get(key) {
        Some(Value::Null) => {
            fields.remove(key);
            None
        }
        Some(value) => {
            let converted = convert(value)?;
            fields.remove(key);
            Some(converted)
        }
        None => None,
    }
}

/// Progress of a callback through validation and exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    Started,
    Validated,
    Exchanged,
    Succeeded,
    Failed,
}

impl FlowPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowPhase::Started => "started",
            FlowPhase::Validated => "validated",
            FlowPhase::Exchanged => "exchanged",
            FlowPhase::Succeeded => "succeeded",
            FlowPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for FlowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
