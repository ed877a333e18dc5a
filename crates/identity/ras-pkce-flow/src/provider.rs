//! Outbound token exchange against the provider's token endpoint.

use crate::config::PkceFlowConfig;
use crate::error::{PkceFlowError, PkceFlowResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Parameters of an `authorization_code` grant with a PKCE verifier.
#[derive(Clone)]
pub struct TokenRequest {
    pub code: String,
    pub code_verifier: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: Option<String>,
}

impl TokenRequest {
    /// Form body sent to the token endpoint. The client secret is never part of it.
    pub fn form_params(&self) -> [(&'static str, &str); 5] {
        [
            ("grant_type", "authorization_code"),
            ("code", &self.code),
            ("redirect_uri", &self.redirect_uri),
            ("client_id", &self.client_id),
            ("code_verifier", &self.code_verifier),
        ]
    }
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("redirect_uri", &self.redirect_uri)
            .field("client_id", &self.client_id)
            .field("confidential", &self.client_secret.is_some())
            .finish_non_exhaustive()
    }
}

/// Raw token endpoint answer; interpretation belongs to the flow completer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

impl ProviderResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs the single token exchange request. Implementations must not retry:
/// authorization codes are single-use.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn exchange_code(&self, request: &TokenRequest) -> PkceFlowResult<ProviderResponse>;
}

/// [`ProviderClient`] that POSTs a form-encoded grant to the configured token endpoint.
#[derive(Clone)]
pub struct HttpProviderClient {
    http_client: Client,
    token_endpoint: String,
}

impl HttpProviderClient {
    pub fn new(token_endpoint: impl Into<String>, timeout: Duration) -> PkceFlowResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PkceFlowError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            token_endpoint: token_endpoint.into(),
        })
    }

    pub fn from_config(config: &PkceFlowConfig) -> PkceFlowResult<Self> {
        Self::new(
            config.token_endpoint.clone(),
            Duration::from_secs(config.http_timeout_seconds),
        )
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn exchange_code(&self, request: &TokenRequest) -> PkceFlowResult<ProviderResponse> {
        let mut builder = self
            .http_client
            .post(&self.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&request.form_params());

        if let Some(secret) = &request.client_secret {
            builder = builder.basic_auth(&request.client_id, Some(secret));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PkceFlowError::TokenExchangeFailed {
                status: None,
                payload: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PkceFlowError::TokenExchangeFailed {
                status: Some(status),
                payload: format!("unreadable response body: {}", e),
            })?;

        debug!("Token endpoint answered with status {}", status);
        Ok(ProviderResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_request(secret: Option<&str>) -> TokenRequest {
        TokenRequest {
            code: "abc".to_string(),
            code_verifier: "verifier-xyz".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            client_id: "client".to_string(),
            client_secret: secret.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_exchange_posts_form_grant() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("code_verifier=verifier-xyz"))
            .and(body_string_contains("client_id=client"))
            .and(body_string_contains(
                "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback",
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access_token": "tok123" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client =
            HttpProviderClient::new(format!("{}/token", mock_server.uri()), Duration::from_secs(5))
                .unwrap();
        let response = client.exchange_code(&token_request(None)).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert!(response.body.contains("tok123"));
    }

    #[tokio::test]
    async fn test_confidential_client_uses_basic_auth() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client =
            HttpProviderClient::new(format!("{}/token", mock_server.uri()), Duration::from_secs(5))
                .unwrap();
        let response = client
            .exchange_code(&token_request(Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status, 200);

        let received = &mock_server.received_requests().await.unwrap()[0];
        let body = String::from_utf8_lossy(&received.body);
        assert!(!body.contains("s3cret"));
    }

    #[tokio::test]
    async fn test_error_status_is_returned_not_raised() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({ "error": "invalid_grant" })),
            )
            .mount(&mock_server)
            .await;

        let client =
            HttpProviderClient::new(format!("{}/token", mock_server.uri()), Duration::from_secs(5))
                .unwrap();
        let response = client.exchange_code(&token_request(None)).await.unwrap();

        assert_eq!(response.status, 400);
        assert!(!response.is_success());
        assert!(response.body.contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_exchange_failure() {
        // Nothing listens on port 9 of the loopback interface.
        let client =
            HttpProviderClient::new("http://127.0.0.1:9/token", Duration::from_secs(2)).unwrap();
        let result = client.exchange_code(&token_request(None)).await;

        assert!(matches!(
            result,
            Err(PkceFlowError::TokenExchangeFailed { status: None, .. })
        ));
    }

    #[test]
    fn test_debug_hides_code_and_secrets() {
        let rendered = format!("{:?}", token_request(Some("s3cret")));
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("verifier-xyz"));
        assert!(!rendered.contains("abc"));
    }
}
