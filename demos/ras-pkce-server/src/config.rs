//! Configuration for the PKCE authorization server
//!
//! Sources, lowest precedence first:
//! - Default values
//! - Configuration file (`pkce-server.toml`, or the path in `PKCE_CONFIG_FILE`)
//! - Environment variables with the `PKCE` prefix, e.g. `PKCE__PROVIDER__CLIENT_ID`
//! - Plain provider variables (`CANVA_CLIENT_ID`, `REDIRECT_URI`, `SCOPES`, ...)
//!
//! Everything is resolved once at start-up; handlers only ever see the result.

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use ras_pkce_flow::PkceFlowConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_CONFIG_FILE: &str = "pkce-server.toml";

/// Main configuration struct for the server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub logging: LoggingConfig,
}

/// Server network and response configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1)
    pub host: IpAddr,

    /// Port to bind to (default: 3000)
    pub port: u16,

    /// Prefix under which `/auth` and `/callback` are mounted
    pub route_prefix: String,

    /// Mark the state cookie `Secure`; only disable for plain-HTTP local testing
    pub secure_cookies: bool,

    /// Include the provider's raw error payload in 500 responses
    pub expose_provider_errors: bool,
}

/// Identity provider and client registration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    /// Space-separated, as sent in the `scope` parameter
    pub scopes: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub extra_auth_params: BTreeMap<String, String>,
    pub state_ttl_seconds: u64,
    pub http_timeout_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `ras_pkce_flow=debug,info`
    pub level: String,

    /// Log format (pretty, json, compact)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            route_prefix: "/api/canva".to_string(),
            secure_cookies: true,
            expose_provider_errors: false,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            redirect_uri: String::new(),
            scopes: String::new(),
            authorization_endpoint: String::new(),
            token_endpoint: String::new(),
            extra_auth_params: BTreeMap::new(),
            state_ttl_seconds: 600,
            http_timeout_seconds: 30,
        }
    }
}

// The client secret must never reach the logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("extra_auth_params", &self.extra_auth_params)
            .field("state_ttl_seconds", &self.state_ttl_seconds)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .finish()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Config file that [`Config::load`] reads, if one exists.
    pub fn file_source<F>(lookup: F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = PathBuf::from(
            lookup("PKCE_CONFIG_FILE").unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string()),
        );
        path.exists().then_some(path)
    }

    /// Load configuration from environment and optional config file
    ///
    /// Runs before logging is installed, so it does not log; see [`Config::file_source`].
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = Self::file_source(|key| std::env::var(key).ok()) {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("PKCE")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Config = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.apply_env_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;

        Ok(settings)
    }

    /// Load and validate a single TOML file, ignoring the environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings: Config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Apply the plain variable names the provider's documentation uses.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(client_id) = lookup("CANVA_CLIENT_ID") {
            self.provider.client_id = client_id;
        }
        if let Some(client_secret) = lookup("CANVA_CLIENT_SECRET") {
            self.provider.client_secret = Some(client_secret);
        }
        if let Some(redirect_uri) = lookup("REDIRECT_URI") {
            self.provider.redirect_uri = redirect_uri;
        }
        if let Some(scopes) = lookup("SCOPES") {
            self.provider.scopes = scopes;
        }
        if let Some(endpoint) = lookup("CANVA_AUTH_ENDPOINT") {
            self.provider.authorization_endpoint = endpoint;
        }
        if let Some(endpoint) = lookup("CANVA_TOKEN_ENDPOINT") {
            self.provider.token_endpoint = endpoint;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host.parse().context("Invalid HOST value")?;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().context("Invalid PORT value")?;
        }
        if let Some(log_level) = lookup("RUST_LOG") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        let prefix = &self.server.route_prefix;
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            anyhow::bail!(
                "Route prefix '{}' must start with '/', must not end with '/' and cannot be the root",
                prefix
            );
        }

        if EnvFilter::try_new(&self.logging.level).is_err() {
            anyhow::bail!("Invalid log level '{}'", self.logging.level);
        }

        let valid_formats = ["pretty", "json", "compact"];
        let format_lower = self.logging.format.to_lowercase();
        if !valid_formats.contains(&format_lower.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        self.flow_config()
            .validate()
            .context("Invalid provider configuration")?;

        Ok(())
    }

    /// Provider settings in the form the flow consumes.
    pub fn flow_config(&self) -> PkceFlowConfig {
        let provider = &self.provider;

        let mut flow = PkceFlowConfig::new(
            provider.client_id.clone(),
            provider.redirect_uri.clone(),
            provider.authorization_endpoint.clone(),
            provider.token_endpoint.clone(),
        )
        .with_scopes(provider.scopes.split_whitespace())
        .with_state_ttl(provider.state_ttl_seconds)
        .with_http_timeout(provider.http_timeout_seconds);

        if let Some(secret) = provider.client_secret.as_ref().filter(|s| !s.is_empty()) {
            flow = flow.with_client_secret(secret.clone());
        }
        for (key, value) in &provider.extra_auth_params {
            flow = flow.with_auth_param(key.clone(), value.clone());
        }

        flow
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn provider_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("CANVA_CLIENT_ID", "OC-client".to_string()),
            ("CANVA_CLIENT_SECRET", "secret".to_string()),
            (
                "REDIRECT_URI",
                "http://127.0.0.1:3000/api/canva/callback".to_string(),
            ),
            ("SCOPES", "design:meta:read profile:read".to_string()),
            (
                "CANVA_AUTH_ENDPOINT",
                "https://www.canva.com/api/oauth/authorize".to_string(),
            ),
            (
                "CANVA_TOKEN_ENDPOINT",
                "https://api.canva.com/rest/v1/oauth/token".to_string(),
            ),
        ])
    }

    #[test]
    fn test_defaults_lack_provider_settings() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.route_prefix, "/api/canva");
        assert!(config.server.secure_cookies);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env = provider_env();
        let mut config = Config::default();
        config
            .apply_env_overrides(|key| env.get(key).cloned())
            .unwrap();

        config.validate().unwrap();

        let flow = config.flow_config();
        assert_eq!(flow.client_id, "OC-client");
        assert_eq!(flow.client_secret.as_deref(), Some("secret"));
        assert_eq!(flow.scopes, vec!["design:meta:read", "profile:read"]);
        assert_eq!(flow.state_ttl_seconds, 600);
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = Config::default();
        let result = config.apply_env_overrides(|key| {
            (key == "PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_provider_value_is_fatal() {
        let mut env = provider_env();
        env.remove("CANVA_TOKEN_ENDPOINT");

        let mut config = Config::default();
        config
            .apply_env_overrides(|key| env.get(key).cloned())
            .unwrap();

        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("token_endpoint"));
    }

    #[test]
    fn test_root_route_prefix_rejected() {
        let env = provider_env();
        let mut config = Config::default();
        config
            .apply_env_overrides(|key| env.get(key).cloned())
            .unwrap();

        config.server.route_prefix = "/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[server]
port = 8080
route_prefix = "/oauth"
secure_cookies = false

[provider]
client_id = "file-client"
redirect_uri = "http://localhost:8080/oauth/callback"
scopes = "profile:read"
authorization_endpoint = "https://provider.example/authorize"
token_endpoint = "https://provider.example/token"
state_ttl_seconds = 300

[provider.extra_auth_params]
prompt = "consent"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.route_prefix, "/oauth");
        assert!(!config.server.secure_cookies);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");

        let flow = config.flow_config();
        assert_eq!(flow.state_ttl_seconds, 300);
        assert_eq!(flow.extra_auth_params.get("prompt").unwrap(), "consent");
        assert!(flow.client_secret.is_none());
    }

    #[test]
    fn test_file_source() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let path = file.path().to_string_lossy().to_string();

        let found = Config::file_source(|key| (key == "PKCE_CONFIG_FILE").then(|| path.clone()));
        assert_eq!(found.as_deref(), Some(file.path()));

        let missing = Config::file_source(|key| {
            (key == "PKCE_CONFIG_FILE").then(|| "/nonexistent/pkce-server.toml".to_string())
        });
        assert!(missing.is_none());
    }

    #[test]
    fn test_debug_redacts_client_secret() {
        let mut config = ProviderConfig::default();
        config.client_secret = Some("hunter2".to_string());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
    }
}
