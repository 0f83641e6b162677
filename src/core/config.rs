use crate::core::types::MessageKind;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_SERVER: &str = "ws.binaryws.com";
pub const DEFAULT_APP_ID: &str = "2472";
pub const DEFAULT_BRAND: &str = "champion";
pub const DEFAULT_LANGUAGE: &str = "EN";
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

/// Connection settings the socket URL and session timers are derived from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub server_url: Option<String>,
    pub app_id: Option<String>,
    pub language: Option<String>,
    pub brand: String,
    pub keep_alive_secs: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            app_id: None,
            language: None,
            brand: DEFAULT_BRAND.to_string(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
        }
    }
}

impl SocketConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Every variable is optional:
    /// - `{PREFIX}_SERVER_URL` (e.g., `CHAMPION_SERVER_URL`)
    /// - `{PREFIX}_APP_ID`
    /// - `{PREFIX}_LANGUAGE`
    /// - `{PREFIX}_BRAND`
    /// - `{PREFIX}_KEEP_ALIVE_SECS`
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            env::var(format!("{}_{}", prefix.to_uppercase(), name))
                .ok()
                .filter(|value| !value.is_empty())
        };

        let mut config = Self {
            server_url: var("SERVER_URL"),
            app_id: var("APP_ID"),
            language: var("LANGUAGE"),
            ..Self::default()
        };

        if let Some(brand) = var("BRAND") {
            config.brand = brand;
        }

        if let Some(secs) = var("KEEP_ALIVE_SECS") {
            config.keep_alive_secs = secs.parse().map_err(|_| {
                ConfigError::InvalidConfiguration(format!(
                    "{}_KEEP_ALIVE_SECS must be a whole number of seconds, got '{}'",
                    prefix.to_uppercase(),
                    secs
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from .env file and environment variables
    ///
    /// A missing .env file is not an error; system environment variables are
    /// used as they are.
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    #[must_use]
    pub fn server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = Some(server_url.into());
        self
    }

    #[must_use]
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }

    #[must_use]
    pub const fn keep_alive_secs(mut self, secs: u64) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    /// Server host, falling back to the public endpoint
    pub fn server(&self) -> &str {
        self.server_url.as_deref().unwrap_or(DEFAULT_SERVER)
    }

    /// Application id, falling back to the default registration
    pub fn resolved_app_id(&self) -> &str {
        self.app_id.as_deref().unwrap_or(DEFAULT_APP_ID)
    }

    /// UI language sent to the server, upper-cased
    pub fn resolved_language(&self) -> String {
        self.language
            .as_deref()
            .unwrap_or(DEFAULT_LANGUAGE)
            .to_uppercase()
    }

    pub fn keep_alive_window(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Full WebSocket endpoint for this configuration
    pub fn socket_url(&self) -> String {
        let params = [
            format!("brand={}", self.brand),
            format!("app_id={}", self.resolved_app_id()),
            format!("l={}", self.resolved_language()),
        ];

        format!("wss://{}/websockets/v3?{}", self.server(), params.join("&"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server().trim().is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "server url cannot be empty".to_string(),
            ));
        }

        let app_id = self.resolved_app_id();
        if app_id.is_empty() || !app_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidConfiguration(format!(
                "app id must be numeric, got '{}'",
                app_id
            )));
        }

        if self.keep_alive_secs == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "keep-alive window must be at least one second".to_string(),
            ));
        }

        Ok(())
    }
}

/// The two kind sets the session consults.
///
/// Required kinds gate readiness; both sets are eligible for the cache-first
/// short-circuit on reply-bearing requests. A kind may sit in either, both or
/// neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKindSets {
    pub required: Vec<MessageKind>,
    pub cache_only: Vec<MessageKind>,
}

impl Default for MessageKindSets {
    fn default() -> Self {
        Self {
            required: vec![
                MessageKind::Authorize,
                MessageKind::Balance,
                MessageKind::GetSettings,
                MessageKind::WebsiteStatus,
            ],
            cache_only: vec![
                MessageKind::GetAccountStatus,
                MessageKind::GetFinancialAssessment,
            ],
        }
    }
}

impl MessageKindSets {
    /// Sets for a session without a token.
    ///
    /// With the default sets such a session never becomes ready, since
    /// `authorize` is never sent, and buffered requests wait forever.
    pub fn anonymous() -> Self {
        Self {
            required: vec![MessageKind::WebsiteStatus],
            ..Self::default()
        }
    }

    pub fn is_cacheable(&self, kind: &MessageKind) -> bool {
        self.required.contains(kind) || self.cache_only.contains(kind)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
