//! Configuration module
//!
//! Client configuration is read from the environment (a `.env` file is loaded
//! first when present). The backend URL and the OAuth client identifier are
//! required; everything else has a default.

use std::env;
use url::Url;

// Common constants
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Configuration for the admin API client.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub oauth_client_id: String,
    pub oauth_token_url: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub max_upload_size_mb: Option<u64>,
    pub environment: String,
}

// Tokens stay out of debug output.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("oauth_client_id", &self.oauth_client_id)
            .field("oauth_token_url", &self.oauth_token_url)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_upload_size_mb", &self.max_upload_size_mb)
            .field("environment", &self.environment)
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_base_url = get("PERSONA_API_URL").ok_or(ConfigError::Missing("PERSONA_API_URL"))?;
        let oauth_client_id =
            get("PERSONA_OAUTH_CLIENT_ID").ok_or(ConfigError::Missing("PERSONA_OAUTH_CLIENT_ID"))?;

        let request_timeout_secs = match get("PERSONA_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                name: "PERSONA_REQUEST_TIMEOUT_SECS",
                reason: e.to_string(),
            })?,
            None => REQUEST_TIMEOUT_SECS,
        };

        let max_upload_size_mb = get("PERSONA_MAX_UPLOAD_SIZE_MB")
            .map(|raw| {
                raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                    name: "PERSONA_MAX_UPLOAD_SIZE_MB",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let environment = get("ENVIRONMENT")
            .or_else(|| get("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let config = Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            oauth_client_id,
            oauth_token_url: get("PERSONA_OAUTH_TOKEN_URL"),
            refresh_token: get("PERSONA_REFRESH_TOKEN"),
            access_token: get("PERSONA_ACCESS_TOKEN"),
            request_timeout_secs,
            max_upload_size_mb,
            environment,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.api_base_url) {
            return Err(ConfigError::Invalid {
                name: "PERSONA_API_URL",
                reason: "must be an absolute http(s) URL".to_string(),
            });
        }

        if self.oauth_client_id.trim().is_empty() {
            return Err(ConfigError::Missing("PERSONA_OAUTH_CLIENT_ID"));
        }

        if let Some(token_url) = &self.oauth_token_url {
            if !is_http_url(token_url) {
                return Err(ConfigError::Invalid {
                    name: "PERSONA_OAUTH_TOKEN_URL",
                    reason: "must be an absolute http(s) URL".to_string(),
                });
            }
            if self.refresh_token.is_none() {
                return Err(ConfigError::Invalid {
                    name: "PERSONA_OAUTH_TOKEN_URL",
                    reason: "PERSONA_REFRESH_TOKEN is required when a token URL is set".to_string(),
                });
            }
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "PERSONA_REQUEST_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Check if the client is pointed at production
    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    /// Whether an OAuth refresh grant can be performed with this configuration.
    pub fn can_refresh(&self) -> bool {
        self.oauth_token_url.is_some() && self.refresh_token.is_some()
    }
}

/// Absolute http(s) URL with a host.
pub(crate) fn is_http_url(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}
