use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SessionError, SessionResult};

/// Environment variable names consumed by [`AppConfig::from_env`].
pub const ENV_PROVIDER_URL: &str = "SHELFMARK_SUPABASE_URL";
pub const ENV_PROVIDER_ANON_KEY: &str = "SHELFMARK_SUPABASE_ANON_KEY";
pub const ENV_PROVIDER_REDIRECT: &str = "SHELFMARK_OAUTH_REDIRECT";
pub const ENV_API_URL: &str = "SHELFMARK_API_URL";

/// Connection settings for the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub url: String,

    /// Project anonymous API key, sent as the `apikey` header.
    pub anon_key: String,

    /// Where OAuth flows should send the browser back to.
    #[serde(default)]
    pub redirect_to: Option<String>,
}

/// Connection settings for the protected backend API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL authorized requests are resolved against.
    pub base_url: String,
}

/// Configuration for the session core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub api: ApiConfig,
}

impl AppConfig {
    /// Read configuration from the environment.
    ///
    /// The backend URL defaults to the provider's REST surface when
    /// `SHELFMARK_API_URL` is not set.
    pub fn from_env() -> SessionResult<Self> {
        let url = require_env(ENV_PROVIDER_URL)?;
        let anon_key = require_env(ENV_PROVIDER_ANON_KEY)?;
        let redirect_to = std::env::var(ENV_PROVIDER_REDIRECT).ok().filter(|v| !v.is_empty());
        let base_url = match std::env::var(ENV_API_URL) {
            Ok(value) if !value.is_empty() => value,
            _ => format!("{}/rest/v1", url.trim_end_matches('/')),
        };

        let config = Self {
            provider: ProviderConfig {
                url,
                anon_key,
                redirect_to,
            },
            api: ApiConfig { base_url },
        };
        config.validate()?;
        debug!(provider_url = %config.provider.url, api_url = %config.api.base_url, "configuration loaded");
        Ok(config)
    }

    /// Check that the configuration is usable before wiring anything up.
    pub fn validate(&self) -> SessionResult<()> {
        validate_url("provider URL", &self.provider.url)?;
        validate_url("API URL", &self.api.base_url)?;
        if self.provider.anon_key.trim().is_empty() {
            return Err(SessionError::Config("provider anon key is empty".into()));
        }
        Ok(())
    }
}

fn require_env(name: &str) -> SessionResult<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SessionError::Config(format!(
            "environment variable {name} is not set"
        ))),
    }
}

fn validate_url(what: &str, value: &str) -> SessionResult<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(SessionError::Config(format!(
            "{what} must start with http:// or https://, got {value:?}"
        )))
    }
}
