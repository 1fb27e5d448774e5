//! Host configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Storefront origin the AJAX endpoints live under
//!   (e.g., `https://your-store.myshopify.com`)
//!
//! ## Optional
//! - `UPSELL_CONFIG` - Widget configuration as inline JSON
//! - `UPSELL_CONFIG_PATH` - Path to a JSON file with the widget configuration
//!   (ignored when `UPSELL_CONFIG` is set)
//! - `STOREFRONT_TIMEOUT_SECS` - HTTP timeout (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::time::Duration;

use thiserror::Error;
use url::Url;

use cart_upsell_core::UpsellConfig;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Invalid upsell configuration: {0}")]
    InvalidWidgetConfig(#[from] cart_upsell_core::ConfigError),
}

/// Host application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Storefront API client configuration
    pub storefront: StorefrontConfig,
    /// Widget configuration supplied by the host page
    pub widget: UpsellConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Storefront API client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Storefront base URL
    pub base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if the widget configuration cannot be read or parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);

        let base_url = env.required("STOREFRONT_BASE_URL")?;
        let base_url = Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("STOREFRONT_BASE_URL".to_string(), e.to_string())
        })?;
        let timeout_secs = env
            .or_default("STOREFRONT_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        let widget = match (env.optional("UPSELL_CONFIG"), env.optional("UPSELL_CONFIG_PATH")) {
            (Some(json), _) => UpsellConfig::from_json(&json)?,
            (None, Some(path)) => {
                let json = std::fs::read_to_string(&path).map_err(|e| {
                    ConfigError::InvalidEnvVar("UPSELL_CONFIG_PATH".to_string(), e.to_string())
                })?;
                UpsellConfig::from_json(&json)?
            }
            (None, None) => UpsellConfig::default(),
        };

        Ok(Self {
            storefront: StorefrontConfig {
                base_url,
                timeout: Duration::from_secs(timeout_secs),
            },
            widget,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional variable; blank values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }
}
