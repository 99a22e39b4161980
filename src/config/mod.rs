//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the
//! `config` and `dotenvy` crates. Variables use the `COMMUNITY_SUPPORT`
//! prefix and `__` between nesting levels.
//!
//! # Example
//!
//! ```no_run
//! use community_support::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod payment;
mod server;
mod webhooks;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};
pub use webhooks::WebhookConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub payment: PaymentConfig,

    #[serde(default)]
    pub webhooks: WebhookConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` if present (development)
    /// 2. Reads `COMMUNITY_SUPPORT__*` variables
    /// 3. Deserializes into the typed sections
    ///
    /// # Environment Variable Format
    ///
    /// - `COMMUNITY_SUPPORT__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `COMMUNITY_SUPPORT__PAYMENT__STRIPE_API_KEY=sk_...` -> `payment.stripe_api_key`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values do
    /// not parse.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("COMMUNITY_SUPPORT")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate()?;
        self.webhooks.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
