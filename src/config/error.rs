//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Invalid Stripe API key format")]
    InvalidStripeKey,

    #[error("Invalid Stripe webhook secret format")]
    InvalidStripeWebhookSecret,

    #[error("Provider call timeout must be between 1 and 60 seconds")]
    InvalidProviderTimeout,

    #[error("Invalid Stripe API base URL")]
    InvalidStripeBaseUrl,

    #[error("Webhook signature tolerance must be between 1 and 3600 seconds")]
    InvalidSignatureTolerance,

    #[error("Webhook ledger retention must be at least 1 day")]
    InvalidRetention,

    #[error("Webhook purge interval must be at least 60 seconds")]
    InvalidPurgeInterval,

    #[error("Live Stripe key required when livemode is enforced")]
    LivemodeRequiresLiveKey,
}
