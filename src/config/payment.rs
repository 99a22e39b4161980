//! Payment provider configuration (Stripe)

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Stripe credentials and call settings.
///
/// Keys are held as secrets so they never end up in `Debug` output or logs.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub stripe_api_key: SecretString,

    /// Webhook signing secret (`whsec_...`)
    pub stripe_webhook_secret: SecretString,

    #[serde(default = "default_base_url")]
    pub stripe_api_base_url: String,

    /// Per-call timeout for provider requests, 1..=60 seconds
    #[serde(default = "default_timeout")]
    pub provider_timeout_secs: u64,

    /// Reject test-mode webhook events
    #[serde(default)]
    pub require_livemode: bool,
}

impl PaymentConfig {
    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_test_")
    }

    /// Check if using Stripe live mode
    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_live_")
    }

    pub fn provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.provider_timeout_secs)
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let api_key = self.stripe_api_key.expose_secret();
        let webhook_secret = self.stripe_webhook_secret.expose_secret();

        if api_key.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_API_KEY"));
        }
        if webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_WEBHOOK_SECRET"));
        }
        if !api_key.starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if !(1..=60).contains(&self.provider_timeout_secs) {
            return Err(ValidationError::InvalidProviderTimeout);
        }
        if !self.stripe_api_base_url.starts_with("https://")
            && !self.stripe_api_base_url.starts_with("http://")
        {
            return Err(ValidationError::InvalidStripeBaseUrl);
        }
        if self.require_livemode && !self.is_live_mode() {
            return Err(ValidationError::LivemodeRequiresLiveKey);
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_timeout() -> u64 {
    10
}
