//! Stripe adapters.
//!
//! - `StripePaymentAdapter`: the `PaymentProvider` port over the REST API
//! - `StripeWebhookNormalizer`: signature verification and event mapping
//! - `MockPaymentProvider`: scriptable stand-in for tests
//!
//! Secrets are held as `secrecy::SecretString` and never logged.

mod mock_payment_provider;
mod stripe_adapter;
mod webhook_types;
mod webhook_verifier;

pub use mock_payment_provider::{MethodCall, MockPaymentProvider};
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter};
pub use webhook_types::{SignatureHeader, SignatureParseError};
pub use webhook_verifier::{StripeWebhookNormalizer, DEFAULT_TOLERANCE_SECS};

#[cfg(test)]
pub use webhook_verifier::sign_for_test;
