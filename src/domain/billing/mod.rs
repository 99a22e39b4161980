//! Billing domain module.
//!
//! Support plans, the subscription lifecycle, payment history and the
//! normalized provider event vocabulary.
//!
//! # Module Structure
//!
//! - `subscription` - Subscription aggregate and its guarded transitions
//! - `status` - SubscriptionStatus state machine
//! - `events` - Provider events after normalization
//! - `errors` / `webhook_errors` - Error taxonomy for callers and webhooks

mod errors;
mod events;
mod payment;
mod plan;
mod provider;
mod status;
mod subscription;
mod webhook_errors;

pub use errors::SubscriptionError;
pub use events::{InvoiceOutcome, ProviderEvent, ProviderEventKind, SubscriptionSnapshot};
pub use payment::{Payment, PaymentStatus};
pub use plan::SupportPlan;
pub use provider::ProviderKind;
pub use status::SubscriptionStatus;
pub use subscription::{ProviderTerms, Subscription};
pub use webhook_errors::WebhookError;
