//! Normalized provider events.
//!
//! Normalizers turn provider payloads into these shapes at the ingestion
//! boundary. Nothing past that boundary looks at provider field names.

use crate::domain::foundation::{Money, Timestamp};
use serde::{Deserialize, Serialize};

use super::{ProviderKind, SubscriptionStatus};

/// A verified provider notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    /// Provider-assigned id, the deduplication key.
    pub event_id: String,
    pub provider: ProviderKind,
    /// Provider's raw type string, kept for logs and the ledger.
    pub event_type: String,
    pub kind: ProviderEventKind,
}

impl ProviderEvent {
    /// Provider subscription the event targets, if any.
    pub fn provider_subscription_id(&self) -> Option<&str> {
        match &self.kind {
            ProviderEventKind::PaymentSucceeded(invoice)
            | ProviderEventKind::PaymentFailed(invoice) => {
                Some(invoice.provider_subscription_id.as_str())
            }
            ProviderEventKind::SubscriptionDeleted {
                provider_subscription_id,
            } => Some(provider_subscription_id.as_str()),
            ProviderEventKind::SubscriptionUpdated(snapshot) => {
                Some(snapshot.provider_subscription_id.as_str())
            }
            ProviderEventKind::Unhandled => None,
        }
    }
}

/// The four event families the lifecycle reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderEventKind {
    PaymentSucceeded(InvoiceOutcome),
    PaymentFailed(InvoiceOutcome),
    SubscriptionDeleted { provider_subscription_id: String },
    SubscriptionUpdated(SubscriptionSnapshot),
    /// Event types nobody here consumes. Acknowledged and dropped.
    Unhandled,
}

/// One billing attempt as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceOutcome {
    pub provider_subscription_id: String,
    /// Identifies this attempt; a retried invoice reports a new one.
    pub provider_transaction_id: String,
    pub amount: Money,
    pub payment_method_kind: String,
    pub period_start: Timestamp,
    pub period_end: Timestamp,
}

/// Provider's view of a subscription after a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub provider_subscription_id: String,
    /// When the provider emitted this view. Older views are skipped.
    pub observed_at: Timestamp,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub cancel_at_period_end: bool,
}
