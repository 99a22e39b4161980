//! Payment records.
//!
//! Append-only history of billing attempts. Rows are never updated; the
//! (provider, provider_transaction_id) pair is unique so a replayed invoice
//! event cannot record the same attempt twice.

use crate::domain::foundation::{Money, PaymentId, SubscriptionId, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{InvoiceOutcome, ProviderKind};

/// Outcome of a billing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "payment_status",
                format!("unknown payment status '{}'", other),
            )),
        }
    }
}

/// One recorded billing attempt against a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub subscription_id: SubscriptionId,
    pub amount: Money,
    pub payment_method_kind: String,
    pub provider: ProviderKind,
    pub provider_transaction_id: String,
    pub status: PaymentStatus,
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    pub created_at: Timestamp,
}

impl Payment {
    /// Builds the record for an invoice outcome.
    pub fn from_invoice(
        subscription_id: SubscriptionId,
        provider: ProviderKind,
        invoice: &InvoiceOutcome,
        status: PaymentStatus,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            subscription_id,
            amount: invoice.amount.clone(),
            payment_method_kind: invoice.payment_method_kind.clone(),
            provider,
            provider_transaction_id: invoice.provider_transaction_id.clone(),
            status,
            period_start: invoice.period_start,
            period_end: invoice.period_end,
            created_at: Timestamp::now(),
        }
    }
}
