//! Stripe webhook verification and normalization.
//!
//! Implements Stripe's signature scheme:
//! 1. Parse the `Stripe-Signature` header (`t=...,v1=...`)
//! 2. Reject timestamps outside the tolerance window
//! 3. Compute HMAC-SHA256 over `"{t}.{raw body}"`
//! 4. Compare against every v1 signature in constant time
//!
//! Only then is the body parsed and translated into a `ProviderEvent`.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::billing::{
    InvoiceOutcome, ProviderEvent, ProviderEventKind, ProviderKind, SubscriptionSnapshot,
    SubscriptionStatus, WebhookError,
};
use crate::domain::foundation::{Money, Timestamp};
use crate::ports::WebhookNormalizer;

use super::webhook_types::{
    SignatureHeader, StripeInvoice, StripeSubscription, StripeWebhookEvent,
};

type HmacSha256 = Hmac<Sha256>;

/// Default maximum age of a signed delivery.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Clock skew tolerated for timestamps in the future.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Payment method recorded when the invoice does not say.
const DEFAULT_PAYMENT_METHOD_KIND: &str = "card";

/// Verifies and normalizes Stripe deliveries.
pub struct StripeWebhookNormalizer {
    secret: SecretString,
    tolerance_secs: i64,
    require_livemode: bool,
}

impl StripeWebhookNormalizer {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            require_livemode: false,
        }
    }

    pub fn with_tolerance_secs(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }

    /// Checks signature and freshness against the raw body.
    pub fn verify(&self, payload: &[u8], signature: &str) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse(signature).map_err(|e| {
            tracing::warn!(error = %e, "Malformed Stripe-Signature header");
            WebhookError::InvalidSignature
        })?;

        self.check_timestamp(header.timestamp, Timestamp::now().as_unix_secs())?;

        let expected = self.compute_signature(header.timestamp, payload)?;
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_eq(&expected, candidate));

        if !matched {
            tracing::warn!(timestamp = header.timestamp, "Stripe signature mismatch");
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }

    fn check_timestamp(&self, signed_at: i64, now: i64) -> Result<(), WebhookError> {
        let age = now - signed_at;
        if age > self.tolerance_secs {
            tracing::warn!(age_secs = age, "Webhook too old, possible replay");
            return Err(WebhookError::TimestampOutOfRange);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            tracing::warn!(age_secs = age, "Webhook timestamp in the future");
            return Err(WebhookError::TimestampOutOfRange);
        }
        Ok(())
    }

    fn compute_signature(&self, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn translate(&self, event: StripeWebhookEvent) -> Result<ProviderEvent, WebhookError> {
        let kind = match event.event_type.as_str() {
            "invoice.payment_succeeded" | "invoice.paid" => {
                match invoice_outcome(&event, true)? {
                    Some(outcome) => ProviderEventKind::PaymentSucceeded(outcome),
                    None => ProviderEventKind::Unhandled,
                }
            }
            "invoice.payment_failed" => match invoice_outcome(&event, false)? {
                Some(outcome) => ProviderEventKind::PaymentFailed(outcome),
                None => ProviderEventKind::Unhandled,
            },
            "customer.subscription.deleted" => {
                let sub = subscription_object(&event)?;
                ProviderEventKind::SubscriptionDeleted {
                    provider_subscription_id: sub.id,
                }
            }
            "customer.subscription.updated" => {
                let sub = subscription_object(&event)?;
                match snapshot(&sub, event.created)? {
                    Some(snapshot) => ProviderEventKind::SubscriptionUpdated(snapshot),
                    None => {
                        tracing::warn!(
                            event_id = %event.id,
                            status = %sub.status,
                            "Subscription status has no local equivalent"
                        );
                        ProviderEventKind::Unhandled
                    }
                }
            }
            _ => ProviderEventKind::Unhandled,
        };

        Ok(ProviderEvent {
            event_id: event.id,
            provider: ProviderKind::Stripe,
            event_type: event.event_type,
            kind,
        })
    }
}

impl WebhookNormalizer for StripeWebhookNormalizer {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    fn signature_header(&self) -> &'static str {
        "Stripe-Signature"
    }

    fn normalize(&self, payload: &[u8], signature: &str) -> Result<ProviderEvent, WebhookError> {
        self.verify(payload, signature)?;

        let event: StripeWebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::ParseError(e.to_string()))?;

        if self.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Rejected test-mode event");
            return Err(WebhookError::LivemodeMismatch);
        }

        self.translate(event)
    }
}

fn subscription_object(event: &StripeWebhookEvent) -> Result<StripeSubscription, WebhookError> {
    serde_json::from_value(event.data.object.clone())
        .map_err(|e| WebhookError::ParseError(format!("invalid subscription: {}", e)))
}

fn snapshot(
    sub: &StripeSubscription,
    created: i64,
) -> Result<Option<SubscriptionSnapshot>, WebhookError> {
    let Some(status) = SubscriptionStatus::from_provider(&sub.status) else {
        return Ok(None);
    };
    Ok(Some(SubscriptionSnapshot {
        provider_subscription_id: sub.id.clone(),
        observed_at: unix_field(created, "created")?,
        status,
        current_period_start: unix_field(sub.current_period_start, "current_period_start")?,
        current_period_end: unix_field(sub.current_period_end, "current_period_end")?,
        cancel_at_period_end: sub.cancel_at_period_end,
    }))
}

/// `None` for invoices that do not belong to a subscription.
fn invoice_outcome(
    event: &StripeWebhookEvent,
    succeeded: bool,
) -> Result<Option<InvoiceOutcome>, WebhookError> {
    let invoice: StripeInvoice = serde_json::from_value(event.data.object.clone())
        .map_err(|e| WebhookError::ParseError(format!("invalid invoice: {}", e)))?;

    let Some(provider_subscription_id) = invoice.subscription.clone() else {
        return Ok(None);
    };

    let (start, end) = invoice
        .billed_period()
        .ok_or(WebhookError::MissingField("lines.data.period"))?;

    let amount_minor = if succeeded {
        invoice.amount_paid
    } else {
        invoice.amount_due
    };
    let amount = Money::from_parts(amount_minor, &invoice.currency)
        .map_err(|e| WebhookError::ParseError(e.to_string()))?;

    let provider_transaction_id = attempt_id(&invoice, succeeded);
    Ok(Some(InvoiceOutcome {
        provider_subscription_id,
        provider_transaction_id,
        amount,
        payment_method_kind: DEFAULT_PAYMENT_METHOD_KIND.to_string(),
        period_start: unix_field(start, "period.start")?,
        period_end: unix_field(end, "period.end")?,
    }))
}

/// Identifies one payment attempt on an invoice.
///
/// The attempt's charge id when Stripe sends one. `invoice.paid` and
/// `invoice.payment_succeeded` for the same attempt share it, while a retry
/// after a failure gets a new one. Invoices settled without a charge fall
/// back to the invoice id plus the outcome.
fn attempt_id(invoice: &StripeInvoice, succeeded: bool) -> String {
    match invoice.charge.as_deref().filter(|c| !c.is_empty()) {
        Some(charge) => charge.to_string(),
        None => {
            let outcome = if succeeded { "succeeded" } else { "failed" };
            format!("{}:{}", invoice.id, outcome)
        }
    }
}

fn unix_field(secs: i64, field: &str) -> Result<Timestamp, WebhookError> {
    Timestamp::from_unix_secs(secs)
        .ok_or_else(|| WebhookError::ParseError(format!("{} out of range", field)))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// Signs `payload` the way Stripe does, for test fixtures.
#[cfg(test)]
pub fn sign_for_test(secret: &str, timestamp: i64, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
