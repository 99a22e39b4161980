//! HandlePaymentWebhookHandler - Ingestion pipeline for provider webhooks.
//!
//! verify -> normalize -> dedup check -> apply -> record outcome.
//!
//! Authenticity and parse failures reject the delivery. Anything that goes
//! wrong while applying a verified event is logged, written to the ledger
//! as `failed` and acknowledged, so one bad event never causes a
//! redelivery storm or blocks unrelated events. A failed event is applied
//! again if the provider redelivers it.

use std::sync::Arc;

use crate::domain::billing::{ProviderEvent, WebhookError};
use crate::ports::{
    NormalizerRegistry, SaveResult, WebhookEventRecord, WebhookEventRepository,
};

use super::{ApplyOutcome, ApplyProviderEventHandler};

/// Command to handle a payment webhook.
#[derive(Debug, Clone)]
pub struct HandlePaymentWebhookCommand {
    /// Provider path segment, e.g. `stripe`.
    pub provider: String,
    /// Raw body, exactly as received.
    pub payload: Vec<u8>,
    /// Signature header value; empty when the header was absent.
    pub signature: String,
}

/// Result of webhook processing. Every variant is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlePaymentWebhookResult {
    /// Event applied to a subscription.
    Processed { event_id: String, outcome: ApplyOutcome },
    /// Event already handled earlier; nothing reapplied.
    Duplicate { event_id: String },
    /// Event accepted and dropped.
    Ignored { event_id: String, reason: String },
    /// Applying the event failed; recorded for reprocessing on redelivery.
    Failed { event_id: String, error: String },
}

pub struct HandlePaymentWebhookHandler {
    normalizers: NormalizerRegistry,
    ledger: Arc<dyn WebhookEventRepository>,
    apply: Arc<ApplyProviderEventHandler>,
}

impl HandlePaymentWebhookHandler {
    pub fn new(
        normalizers: NormalizerRegistry,
        ledger: Arc<dyn WebhookEventRepository>,
        apply: Arc<ApplyProviderEventHandler>,
    ) -> Self {
        Self {
            normalizers,
            ledger,
            apply,
        }
    }

    /// Name of the header carrying the provider's signature.
    pub fn signature_header(&self, provider: &str) -> Result<&'static str, WebhookError> {
        Ok(self.normalizers.get(provider)?.signature_header())
    }

    pub async fn handle(
        &self,
        cmd: HandlePaymentWebhookCommand,
    ) -> Result<HandlePaymentWebhookResult, WebhookError> {
        // 1. Verify and normalize; these errors reject the delivery
        let normalizer = self.normalizers.get(&cmd.provider)?;
        let event = normalizer.normalize(&cmd.payload, &cmd.signature)?;

        // 2. Dedup check
        match self
            .ledger
            .find_by_event_id(event.provider, &event.event_id)
            .await
        {
            Ok(Some(record)) if record.result.is_final() => {
                tracing::info!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    previous = %record.result,
                    "Duplicate webhook skipped"
                );
                return Ok(HandlePaymentWebhookResult::Duplicate {
                    event_id: event.event_id,
                });
            }
            Ok(Some(_)) => {
                tracing::info!(event_id = %event.event_id, "Reprocessing previously failed webhook");
            }
            Ok(None) => {}
            Err(err) => {
                // Applying is idempotent at the store, so proceed without the ledger
                tracing::warn!(event_id = %event.event_id, error = %err, "Dedup lookup failed");
            }
        }

        // 3. Apply, isolating failures to this event
        let payload = serde_json::from_slice(&cmd.payload).unwrap_or(serde_json::Value::Null);
        let (record, result) = match self.apply.handle(&event).await {
            Ok(ApplyOutcome::Unhandled) => {
                let reason = "Unhandled event type".to_string();
                tracing::debug!(event_id = %event.event_id, event_type = %event.event_type, "Webhook ignored");
                (
                    WebhookEventRecord::ignored(event.provider, &event.event_id, &event.event_type, &reason, payload),
                    HandlePaymentWebhookResult::Ignored { event_id: event.event_id.clone(), reason },
                )
            }
            Ok(ApplyOutcome::Unmatched { provider_subscription_id }) => {
                let reason = format!("No local subscription for {}", provider_subscription_id);
                (
                    WebhookEventRecord::ignored(event.provider, &event.event_id, &event.event_type, &reason, payload),
                    HandlePaymentWebhookResult::Ignored { event_id: event.event_id.clone(), reason },
                )
            }
            Ok(ApplyOutcome::Stale { subscription_id }) => {
                let reason = format!(
                    "Older than the last applied update for subscription {}",
                    subscription_id
                );
                (
                    WebhookEventRecord::ignored(event.provider, &event.event_id, &event.event_type, &reason, payload),
                    HandlePaymentWebhookResult::Ignored { event_id: event.event_id.clone(), reason },
                )
            }
            Ok(outcome) => (
                WebhookEventRecord::success(event.provider, &event.event_id, &event.event_type, payload),
                HandlePaymentWebhookResult::Processed { event_id: event.event_id.clone(), outcome },
            ),
            Err(err) => {
                tracing::error!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    provider_subscription_id = event.provider_subscription_id().unwrap_or(""),
                    error = %err,
                    "Failed to apply webhook event"
                );
                let error = err.to_string();
                (
                    WebhookEventRecord::failed(event.provider, &event.event_id, &event.event_type, &error, payload),
                    HandlePaymentWebhookResult::Failed { event_id: event.event_id.clone(), error },
                )
            }
        };

        // 4. Record the outcome
        self.record(&event, record).await;
        Ok(result)
    }

    async fn record(&self, event: &ProviderEvent, record: WebhookEventRecord) {
        let outcome = record.result;
        match self.ledger.save(record).await {
            Ok(SaveResult::AlreadyExists) => tracing::debug!(
                event_id = %event.event_id,
                "Concurrent delivery recorded this event first"
            ),
            Ok(_) => {}
            Err(err) => tracing::error!(
                event_id = %event.event_id,
                outcome = %outcome,
                error = %err,
                "Failed to record webhook event"
            ),
        }
    }
}
