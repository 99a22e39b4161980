//! ApplyProviderEventHandler - Applies one normalized provider event to the
//! subscription it targets.
//!
//! Provider events are the source of truth for status and billing periods.
//! Writes use compare-and-set; a concurrent change reloads the row and the
//! event is applied again on top of it. Subscription snapshots delivered out
//! of order are dropped once a newer one has been applied.

use std::sync::Arc;

use crate::domain::billing::{
    InvoiceOutcome, Payment, PaymentStatus, ProviderEvent, ProviderEventKind, Subscription,
    SubscriptionStatus, WebhookError,
};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::ports::{PaymentInsert, SubscriptionRepository};

use super::PersistRetry;

/// What applying an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The subscription was updated.
    Applied {
        subscription_id: SubscriptionId,
        status: SubscriptionStatus,
        /// Set for invoice events.
        payment: Option<PaymentInsert>,
    },
    /// The snapshot predates the last one applied; nothing was written.
    Stale { subscription_id: SubscriptionId },
    /// No local subscription carries the provider id.
    Unmatched { provider_subscription_id: String },
    /// Event type nobody consumes.
    Unhandled,
}

enum Written {
    Changed(Option<PaymentInsert>),
    Stale,
}

pub struct ApplyProviderEventHandler {
    repository: Arc<dyn SubscriptionRepository>,
    retry: PersistRetry,
}

impl ApplyProviderEventHandler {
    pub fn new(repository: Arc<dyn SubscriptionRepository>) -> Self {
        Self {
            repository,
            retry: PersistRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: PersistRetry) -> Self {
        self.retry = retry;
        self
    }

    pub async fn handle(&self, event: &ProviderEvent) -> Result<ApplyOutcome, WebhookError> {
        let Some(provider_subscription_id) = event.provider_subscription_id() else {
            return Ok(ApplyOutcome::Unhandled);
        };

        let found = self
            .repository
            .find_by_provider_id(event.provider, provider_subscription_id)
            .await
            .map_err(|e| to_webhook_error(e, provider_subscription_id))?;

        let Some(mut current) = found else {
            tracing::warn!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                provider_subscription_id,
                "No local subscription for provider event"
            );
            return Ok(ApplyOutcome::Unmatched {
                provider_subscription_id: provider_subscription_id.to_string(),
            });
        };

        let mut attempt = 1;
        loop {
            let previous_status = current.status;
            let mut next = current.clone();
            let written = self.apply_once(event, &mut next).await;

            let err = match written {
                Ok(Written::Stale) => {
                    tracing::info!(
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        subscription_id = %current.id,
                        "Skipping subscription update older than the last one applied"
                    );
                    return Ok(ApplyOutcome::Stale {
                        subscription_id: current.id,
                    });
                }
                Ok(Written::Changed(payment)) => {
                    tracing::info!(
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        subscription_id = %next.id,
                        from = %previous_status,
                        to = %next.status,
                        cancel_at_period_end = next.cancel_at_period_end,
                        payment = ?payment,
                        "Provider event applied"
                    );
                    return Ok(ApplyOutcome::Applied {
                        subscription_id: next.id,
                        status: next.status,
                        payment,
                    });
                }
                Err(err) => err,
            };

            let retryable = err.code == ErrorCode::ConcurrentModification || err.is_transient();
            if !retryable || !self.retry.allows_another(attempt) {
                return Err(to_webhook_error(err, provider_subscription_id));
            }

            if err.code == ErrorCode::ConcurrentModification {
                current = self
                    .repository
                    .find_by_id(&current.id)
                    .await
                    .map_err(|e| to_webhook_error(e, provider_subscription_id))?
                    .ok_or_else(|| {
                        WebhookError::Database(format!("subscription {} disappeared", current.id))
                    })?;
            } else {
                self.retry.pause(attempt).await;
            }
            attempt += 1;
        }
    }

    /// Mutates `subscription` for the event and writes it.
    async fn apply_once(
        &self,
        event: &ProviderEvent,
        subscription: &mut Subscription,
    ) -> Result<Written, DomainError> {
        let now = Timestamp::now();
        match &event.kind {
            ProviderEventKind::PaymentSucceeded(invoice) => self
                .record_payment(event, subscription, invoice, PaymentStatus::Succeeded, now)
                .await
                .map(|inserted| Written::Changed(Some(inserted))),
            ProviderEventKind::PaymentFailed(invoice) => self
                .record_payment(event, subscription, invoice, PaymentStatus::Failed, now)
                .await
                .map(|inserted| Written::Changed(Some(inserted))),
            ProviderEventKind::SubscriptionDeleted { .. } => {
                subscription.mark_deleted_by_provider(now);
                self.repository.update(subscription).await?;
                subscription.version += 1;
                Ok(Written::Changed(None))
            }
            ProviderEventKind::SubscriptionUpdated(snapshot) => {
                if !subscription.apply_snapshot(snapshot, now)? {
                    return Ok(Written::Stale);
                }
                self.repository.update(subscription).await?;
                subscription.version += 1;
                Ok(Written::Changed(None))
            }
            ProviderEventKind::Unhandled => Ok(Written::Changed(None)),
        }
    }

    async fn record_payment(
        &self,
        event: &ProviderEvent,
        subscription: &mut Subscription,
        invoice: &InvoiceOutcome,
        status: PaymentStatus,
        now: Timestamp,
    ) -> Result<PaymentInsert, DomainError> {
        let moved = subscription.record_payment(status, now)?;
        if !moved {
            tracing::warn!(
                event_id = %event.event_id,
                subscription_id = %subscription.id,
                "Payment reported for a canceled subscription; recording without status change"
            );
        }
        let payment = Payment::from_invoice(subscription.id, event.provider, invoice, status);
        let inserted = self
            .repository
            .update_with_payment(subscription, &payment)
            .await?;
        subscription.version += 1;
        Ok(inserted)
    }
}

fn to_webhook_error(err: DomainError, provider_subscription_id: &str) -> WebhookError {
    match err.code {
        ErrorCode::ValidationFailed => WebhookError::InvalidPeriod(provider_subscription_id.to_string()),
        ErrorCode::InvalidStateTransition => WebhookError::InvalidTransition(err.message),
        ErrorCode::ConcurrentModification => {
            WebhookError::Conflict(provider_subscription_id.to_string())
        }
        _ => WebhookError::Database(err.message),
    }
}
