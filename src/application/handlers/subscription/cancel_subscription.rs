//! CancelSubscriptionHandler - Command handler for user-initiated cancellation.
//!
//! The provider is told first. The local row changes only after the
//! provider confirms, and a provider failure leaves it untouched.

use std::sync::Arc;

use crate::domain::billing::{Subscription, SubscriptionError};
use crate::domain::foundation::{ErrorCode, SubscriptionId, Timestamp, UserId};
use crate::ports::{ProviderRegistry, SubscriptionRepository};

use super::PersistRetry;

/// Command to cancel a subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
    pub subscription_id: SubscriptionId,
    /// Keep access until the current period ends (the default).
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    pub subscription: Subscription,
}

pub struct CancelSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    providers: ProviderRegistry,
    retry: PersistRetry,
}

impl CancelSubscriptionHandler {
    pub fn new(repository: Arc<dyn SubscriptionRepository>, providers: ProviderRegistry) -> Self {
        Self {
            repository,
            providers,
            retry: PersistRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: PersistRetry) -> Self {
        self.retry = retry;
        self
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, SubscriptionError> {
        // 1. Load and authorize
        let subscription = self
            .repository
            .find_by_id(&cmd.subscription_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found("subscription", cmd.subscription_id))?;

        if !subscription.is_held_by(cmd.user_id) {
            return Err(SubscriptionError::unauthorized(
                "Only the subscriber can cancel this subscription",
            ));
        }

        // 2. Guard
        subscription.ensure_cancelable(cmd.cancel_at_period_end)?;

        let provider_subscription_id = subscription
            .provider_subscription_id
            .clone()
            .ok_or_else(|| {
                SubscriptionError::infrastructure(format!(
                    "Subscription {} has no provider reference",
                    subscription.id
                ))
            })?;
        let provider = self.providers.get(subscription.provider).ok_or_else(|| {
            SubscriptionError::ProviderUnavailable(format!(
                "payment provider '{}' is not configured",
                subscription.provider
            ))
        })?;

        // 3. Provider first
        provider
            .cancel_subscription(&provider_subscription_id, cmd.cancel_at_period_end)
            .await?;

        // 4. Mirror locally
        let subscription = self
            .persist(subscription, cmd.cancel_at_period_end)
            .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            at_period_end = cmd.cancel_at_period_end,
            status = %subscription.status,
            "Subscription canceled"
        );

        Ok(CancelSubscriptionResult { subscription })
    }

    /// Applies the cancellation with compare-and-set, reloading on conflict.
    async fn persist(
        &self,
        loaded: Subscription,
        at_period_end: bool,
    ) -> Result<Subscription, SubscriptionError> {
        let mut current = loaded;
        let mut attempt = 1;

        loop {
            let mut next = current.clone();
            let now = Timestamp::now();
            let applied = if at_period_end {
                next.schedule_cancellation(now)
            } else {
                next.cancel_immediately(now)
            };
            if applied.is_err() && attempt > 1 {
                // A webhook mirrored the same cancellation while we retried
                return Ok(current);
            }
            applied?;

            let err = match self.repository.update(&next).await {
                Ok(()) => {
                    next.version += 1;
                    return Ok(next);
                }
                Err(err) => err,
            };

            if !self.retry.allows_another(attempt) {
                return Err(self.diverged(&current, at_period_end, err));
            }

            if err.code == ErrorCode::ConcurrentModification {
                current = match self.repository.find_by_id(&current.id).await {
                    Ok(Some(reloaded)) => reloaded,
                    Ok(None) => {
                        return Err(SubscriptionError::not_found("subscription", current.id))
                    }
                    Err(reload_err) => return Err(self.diverged(&current, at_period_end, reload_err)),
                };
            } else if err.is_transient() {
                tracing::warn!(subscription_id = %current.id, attempt, error = %err, "Cancel write failed, retrying");
                self.retry.pause(attempt).await;
            } else {
                return Err(self.diverged(&current, at_period_end, err));
            }
            attempt += 1;
        }
    }

    fn diverged(
        &self,
        subscription: &Subscription,
        at_period_end: bool,
        err: crate::domain::foundation::DomainError,
    ) -> SubscriptionError {
        tracing::error!(
            reconcile_required = true,
            subscription_id = %subscription.id,
            provider = %subscription.provider,
            provider_subscription_id = subscription.provider_subscription_id.as_deref().unwrap_or(""),
            at_period_end,
            error = %err,
            "Provider canceled but local update failed"
        );
        SubscriptionError::infrastructure(err.to_string())
    }
}
