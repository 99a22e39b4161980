//! Subscription aggregate.
//!
//! One user's support of one community under one plan. The provider owns the
//! billing truth; this record mirrors it and adds the local guards.
//!
//! # Design Decisions
//!
//! - **Materialized after the provider**: a row exists only once the provider
//!   subscription does, so `provider_subscription_id` is always set here
//! - **Sticky `canceled_at`**: once stamped it is never cleared or moved
//! - **Optimistic versioning**: the store bumps `version` on each write and
//!   refuses writes carrying a stale one
//! - **Provider clock**: snapshots carry the provider's emission time, and
//!   one older than the last applied snapshot is dropped

use crate::domain::foundation::{
    CommunityId, DomainError, ErrorCode, PlanId, StateMachine, SubscriptionId, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use super::{PaymentStatus, ProviderKind, SubscriptionError, SubscriptionSnapshot, SubscriptionStatus};

/// Subscription aggregate.
///
/// # Invariants
///
/// - At most one live (pending, active or past-due) subscription per
///   (user, community)
/// - (provider, provider_subscription_id) is unique
/// - `current_period_start <= current_period_end`
/// - `Canceled` is never left
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub community_id: CommunityId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub provider: ProviderKind,
    pub provider_subscription_id: Option<String>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<Timestamp>,
    /// Provider time of the last applied subscription snapshot.
    pub provider_synced_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Compare-and-set token, starts at 1.
    pub version: i64,
}

/// What the provider reported when the subscription was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTerms {
    pub provider_subscription_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
}

impl Subscription {
    /// Builds the local record for a subscription the provider just created.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty provider id or an inverted
    /// billing period.
    pub fn materialize(
        user_id: UserId,
        community_id: CommunityId,
        plan_id: PlanId,
        provider: ProviderKind,
        terms: ProviderTerms,
    ) -> Result<Self, DomainError> {
        if terms.provider_subscription_id.trim().is_empty() {
            return Err(DomainError::validation(
                "provider_subscription_id",
                "Provider returned an empty subscription id",
            ));
        }
        ensure_period(&terms.current_period_start, &terms.current_period_end)?;

        let now = Timestamp::now();
        let mut subscription = Self {
            id: SubscriptionId::new(),
            user_id,
            community_id,
            plan_id,
            status: SubscriptionStatus::Pending,
            current_period_start: terms.current_period_start,
            current_period_end: terms.current_period_end,
            provider,
            provider_subscription_id: Some(terms.provider_subscription_id),
            cancel_at_period_end: false,
            canceled_at: None,
            provider_synced_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        if terms.status != SubscriptionStatus::Pending {
            subscription.move_to(terms.status)?;
        }
        if subscription.status == SubscriptionStatus::Canceled {
            subscription.canceled_at = Some(now);
        }
        Ok(subscription)
    }

    /// True if `user_id` is the subscriber.
    pub fn is_held_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Checks the cancel guard without changing anything.
    ///
    /// A canceled subscription refuses both kinds of cancel. One already
    /// scheduled to cancel refuses another end-of-period request but still
    /// accepts an immediate one. A pending subscription has no paid period
    /// to end; the provider expires it if the first invoice stays unpaid.
    pub fn ensure_cancelable(&self, at_period_end: bool) -> Result<(), SubscriptionError> {
        if self.status == SubscriptionStatus::Pending {
            return Err(SubscriptionError::validation(
                "status",
                "A subscription awaiting its first payment cannot be canceled",
            ));
        }
        if self.status == SubscriptionStatus::Canceled
            || (at_period_end && self.cancel_at_period_end)
        {
            return Err(SubscriptionError::already_canceled(self.id));
        }
        Ok(())
    }

    /// Mirrors a provider-confirmed end-of-period cancellation.
    ///
    /// Status is untouched until the provider reports the period boundary.
    pub fn schedule_cancellation(&mut self, now: Timestamp) -> Result<(), SubscriptionError> {
        self.ensure_cancelable(true)?;
        self.cancel_at_period_end = true;
        self.canceled_at.get_or_insert(now);
        self.updated_at = now;
        Ok(())
    }

    /// Mirrors a provider-confirmed immediate cancellation.
    pub fn cancel_immediately(&mut self, now: Timestamp) -> Result<(), SubscriptionError> {
        self.ensure_cancelable(false)?;
        self.move_to(SubscriptionStatus::Canceled)?;
        self.canceled_at.get_or_insert(now);
        self.updated_at = now;
        Ok(())
    }

    /// Applies the status consequence of an invoice outcome.
    ///
    /// Returns `false` when the subscription is already canceled; the payment
    /// is still recorded by the caller but the status stays put.
    pub fn record_payment(
        &mut self,
        outcome: PaymentStatus,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        if self.status == SubscriptionStatus::Canceled {
            return Ok(false);
        }
        let target = match outcome {
            PaymentStatus::Succeeded => SubscriptionStatus::Active,
            PaymentStatus::Failed => SubscriptionStatus::PastDue,
        };
        self.move_to(target)?;
        self.updated_at = now;
        Ok(true)
    }

    /// The provider deleted the subscription.
    pub fn mark_deleted_by_provider(&mut self, now: Timestamp) {
        self.status = SubscriptionStatus::Canceled;
        self.canceled_at.get_or_insert(now);
        self.updated_at = now;
    }

    /// Adopts the provider's view after a subscription change.
    ///
    /// Periods are always refreshed. Status and the cancel flag follow the
    /// provider unless the subscription is already canceled locally.
    ///
    /// Returns `false` and changes nothing when the snapshot was emitted
    /// before the last one applied.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an inverted period, and an
    /// invalid-transition error when the provider reports a status this
    /// subscription cannot move to (e.g. back to pending).
    pub fn apply_snapshot(
        &mut self,
        snapshot: &SubscriptionSnapshot,
        now: Timestamp,
    ) -> Result<bool, DomainError> {
        if let Some(synced) = &self.provider_synced_at {
            if snapshot.observed_at.is_before(synced) {
                return Ok(false);
            }
        }
        ensure_period(&snapshot.current_period_start, &snapshot.current_period_end)?;

        if self.status != SubscriptionStatus::Canceled {
            if snapshot.status != self.status || self.status.can_transition_to(&snapshot.status) {
                self.move_to(snapshot.status)?;
            }
            if snapshot.status == SubscriptionStatus::Canceled {
                self.canceled_at.get_or_insert(now);
            }
            if snapshot.cancel_at_period_end && !self.cancel_at_period_end {
                self.canceled_at.get_or_insert(now);
            }
            self.cancel_at_period_end = snapshot.cancel_at_period_end;
        }

        self.current_period_start = snapshot.current_period_start;
        self.current_period_end = snapshot.current_period_end;
        self.provider_synced_at = Some(snapshot.observed_at);
        self.updated_at = now;
        Ok(true)
    }

    fn move_to(&mut self, target: SubscriptionStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|e| {
            DomainError::new(ErrorCode::InvalidStateTransition, e.to_string())
                .with_detail("id", self.id.to_string())
        })?;
        Ok(())
    }
}

fn ensure_period(start: &Timestamp, end: &Timestamp) -> Result<(), DomainError> {
    if end.is_before(start) {
        return Err(DomainError::validation(
            "current_period_end",
            "Billing period ends before it starts",
        ));
    }
    Ok(())
}
