//! Subscription repository port (write side).
//!
//! The authoritative local record of subscriptions and their payments.
//!
//! # Design
//!
//! - **Uniqueness at the store**: the one-live-subscription rule and the
//!   provider join key are enforced by `insert`, so two racing subscribe
//!   requests cannot both land
//! - **Compare-and-set updates**: `update` only succeeds against the version
//!   the caller loaded
//! - **Append-only payments**: a payment whose provider transaction id is
//!   already stored is skipped, not duplicated

use crate::domain::billing::{Payment, ProviderKind, Subscription};
use crate::domain::foundation::{CommunityId, DomainError, SubscriptionId, UserId};
use async_trait::async_trait;

/// Whether a payment row was written or already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentInsert {
    Recorded,
    Duplicate,
}

/// Repository port for Subscription persistence.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Stores a newly materialized subscription.
    ///
    /// # Errors
    ///
    /// - `SubscriptionExists` if the pair already has a live subscription or
    ///   the provider subscription id is taken
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Writes changes if the stored version still equals `subscription.version`.
    ///
    /// The stored version becomes `subscription.version + 1`.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the row does not exist
    /// - `ConcurrentModification` if the version moved
    /// - `SubscriptionExists` if the change would create a second live row
    /// - `DatabaseError` on persistence failure
    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Appends a payment and writes the subscription in one transaction.
    ///
    /// Same compare-and-set rules as `update`. A duplicate payment is skipped
    /// and reported; the subscription write still happens.
    async fn update_with_payment(
        &self,
        subscription: &Subscription,
        payment: &Payment,
    ) -> Result<PaymentInsert, DomainError>;

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// Resolves the join key carried by provider events.
    async fn find_by_provider_id(
        &self,
        provider: ProviderKind,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// The active or past-due subscription for the pair, if any.
    async fn find_live(
        &self,
        user_id: UserId,
        community_id: CommunityId,
    ) -> Result<Option<Subscription>, DomainError>;
}
