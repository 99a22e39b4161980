//! Subscription reader port (read side / CQRS queries).
//!
//! Paginated views for holders, community owners and payment history.

use crate::domain::billing::{Payment, PaymentStatus, ProviderKind, Subscription, SubscriptionStatus};
use crate::domain::foundation::{
    CommunityId, DomainError, PaymentId, PlanId, SubscriptionId, Timestamp, UserId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Reader port for subscription queries.
#[async_trait]
pub trait SubscriptionReader: Send + Sync {
    async fn get(&self, id: &SubscriptionId) -> Result<Option<SubscriptionView>, DomainError>;

    /// Newest first.
    async fn list_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<SubscriptionView>, DomainError>;

    /// Newest first.
    async fn list_for_community(
        &self,
        community_id: CommunityId,
        page: PageRequest,
    ) -> Result<Page<SubscriptionView>, DomainError>;

    /// Newest first.
    async fn list_payments(
        &self,
        subscription_id: &SubscriptionId,
        page: PageRequest,
    ) -> Result<Page<PaymentView>, DomainError>;
}

/// One-based page selector, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    per_page: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A page of results plus the total across all pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page(),
            per_page: request.per_page(),
        }
    }

    /// Converts the items, keeping paging metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Subscription as shown to holders and owners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionView {
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
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Subscription> for SubscriptionView {
    fn from(s: Subscription) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            community_id: s.community_id,
            plan_id: s.plan_id,
            status: s.status,
            current_period_start: s.current_period_start,
            current_period_end: s.current_period_end,
            provider: s.provider,
            provider_subscription_id: s.provider_subscription_id,
            cancel_at_period_end: s.cancel_at_period_end,
            canceled_at: s.canceled_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// Payment history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentView {
    pub id: PaymentId,
    pub subscription_id: SubscriptionId,
    pub amount_minor: i64,
    pub currency: String,
    pub payment_method_kind: String,
    pub provider: ProviderKind,
    pub provider_transaction_id: String,
    pub status: PaymentStatus,
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    pub created_at: Timestamp,
}

impl From<Payment> for PaymentView {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            subscription_id: p.subscription_id,
            amount_minor: p.amount.amount_minor(),
            currency: p.amount.currency().code().to_string(),
            payment_method_kind: p.payment_method_kind,
            provider: p.provider,
            provider_transaction_id: p.provider_transaction_id,
            status: p.status,
            period_start: p.period_start,
            period_end: p.period_end,
            created_at: p.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_reader_is_object_safe() {
        fn _accepts_dyn(_reader: &dyn SubscriptionReader) {}
    }

    #[test]
    fn page_request_defaults() {
        let request = PageRequest::default();
        assert_eq!(request.page(), 1);
        assert_eq!(request.per_page(), DEFAULT_PER_PAGE);
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn page_request_clamps_bounds() {
        let request = PageRequest::new(Some(0), Some(1_000));
        assert_eq!(request.page(), 1);
        assert_eq!(request.per_page(), MAX_PER_PAGE);

        assert_eq!(PageRequest::new(Some(3), Some(0)).per_page(), 1);
    }

    #[test]
    fn offset_skips_previous_pages() {
        assert_eq!(PageRequest::new(Some(3), Some(25)).offset(), 50);
    }

    #[test]
    fn page_map_keeps_metadata() {
        let page = Page::new(vec![1, 2], 7, PageRequest::new(Some(2), Some(2)));
        let mapped = page.map(|n| n * 10);
        assert_eq!(mapped.items, vec![10, 20]);
        assert_eq!(mapped.total, 7);
        assert_eq!(mapped.page, 2);
    }
}
