//! In-memory subscription store.
//!
//! Mirrors the PostgreSQL constraints (partial uniqueness on live rows,
//! unique provider join key, unique payment transaction ids, versioned
//! updates) so engine tests exercise the same races. Useful for tests and
//! local development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::{Payment, ProviderKind, Subscription};
use crate::domain::foundation::{CommunityId, DomainError, ErrorCode, SubscriptionId, UserId};
use crate::ports::{
    Page, PageRequest, PaymentInsert, PaymentView, SubscriptionReader, SubscriptionRepository,
    SubscriptionView,
};

#[derive(Debug, Default)]
struct StoreState {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    payments: Vec<Payment>,
}

impl StoreState {
    fn check_unique(&self, candidate: &Subscription) -> Result<(), DomainError> {
        for other in self.subscriptions.values() {
            if other.id == candidate.id {
                continue;
            }
            if candidate.status.is_live()
                && other.status.is_live()
                && other.user_id == candidate.user_id
                && other.community_id == candidate.community_id
            {
                return Err(DomainError::new(
                    ErrorCode::SubscriptionExists,
                    format!(
                        "User {} already supports community {}",
                        candidate.user_id, candidate.community_id
                    ),
                ));
            }
            if candidate.provider_subscription_id.is_some()
                && other.provider == candidate.provider
                && other.provider_subscription_id == candidate.provider_subscription_id
            {
                return Err(DomainError::new(
                    ErrorCode::SubscriptionExists,
                    "Provider subscription already linked",
                ));
            }
        }
        Ok(())
    }

    fn check_version(&self, candidate: &Subscription) -> Result<(), DomainError> {
        let stored = self.subscriptions.get(&candidate.id).ok_or_else(|| {
            DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
                .with_detail("id", candidate.id.to_string())
        })?;
        if stored.version != candidate.version {
            return Err(DomainError::new(
                ErrorCode::ConcurrentModification,
                format!(
                    "Subscription {} changed (expected version {}, found {})",
                    candidate.id, candidate.version, stored.version
                ),
            ));
        }
        self.check_unique(candidate)
    }

    fn write(&mut self, candidate: &Subscription) {
        let mut stored = candidate.clone();
        stored.version = candidate.version + 1;
        self.subscriptions.insert(stored.id, stored);
    }
}

/// In-memory store for subscriptions and payments.
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored subscriptions
    pub async fn subscription_count(&self) -> usize {
        self.state.read().await.subscriptions.len()
    }

    /// Payments recorded against a subscription, oldest first.
    pub async fn payments_for(&self, subscription_id: &SubscriptionId) -> Vec<Payment> {
        self.state
            .read()
            .await
            .payments
            .iter()
            .filter(|p| &p.subscription_id == subscription_id)
            .cloned()
            .collect()
    }
}

fn paginate<T: Clone>(mut rows: Vec<T>, request: PageRequest) -> Page<T> {
    let total = rows.len() as u64;
    let start = (request.offset() as usize).min(rows.len());
    let end = (start + request.per_page() as usize).min(rows.len());
    let items = rows.drain(start..end).collect();
    Page::new(items, total, request)
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionStore {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        if state.subscriptions.contains_key(&subscription.id) {
            return Err(DomainError::new(
                ErrorCode::SubscriptionExists,
                "Subscription id already used",
            ));
        }
        state.check_unique(subscription)?;
        state
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut state = self.state.write().await;
        state.check_version(subscription)?;
        state.write(subscription);
        Ok(())
    }

    async fn update_with_payment(
        &self,
        subscription: &Subscription,
        payment: &Payment,
    ) -> Result<PaymentInsert, DomainError> {
        let mut state = self.state.write().await;
        state.check_version(subscription)?;

        let duplicate = state.payments.iter().any(|p| {
            p.provider == payment.provider
                && p.provider_transaction_id == payment.provider_transaction_id
        });
        if !duplicate {
            state.payments.push(payment.clone());
        }
        state.write(subscription);

        Ok(if duplicate {
            PaymentInsert::Duplicate
        } else {
            PaymentInsert::Recorded
        })
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.state.read().await.subscriptions.get(id).cloned())
    }

    async fn find_by_provider_id(
        &self,
        provider: ProviderKind,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .find(|s| {
                s.provider == provider
                    && s.provider_subscription_id.as_deref() == Some(provider_subscription_id)
            })
            .cloned())
    }

    async fn find_live(
        &self,
        user_id: UserId,
        community_id: CommunityId,
    ) -> Result<Option<Subscription>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .find(|s| s.user_id == user_id && s.community_id == community_id && s.status.is_live())
            .cloned())
    }
}

#[async_trait]
impl SubscriptionReader for InMemorySubscriptionStore {
    async fn get(&self, id: &SubscriptionId) -> Result<Option<SubscriptionView>, DomainError> {
        Ok(self
            .state
            .read()
            .await
            .subscriptions
            .get(id)
            .cloned()
            .map(SubscriptionView::from))
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<SubscriptionView>, DomainError> {
        let state = self.state.read().await;
        let mut rows: Vec<Subscription> = state
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, page).map(SubscriptionView::from))
    }

    async fn list_for_community(
        &self,
        community_id: CommunityId,
        page: PageRequest,
    ) -> Result<Page<SubscriptionView>, DomainError> {
        let state = self.state.read().await;
        let mut rows: Vec<Subscription> = state
            .subscriptions
            .values()
            .filter(|s| s.community_id == community_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, page).map(SubscriptionView::from))
    }

    async fn list_payments(
        &self,
        subscription_id: &SubscriptionId,
        page: PageRequest,
    ) -> Result<Page<PaymentView>, DomainError> {
        let state = self.state.read().await;
        let mut rows: Vec<Payment> = state
            .payments
            .iter()
            .filter(|p| &p.subscription_id == subscription_id)
            .cloned()
            .collect();
        rows.reverse();
        Ok(paginate(rows, page).map(PaymentView::from))
    }
}
