//! CreateSubscriptionHandler - Command handler for subscribing to a community plan.
//!
//! The provider is called first and the local row is written only after it
//! succeeds. The store's uniqueness rule settles racing requests; the loser's
//! provider subscription is canceled on a best-effort basis.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::billing::{ProviderKind, ProviderTerms, Subscription, SubscriptionError};
use crate::domain::foundation::{CommunityId, ErrorCode, UserId};
use crate::ports::{
    CommunityDirectory, CreateSubscriptionRequest, EnsureCustomerRequest, EnsureOfferingRequest,
    PaymentProvider, ProviderRegistry, SubscriptionRepository,
};

use super::PersistRetry;

/// Command to subscribe a user to a community's active plan.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub user_id: UserId,
    pub community_id: CommunityId,
    /// Provider payment method token (pm_xxx for Stripe).
    pub payment_method_id: String,
    /// Provider name as supplied by the caller.
    pub provider: String,
    /// Caller-supplied key so a retried request cannot subscribe twice.
    pub idempotency_key: Option<String>,
}

/// Result of a successful subscribe.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionResult {
    pub subscription: Subscription,
}

pub struct CreateSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    directory: Arc<dyn CommunityDirectory>,
    providers: ProviderRegistry,
    retry: PersistRetry,
}

impl CreateSubscriptionHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        directory: Arc<dyn CommunityDirectory>,
        providers: ProviderRegistry,
    ) -> Self {
        Self {
            repository,
            directory,
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
        cmd: CreateSubscriptionCommand,
    ) -> Result<CreateSubscriptionResult, SubscriptionError> {
        // 1. Input checks; nothing external is touched before these pass
        let (kind, provider) = self.providers.resolve(&cmd.provider)?;
        let payment_method_id = cmd.payment_method_id.trim();
        if payment_method_id.is_empty() {
            return Err(SubscriptionError::validation(
                "paymentMethodId",
                "Payment method is required",
            ));
        }

        // 2. Guards
        if !self.directory.community_exists(cmd.community_id).await? {
            return Err(SubscriptionError::not_found("community", cmd.community_id));
        }
        let plan = self
            .directory
            .active_plan(cmd.community_id)
            .await?
            .filter(|p| p.accepts_subscribers())
            .ok_or_else(|| SubscriptionError::not_found("plan", cmd.community_id))?;

        if self
            .repository
            .find_live(cmd.user_id, cmd.community_id)
            .await?
            .is_some()
        {
            return Err(SubscriptionError::already_subscribed(
                cmd.user_id,
                cmd.community_id,
            ));
        }

        let member = self
            .directory
            .member_profile(cmd.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found("member", cmd.user_id))?;

        // 3. Provider side
        let customer = provider
            .ensure_customer(EnsureCustomerRequest {
                user_id: cmd.user_id,
                email: member.email,
                display_name: member.display_name,
            })
            .await?;

        let offering = provider
            .ensure_priced_offering(EnsureOfferingRequest {
                community_id: cmd.community_id,
                plan_id: plan.id,
                name: plan.name.clone(),
                description: plan.description.clone(),
                price: plan.price.clone(),
            })
            .await?;

        let metadata = HashMap::from([
            ("user_id".to_string(), cmd.user_id.to_string()),
            ("community_id".to_string(), cmd.community_id.to_string()),
            ("plan_id".to_string(), plan.id.to_string()),
        ]);

        let created = provider
            .create_subscription(CreateSubscriptionRequest {
                customer,
                offering,
                payment_method_id: payment_method_id.to_string(),
                metadata,
                idempotency_key: cmd.idempotency_key,
            })
            .await?;

        // 4. Local record, only now that the provider has committed
        let provider_subscription_id = created.id.clone();
        let subscription = match Subscription::materialize(
            cmd.user_id,
            cmd.community_id,
            plan.id,
            kind,
            ProviderTerms {
                provider_subscription_id: created.id,
                status: created.status,
                current_period_start: created.current_period_start,
                current_period_end: created.current_period_end,
            },
        ) {
            Ok(subscription) => subscription,
            Err(err) => {
                compensate(provider.as_ref(), kind, &provider_subscription_id, "unusable provider response").await;
                return Err(SubscriptionError::infrastructure(err.to_string()));
            }
        };

        match self
            .retry
            .run("insert_subscription", || self.repository.insert(&subscription))
            .await
        {
            Ok(()) => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    user_id = %subscription.user_id,
                    community_id = %subscription.community_id,
                    provider = %kind,
                    provider_subscription_id = %provider_subscription_id,
                    status = %subscription.status,
                    "Subscription created"
                );
                Ok(CreateSubscriptionResult { subscription })
            }
            Err(err) if err.code == ErrorCode::SubscriptionExists => {
                // Lost the race against a concurrent subscribe for the same pair
                compensate(provider.as_ref(), kind, &provider_subscription_id, "lost subscribe race").await;
                Err(SubscriptionError::already_subscribed(
                    cmd.user_id,
                    cmd.community_id,
                ))
            }
            Err(err) => {
                tracing::error!(
                    reconcile_required = true,
                    user_id = %cmd.user_id,
                    community_id = %cmd.community_id,
                    provider = %kind,
                    provider_subscription_id = %provider_subscription_id,
                    error = %err,
                    "Provider subscription created but local insert failed"
                );
                Err(SubscriptionError::infrastructure(err.to_string()))
            }
        }
    }
}

/// Best-effort immediate cancel of a provider subscription with no local row.
async fn compensate(
    provider: &dyn PaymentProvider,
    kind: ProviderKind,
    provider_subscription_id: &str,
    reason: &'static str,
) {
    match provider
        .cancel_subscription(provider_subscription_id, false)
        .await
    {
        Ok(_) => tracing::warn!(
            provider = %kind,
            provider_subscription_id,
            reason,
            "Canceled orphaned provider subscription"
        ),
        Err(err) => tracing::error!(
            reconcile_required = true,
            provider = %kind,
            provider_subscription_id,
            reason,
            error = %err,
            "Failed to cancel orphaned provider subscription"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryCommunityDirectory, InMemorySubscriptionStore};
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::domain::billing::{Payment, SubscriptionStatus, SupportPlan};
    use crate::domain::foundation::{DomainError, Money, PlanId, SubscriptionId};
    use crate::ports::{MemberProfile, PaymentError, PaymentInsert};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    // ════════════════════════════════════════════════════════════════════════════
    // Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    fn user() -> UserId {
        UserId::new(3).unwrap()
    }

    fn community() -> CommunityId {
        CommunityId::new(1).unwrap()
    }

    fn plan(active: bool) -> SupportPlan {
        SupportPlan {
            id: PlanId::new(10).unwrap(),
            community_id: community(),
            name: "Supporter".to_string(),
            description: Some("Keeps the lights on".to_string()),
            price: Money::from_parts(999, "USD").unwrap(),
            benefits: None,
            is_active: active,
        }
    }

    async fn directory_with(plan: Option<SupportPlan>) -> Arc<InMemoryCommunityDirectory> {
        let directory = InMemoryCommunityDirectory::new();
        directory
            .add_community(community(), UserId::new(99).unwrap())
            .await;
        if let Some(plan) = plan {
            directory.add_plan(plan).await;
        }
        directory
            .add_member(MemberProfile {
                user_id: user(),
                email: "three@example.com".to_string(),
                display_name: Some("Three".to_string()),
            })
            .await;
        Arc::new(directory)
    }

    fn command() -> CreateSubscriptionCommand {
        CreateSubscriptionCommand {
            user_id: user(),
            community_id: community(),
            payment_method_id: "pm_card_visa".to_string(),
            provider: "stripe".to_string(),
            idempotency_key: None,
        }
    }

    fn handler(
        store: Arc<dyn SubscriptionRepository>,
        directory: Arc<InMemoryCommunityDirectory>,
        mock: &MockPaymentProvider,
    ) -> CreateSubscriptionHandler {
        CreateSubscriptionHandler::new(
            store,
            directory,
            ProviderRegistry::new().with(Arc::new(mock.clone())),
        )
        .with_retry(PersistRetry::new(3, Duration::ZERO))
    }

    /// Store whose inserts fail with a transient error a fixed number of times.
    struct FlakyStore {
        inner: InMemorySubscriptionStore,
        failures_left: AtomicU32,
        insert_calls: AtomicU32,
    }

    impl FlakyStore {
        fn failing(times: u32) -> Self {
            Self {
                inner: InMemorySubscriptionStore::new(),
                failures_left: AtomicU32::new(times),
                insert_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SubscriptionRepository for FlakyStore {
        async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(DomainError::database("connection reset"));
            }
            self.inner.insert(subscription).await
        }

        async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
            self.inner.update(subscription).await
        }

        async fn update_with_payment(
            &self,
            subscription: &Subscription,
            payment: &Payment,
        ) -> Result<PaymentInsert, DomainError> {
            self.inner.update_with_payment(subscription, payment).await
        }

        async fn find_by_id(
            &self,
            id: &SubscriptionId,
        ) -> Result<Option<Subscription>, DomainError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_provider_id(
            &self,
            provider: ProviderKind,
            provider_subscription_id: &str,
        ) -> Result<Option<Subscription>, DomainError> {
            self.inner
                .find_by_provider_id(provider, provider_subscription_id)
                .await
        }

        async fn find_live(
            &self,
            user_id: UserId,
            community_id: CommunityId,
        ) -> Result<Option<Subscription>, DomainError> {
            self.inner.find_live(user_id, community_id).await
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn creates_subscription_with_provider_status() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mock = MockPaymentProvider::new();
        mock.set_next_subscription_id("sub_X");

        let result = handler(store.clone(), directory_with(Some(plan(true))).await, &mock)
            .handle(command())
            .await
            .unwrap();

        let sub = result.subscription;
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.provider_subscription_id.as_deref(), Some("sub_X"));
        assert_eq!(sub.plan_id, PlanId::new(10).unwrap());
        assert!(store.find_by_id(&sub.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn provider_calls_run_in_order_with_metadata() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mock = MockPaymentProvider::new();

        handler(store, directory_with(Some(plan(true))).await, &mock)
            .handle(command())
            .await
            .unwrap();

        let methods: Vec<String> = mock.calls().into_iter().map(|c| c.method).collect();
        assert_eq!(
            methods,
            vec!["ensure_customer", "ensure_priced_offering", "create_subscription"]
        );
    }

    #[tokio::test]
    async fn past_due_initial_status_is_kept() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mock = MockPaymentProvider::new();
        mock.set_initial_status(SubscriptionStatus::PastDue);

        let result = handler(store, directory_with(Some(plan(true))).await, &mock)
            .handle(command())
            .await
            .unwrap();
        assert_eq!(result.subscription.status, SubscriptionStatus::PastDue);
    }

    #[tokio::test]
    async fn unsupported_provider_is_rejected_before_any_call() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mock = MockPaymentProvider::new();
        let mut cmd = command();
        cmd.provider = "paypal".to_string();

        let err = handler(store.clone(), directory_with(Some(plan(true))).await, &mock)
            .handle(cmd)
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::Validation { ref field, .. } if field == "provider"));
        assert!(mock.calls().is_empty());
        assert_eq!(store.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn missing_community_is_not_found() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mock = MockPaymentProvider::new();
        let mut cmd = command();
        cmd.community_id = CommunityId::new(42).unwrap();

        let err = handler(store, directory_with(Some(plan(true))).await, &mock)
            .handle(cmd)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CommunityNotFound);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn inactive_plan_is_not_found() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mock = MockPaymentProvider::new();

        let err = handler(store, directory_with(Some(plan(false))).await, &mock)
            .handle(command())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PlanNotFound);
    }

    #[tokio::test]
    async fn second_subscribe_is_already_subscribed() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mock = MockPaymentProvider::new();
        let handler = handler(store.clone(), directory_with(Some(plan(true))).await, &mock);

        handler.handle(command()).await.unwrap();
        let err = handler.handle(command()).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::SubscriptionExists);
        assert_eq!(mock.call_count("create_subscription"), 1);
        assert_eq!(store.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn declined_card_leaves_store_untouched() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mock = MockPaymentProvider::new();
        mock.set_method_error(
            "create_subscription",
            PaymentError::declined("Your card was declined"),
        );

        let err = handler(store.clone(), directory_with(Some(plan(true))).await, &mock)
            .handle(command())
            .await
            .unwrap_err();

        assert_eq!(err, SubscriptionError::PaymentDeclined("Your card was declined".into()));
        assert_eq!(store.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn provider_timeout_is_unavailable_and_not_persisted() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mock = MockPaymentProvider::new();
        mock.set_method_error("ensure_customer", PaymentError::unavailable("timed out"));

        let err = handler(store.clone(), directory_with(Some(plan(true))).await, &mock)
            .handle(command())
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(!mock.was_called("create_subscription"));
        assert_eq!(store.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn transient_insert_failures_are_retried() {
        let store = Arc::new(FlakyStore::failing(2));
        let mock = MockPaymentProvider::new();

        handler(store.clone(), directory_with(Some(plan(true))).await, &mock)
            .handle(command())
            .await
            .unwrap();

        assert_eq!(store.insert_calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.inner.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn exhausted_insert_retries_surface_infrastructure_error() {
        let store = Arc::new(FlakyStore::failing(10));
        let mock = MockPaymentProvider::new();

        let err = handler(store.clone(), directory_with(Some(plan(true))).await, &mock)
            .handle(command())
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::Infrastructure(_)));
        assert_eq!(store.insert_calls.load(Ordering::SeqCst), 3);
        // The provider keeps its subscription; a webhook reconciles later
        assert!(!mock.was_called("cancel_subscription"));
    }

    #[tokio::test]
    async fn lost_race_cancels_orphan() {
        let store = Arc::new(InMemorySubscriptionStore::new());
        let mock = MockPaymentProvider::new();
        let directory = directory_with(Some(plan(true))).await;

        // A row that find_live cannot see yet would be inserted by a racing
        // request; simulate by inserting between the guard and the insert.
        let racing = Subscription::materialize(
            user(),
            community(),
            PlanId::new(10).unwrap(),
            ProviderKind::Stripe,
            ProviderTerms {
                provider_subscription_id: "sub_racer".into(),
                status: SubscriptionStatus::Active,
                current_period_start: crate::domain::foundation::Timestamp::now(),
                current_period_end: crate::domain::foundation::Timestamp::now().add_days(30),
            },
        )
        .unwrap();

        mock.set_create_delay(Duration::from_millis(50));
        mock.set_next_subscription_id("sub_loser");
        let handler = handler(store.clone(), directory, &mock);

        let pending = handler.handle(command());
        let racer = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.insert(&racing).await.unwrap();
        };
        let (result, ()) = tokio::join!(pending, racer);

        assert_eq!(result.unwrap_err().code(), ErrorCode::SubscriptionExists);
        let orphan = mock.subscription("sub_loser").unwrap();
        assert_eq!(orphan.status, SubscriptionStatus::Canceled);
        assert_eq!(store.subscription_count().await, 1);
    }
}
