//! Mock payment provider for testing.
//!
//! Scriptable stand-in for the Stripe adapter:
//! - Provider-side state (customers, offerings, subscriptions)
//! - Error injection per method
//! - Call tracking
//! - Optional latency on subscription creation, for race tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::billing::{ProviderKind, SubscriptionStatus};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    CreateSubscriptionRequest, CustomerRef, EnsureCustomerRequest, EnsureOfferingRequest,
    OfferingRef, PaymentError, PaymentProvider, ProviderSubscription,
};

/// Mock payment provider for testing.
///
/// ```ignore
/// let mock = MockPaymentProvider::new();
/// mock.set_next_subscription_id("sub_X");
/// mock.set_method_error("create_subscription", PaymentError::declined("card_declined"));
/// ```
#[derive(Clone, Default)]
pub struct MockPaymentProvider {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    customers: HashMap<String, CustomerRef>,
    offerings: HashMap<(i64, i64), OfferingRef>,
    subscriptions: HashMap<String, ProviderSubscription>,

    next_subscription_id: Option<String>,
    initial_status: Option<SubscriptionStatus>,
    create_delay: Option<Duration>,
    sequence: u64,

    /// Errors returned on every call to the named method until cleared.
    method_errors: HashMap<String, PaymentError>,

    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Configuration

    /// Id handed out by the next `create_subscription`.
    pub fn set_next_subscription_id(&self, id: impl Into<String>) {
        self.state().next_subscription_id = Some(id.into());
    }

    /// Status reported for newly created subscriptions (default active).
    pub fn set_initial_status(&self, status: SubscriptionStatus) {
        self.state().initial_status = Some(status);
    }

    /// Sleep inside `create_subscription` before answering.
    pub fn set_create_delay(&self, delay: Duration) {
        self.state().create_delay = Some(delay);
    }

    /// Make every call to `method` fail with `error`.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        self.state().method_errors.clear();
    }

    /// Provider-side view of a subscription.
    pub fn subscription(&self, id: &str) -> Option<ProviderSubscription> {
        self.state().subscriptions.get(id).cloned()
    }

    // Call tracking

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    // Internal helpers

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), PaymentError> {
        match self.state().method_errors.get(method) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state();
        state.sequence += 1;
        format!("{}_mock_{}", prefix, state.sequence)
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    async fn ensure_customer(
        &self,
        request: EnsureCustomerRequest,
    ) -> Result<CustomerRef, PaymentError> {
        self.record_call(
            "ensure_customer",
            vec![request.user_id.to_string(), request.email.clone()],
        );
        self.check_error("ensure_customer")?;

        if let Some(existing) = self.state().customers.get(&request.email) {
            return Ok(existing.clone());
        }
        let customer = CustomerRef {
            id: self.next_id("cus"),
        };
        self.state()
            .customers
            .insert(request.email, customer.clone());
        Ok(customer)
    }

    async fn ensure_priced_offering(
        &self,
        request: EnsureOfferingRequest,
    ) -> Result<OfferingRef, PaymentError> {
        self.record_call(
            "ensure_priced_offering",
            vec![
                request.community_id.to_string(),
                request.plan_id.to_string(),
                request.price.to_string(),
            ],
        );
        self.check_error("ensure_priced_offering")?;

        let key = (request.community_id.value(), request.plan_id.value());
        if let Some(existing) = self.state().offerings.get(&key) {
            return Ok(existing.clone());
        }
        let offering = OfferingRef {
            product_id: self.next_id("prod"),
            price_id: self.next_id("price"),
        };
        self.state().offerings.insert(key, offering.clone());
        Ok(offering)
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ProviderSubscription, PaymentError> {
        self.record_call(
            "create_subscription",
            vec![
                request.customer.id.clone(),
                request.offering.price_id.clone(),
                request.payment_method_id.clone(),
            ],
        );
        self.check_error("create_subscription")?;

        let delay = self.state().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.state().next_subscription_id.take();
        let id = match scripted {
            Some(id) => id,
            None => self.next_id("sub"),
        };
        let now = Timestamp::now();
        let subscription = ProviderSubscription {
            id: id.clone(),
            status: self.state().initial_status.unwrap_or(SubscriptionStatus::Active),
            current_period_start: now,
            current_period_end: now.add_days(30),
            cancel_at_period_end: false,
        };
        self.state().subscriptions.insert(id, subscription.clone());
        Ok(subscription)
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, PaymentError> {
        self.record_call(
            "cancel_subscription",
            vec![provider_subscription_id.to_string(), at_period_end.to_string()],
        );
        self.check_error("cancel_subscription")?;

        let mut state = self.state();
        let subscription = state
            .subscriptions
            .get_mut(provider_subscription_id)
            .ok_or_else(|| PaymentError::not_found("Subscription"))?;

        if at_period_end {
            subscription.cancel_at_period_end = true;
        } else {
            subscription.status = SubscriptionStatus::Canceled;
        }
        Ok(subscription.clone())
    }
}
