//! Payment provider port.
//!
//! Abstract payment operations the lifecycle needs from an external billing
//! system. Implementations perform API calls only; they never touch local
//! storage.
//!
//! # Design
//!
//! - **Lookup-or-create**: customer and offering setup is idempotent
//! - **Minor units end to end**: amounts cross this boundary as `Money`
//! - **Timeouts are failures**: an indeterminate call is `ProviderUnavailable`

use crate::domain::billing::{ProviderKind, SubscriptionError, SubscriptionStatus};
use crate::domain::foundation::{CommunityId, DomainError, ErrorCode, Money, PlanId, Timestamp, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Port for one payment provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Which provider this adapter speaks to.
    fn kind(&self) -> ProviderKind;

    /// Finds the customer by email or creates it.
    async fn ensure_customer(&self, request: EnsureCustomerRequest)
        -> Result<CustomerRef, PaymentError>;

    /// Finds the offering tagged with (community, plan) or creates it, then
    /// reuses its price or creates a monthly one.
    async fn ensure_priced_offering(
        &self,
        request: EnsureOfferingRequest,
    ) -> Result<OfferingRef, PaymentError>;

    /// Attaches the payment method, makes it the default, and subscribes.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ProviderSubscription, PaymentError>;

    /// Cancels now or at the end of the current period.
    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, PaymentError>;
}

/// Request to resolve a provider customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureCustomerRequest {
    /// Internal user ID (stored as metadata).
    pub user_id: UserId,

    /// Lookup key.
    pub email: String,

    pub display_name: Option<String>,
}

/// Provider customer handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRef {
    pub id: String,
}

/// Request to resolve a priced offering for a community plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureOfferingRequest {
    pub community_id: CommunityId,
    pub plan_id: PlanId,
    pub name: String,
    pub description: Option<String>,
    /// Monthly price.
    pub price: Money,
}

/// Provider product and recurring price handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferingRef {
    pub product_id: String,
    pub price_id: String,
}

/// Request to start a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub customer: CustomerRef,
    pub offering: OfferingRef,
    pub payment_method_id: String,

    /// Tags stored on the provider object (user, community, plan).
    pub metadata: HashMap<String, String>,

    /// Idempotency key so a retried request cannot double-subscribe.
    pub idempotency_key: Option<String>,
}

/// Provider's view of a subscription, already mapped to local status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub cancel_at_period_end: bool,
}

/// Errors from payment provider operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error code for categorization.
    pub code: PaymentErrorCode,

    /// Human-readable message.
    pub message: String,

    /// Provider's error code (if available).
    pub provider_code: Option<String>,

    /// Whether the operation can be retried.
    pub retryable: bool,
}

impl PaymentError {
    /// Create a new payment error.
    pub fn new(code: PaymentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    /// Attach the provider's own error code.
    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderUnavailable, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::ProviderRejected, message)
    }

    pub fn declined(message: impl Into<String>) -> Self {
        Self::new(PaymentErrorCode::PaymentDeclined, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(PaymentErrorCode::NotFound, format!("{} not found", resource))
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PaymentError {}

impl From<PaymentError> for DomainError {
    fn from(err: PaymentError) -> Self {
        let code = match err.code {
            PaymentErrorCode::PaymentDeclined => ErrorCode::PaymentDeclined,
            PaymentErrorCode::ProviderUnavailable => ErrorCode::ProviderUnavailable,
            PaymentErrorCode::ProviderRejected => ErrorCode::ValidationFailed,
            PaymentErrorCode::NotFound => ErrorCode::SubscriptionNotFound,
        };
        DomainError::new(code, err.message)
    }
}

impl From<PaymentError> for SubscriptionError {
    fn from(err: PaymentError) -> Self {
        match err.code {
            PaymentErrorCode::PaymentDeclined => SubscriptionError::PaymentDeclined(err.message),
            PaymentErrorCode::ProviderUnavailable => {
                SubscriptionError::ProviderUnavailable(err.message)
            }
            PaymentErrorCode::ProviderRejected => {
                SubscriptionError::validation("payment", err.message)
            }
            PaymentErrorCode::NotFound => {
                SubscriptionError::not_found("provider subscription", err.message)
            }
        }
    }
}

/// Payment error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorCode {
    /// Network fault, timeout, rate limit or provider 5xx.
    ProviderUnavailable,

    /// Provider refused the request itself (bad amount, bad currency).
    ProviderRejected,

    /// Card or authentication failure on the payment instrument.
    PaymentDeclined,

    /// Referenced provider object does not exist.
    NotFound,
}

impl PaymentErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentErrorCode::ProviderUnavailable)
    }
}

impl std::fmt::Display for PaymentErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentErrorCode::ProviderUnavailable => "provider_unavailable",
            PaymentErrorCode::ProviderRejected => "provider_rejected",
            PaymentErrorCode::PaymentDeclined => "payment_declined",
            PaymentErrorCode::NotFound => "not_found",
        };
        write!(f, "{}", s)
    }
}

/// Configured adapters keyed by provider.
///
/// Injected into the lifecycle handlers so tests can swap in fakes.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own kind.
    pub fn with(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn PaymentProvider>> {
        self.providers.get(&kind).cloned()
    }

    /// Parses a caller-supplied provider name and finds its adapter.
    ///
    /// # Errors
    ///
    /// `Validation` for unknown names and for known providers that are not
    /// configured in this deployment.
    pub fn resolve(
        &self,
        name: &str,
    ) -> Result<(ProviderKind, Arc<dyn PaymentProvider>), SubscriptionError> {
        let kind: ProviderKind = name
            .parse()
            .map_err(|e: crate::domain::foundation::ValidationError| {
                SubscriptionError::validation("provider", e.to_string())
            })?;
        let provider = self.get(kind).ok_or_else(|| {
            SubscriptionError::validation(
                "provider",
                format!("payment provider '{}' is not configured", kind),
            )
        })?;
        Ok((kind, provider))
    }
}
