//! HTTP DTOs for subscription endpoints.
//!
//! JSON bodies are camelCase; timestamps are RFC 3339 strings.

use serde::{Deserialize, Serialize};

use crate::application::handlers::HandlePaymentWebhookResult;
use crate::ports::{Page, PageRequest, PaymentView, SubscriptionView};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start supporting a community.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    /// Provider-side payment method token, e.g. `pm_...`.
    pub payment_method_id: String,
    /// Provider name, e.g. `stripe`.
    pub provider: String,
}

/// Request to cancel a subscription.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionRequest {
    #[serde(default = "default_cancel_at_period_end")]
    pub cancel_at_period_end: bool,
}

impl Default for CancelSubscriptionRequest {
    fn default() -> Self {
        Self {
            cancel_at_period_end: default_cancel_at_period_end(),
        }
    }
}

fn default_cancel_at_period_end() -> bool {
    true
}

/// `?page=&per_page=` on list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    #[serde(alias = "perPage")]
    pub per_page: Option<u32>,
}

impl From<PaginationParams> for PageRequest {
    fn from(params: PaginationParams) -> Self {
        PageRequest::new(params.page, params.per_page)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: String,
    pub user_id: i64,
    pub community_id: i64,
    pub plan_id: i64,
    pub status: String,
    pub current_period_start: String,
    pub current_period_end: String,
    pub provider: String,
    pub provider_subscription_id: Option<String>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<SubscriptionView> for SubscriptionResponse {
    fn from(view: SubscriptionView) -> Self {
        Self {
            id: view.id.to_string(),
            user_id: view.user_id.value(),
            community_id: view.community_id.value(),
            plan_id: view.plan_id.value(),
            status: view.status.as_str().to_string(),
            current_period_start: view.current_period_start.as_datetime().to_rfc3339(),
            current_period_end: view.current_period_end.as_datetime().to_rfc3339(),
            provider: view.provider.as_str().to_string(),
            provider_subscription_id: view.provider_subscription_id,
            cancel_at_period_end: view.cancel_at_period_end,
            canceled_at: view.canceled_at.map(|t| t.as_datetime().to_rfc3339()),
            created_at: view.created_at.as_datetime().to_rfc3339(),
            updated_at: view.updated_at.as_datetime().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: String,
    pub subscription_id: String,
    /// Minor currency units, e.g. cents.
    pub amount: i64,
    pub currency: String,
    pub payment_method_kind: String,
    pub provider: String,
    pub provider_transaction_id: String,
    pub status: String,
    pub period_start: String,
    pub period_end: String,
    pub created_at: String,
}

impl From<PaymentView> for PaymentResponse {
    fn from(view: PaymentView) -> Self {
        Self {
            id: view.id.to_string(),
            subscription_id: view.subscription_id.to_string(),
            amount: view.amount_minor,
            currency: view.currency,
            payment_method_kind: view.payment_method_kind,
            provider: view.provider.as_str().to_string(),
            provider_transaction_id: view.provider_transaction_id,
            status: view.status.as_str().to_string(),
            period_start: view.period_start.as_datetime().to_rfc3339(),
            period_end: view.period_end.as_datetime().to_rfc3339(),
            created_at: view.created_at.as_datetime().to_rfc3339(),
        }
    }
}

/// Paged list envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<V, T: From<V>> From<Page<V>> for PageResponse<T> {
    fn from(page: Page<V>) -> Self {
        let page = page.map(T::from);
        Self {
            items: page.items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        }
    }
}

/// Acknowledgment body for webhook deliveries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAckResponse {
    pub received: bool,
    pub event_id: String,
    /// `processed`, `duplicate`, `ignored` or `failed`.
    pub outcome: &'static str,
}

impl From<&HandlePaymentWebhookResult> for WebhookAckResponse {
    fn from(result: &HandlePaymentWebhookResult) -> Self {
        let (event_id, outcome) = match result {
            HandlePaymentWebhookResult::Processed { event_id, .. } => (event_id, "processed"),
            HandlePaymentWebhookResult::Duplicate { event_id } => (event_id, "duplicate"),
            HandlePaymentWebhookResult::Ignored { event_id, .. } => (event_id, "ignored"),
            HandlePaymentWebhookResult::Failed { event_id, .. } => (event_id, "failed"),
        };
        Self {
            received: true,
            event_id: event_id.clone(),
            outcome,
        }
    }
}

/// Error body shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_request_defaults_to_period_end() {
        let request: CancelSubscriptionRequest = serde_json::from_str("{}").unwrap();
        assert!(request.cancel_at_period_end);

        let request: CancelSubscriptionRequest =
            serde_json::from_str(r#"{"cancelAtPeriodEnd": false}"#).unwrap();
        assert!(!request.cancel_at_period_end);
    }

    #[test]
    fn create_request_reads_camel_case() {
        let request: CreateSubscriptionRequest =
            serde_json::from_str(r#"{"paymentMethodId": "pm_1", "provider": "stripe"}"#).unwrap();
        assert_eq!(request.payment_method_id, "pm_1");
        assert_eq!(request.provider, "stripe");
    }

    #[test]
    fn pagination_params_become_clamped_page_request() {
        let request: PageRequest = PaginationParams {
            page: Some(0),
            per_page: Some(500),
        }
        .into();
        assert_eq!(request.page(), 1);
        assert_eq!(request.per_page(), crate::ports::MAX_PER_PAGE);
    }

    #[test]
    fn webhook_ack_reports_outcome() {
        let ack = WebhookAckResponse::from(&HandlePaymentWebhookResult::Duplicate {
            event_id: "evt_1".to_string(),
        });
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["eventId"], "evt_1");
        assert_eq!(json["outcome"], "duplicate");
        assert_eq!(json["received"], true);
    }
}
