//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port over the Stripe REST API with
//! form-encoded requests and HTTP basic auth.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key).with_timeout(Duration::from_secs(10));
//! let adapter = StripePaymentAdapter::new(config)?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::domain::billing::{ProviderKind, SubscriptionStatus};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    CreateSubscriptionRequest, CustomerRef, EnsureCustomerRequest, EnsureOfferingRequest,
    OfferingRef, PaymentError, PaymentErrorCode, PaymentProvider, ProviderSubscription,
};

use super::webhook_types::{
    StripeApiError, StripeCustomer, StripeErrorBody, StripeList, StripePrice, StripeProduct,
    StripeSubscription,
};

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    api_base_url: String,

    /// Per-request timeout. A timed-out call is reported as unavailable.
    timeout: Duration,
}

impl StripeConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Stripe payment provider adapter.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentAdapter {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PaymentError::unavailable(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, PaymentError> {
        request
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PaymentError::unavailable("Stripe request timed out")
                } else {
                    PaymentError::unavailable(format!("Stripe request failed: {}", e))
                }
            })
    }

    /// Sends the request and decodes a 2xx body, mapping anything else.
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, PaymentError> {
        let response = self.send(request).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let api_error = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .map(|b| b.error);
            let err = map_api_error(status, api_error.as_ref(), &body);
            tracing::warn!(
                operation,
                status = status.as_u16(),
                code = %err.code,
                provider_code = err.provider_code.as_deref().unwrap_or(""),
                "Stripe API call failed"
            );
            return Err(err);
        }

        response.json::<T>().await.map_err(|e| {
            PaymentError::unavailable(format!("Failed to parse Stripe response: {}", e))
        })
    }

    async fn find_product(
        &self,
        request: &EnsureOfferingRequest,
    ) -> Result<Option<StripeProduct>, PaymentError> {
        let query = format!(
            "metadata['community_id']:'{}' AND metadata['plan_id']:'{}'",
            request.community_id, request.plan_id
        );
        let found: StripeList<StripeProduct> = self
            .call(
                "search_products",
                self.http_client
                    .get(self.url("/v1/products/search"))
                    .query(&[("query", query)]),
            )
            .await?;
        Ok(found.data.into_iter().find(|p| p.active))
    }

    async fn create_product(
        &self,
        request: &EnsureOfferingRequest,
    ) -> Result<StripeProduct, PaymentError> {
        let mut params = vec![
            ("name", request.name.clone()),
            ("metadata[community_id]", request.community_id.to_string()),
            ("metadata[plan_id]", request.plan_id.to_string()),
        ];
        if let Some(description) = request.description.as_ref().filter(|d| !d.is_empty()) {
            params.push(("description", description.clone()));
        }
        self.call(
            "create_product",
            self.http_client.post(self.url("/v1/products")).form(&params),
        )
        .await
    }

    async fn find_monthly_price(
        &self,
        product_id: &str,
        request: &EnsureOfferingRequest,
    ) -> Result<Option<StripePrice>, PaymentError> {
        let prices: StripeList<StripePrice> = self
            .call(
                "list_prices",
                self.http_client.get(self.url("/v1/prices")).query(&[
                    ("product", product_id),
                    ("active", "true"),
                    ("type", "recurring"),
                    ("limit", "100"),
                ]),
            )
            .await?;
        let currency = request.price.currency().to_provider_code();
        Ok(prices
            .data
            .into_iter()
            .find(|p| p.matches_monthly(request.price.amount_minor(), &currency)))
    }

    async fn create_monthly_price(
        &self,
        product_id: &str,
        request: &EnsureOfferingRequest,
    ) -> Result<StripePrice, PaymentError> {
        let params = [
            ("product", product_id.to_string()),
            ("unit_amount", request.price.amount_minor().to_string()),
            ("currency", request.price.currency().to_provider_code()),
            ("recurring[interval]", "month".to_string()),
        ];
        self.call(
            "create_price",
            self.http_client.post(self.url("/v1/prices")).form(&params),
        )
        .await
    }
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    async fn ensure_customer(
        &self,
        request: EnsureCustomerRequest,
    ) -> Result<CustomerRef, PaymentError> {
        let existing: StripeList<StripeCustomer> = self
            .call(
                "list_customers",
                self.http_client
                    .get(self.url("/v1/customers"))
                    .query(&[("email", request.email.as_str()), ("limit", "1")]),
            )
            .await?;

        if let Some(customer) = existing.data.into_iter().find(|c| !c.deleted) {
            return Ok(CustomerRef { id: customer.id });
        }

        let mut params = vec![
            ("email", request.email.clone()),
            ("metadata[user_id]", request.user_id.to_string()),
        ];
        if let Some(name) = &request.display_name {
            params.push(("name", name.clone()));
        }

        let customer: StripeCustomer = self
            .call(
                "create_customer",
                self.http_client.post(self.url("/v1/customers")).form(&params),
            )
            .await?;

        tracing::info!(customer_id = %customer.id, user_id = %request.user_id, "Created Stripe customer");
        Ok(CustomerRef { id: customer.id })
    }

    async fn ensure_priced_offering(
        &self,
        request: EnsureOfferingRequest,
    ) -> Result<OfferingRef, PaymentError> {
        let product = match self.find_product(&request).await? {
            Some(product) => product,
            None => self.create_product(&request).await?,
        };

        let price = match self.find_monthly_price(&product.id, &request).await? {
            Some(price) => price,
            None => self.create_monthly_price(&product.id, &request).await?,
        };

        Ok(OfferingRef {
            product_id: product.id,
            price_id: price.id,
        })
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ProviderSubscription, PaymentError> {
        let customer_id = request.customer.id.as_str();
        let payment_method_id = payment_method_ref(&request.payment_method_id)?;

        let _attached: serde_json::Value = self
            .call(
                "attach_payment_method",
                self.http_client
                    .post(self.url(&format!(
                        "/v1/payment_methods/{}/attach",
                        payment_method_id
                    )))
                    .form(&[("customer", customer_id)]),
            )
            .await?;

        let _customer: StripeCustomer = self
            .call(
                "set_default_payment_method",
                self.http_client
                    .post(self.url(&format!("/v1/customers/{}", customer_id)))
                    .form(&[(
                        "invoice_settings[default_payment_method]",
                        payment_method_id,
                    )]),
            )
            .await?;

        let mut builder = self
            .http_client
            .post(self.url("/v1/subscriptions"))
            .form(&subscription_form(&request));
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let subscription: StripeSubscription = self.call("create_subscription", builder).await?;
        to_provider_subscription(subscription)
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, PaymentError> {
        let url = self.url(&format!("/v1/subscriptions/{}", provider_subscription_id));

        let builder = if at_period_end {
            self.http_client
                .post(&url)
                .form(&[("cancel_at_period_end", "true")])
        } else {
            self.http_client.delete(&url)
        };

        let subscription: StripeSubscription = self.call("cancel_subscription", builder).await?;
        to_provider_subscription(subscription)
    }
}

/// Checks a payment method id before it is placed in a URL path.
fn payment_method_ref(id: &str) -> Result<&str, PaymentError> {
    let well_formed = id.len() > 3
        && id.starts_with("pm_")
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if !well_formed {
        return Err(PaymentError::rejected(
            "payment_method_id must look like pm_ followed by letters and digits",
        ));
    }
    Ok(id)
}

/// Form body for `POST /v1/subscriptions`.
///
/// `error_if_incomplete` makes a declined first charge fail the request
/// instead of leaving an incomplete subscription behind.
fn subscription_form(request: &CreateSubscriptionRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("customer".to_string(), request.customer.id.clone()),
        (
            "items[0][price]".to_string(),
            request.offering.price_id.clone(),
        ),
        (
            "payment_behavior".to_string(),
            "error_if_incomplete".to_string(),
        ),
    ];
    for (key, value) in &request.metadata {
        params.push((format!("metadata[{}]", key), value.clone()));
    }
    params
}

fn to_provider_subscription(sub: StripeSubscription) -> Result<ProviderSubscription, PaymentError> {
    let status = SubscriptionStatus::from_provider(&sub.status).ok_or_else(|| {
        PaymentError::rejected(format!("Unsupported subscription status '{}'", sub.status))
    })?;
    let period = |secs: i64| {
        Timestamp::from_unix_secs(secs)
            .ok_or_else(|| PaymentError::rejected(format!("Invalid period timestamp {}", secs)))
    };
    Ok(ProviderSubscription {
        status,
        current_period_start: period(sub.current_period_start)?,
        current_period_end: period(sub.current_period_end)?,
        cancel_at_period_end: sub.cancel_at_period_end,
        id: sub.id,
    })
}

/// Classifies a non-2xx Stripe response.
fn map_api_error(status: StatusCode, api_error: Option<&StripeApiError>, raw: &str) -> PaymentError {
    let message = api_error
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| format!("Stripe API error {}: {}", status.as_u16(), raw));

    let is_card_error = api_error.is_some_and(|e| e.error_type == "card_error");

    let code = if status == StatusCode::PAYMENT_REQUIRED || is_card_error {
        PaymentErrorCode::PaymentDeclined
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        PaymentErrorCode::ProviderUnavailable
    } else if status == StatusCode::NOT_FOUND {
        PaymentErrorCode::NotFound
    } else {
        PaymentErrorCode::ProviderRejected
    };

    let mut err = PaymentError::new(code, message);
    if let Some(provider_code) = api_error.and_then(|e| e.decline_code.clone().or_else(|| e.code.clone())) {
        err = err.with_provider_code(provider_code);
    }
    err
}
