//! HTTP handlers for subscription endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Json, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::handlers::{
    ApplyProviderEventHandler, CancelSubscriptionCommand, CancelSubscriptionHandler,
    CreateSubscriptionCommand, CreateSubscriptionHandler, GetSubscriptionHandler,
    GetSubscriptionQuery, HandlePaymentWebhookCommand, HandlePaymentWebhookHandler,
    ListCommunitySubscriptionsHandler, ListCommunitySubscriptionsQuery,
    ListMySubscriptionsHandler, ListMySubscriptionsQuery, ListPaymentsHandler, ListPaymentsQuery,
    PersistRetry,
};
use crate::domain::billing::{SubscriptionError, WebhookError};
use crate::domain::foundation::{CommunityId, SubscriptionId, UserId};
use crate::ports::{
    CommunityDirectory, NormalizerRegistry, ProviderRegistry, SubscriptionReader,
    SubscriptionRepository, SubscriptionView, WebhookEventRepository,
};

use super::dto::{
    CancelSubscriptionRequest, CreateSubscriptionRequest, ErrorResponse, PageResponse,
    PaginationParams, PaymentResponse, SubscriptionResponse, WebhookAckResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared dependencies; handlers are built per request from these.
#[derive(Clone)]
pub struct SubscriptionAppState {
    pub repository: Arc<dyn SubscriptionRepository>,
    pub reader: Arc<dyn SubscriptionReader>,
    pub directory: Arc<dyn CommunityDirectory>,
    pub ledger: Arc<dyn WebhookEventRepository>,
    pub providers: ProviderRegistry,
    pub normalizers: NormalizerRegistry,
    pub retry: PersistRetry,
}

impl SubscriptionAppState {
    pub fn create_handler(&self) -> CreateSubscriptionHandler {
        CreateSubscriptionHandler::new(
            self.repository.clone(),
            self.directory.clone(),
            self.providers.clone(),
        )
        .with_retry(self.retry)
    }

    pub fn cancel_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(self.repository.clone(), self.providers.clone())
            .with_retry(self.retry)
    }

    pub fn get_handler(&self) -> GetSubscriptionHandler {
        GetSubscriptionHandler::new(self.reader.clone(), self.directory.clone())
    }

    pub fn list_mine_handler(&self) -> ListMySubscriptionsHandler {
        ListMySubscriptionsHandler::new(self.reader.clone())
    }

    pub fn list_community_handler(&self) -> ListCommunitySubscriptionsHandler {
        ListCommunitySubscriptionsHandler::new(self.reader.clone(), self.directory.clone())
    }

    pub fn payments_handler(&self) -> ListPaymentsHandler {
        ListPaymentsHandler::new(self.reader.clone(), self.directory.clone())
    }

    pub fn webhook_handler(&self) -> HandlePaymentWebhookHandler {
        let apply = ApplyProviderEventHandler::new(self.repository.clone()).with_retry(self.retry);
        HandlePaymentWebhookHandler::new(
            self.normalizers.clone(),
            self.ledger.clone(),
            Arc::new(apply),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Caller identity
// ════════════════════════════════════════════════════════════════════════════════

/// Caller identity set by the authenticating gateway in front of this service.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::from_str(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

fn parse_path<T: FromStr>(field: &str, raw: &str) -> Result<T, SubscriptionError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| SubscriptionError::validation(field, e.to_string()))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /communities/:community_id/subscriptions
pub async fn create_subscription(
    State(state): State<SubscriptionAppState>,
    user: AuthenticatedUser,
    Path(community_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let community_id: CommunityId = parse_path("community_id", &community_id)?;
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = CreateSubscriptionCommand {
        user_id: user.user_id,
        community_id,
        payment_method_id: request.payment_method_id,
        provider: request.provider,
        idempotency_key,
    };
    let result = state.create_handler().handle(cmd).await?;

    let response = SubscriptionResponse::from(SubscriptionView::from(result.subscription));
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /subscriptions/:id/cancel
///
/// An empty body cancels at period end.
pub async fn cancel_subscription(
    State(state): State<SubscriptionAppState>,
    user: AuthenticatedUser,
    Path(subscription_id): Path<String>,
    request: Option<Json<CancelSubscriptionRequest>>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let subscription_id: SubscriptionId = parse_path("subscription_id", &subscription_id)?;
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let cmd = CancelSubscriptionCommand {
        user_id: user.user_id,
        subscription_id,
        cancel_at_period_end: request.cancel_at_period_end,
    };
    let result = state.cancel_handler().handle(cmd).await?;

    Ok(Json(SubscriptionResponse::from(SubscriptionView::from(
        result.subscription,
    ))))
}

/// POST /webhooks/:provider
///
/// Takes the raw body; the signature covers the exact bytes sent.
pub async fn handle_webhook(
    State(state): State<SubscriptionAppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let handler = state.webhook_handler();
    let header = handler.signature_header(&provider)?;
    let signature = headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::InvalidSignature)?;

    let cmd = HandlePaymentWebhookCommand {
        provider,
        payload: body.to_vec(),
        signature: signature.to_string(),
    };
    let result = handler.handle(cmd).await?;

    Ok((StatusCode::OK, Json(WebhookAckResponse::from(&result))))
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /subscriptions/:id
pub async fn get_subscription(
    State(state): State<SubscriptionAppState>,
    user: AuthenticatedUser,
    Path(subscription_id): Path<String>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let query = GetSubscriptionQuery {
        user_id: user.user_id,
        subscription_id: parse_path("subscription_id", &subscription_id)?,
    };
    let view = state.get_handler().handle(query).await?;
    Ok(Json(SubscriptionResponse::from(view)))
}

/// GET /subscriptions/:id/payments
pub async fn list_payments(
    State(state): State<SubscriptionAppState>,
    user: AuthenticatedUser,
    Path(subscription_id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let query = ListPaymentsQuery {
        user_id: user.user_id,
        subscription_id: parse_path("subscription_id", &subscription_id)?,
        page: params.into(),
    };
    let page = state.payments_handler().handle(query).await?;
    Ok(Json(PageResponse::<PaymentResponse>::from(page)))
}

/// GET /me/subscriptions
pub async fn list_my_subscriptions(
    State(state): State<SubscriptionAppState>,
    user: AuthenticatedUser,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let query = ListMySubscriptionsQuery {
        user_id: user.user_id,
        page: params.into(),
    };
    let page = state.list_mine_handler().handle(query).await?;
    Ok(Json(PageResponse::<SubscriptionResponse>::from(page)))
}

/// GET /communities/:community_id/subscriptions
pub async fn list_community_subscriptions(
    State(state): State<SubscriptionAppState>,
    user: AuthenticatedUser,
    Path(community_id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, SubscriptionApiError> {
    let query = ListCommunitySubscriptionsQuery {
        user_id: user.user_id,
        community_id: parse_path("community_id", &community_id)?,
        page: params.into(),
    };
    let page = state.list_community_handler().handle(query).await?;
    Ok(Json(PageResponse::<SubscriptionResponse>::from(page)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts lifecycle errors to HTTP responses.
#[derive(Debug)]
pub struct SubscriptionApiError(SubscriptionError);

impl From<SubscriptionError> for SubscriptionApiError {
    fn from(err: SubscriptionError) -> Self {
        Self(err)
    }
}

impl SubscriptionApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SubscriptionError::Validation { .. } => StatusCode::BAD_REQUEST,
            SubscriptionError::Unauthorized(_) => StatusCode::FORBIDDEN,
            SubscriptionError::NotFound { .. } => StatusCode::NOT_FOUND,
            SubscriptionError::AlreadySubscribed(_) | SubscriptionError::AlreadyCanceled(_) => {
                StatusCode::CONFLICT
            }
            SubscriptionError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            SubscriptionError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SubscriptionError::InvalidSignature => StatusCode::UNAUTHORIZED,
            SubscriptionError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SubscriptionApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self.0, "Subscription request failed");
        }
        let body = ErrorResponse::new(self.0.code().to_string(), self.0.message());
        (status, Json(body)).into_response()
    }
}

/// Webhook rejection; per-event failures never reach this type.
#[derive(Debug)]
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        tracing::warn!(status = status.as_u16(), error = %self.0, "Webhook delivery rejected");
        let code = match status {
            StatusCode::UNAUTHORIZED => "INVALID_WEBHOOK_SIGNATURE",
            StatusCode::NOT_FOUND => "UNKNOWN_PROVIDER",
            StatusCode::BAD_REQUEST => "INVALID_PAYLOAD",
            _ => "WEBHOOK_FAILED",
        };
        (status, Json(ErrorResponse::new(code, self.0.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_map_to_statuses() {
        let cases = [
            (SubscriptionError::validation("provider", "bad"), StatusCode::BAD_REQUEST),
            (SubscriptionError::unauthorized("no"), StatusCode::FORBIDDEN),
            (SubscriptionError::not_found("plan", 1), StatusCode::NOT_FOUND),
            (
                SubscriptionError::AlreadySubscribed("dup".into()),
                StatusCode::CONFLICT,
            ),
            (
                SubscriptionError::already_canceled(SubscriptionId::new()),
                StatusCode::CONFLICT,
            ),
            (
                SubscriptionError::PaymentDeclined("card_declined".into()),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                SubscriptionError::ProviderUnavailable("timeout".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (SubscriptionError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (
                SubscriptionError::infrastructure("db"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(SubscriptionApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn malformed_path_id_is_a_validation_error() {
        let err = parse_path::<SubscriptionId>("subscription_id", "not-a-uuid").unwrap_err();
        assert!(matches!(err, SubscriptionError::Validation { .. }));

        let err = parse_path::<CommunityId>("community_id", "-4").unwrap_err();
        assert!(matches!(err, SubscriptionError::Validation { .. }));
    }
}
