//! Axum router configuration for subscription endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, create_subscription, get_subscription, handle_webhook,
    list_community_subscriptions, list_my_subscriptions, list_payments, SubscriptionAppState,
};

/// Member and owner endpoints; all read the caller from `X-User-Id`.
///
/// # Routes
/// - `POST /communities/:community_id/subscriptions` - Subscribe to the active plan
/// - `GET /communities/:community_id/subscriptions` - Owner's subscriber list
/// - `GET /me/subscriptions` - Caller's subscriptions
/// - `GET /subscriptions/:id` - One subscription (holder or owner)
/// - `GET /subscriptions/:id/payments` - Payment history (holder or owner)
/// - `POST /subscriptions/:id/cancel` - Cancel now or at period end
pub fn subscription_routes() -> Router<SubscriptionAppState> {
    Router::new()
        .route(
            "/communities/:community_id/subscriptions",
            post(create_subscription).get(list_community_subscriptions),
        )
        .route("/me/subscriptions", get(list_my_subscriptions))
        .route("/subscriptions/:id", get(get_subscription))
        .route("/subscriptions/:id/payments", get(list_payments))
        .route("/subscriptions/:id/cancel", post(cancel_subscription))
}

/// Provider callbacks. No caller identity; the signature authenticates.
///
/// # Routes
/// - `POST /webhooks/:provider` - Raw provider event delivery
pub fn webhook_routes() -> Router<SubscriptionAppState> {
    Router::new().route("/webhooks/:provider", post(handle_webhook))
}

/// Both route groups, ready for `.with_state(...)`.
pub fn subscription_router() -> Router<SubscriptionAppState> {
    subscription_routes().merge(webhook_routes())
}
