//! HTTP adapters - REST API implementations.
//!
//! `app` assembles the full service: subscription routes, provider webhooks,
//! a health check, and the tracing and timeout layers.

pub mod subscription;

use std::time::Duration;

use axum::{routing::get, Json, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use subscription::{subscription_router, SubscriptionAppState};

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Builds the application router with shared state and middleware applied.
pub fn app(state: SubscriptionAppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(subscription_router())
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
