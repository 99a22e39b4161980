//! HTTP adapter for community support subscriptions.
//!
//! - `POST /communities/:community_id/subscriptions` - Subscribe
//! - `POST /subscriptions/:id/cancel` - Cancel
//! - `GET /subscriptions/:id`, `GET /subscriptions/:id/payments` - Details and history
//! - `GET /me/subscriptions`, `GET /communities/:community_id/subscriptions` - Lists
//! - `POST /webhooks/:provider` - Provider webhooks

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{AuthenticatedUser, SubscriptionApiError, SubscriptionAppState, WebhookApiError};
pub use routes::subscription_router;
