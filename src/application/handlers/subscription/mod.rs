//! Subscription handlers.
//!
//! ## Commands
//! - Subscribing to a community plan
//! - Cancelling (now or at period end)
//! - Applying provider events and ingesting provider webhooks
//! - Purging the webhook ledger
//!
//! ## Queries
//! - Get one subscription
//! - List the caller's or a community's subscriptions
//! - List a subscription's payments

mod apply_provider_event;
mod cancel_subscription;
mod create_subscription;
mod get_subscription;
mod handle_payment_webhook;
mod list_payments;
mod list_subscriptions;
mod purge_webhook_events;
mod retry;

pub use retry::PersistRetry;

// Commands
pub use apply_provider_event::{ApplyOutcome, ApplyProviderEventHandler};
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use create_subscription::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
};
pub use handle_payment_webhook::{
    HandlePaymentWebhookCommand, HandlePaymentWebhookHandler, HandlePaymentWebhookResult,
};
pub use purge_webhook_events::PurgeWebhookEventsHandler;

// Queries
pub use get_subscription::{GetSubscriptionHandler, GetSubscriptionQuery};
pub use list_payments::{ListPaymentsHandler, ListPaymentsQuery};
pub use list_subscriptions::{
    ListCommunitySubscriptionsHandler, ListCommunitySubscriptionsQuery,
    ListMySubscriptionsHandler, ListMySubscriptionsQuery,
};
