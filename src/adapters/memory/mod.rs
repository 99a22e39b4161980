//! In-memory adapters.
//!
//! Same constraint semantics as the PostgreSQL adapters, minus durability.

mod community_directory;
mod subscription_store;
mod webhook_event_store;

pub use community_directory::InMemoryCommunityDirectory;
pub use subscription_store::InMemorySubscriptionStore;
pub use webhook_event_store::InMemoryWebhookEventStore;
