//! PostgreSQL adapters - Database implementations for store ports.
//!
//! - `PostgresSubscriptionRepository` - Versioned subscription and payment writes
//! - `PostgresSubscriptionReader` - Paginated read models
//! - `PostgresWebhookEventRepository` - Webhook deduplication ledger
//! - `PostgresCommunityDirectory` - Plans, ownership and member profiles
//!
//! The schema lives in `migrations/` and is applied at startup.

mod community_directory;
mod subscription_reader;
mod subscription_repository;
mod webhook_event_repository;

pub use community_directory::PostgresCommunityDirectory;
pub use subscription_reader::PostgresSubscriptionReader;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;
