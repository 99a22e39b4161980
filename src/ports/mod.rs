//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Provider Ports
//!
//! - `PaymentProvider` - Customer, offering and subscription calls
//! - `WebhookNormalizer` - Per-provider webhook verification and parsing
//!
//! ## Storage Ports
//!
//! - `SubscriptionRepository` - Subscription and payment writes
//! - `SubscriptionReader` - Paginated read models
//! - `WebhookEventRepository` - Webhook deduplication ledger
//!
//! ## Collaborator Ports
//!
//! - `CommunityDirectory` - Plans, ownership and member profiles

mod community_directory;
mod payment_provider;
mod subscription_reader;
mod subscription_repository;
mod webhook_event_repository;
mod webhook_normalizer;

pub use community_directory::{CommunityDirectory, MemberProfile};
pub use payment_provider::{
    CreateSubscriptionRequest, CustomerRef, EnsureCustomerRequest, EnsureOfferingRequest,
    OfferingRef, PaymentError, PaymentErrorCode, PaymentProvider, ProviderRegistry,
    ProviderSubscription,
};
pub use subscription_reader::{
    Page, PageRequest, PaymentView, SubscriptionReader, SubscriptionView, DEFAULT_PER_PAGE,
    MAX_PER_PAGE,
};
pub use subscription_repository::{PaymentInsert, SubscriptionRepository};
pub use webhook_event_repository::{
    EventOutcome, SaveResult, WebhookEventRecord, WebhookEventRepository,
};
pub use webhook_normalizer::{NormalizerRegistry, WebhookNormalizer};
