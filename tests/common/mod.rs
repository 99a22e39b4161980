//! Shared fixtures for integration tests.
//!
//! Wires the real handlers to in-memory stores, the scriptable mock provider
//! and the real Stripe webhook normalizer.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::{json, Value};
use sha2::Sha256;

use community_support::adapters::http::SubscriptionAppState;
use community_support::adapters::memory::{
    InMemoryCommunityDirectory, InMemorySubscriptionStore, InMemoryWebhookEventStore,
};
use community_support::adapters::stripe::{MockPaymentProvider, StripeWebhookNormalizer};
use community_support::application::handlers::HandlePaymentWebhookCommand;
use community_support::application::PersistRetry;
use community_support::domain::billing::SupportPlan;
use community_support::domain::foundation::{CommunityId, Money, PlanId, Timestamp, UserId};
use community_support::ports::{MemberProfile, NormalizerRegistry, ProviderRegistry};

pub const WEBHOOK_SECRET: &str = "whsec_integration_secret";
pub const OWNER: i64 = 99;
pub const COMMUNITY: i64 = 1;
pub const PLAN: i64 = 10;

pub struct Harness {
    pub store: InMemorySubscriptionStore,
    pub directory: InMemoryCommunityDirectory,
    pub ledger: InMemoryWebhookEventStore,
    pub provider: MockPaymentProvider,
    pub state: SubscriptionAppState,
}

impl Harness {
    /// Community 1 owned by user 99, with a 999 USD monthly plan and
    /// members 3 and 4.
    pub async fn new() -> Self {
        let store = InMemorySubscriptionStore::new();
        let directory = InMemoryCommunityDirectory::new();
        let ledger = InMemoryWebhookEventStore::new();
        let provider = MockPaymentProvider::new();

        directory
            .add_community(community(), UserId::new(OWNER).unwrap())
            .await;
        directory
            .add_plan(SupportPlan {
                id: PlanId::new(PLAN).unwrap(),
                community_id: community(),
                name: "Supporter".to_string(),
                description: None,
                price: Money::from_parts(999, "USD").unwrap(),
                benefits: Some("Name in the credits".to_string()),
                is_active: true,
            })
            .await;
        for id in [3, 4] {
            directory
                .add_member(MemberProfile {
                    user_id: UserId::new(id).unwrap(),
                    email: format!("member{}@example.com", id),
                    display_name: None,
                })
                .await;
        }

        let normalizer = StripeWebhookNormalizer::new(SecretString::new(WEBHOOK_SECRET.to_string()));
        let state = SubscriptionAppState {
            repository: Arc::new(store.clone()),
            reader: Arc::new(store.clone()),
            directory: Arc::new(directory.clone()),
            ledger: Arc::new(ledger.clone()),
            providers: ProviderRegistry::new().with(Arc::new(provider.clone())),
            normalizers: NormalizerRegistry::new().with(Arc::new(normalizer)),
            retry: PersistRetry::new(3, Duration::ZERO),
        };

        Self {
            store,
            directory,
            ledger,
            provider,
            state,
        }
    }

    /// A signed delivery of `event` to the Stripe webhook pipeline.
    pub fn delivery(&self, event: &Value) -> HandlePaymentWebhookCommand {
        let payload = event.to_string();
        HandlePaymentWebhookCommand {
            provider: "stripe".to_string(),
            signature: sign(&payload),
            payload: payload.into_bytes(),
        }
    }
}

pub fn user(id: i64) -> UserId {
    UserId::new(id).unwrap()
}

pub fn community() -> CommunityId {
    CommunityId::new(COMMUNITY).unwrap()
}

/// `Stripe-Signature` header value for `payload`, signed now.
pub fn sign(payload: &str) -> String {
    let timestamp = Timestamp::now().as_unix_secs();
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

fn envelope(event_id: &str, event_type: &str, object: Value) -> Value {
    envelope_at(event_id, event_type, Timestamp::now().as_unix_secs(), object)
}

fn envelope_at(event_id: &str, event_type: &str, created: i64, object: Value) -> Value {
    json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "created": created,
        "livemode": false,
        "data": { "object": object }
    })
}

/// `invoice.payment_succeeded` or `invoice.payment_failed` for `sub_id`,
/// settled without a charge object.
pub fn invoice_event(event_id: &str, invoice_id: &str, sub_id: &str, paid: bool) -> Value {
    invoice_attempt(event_id, invoice_id, None, sub_id, paid)
}

/// An invoice event reporting the attempt made with `charge`.
pub fn invoice_attempt(
    event_id: &str,
    invoice_id: &str,
    charge: Option<&str>,
    sub_id: &str,
    paid: bool,
) -> Value {
    let start = Timestamp::now().as_unix_secs();
    let end = start + 30 * 24 * 3600;
    let event_type = if paid {
        "invoice.payment_succeeded"
    } else {
        "invoice.payment_failed"
    };
    envelope(
        event_id,
        event_type,
        json!({
            "id": invoice_id,
            "object": "invoice",
            "customer": "cus_1",
            "subscription": sub_id,
            "charge": charge,
            "status": if paid { "paid" } else { "open" },
            "amount_paid": if paid { 999 } else { 0 },
            "amount_due": 999,
            "currency": "usd",
            "lines": { "data": [ { "id": "il_1", "period": { "start": start, "end": end } } ] }
        }),
    )
}

/// `customer.subscription.updated` with the given status and flag.
pub fn subscription_updated(
    event_id: &str,
    sub_id: &str,
    status: &str,
    cancel_at_period_end: bool,
) -> Value {
    let now = Timestamp::now().as_unix_secs();
    subscription_updated_at(event_id, sub_id, status, cancel_at_period_end, now, now)
}

/// `customer.subscription.updated` emitted at `created` for a period
/// starting at `period_start`.
pub fn subscription_updated_at(
    event_id: &str,
    sub_id: &str,
    status: &str,
    cancel_at_period_end: bool,
    created: i64,
    period_start: i64,
) -> Value {
    let start = period_start;
    envelope_at(
        event_id,
        "customer.subscription.updated",
        created,
        json!({
            "id": sub_id,
            "object": "subscription",
            "customer": "cus_1",
            "status": status,
            "current_period_start": start,
            "current_period_end": start + 30 * 24 * 3600,
            "cancel_at_period_end": cancel_at_period_end,
            "canceled_at": null,
            "metadata": {}
        }),
    )
}

pub fn subscription_deleted(event_id: &str, sub_id: &str) -> Value {
    let start = Timestamp::now().as_unix_secs();
    envelope(
        event_id,
        "customer.subscription.deleted",
        json!({
            "id": sub_id,
            "object": "subscription",
            "customer": "cus_1",
            "status": "canceled",
            "current_period_start": start,
            "current_period_end": start + 30 * 24 * 3600,
            "cancel_at_period_end": false,
            "canceled_at": start,
            "metadata": {}
        }),
    )
}
