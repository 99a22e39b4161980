//! In-memory webhook deduplication ledger.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::ProviderKind;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{SaveResult, WebhookEventRecord, WebhookEventRepository};

/// Ledger held in a map keyed by (provider, event id).
#[derive(Debug, Clone, Default)]
pub struct InMemoryWebhookEventStore {
    records: Arc<RwLock<HashMap<(ProviderKind, String), WebhookEventRecord>>>,
}

impl InMemoryWebhookEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored records
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventStore {
    async fn find_by_event_id(
        &self,
        provider: ProviderKind,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records.get(&(provider, event_id.to_string())).cloned())
    }

    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError> {
        let mut records = self.records.write().await;
        let key = (record.provider, record.event_id.clone());
        match records.get(&key) {
            Some(existing) if existing.result.is_final() => Ok(SaveResult::AlreadyExists),
            Some(_) => {
                records.insert(key, record);
                Ok(SaveResult::Upgraded)
            }
            None => {
                records.insert(key, record);
                Ok(SaveResult::Inserted)
            }
        }
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut records = self.records.write().await;
        let before_count = records.len();
        records.retain(|_, r| !r.processed_at.is_before(&cutoff));
        Ok((before_count - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::EventOutcome;

    fn success(id: &str) -> WebhookEventRecord {
        WebhookEventRecord::success(ProviderKind::Stripe, id, "invoice.paid", serde_json::json!({}))
    }

    fn failed(id: &str) -> WebhookEventRecord {
        WebhookEventRecord::failed(
            ProviderKind::Stripe,
            id,
            "invoice.paid",
            "database unavailable",
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn find_returns_none_for_new_event() {
        let store = InMemoryWebhookEventStore::new();
        assert!(store
            .find_by_event_id(ProviderKind::Stripe, "evt_new")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_success_is_not_overwritten() {
        let store = InMemoryWebhookEventStore::new();
        assert_eq!(store.save(success("evt_1")).await.unwrap(), SaveResult::Inserted);
        assert_eq!(store.save(failed("evt_1")).await.unwrap(), SaveResult::AlreadyExists);

        let found = store
            .find_by_event_id(ProviderKind::Stripe, "evt_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.result, EventOutcome::Success);
    }

    #[tokio::test]
    async fn failed_record_is_upgraded() {
        let store = InMemoryWebhookEventStore::new();
        store.save(failed("evt_2")).await.unwrap();
        assert_eq!(store.save(success("evt_2")).await.unwrap(), SaveResult::Upgraded);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn delete_before_removes_old_records() {
        let store = InMemoryWebhookEventStore::new();
        let mut old = success("evt_old");
        old.processed_at = Timestamp::now().add_days(-60);
        store.save(old).await.unwrap();
        store.save(success("evt_new")).await.unwrap();

        let deleted = store
            .delete_before(Timestamp::now().add_days(-30))
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(store
            .find_by_event_id(ProviderKind::Stripe, "evt_old")
            .await
            .unwrap()
            .is_none());
    }
}
