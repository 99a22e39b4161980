//! PurgeWebhookEventsHandler - Drops dedup ledger rows past retention.
//!
//! Providers stop redelivering after a few days, so old rows only cost space.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::WebhookEventRepository;

pub struct PurgeWebhookEventsHandler {
    ledger: Arc<dyn WebhookEventRepository>,
    retention_days: i64,
}

impl PurgeWebhookEventsHandler {
    pub fn new(ledger: Arc<dyn WebhookEventRepository>, retention_days: i64) -> Self {
        Self {
            ledger,
            retention_days,
        }
    }

    /// Deletes records older than the retention window as of `now`.
    pub async fn handle(&self, now: Timestamp) -> Result<u64, DomainError> {
        let cutoff = now.add_days(-self.retention_days);
        let deleted = self.ledger.delete_before(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, retention_days = self.retention_days, "Purged webhook ledger");
        }
        Ok(deleted)
    }
}
