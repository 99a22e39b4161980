//! PostgreSQL implementation of WebhookEventRepository.
//!
//! `save` is a single upsert keyed on (provider, event_id). The conflict
//! branch only fires over a `failed` row, so a final outcome is never
//! overwritten even when two deliveries of one event race.

use crate::domain::billing::ProviderKind;
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{SaveResult, WebhookEventRecord, WebhookEventRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::subscription_repository::stored;

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    provider: String,
    event_id: String,
    event_type: String,
    processed_at: DateTime<Utc>,
    result: String,
    error_message: Option<String>,
    payload: serde_json::Value,
}

impl TryFrom<WebhookEventRow> for WebhookEventRecord {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        Ok(WebhookEventRecord {
            provider: stored("provider", row.provider.parse())?,
            event_id: row.event_id,
            event_type: row.event_type,
            processed_at: Timestamp::from_datetime(row.processed_at),
            result: stored("result", row.result.parse())?,
            error_message: row.error_message,
            payload: row.payload,
        })
    }
}

/// `xmax = 0` holds only for a freshly inserted tuple.
fn save_result(written: Option<bool>) -> SaveResult {
    match written {
        Some(true) => SaveResult::Inserted,
        Some(false) => SaveResult::Upgraded,
        None => SaveResult::AlreadyExists,
    }
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn find_by_event_id(
        &self,
        provider: ProviderKind,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(
            r#"
            SELECT provider, event_id, event_type, processed_at, result, error_message, payload
            FROM webhook_events
            WHERE provider = $1 AND event_id = $2
            "#,
        )
        .bind(provider.as_str())
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find webhook event: {}", e)))?;

        row.map(WebhookEventRecord::try_from).transpose()
    }

    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError> {
        let written: Option<bool> = sqlx::query_scalar(
            r#"
            INSERT INTO webhook_events (
                provider, event_id, event_type, processed_at, result, error_message, payload
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (provider, event_id) DO UPDATE SET
                event_type = EXCLUDED.event_type,
                processed_at = EXCLUDED.processed_at,
                result = EXCLUDED.result,
                error_message = EXCLUDED.error_message,
                payload = EXCLUDED.payload
            WHERE webhook_events.result = 'failed'
            RETURNING (xmax = 0)
            "#,
        )
        .bind(record.provider.as_str())
        .bind(&record.event_id)
        .bind(&record.event_type)
        .bind(record.processed_at.as_datetime())
        .bind(record.result.as_str())
        .bind(&record.error_message)
        .bind(&record.payload)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to save webhook event: {}", e)))?;

        Ok(save_result(written))
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE processed_at < $1")
            .bind(cutoff.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::database(format!("Failed to purge webhook events: {}", e))
            })?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;
    use crate::ports::EventOutcome;

    #[test]
    fn upsert_outcomes_map_to_save_results() {
        assert_eq!(save_result(Some(true)), SaveResult::Inserted);
        assert_eq!(save_result(Some(false)), SaveResult::Upgraded);
        assert_eq!(save_result(None), SaveResult::AlreadyExists);
    }

    #[test]
    fn row_converts_to_record() {
        let record = WebhookEventRecord::try_from(WebhookEventRow {
            provider: "stripe".to_string(),
            event_id: "evt_1".to_string(),
            event_type: "invoice.paid".to_string(),
            processed_at: Utc::now(),
            result: "ignored".to_string(),
            error_message: Some("Unhandled event type".to_string()),
            payload: serde_json::json!({"id": "evt_1"}),
        })
        .unwrap();
        assert_eq!(record.provider, ProviderKind::Stripe);
        assert_eq!(record.result, EventOutcome::Ignored);
    }

    #[test]
    fn unknown_stored_result_is_a_database_error() {
        let err = WebhookEventRecord::try_from(WebhookEventRow {
            provider: "stripe".to_string(),
            event_id: "evt_1".to_string(),
            event_type: "invoice.paid".to_string(),
            processed_at: Utc::now(),
            result: "pending".to_string(),
            error_message: None,
            payload: serde_json::Value::Null,
        })
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }
}
