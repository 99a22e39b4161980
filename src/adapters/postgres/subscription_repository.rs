//! PostgreSQL implementation of SubscriptionRepository.
//!
//! The live-pair and provider-key rules are unique indexes, so two racing
//! inserts are settled by the database rather than by a read-then-write.

use crate::domain::billing::{Payment, ProviderKind, Subscription};
use crate::domain::foundation::{
    CommunityId, DomainError, ErrorCode, PlanId, SubscriptionId, Timestamp, UserId,
};
use crate::ports::{PaymentInsert, SubscriptionRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::fmt::Display;
use uuid::Uuid;

const LIVE_PAIR_INDEX: &str = "subscriptions_live_pair_key";
const PROVIDER_REF_KEY: &str = "subscriptions_provider_ref_key";

pub(super) const SUBSCRIPTION_COLUMNS: &str = "id, user_id, community_id, plan_id, status, \
     current_period_start, current_period_end, provider, provider_subscription_id, \
     cancel_at_period_end, canceled_at, provider_synced_at, created_at, updated_at, version";

/// PostgreSQL implementation of the SubscriptionRepository port.
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: &SubscriptionId) -> Result<bool, DomainError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM subscriptions WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to check subscription: {}", e)))
    }

    /// Turns a zero-row compare-and-set into the matching error.
    async fn stale_write(&self, id: &SubscriptionId) -> DomainError {
        match self.exists(id).await {
            Ok(true) => DomainError::new(
                ErrorCode::ConcurrentModification,
                "Subscription was modified concurrently",
            ),
            Ok(false) => DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found"),
            Err(e) => e,
        }
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
pub(super) struct SubscriptionRow {
    id: Uuid,
    user_id: i64,
    community_id: i64,
    plan_id: i64,
    status: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    provider: String,
    provider_subscription_id: Option<String>,
    cancel_at_period_end: bool,
    canceled_at: Option<DateTime<Utc>>,
    provider_synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: stored("user_id", UserId::new(row.user_id))?,
            community_id: stored("community_id", CommunityId::new(row.community_id))?,
            plan_id: stored("plan_id", PlanId::new(row.plan_id))?,
            status: stored("status", row.status.parse())?,
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            provider: stored("provider", row.provider.parse())?,
            provider_subscription_id: row.provider_subscription_id,
            cancel_at_period_end: row.cancel_at_period_end,
            canceled_at: row.canceled_at.map(Timestamp::from_datetime),
            provider_synced_at: row.provider_synced_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            version: row.version,
        })
    }
}

/// Maps a column that failed domain parsing to a database error.
pub(super) fn stored<T, E: Display>(column: &str, value: Result<T, E>) -> Result<T, DomainError> {
    value.map_err(|e| DomainError::database(format!("Invalid stored {}: {}", column, e)))
}

/// Maps unique violations onto `SubscriptionExists`.
fn write_error(e: sqlx::Error, action: &str) -> DomainError {
    if let sqlx::Error::Database(db_err) = &e {
        match db_err.constraint() {
            Some(LIVE_PAIR_INDEX) => {
                return DomainError::new(
                    ErrorCode::SubscriptionExists,
                    "User already supports this community",
                )
            }
            Some(PROVIDER_REF_KEY) => {
                return DomainError::new(
                    ErrorCode::SubscriptionExists,
                    "Provider subscription already linked",
                )
            }
            _ => {}
        }
    }
    DomainError::database(format!("Failed to {} subscription: {}", action, e))
}

/// Compare-and-set write inside an open transaction. Returns rows affected.
async fn write_versioned(
    tx: &mut Transaction<'_, Postgres>,
    subscription: &Subscription,
) -> Result<u64, DomainError> {
    let result = sqlx::query(
        r#"
        UPDATE subscriptions SET
            status = $2,
            current_period_start = $3,
            current_period_end = $4,
            provider_subscription_id = $5,
            cancel_at_period_end = $6,
            canceled_at = $7,
            provider_synced_at = $8,
            updated_at = $9,
            version = version + 1
        WHERE id = $1 AND version = $10
        "#,
    )
    .bind(subscription.id.as_uuid())
    .bind(subscription.status.as_str())
    .bind(subscription.current_period_start.as_datetime())
    .bind(subscription.current_period_end.as_datetime())
    .bind(&subscription.provider_subscription_id)
    .bind(subscription.cancel_at_period_end)
    .bind(subscription.canceled_at.as_ref().map(Timestamp::as_datetime))
    .bind(subscription.provider_synced_at.as_ref().map(Timestamp::as_datetime))
    .bind(subscription.updated_at.as_datetime())
    .bind(subscription.version)
    .execute(&mut **tx)
    .await
    .map_err(|e| write_error(e, "update"))?;

    Ok(result.rows_affected())
}

fn begin_error(e: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to start transaction: {}", e))
}

fn commit_error(e: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to commit transaction: {}", e))
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn insert(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, community_id, plan_id, status,
                current_period_start, current_period_end, provider, provider_subscription_id,
                cancel_at_period_end, canceled_at, provider_synced_at, created_at, updated_at,
                version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.value())
        .bind(subscription.community_id.value())
        .bind(subscription.plan_id.value())
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(subscription.provider.as_str())
        .bind(&subscription.provider_subscription_id)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.canceled_at.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.provider_synced_at.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.version)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "insert"))?;

        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(begin_error)?;
        if write_versioned(&mut tx, subscription).await? == 0 {
            drop(tx);
            return Err(self.stale_write(&subscription.id).await);
        }
        tx.commit().await.map_err(commit_error)
    }

    async fn update_with_payment(
        &self,
        subscription: &Subscription,
        payment: &Payment,
    ) -> Result<PaymentInsert, DomainError> {
        let mut tx = self.pool.begin().await.map_err(begin_error)?;
        if write_versioned(&mut tx, subscription).await? == 0 {
            drop(tx);
            return Err(self.stale_write(&subscription.id).await);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO payments (
                id, subscription_id, amount_minor, currency, payment_method_kind,
                provider, provider_transaction_id, status, period_start, period_end, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT ON CONSTRAINT payments_provider_transaction_key DO NOTHING
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.subscription_id.as_uuid())
        .bind(payment.amount.amount_minor())
        .bind(payment.amount.currency().code())
        .bind(&payment.payment_method_kind)
        .bind(payment.provider.as_str())
        .bind(&payment.provider_transaction_id)
        .bind(payment.status.as_str())
        .bind(payment.period_start.as_datetime())
        .bind(payment.period_end.as_datetime())
        .bind(payment.created_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| DomainError::database(format!("Failed to record payment: {}", e)))?
        .rows_affected();

        tx.commit().await.map_err(commit_error)?;

        Ok(if inserted == 0 {
            PaymentInsert::Duplicate
        } else {
            PaymentInsert::Recorded
        })
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find subscription: {}", e)))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_provider_id(
        &self,
        provider: ProviderKind,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE provider = $1 AND provider_subscription_id = $2",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(provider.as_str())
        .bind(provider_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find subscription: {}", e)))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_live(
        &self,
        user_id: UserId,
        community_id: CommunityId,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM subscriptions
            WHERE user_id = $1
              AND community_id = $2
              AND status <> 'canceled'
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id.value())
        .bind(community_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to find live subscription: {}", e)))?;

        row.map(Subscription::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::SubscriptionStatus;

    fn row(status: &str, provider: &str) -> SubscriptionRow {
        let now = Utc::now();
        SubscriptionRow {
            id: Uuid::new_v4(),
            user_id: 3,
            community_id: 1,
            plan_id: 10,
            status: status.to_string(),
            current_period_start: now,
            current_period_end: now + chrono::Duration::days(30),
            provider: provider.to_string(),
            provider_subscription_id: Some("sub_X".to_string()),
            cancel_at_period_end: false,
            canceled_at: None,
            provider_synced_at: Some(now),
            created_at: now,
            updated_at: now,
            version: 4,
        }
    }

    #[test]
    fn row_converts_to_subscription() {
        let sub = Subscription::try_from(row("past_due", "stripe")).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        assert_eq!(sub.provider, ProviderKind::Stripe);
        assert_eq!(sub.user_id.value(), 3);
        assert_eq!(sub.version, 4);
        assert!(sub.provider_synced_at.is_some());
    }

    #[test]
    fn unknown_stored_status_is_a_database_error() {
        let err = Subscription::try_from(row("paused", "stripe")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(err.message().contains("status"));
    }

    #[test]
    fn non_positive_stored_key_is_a_database_error() {
        let mut bad = row("active", "stripe");
        bad.plan_id = 0;
        let err = Subscription::try_from(bad).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn non_constraint_errors_are_database_errors() {
        let err = write_error(sqlx::Error::RowNotFound, "insert");
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(err.is_transient());
    }
}
