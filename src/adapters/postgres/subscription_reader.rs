//! PostgreSQL implementation of SubscriptionReader.
//!
//! Paginated read queries. Totals are counted with a separate query so the
//! page query stays a plain indexed scan.

use crate::domain::billing::{Payment, Subscription};
use crate::domain::foundation::{
    CommunityId, DomainError, Money, PaymentId, SubscriptionId, Timestamp, UserId,
};
use crate::ports::{Page, PageRequest, PaymentView, SubscriptionReader, SubscriptionView};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::subscription_repository::{stored, SubscriptionRow, SUBSCRIPTION_COLUMNS};

/// PostgreSQL implementation of the SubscriptionReader port.
pub struct PostgresSubscriptionReader {
    pool: PgPool,
}

impl PostgresSubscriptionReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pages subscriptions filtered on one bigint column, newest first.
    async fn list_by(
        &self,
        column: &'static str,
        value: i64,
        page: PageRequest,
    ) -> Result<Page<SubscriptionView>, DomainError> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM subscriptions WHERE {} = $1",
            column
        ))
        .bind(value)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to count subscriptions: {}", e)))?;

        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM subscriptions
            WHERE {} = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            SUBSCRIPTION_COLUMNS, column
        ))
        .bind(value)
        .bind(i64::from(page.per_page()))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list subscriptions: {}", e)))?;

        let items = rows
            .into_iter()
            .map(|row| Subscription::try_from(row).map(SubscriptionView::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, total.max(0) as u64, page))
    }
}

/// Row for payment history queries.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    subscription_id: Uuid,
    amount_minor: i64,
    currency: String,
    payment_method_kind: String,
    provider: String,
    provider_transaction_id: String,
    status: String,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            amount: stored("amount", Money::from_parts(row.amount_minor, &row.currency))?,
            payment_method_kind: row.payment_method_kind,
            provider: stored("provider", row.provider.parse())?,
            provider_transaction_id: row.provider_transaction_id,
            status: stored("status", row.status.parse())?,
            period_start: Timestamp::from_datetime(row.period_start),
            period_end: Timestamp::from_datetime(row.period_end),
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

#[async_trait]
impl SubscriptionReader for PostgresSubscriptionReader {
    async fn get(&self, id: &SubscriptionId) -> Result<Option<SubscriptionView>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to get subscription: {}", e)))?;

        row.map(|r| Subscription::try_from(r).map(SubscriptionView::from))
            .transpose()
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<SubscriptionView>, DomainError> {
        self.list_by("user_id", user_id.value(), page).await
    }

    async fn list_for_community(
        &self,
        community_id: CommunityId,
        page: PageRequest,
    ) -> Result<Page<SubscriptionView>, DomainError> {
        self.list_by("community_id", community_id.value(), page).await
    }

    async fn list_payments(
        &self,
        subscription_id: &SubscriptionId,
        page: PageRequest,
    ) -> Result<Page<PaymentView>, DomainError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE subscription_id = $1")
                .bind(subscription_id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to count payments: {}", e)))?;

        let rows: Vec<PaymentRow> = sqlx::query_as(
            r#"
            SELECT id, subscription_id, amount_minor, currency, payment_method_kind,
                   provider, provider_transaction_id, status, period_start, period_end, created_at
            FROM payments
            WHERE subscription_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(subscription_id.as_uuid())
        .bind(i64::from(page.per_page()))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to list payments: {}", e)))?;

        let items = rows
            .into_iter()
            .map(|row| Payment::try_from(row).map(PaymentView::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, total.max(0) as u64, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{PaymentStatus, ProviderKind};
    use crate::domain::foundation::ErrorCode;

    fn payment_row(currency: &str, status: &str) -> PaymentRow {
        let now = Utc::now();
        PaymentRow {
            id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
            amount_minor: 999,
            currency: currency.to_string(),
            payment_method_kind: "card".to_string(),
            provider: "stripe".to_string(),
            provider_transaction_id: "in_1".to_string(),
            status: status.to_string(),
            period_start: now,
            period_end: now + chrono::Duration::days(30),
            created_at: now,
        }
    }

    #[test]
    fn payment_row_converts() {
        let payment = Payment::try_from(payment_row("usd", "succeeded")).unwrap();
        assert_eq!(payment.amount.amount_minor(), 999);
        assert_eq!(payment.amount.currency().code(), "USD");
        assert_eq!(payment.provider, ProviderKind::Stripe);
        assert_eq!(payment.status, PaymentStatus::Succeeded);
    }

    #[test]
    fn malformed_payment_row_is_a_database_error() {
        let err = Payment::try_from(payment_row("dollars", "succeeded")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);

        let err = Payment::try_from(payment_row("USD", "refunded")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }
}
