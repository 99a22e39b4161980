//! PostgreSQL implementation of CommunityDirectory.
//!
//! Reads the platform's communities, users and support_plans tables.

use crate::domain::billing::SupportPlan;
use crate::domain::foundation::{CommunityId, DomainError, Money, PlanId, UserId};
use crate::ports::{CommunityDirectory, MemberProfile};
use async_trait::async_trait;
use sqlx::PgPool;

use super::subscription_repository::stored;

pub struct PostgresCommunityDirectory {
    pool: PgPool,
}

impl PostgresCommunityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: i64,
    community_id: i64,
    name: String,
    description: Option<String>,
    price_minor: i64,
    currency: String,
    benefits: Option<String>,
    is_active: bool,
}

impl TryFrom<PlanRow> for SupportPlan {
    type Error = DomainError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(SupportPlan {
            id: stored("plan id", PlanId::new(row.id))?,
            community_id: stored("community_id", CommunityId::new(row.community_id))?,
            name: row.name,
            description: row.description,
            price: stored("price", Money::from_parts(row.price_minor, &row.currency))?,
            benefits: row.benefits,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    id: i64,
    email: String,
    display_name: Option<String>,
}

#[async_trait]
impl CommunityDirectory for PostgresCommunityDirectory {
    async fn active_plan(
        &self,
        community_id: CommunityId,
    ) -> Result<Option<SupportPlan>, DomainError> {
        // Newest active plan wins if plan management left more than one.
        let row: Option<PlanRow> = sqlx::query_as(
            r#"
            SELECT id, community_id, name, description, price_minor, currency, benefits, is_active
            FROM support_plans
            WHERE community_id = $1 AND is_active
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(community_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to load support plan: {}", e)))?;

        row.map(SupportPlan::try_from).transpose()
    }

    async fn community_exists(&self, community_id: CommunityId) -> Result<bool, DomainError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM communities WHERE id = $1)")
            .bind(community_id.value())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to check community: {}", e)))
    }

    async fn is_owner(
        &self,
        user_id: UserId,
        community_id: CommunityId,
    ) -> Result<bool, DomainError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM communities WHERE id = $1 AND owner_id = $2)",
        )
        .bind(community_id.value())
        .bind(user_id.value())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to check ownership: {}", e)))
    }

    async fn member_profile(&self, user_id: UserId) -> Result<Option<MemberProfile>, DomainError> {
        let row: Option<MemberRow> =
            sqlx::query_as("SELECT id, email, display_name FROM users WHERE id = $1")
                .bind(user_id.value())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database(format!("Failed to load member: {}", e)))?;

        row.map(|r| {
            Ok(MemberProfile {
                user_id: stored("user id", UserId::new(r.id))?,
                email: r.email,
                display_name: r.display_name,
            })
        })
        .transpose()
    }
}
