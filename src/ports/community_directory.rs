//! Community directory port.
//!
//! Plans, ownership and member profiles are owned by other parts of the
//! platform. The lifecycle only reads them.

use crate::domain::billing::SupportPlan;
use crate::domain::foundation::{CommunityId, DomainError, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait CommunityDirectory: Send + Sync {
    /// The community's currently active support plan.
    async fn active_plan(&self, community_id: CommunityId)
        -> Result<Option<SupportPlan>, DomainError>;

    async fn community_exists(&self, community_id: CommunityId) -> Result<bool, DomainError>;

    async fn is_owner(&self, user_id: UserId, community_id: CommunityId)
        -> Result<bool, DomainError>;

    /// Contact details used to resolve the provider customer.
    async fn member_profile(&self, user_id: UserId) -> Result<Option<MemberProfile>, DomainError>;
}

/// What the provider needs to know about a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub user_id: UserId,
    pub email: String,
    pub display_name: Option<String>,
}
