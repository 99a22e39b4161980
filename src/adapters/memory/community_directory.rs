//! In-memory community directory for tests and local development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::SupportPlan;
use crate::domain::foundation::{CommunityId, DomainError, UserId};
use crate::ports::{CommunityDirectory, MemberProfile};

#[derive(Debug, Default)]
struct DirectoryState {
    owners: HashMap<CommunityId, UserId>,
    plans: Vec<SupportPlan>,
    members: HashMap<UserId, MemberProfile>,
}

/// Seedable directory of communities, plans and members.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommunityDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl InMemoryCommunityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_community(&self, community_id: CommunityId, owner_id: UserId) {
        self.state.write().await.owners.insert(community_id, owner_id);
    }

    pub async fn add_plan(&self, plan: SupportPlan) {
        self.state.write().await.plans.push(plan);
    }

    pub async fn add_member(&self, profile: MemberProfile) {
        self.state
            .write()
            .await
            .members
            .insert(profile.user_id, profile);
    }
}

#[async_trait]
impl CommunityDirectory for InMemoryCommunityDirectory {
    async fn active_plan(
        &self,
        community_id: CommunityId,
    ) -> Result<Option<SupportPlan>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .plans
            .iter()
            .find(|p| p.community_id == community_id && p.is_active)
            .cloned())
    }

    async fn community_exists(&self, community_id: CommunityId) -> Result<bool, DomainError> {
        Ok(self.state.read().await.owners.contains_key(&community_id))
    }

    async fn is_owner(
        &self,
        user_id: UserId,
        community_id: CommunityId,
    ) -> Result<bool, DomainError> {
        Ok(self.state.read().await.owners.get(&community_id) == Some(&user_id))
    }

    async fn member_profile(&self, user_id: UserId) -> Result<Option<MemberProfile>, DomainError> {
        Ok(self.state.read().await.members.get(&user_id).cloned())
    }
}
