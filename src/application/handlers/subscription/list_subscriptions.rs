//! Query handlers for paginated subscription lists.

use std::sync::Arc;

use crate::domain::billing::SubscriptionError;
use crate::domain::foundation::{CommunityId, UserId};
use crate::ports::{CommunityDirectory, Page, PageRequest, SubscriptionReader, SubscriptionView};

/// Query for the caller's own subscriptions.
#[derive(Debug, Clone)]
pub struct ListMySubscriptionsQuery {
    pub user_id: UserId,
    pub page: PageRequest,
}

pub struct ListMySubscriptionsHandler {
    reader: Arc<dyn SubscriptionReader>,
}

impl ListMySubscriptionsHandler {
    pub fn new(reader: Arc<dyn SubscriptionReader>) -> Self {
        Self { reader }
    }

    pub async fn handle(
        &self,
        query: ListMySubscriptionsQuery,
    ) -> Result<Page<SubscriptionView>, SubscriptionError> {
        Ok(self.reader.list_for_user(query.user_id, query.page).await?)
    }
}

/// Query for every subscription to a community. Owner only.
#[derive(Debug, Clone)]
pub struct ListCommunitySubscriptionsQuery {
    pub user_id: UserId,
    pub community_id: CommunityId,
    pub page: PageRequest,
}

pub struct ListCommunitySubscriptionsHandler {
    reader: Arc<dyn SubscriptionReader>,
    directory: Arc<dyn CommunityDirectory>,
}

impl ListCommunitySubscriptionsHandler {
    pub fn new(reader: Arc<dyn SubscriptionReader>, directory: Arc<dyn CommunityDirectory>) -> Self {
        Self { reader, directory }
    }

    pub async fn handle(
        &self,
        query: ListCommunitySubscriptionsQuery,
    ) -> Result<Page<SubscriptionView>, SubscriptionError> {
        if !self.directory.community_exists(query.community_id).await? {
            return Err(SubscriptionError::not_found("community", query.community_id));
        }
        if !self
            .directory
            .is_owner(query.user_id, query.community_id)
            .await?
        {
            return Err(SubscriptionError::unauthorized(
                "Only the community owner can list its subscriptions",
            ));
        }
        Ok(self
            .reader
            .list_for_community(query.community_id, query.page)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryCommunityDirectory, InMemorySubscriptionStore};
    use crate::domain::billing::{ProviderKind, ProviderTerms, Subscription, SubscriptionStatus};
    use crate::domain::foundation::{ErrorCode, PlanId, Timestamp};
    use crate::ports::SubscriptionRepository;

    fn owner() -> UserId {
        UserId::new(99).unwrap()
    }

    async fn seeded_store(subscribers: i64) -> InMemorySubscriptionStore {
        let store = InMemorySubscriptionStore::new();
        let now = Timestamp::now();
        for user in 1..=subscribers {
            let sub = Subscription::materialize(
                UserId::new(user).unwrap(),
                CommunityId::new(1).unwrap(),
                PlanId::new(10).unwrap(),
                ProviderKind::Stripe,
                ProviderTerms {
                    provider_subscription_id: format!("sub_{}", user),
                    status: SubscriptionStatus::Active,
                    current_period_start: now,
                    current_period_end: now.add_days(30),
                },
            )
            .unwrap();
            store.insert(&sub).await.unwrap();
        }
        store
    }

    async fn directory() -> InMemoryCommunityDirectory {
        let directory = InMemoryCommunityDirectory::new();
        directory
            .add_community(CommunityId::new(1).unwrap(), owner())
            .await;
        directory
    }

    #[tokio::test]
    async fn owner_pages_through_community_subscriptions() {
        let handler = ListCommunitySubscriptionsHandler::new(
            Arc::new(seeded_store(5).await),
            Arc::new(directory().await),
        );

        let page = handler
            .handle(ListCommunitySubscriptionsQuery {
                user_id: owner(),
                community_id: CommunityId::new(1).unwrap(),
                page: PageRequest::new(Some(2), Some(2)),
            })
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.page, 2);
    }

    #[tokio::test]
    async fn non_owner_cannot_list_community() {
        let handler = ListCommunitySubscriptionsHandler::new(
            Arc::new(seeded_store(1).await),
            Arc::new(directory().await),
        );

        let err = handler
            .handle(ListCommunitySubscriptionsQuery {
                user_id: UserId::new(1).unwrap(),
                community_id: CommunityId::new(1).unwrap(),
                page: PageRequest::default(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn unknown_community_is_not_found() {
        let handler = ListCommunitySubscriptionsHandler::new(
            Arc::new(seeded_store(0).await),
            Arc::new(directory().await),
        );

        let err = handler
            .handle(ListCommunitySubscriptionsQuery {
                user_id: owner(),
                community_id: CommunityId::new(2).unwrap(),
                page: PageRequest::default(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CommunityNotFound);
    }

    #[tokio::test]
    async fn member_sees_only_own_subscriptions() {
        let handler = ListMySubscriptionsHandler::new(Arc::new(seeded_store(3).await));

        let page = handler
            .handle(ListMySubscriptionsQuery {
                user_id: UserId::new(2).unwrap(),
                page: PageRequest::default(),
            })
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].user_id, UserId::new(2).unwrap());
    }
}
