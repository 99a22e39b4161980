//! GetSubscriptionHandler - Query handler for one subscription.

use std::sync::Arc;

use crate::domain::billing::SubscriptionError;
use crate::domain::foundation::{SubscriptionId, UserId};
use crate::ports::{CommunityDirectory, SubscriptionReader, SubscriptionView};

/// Query to fetch a subscription.
#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    pub user_id: UserId,
    pub subscription_id: SubscriptionId,
}

/// Visible to the subscriber and to the community owner.
pub struct GetSubscriptionHandler {
    reader: Arc<dyn SubscriptionReader>,
    directory: Arc<dyn CommunityDirectory>,
}

impl GetSubscriptionHandler {
    pub fn new(reader: Arc<dyn SubscriptionReader>, directory: Arc<dyn CommunityDirectory>) -> Self {
        Self { reader, directory }
    }

    pub async fn handle(&self, query: GetSubscriptionQuery) -> Result<SubscriptionView, SubscriptionError> {
        load_visible(
            self.reader.as_ref(),
            self.directory.as_ref(),
            query.user_id,
            &query.subscription_id,
        )
        .await
    }
}

/// Loads a subscription the caller is allowed to see.
pub(crate) async fn load_visible(
    reader: &dyn SubscriptionReader,
    directory: &dyn CommunityDirectory,
    user_id: UserId,
    subscription_id: &SubscriptionId,
) -> Result<SubscriptionView, SubscriptionError> {
    let view = reader
        .get(subscription_id)
        .await?
        .ok_or_else(|| SubscriptionError::not_found("subscription", subscription_id))?;

    if view.user_id != user_id && !directory.is_owner(user_id, view.community_id).await? {
        return Err(SubscriptionError::unauthorized(
            "Not allowed to view this subscription",
        ));
    }
    Ok(view)
}
