//! ListPaymentsHandler - Query handler for a subscription's payment history.

use std::sync::Arc;

use crate::domain::billing::SubscriptionError;
use crate::domain::foundation::{SubscriptionId, UserId};
use crate::ports::{CommunityDirectory, Page, PageRequest, PaymentView, SubscriptionReader};

use super::get_subscription::load_visible;

#[derive(Debug, Clone)]
pub struct ListPaymentsQuery {
    pub user_id: UserId,
    pub subscription_id: SubscriptionId,
    pub page: PageRequest,
}

pub struct ListPaymentsHandler {
    reader: Arc<dyn SubscriptionReader>,
    directory: Arc<dyn CommunityDirectory>,
}

impl ListPaymentsHandler {
    pub fn new(reader: Arc<dyn SubscriptionReader>, directory: Arc<dyn CommunityDirectory>) -> Self {
        Self { reader, directory }
    }

    pub async fn handle(&self, query: ListPaymentsQuery) -> Result<Page<PaymentView>, SubscriptionError> {
        load_visible(
            self.reader.as_ref(),
            self.directory.as_ref(),
            query.user_id,
            &query.subscription_id,
        )
        .await?;

        Ok(self
            .reader
            .list_payments(&query.subscription_id, query.page)
            .await?)
    }
}
