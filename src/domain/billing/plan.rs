//! Support plan read model.
//!
//! Plans are owned by the community's plan management; the billing core only
//! reads the currently active one.

use crate::domain::foundation::{CommunityId, Money, PlanId};
use serde::{Deserialize, Serialize};

/// A community's recurring monthly support offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportPlan {
    pub id: PlanId,
    pub community_id: CommunityId,
    pub name: String,
    pub description: Option<String>,
    /// Monthly price.
    pub price: Money,
    pub benefits: Option<String>,
    pub is_active: bool,
}

impl SupportPlan {
    /// A plan accepts new subscribers only while active and priced.
    pub fn accepts_subscribers(&self) -> bool {
        self.is_active && !self.price.is_zero()
    }
}
