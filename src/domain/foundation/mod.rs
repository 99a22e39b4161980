//! Foundation module - Shared domain primitives.
//!
//! Identifiers, time, money and error types used across the billing domain.

mod errors;
mod ids;
mod money;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{CommunityId, PaymentId, PlanId, SubscriptionId, UserId};
pub use money::{Currency, Money};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
