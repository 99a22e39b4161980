//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, money, errors)
//! - `billing` - Support plans, subscriptions, payments and provider events

pub mod billing;
pub mod foundation;
