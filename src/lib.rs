//! Community Support - recurring support plans for communities.
//!
//! Members subscribe to a community's monthly plan through an external
//! payment provider. The provider owns the billing truth; this crate keeps a
//! local mirror of each subscription and its payments, reconciled through
//! signed webhooks.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
