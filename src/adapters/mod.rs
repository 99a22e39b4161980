//! Adapters - Implementations of port interfaces.
//!
//! - `stripe` - Stripe payment provider, webhook verification and a mock provider
//! - `postgres` - sqlx-backed stores
//! - `memory` - In-memory stores for tests and local development
//! - `http` - Axum REST API

pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;
