//! Webhook ingestion error types.
//!
//! Pipeline-level failures decide the HTTP acknowledgment. Failures inside a
//! single event's side effects never reach the provider; they are logged,
//! recorded in the ledger and acknowledged.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that occur while verifying, parsing or applying a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No normalizer is registered for the provider path segment.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Signature header missing or no signature matched.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed timestamp is outside the freshness window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Test-mode event delivered to a live-only deployment.
    #[error("Livemode mismatch")]
    LivemodeMismatch,

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required field missing from a recognized event.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Provider reported a period that ends before it starts.
    #[error("Invalid billing period for {0}")]
    InvalidPeriod(String),

    /// Transition refused by the subscription state machine.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Row changed underneath us more times than we are willing to retry.
    #[error("Concurrent modification of {0}")]
    Conflict(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// True for failures that reject the delivery as a whole.
    ///
    /// Everything else is confined to one event and acknowledged.
    pub fn rejects_delivery(&self) -> bool {
        matches!(
            self,
            WebhookError::UnknownProvider(_)
                | WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::LivemodeMismatch
                | WebhookError::ParseError(_)
                | WebhookError::MissingField(_)
        )
    }

    /// Maps the error to the acknowledgment status.
    ///
    /// - 401: authenticity failures, no processing happened
    /// - 400: unreadable payloads
    /// - 404: unknown provider path
    /// - 200: per-event failures, already logged and recorded
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::LivemodeMismatch => StatusCode::UNAUTHORIZED,

            WebhookError::ParseError(_) | WebhookError::MissingField(_) => StatusCode::BAD_REQUEST,

            WebhookError::UnknownProvider(_) => StatusCode::NOT_FOUND,

            WebhookError::InvalidPeriod(_)
            | WebhookError::InvalidTransition(_)
            | WebhookError::Conflict(_)
            | WebhookError::Database(_) => StatusCode::OK,
        }
    }
}
