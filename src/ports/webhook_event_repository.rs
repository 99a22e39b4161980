//! WebhookEventRepository port - durable deduplication ledger.
//!
//! Providers redeliver on timeouts and on anything that is not a 2xx, so
//! every event id is recorded with its outcome. Only `success` and `ignored`
//! outcomes short-circuit a redelivery; a `failed` event is reprocessed and
//! its record upgraded.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::domain::billing::ProviderKind;
use crate::domain::foundation::{DomainError, Timestamp, ValidationError};

/// Outcome stored for a delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Success,
    Ignored,
    Failed,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Success => "success",
            EventOutcome::Ignored => "ignored",
            EventOutcome::Failed => "failed",
        }
    }

    /// True if a redelivery must not be applied again.
    pub fn is_final(&self) -> bool {
        !matches!(self, EventOutcome::Failed)
    }
}

impl fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventOutcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(EventOutcome::Success),
            "ignored" => Ok(EventOutcome::Ignored),
            "failed" => Ok(EventOutcome::Failed),
            other => Err(ValidationError::invalid_format(
                "result",
                format!("unknown event outcome '{}'", other),
            )),
        }
    }
}

/// Record of a delivered webhook event.
#[derive(Debug, Clone)]
pub struct WebhookEventRecord {
    pub provider: ProviderKind,

    /// Provider event id (evt_xxx for Stripe).
    pub event_id: String,

    /// Provider's event type string.
    pub event_type: String,

    pub processed_at: Timestamp,

    pub result: EventOutcome,

    /// Ignore reason or failure message.
    pub error_message: Option<String>,

    /// Original payload for debugging.
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    fn new(
        provider: ProviderKind,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        result: EventOutcome,
        error_message: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            provider,
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at: Timestamp::now(),
            result,
            error_message,
            payload,
        }
    }

    pub fn success(
        provider: ProviderKind,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(provider, event_id, event_type, EventOutcome::Success, None, payload)
    }

    pub fn ignored(
        provider: ProviderKind,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(
            provider,
            event_id,
            event_type,
            EventOutcome::Ignored,
            Some(reason.into()),
            payload,
        )
    }

    pub fn failed(
        provider: ProviderKind,
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        error: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(
            provider,
            event_id,
            event_type,
            EventOutcome::Failed,
            Some(error.into()),
            payload,
        )
    }
}

/// Result of attempting to save a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// First record for this event.
    Inserted,
    /// Replaced an earlier `failed` record.
    Upgraded,
    /// A final record already exists; nothing written.
    AlreadyExists,
}

/// Port for the deduplication ledger.
///
/// Implementations key records on (provider, event_id) and must make `save`
/// atomic so concurrent deliveries of one event cannot both insert.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn find_by_event_id(
        &self,
        provider: ProviderKind,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Inserts the record, or overwrites an existing `failed` one.
    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, DomainError>;

    /// Deletes records processed before `cutoff`, returning how many.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}
