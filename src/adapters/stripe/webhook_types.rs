//! Stripe wire types.
//!
//! Shapes of the Stripe objects this crate reads, both from REST responses
//! and from webhook payloads. Only fields the lifecycle needs are declared;
//! serde ignores the rest so new Stripe fields never break parsing.

use serde::Deserialize;
use thiserror::Error;

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Error parsing the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureParseError {
    #[error("Missing Stripe-Signature header")]
    MissingHeader,
    #[error("Missing timestamp (t=) in signature")]
    MissingTimestamp,
    #[error("Missing v1 signature in header")]
    MissingV1Signature,
    #[error("Invalid timestamp format")]
    InvalidTimestamp,
    #[error("Invalid signature format (not valid hex)")]
    InvalidSignatureFormat,
}

/// Parsed `Stripe-Signature` header.
///
/// Format: `t=<unix>,v1=<hex>[,v1=<hex>...][,v0=<hex>]`. Stripe sends more
/// than one `v1` while a signing secret is being rolled; any match is
/// accepted.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    /// Unix timestamp when Stripe signed the delivery.
    pub timestamp: i64,

    /// Every v1 (HMAC-SHA256) signature, decoded.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        let header = header.trim();
        if header.is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse::<i64>()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    let bytes = hex::decode(value.trim())
                        .map_err(|_| SignatureParseError::InvalidSignatureFormat)?;
                    v1_signatures.push(bytes);
                }
                // v0 and future schemes are ignored
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureParseError::MissingTimestamp)?;
        if v1_signatures.is_empty() {
            return Err(SignatureParseError::MissingV1Signature);
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Events
// ════════════════════════════════════════════════════════════════════════════════

/// Webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeWebhookEvent {
    /// Event id (evt_xxx), the deduplication key.
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp of event creation.
    #[serde(default)]
    pub created: i64,

    pub data: StripeEventData,

    /// False for test-mode events.
    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    /// The object the event is about; its shape depends on `type`.
    pub object: serde_json::Value,
}

// ════════════════════════════════════════════════════════════════════════════════
// API Objects
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeProduct {
    pub id: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
    #[serde(default)]
    pub active: bool,
    /// Minor units.
    pub unit_amount: Option<i64>,
    pub currency: String,
    pub recurring: Option<StripeRecurring>,
}

impl StripePrice {
    /// True if this price can be reused for a monthly plan charging
    /// `amount_minor` in `currency` (lowercase).
    pub fn matches_monthly(&self, amount_minor: i64, currency: &str) -> bool {
        self.active
            && self.unit_amount == Some(amount_minor)
            && self.currency.eq_ignore_ascii_case(currency)
            && self
                .recurring
                .as_ref()
                .is_some_and(|r| r.interval == "month" && r.interval_count == 1)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeRecurring {
    pub interval: String,
    #[serde(default = "default_interval_count")]
    pub interval_count: i64,
}

fn default_interval_count() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
    pub current_period_start: i64,
    pub current_period_end: i64,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    /// Absent for one-off invoices.
    pub subscription: Option<String>,
    /// Charge of the attempt this event reports; each retry gets its own.
    #[serde(default)]
    pub charge: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    pub currency: String,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
    #[serde(default)]
    pub lines: StripeList<StripeInvoiceLine>,
}

impl StripeInvoice {
    /// Service period billed by this invoice.
    ///
    /// Invoice-level `period_*` describe the previous cycle for subscription
    /// invoices, so the first line item's period wins when present.
    pub fn billed_period(&self) -> Option<(i64, i64)> {
        if let Some(line) = self.lines.data.first() {
            return Some((line.period.start, line.period.end));
        }
        match (self.period_start, self.period_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoiceLine {
    pub period: StripePeriod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePeriod {
    pub start: i64,
    pub end: i64,
}

/// Paginated list envelope (`object: "list"` and `object: "search_result"`).
///
/// Lookups here read the first page only.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

/// Body of a non-2xx Stripe response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorBody {
    pub error: StripeApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiError {
    /// `card_error`, `invalid_request_error`, `api_error`, ...
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: Option<String>,
    pub decline_code: Option<String>,
    pub message: Option<String>,
}
