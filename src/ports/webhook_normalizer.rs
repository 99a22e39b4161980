//! Webhook normalizer port.
//!
//! One implementation per provider: verify the raw bytes, then translate the
//! payload into a `ProviderEvent`. Verification must run on the exact bytes
//! received, before any parsing.

use crate::domain::billing::{ProviderEvent, ProviderKind, WebhookError};
use std::collections::HashMap;
use std::sync::Arc;

pub trait WebhookNormalizer: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Request header carrying the signature.
    fn signature_header(&self) -> &'static str;

    /// Verifies and normalizes one delivery.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature`, `TimestampOutOfRange` or `LivemodeMismatch`
    ///   when authenticity cannot be established
    /// - `ParseError` or `MissingField` for unreadable payloads
    fn normalize(&self, payload: &[u8], signature: &str) -> Result<ProviderEvent, WebhookError>;
}

/// Normalizers keyed by the provider path segment.
#[derive(Clone, Default)]
pub struct NormalizerRegistry {
    normalizers: HashMap<&'static str, Arc<dyn WebhookNormalizer>>,
}

impl NormalizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, normalizer: Arc<dyn WebhookNormalizer>) -> Self {
        self.normalizers
            .insert(normalizer.provider().as_str(), normalizer);
        self
    }

    /// Looks up by path segment, e.g. `stripe`.
    pub fn get(&self, provider: &str) -> Result<Arc<dyn WebhookNormalizer>, WebhookError> {
        self.normalizers
            .get(provider)
            .cloned()
            .ok_or_else(|| WebhookError::UnknownProvider(provider.to_string()))
    }
}
