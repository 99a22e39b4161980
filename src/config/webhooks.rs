//! Webhook ingestion configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Max age of a signed timestamp, in seconds
    #[serde(default = "default_tolerance")]
    pub signature_tolerance_secs: i64,

    /// Days a dedup ledger row is kept
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Seconds between ledger purges
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl WebhookConfig {
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=3600).contains(&self.signature_tolerance_secs) {
            return Err(ValidationError::InvalidSignatureTolerance);
        }
        if self.retention_days < 1 {
            return Err(ValidationError::InvalidRetention);
        }
        if self.purge_interval_secs < 60 {
            return Err(ValidationError::InvalidPurgeInterval);
        }
        Ok(())
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signature_tolerance_secs: default_tolerance(),
            retention_days: default_retention_days(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

fn default_tolerance() -> i64 {
    300
}

fn default_retention_days() -> i64 {
    30
}

fn default_purge_interval() -> u64 {
    3600
}
