//! Engine tunables.
//!
//! Every field has a default; a TOML `[engine]` table only needs to name what it
//! overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::error::DisburseError;
use crate::fee::FeePolicy;
use crate::retry::RetryPolicy;
use crate::submit::SubmitterConfig;

/// Batch size used when the request carries no hint.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Configuration of a [`Disburser`](crate::Disburser).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backoff for RPC calls.
    pub retry: RetryPolicy,
    /// Confirmation loop tunables.
    pub submitter: SubmitterConfig,
    /// Fee estimation tunables.
    pub fees: FeePolicy,
    /// Pause between consecutive batches, to stay under RPC rate limits.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "inter_batch_delay_ms")]
    pub inter_batch_delay: Duration,
    /// Batch size used when the request carries no hint.
    pub default_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            submitter: SubmitterConfig::default(),
            fees: FeePolicy::default(),
            inter_batch_delay: Duration::from_millis(500),
            default_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl EngineConfig {
    /// Rejects settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`DisburseError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), DisburseError> {
        if self.retry.max_attempts == 0 {
            return Err(DisburseError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(self.retry.multiplier >= 1.0) {
            return Err(DisburseError::InvalidConfig(
                "retry.multiplier must be at least 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(DisburseError::InvalidConfig(
                "retry.jitter must be within [0, 1]".into(),
            ));
        }
        if self.submitter.max_iterations == 0 {
            return Err(DisburseError::InvalidConfig(
                "submitter.max_iterations must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fees.percentile) {
            return Err(DisburseError::InvalidConfig(
                "fees.percentile must be within [0, 1]".into(),
            ));
        }
        if self.fees.min_priority_fee > self.fees.max_priority_fee {
            return Err(DisburseError::InvalidConfig(
                "fees.min_priority_fee exceeds fees.max_priority_fee".into(),
            ));
        }
        if self.default_batch_size == 0 {
            return Err(DisburseError::InvalidConfig(
                "default_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
