//! Error classification and exponential backoff.
//!
//! Terminal errors come from an explicit deny-list and are never retried, even
//! with attempts left: retrying them burns fees and can repeat partial side
//! effects. Everything else is treated as transient up to the attempt ceiling.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use rand::rng;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use tokio_util::sync::CancellationToken;

use crate::error::RpcError;

/// Lowercase message fragments that mark an error as terminal.
pub const TERMINAL_PATTERNS: &[&str] = &[
    "insufficient funds",
    "insufficient lamports",
    "insufficient balance",
    "invalid address",
    "invalid signature",
    "unauthorized",
    "forbidden",
    "invalid contract",
    "reverted",
    "out of gas",
    "gas required exceeds allowance",
    "invalid recipient",
    "invalid account data",
    "transaction simulation failed",
    "attempt to debit an account",
];

/// Retry classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying after a delay.
    Retryable,
    /// Retrying cannot change the outcome.
    Terminal,
}

/// Classifies an error message against [`TERMINAL_PATTERNS`].
#[must_use]
pub fn classify(message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    if TERMINAL_PATTERNS.iter().any(|p| lower.contains(p)) {
        ErrorClass::Terminal
    } else {
        ErrorClass::Retryable
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again once the delay has elapsed.
    RetryAfter(Duration),
    /// Give up.
    Fail,
}

/// Bounded exponential backoff with jitter.
///
/// `delay(n) = min(base * multiplier^(n-1), max_delay) + jitter`, where jitter is
/// drawn uniformly from `[0, jitter * delay]`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "base_delay_ms")]
    pub base_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Upper bound before jitter.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "max_delay_ms")]
    pub max_delay: Duration,
    /// Fraction of the delay added at random, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            multiplier: 1.5,
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jitter = self.jitter.clamp(0.0, 1.0);
        let extra = if jitter > 0.0 {
            rng().random_range(0.0..=capped * jitter)
        } else {
            0.0
        };
        Duration::from_secs_f64(capped + extra)
    }

    /// Decides whether attempt number `attempt` (1-based) should be followed by another.
    #[must_use]
    pub fn decide(&self, message: &str, attempt: u32) -> RetryDecision {
        if classify(message) == ErrorClass::Terminal || attempt >= self.max_attempts {
            RetryDecision::Fail
        } else {
            RetryDecision::RetryAfter(self.delay(attempt))
        }
    }

    /// Runs `op` until it succeeds, fails terminally, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the last [`RpcError`] once no further attempt is allowed.
    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<T, RpcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        self.run_until(label, &CancellationToken::new(), op).await
    }

    /// Like [`run`](Self::run), but stops waiting between attempts once `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns the last [`RpcError`] once no further attempt is allowed or the
    /// operation was cancelled during a backoff.
    pub async fn run_until<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RpcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) => match self.decide(error.message(), attempt) {
                    RetryDecision::RetryAfter(delay) => {
                        #[cfg(feature = "telemetry")]
                        tracing::warn!(
                            op = label,
                            attempt,
                            max_attempts = self.max_attempts,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %error,
                            "RPC call failed, retrying"
                        );
                        #[cfg(not(feature = "telemetry"))]
                        let _ = label;
                        tokio::select! {
                            () = cancel.cancelled() => return Err(error),
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                    RetryDecision::Fail => return Err(error),
                },
            }
        }
    }
}
