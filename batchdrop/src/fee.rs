//! Fee estimation.
//!
//! [`estimate`] never fails: an empty sample, an RPC error or a timeout all
//! yield the configured fallback, so fee estimation can never block a disbursement.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::adapter::RpcEndpoint;
use crate::chain::ChainKind;

/// Raw fee-market observation returned by an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeSample {
    /// Recent per-slot prioritization fees in micro-lamports per compute unit.
    PriorityFees(Vec<u64>),
    /// Current gas price in wei, with the suggested EIP-1559 tip when available.
    GasPrice {
        /// Gas price (legacy) or base-fee-inclusive price (EIP-1559).
        gas_price: u128,
        /// Suggested priority tip.
        priority_fee: Option<u128>,
    },
}

/// Transaction-cost hint handed to the adapter when it builds a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeeHint {
    /// Compute-unit price for Solana transactions.
    Priority {
        /// Micro-lamports per compute unit.
        micro_lamports: u64,
    },
    /// Gas pricing for EVM transactions. Gas limits are per transaction type.
    Gas {
        /// Gas price (legacy) or max fee per gas (EIP-1559), in wei.
        gas_price: u128,
        /// Max priority fee per gas, in wei.
        priority_fee: u128,
    },
}

/// Fee estimation tunables.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeePolicy {
    /// Percentile of the positive priority-fee samples to use.
    pub percentile: f64,
    /// Priority fee floor, micro-lamports.
    pub min_priority_fee: u64,
    /// Priority fee ceiling, micro-lamports.
    pub max_priority_fee: u64,
    /// Priority fee used when sampling yields nothing.
    pub fallback_priority_fee: u64,
    /// Multiplier applied to account-creation transactions.
    pub creation_boost: f64,
    /// Gas price used when the gas price query fails, in wei.
    pub fallback_gas_price: u64,
    /// Priority tip used when the node suggests none, in wei.
    pub fallback_priority_gas: u64,
    /// Safety margin added to fixed gas limits, in percent.
    pub gas_buffer_percent: u64,
    /// Upper bound on the fee query itself.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeout_ms")]
    pub timeout: Duration,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            percentile: 0.95,
            min_priority_fee: 10_000,
            max_priority_fee: 500_000,
            fallback_priority_fee: 20_000,
            creation_boost: 1.5,
            fallback_gas_price: 30_000_000_000,
            fallback_priority_gas: 1_500_000_000,
            gas_buffer_percent: 20,
            timeout: Duration::from_secs(5),
        }
    }
}

impl FeePolicy {
    /// Fallback hint for a chain family.
    #[must_use]
    pub fn fallback(&self, kind: ChainKind) -> FeeHint {
        match kind {
            ChainKind::Solana => FeeHint::Priority {
                micro_lamports: self.fallback_priority_fee,
            },
            ChainKind::Evm => FeeHint::Gas {
                gas_price: u128::from(self.fallback_gas_price),
                priority_fee: u128::from(self.fallback_priority_gas),
            },
        }
    }

    /// Picks the configured percentile of the positive samples and clamps it.
    #[must_use]
    pub fn priority_fee_from_samples(&self, samples: &[u64]) -> u64 {
        let mut positive: Vec<u64> = samples.iter().copied().filter(|fee| *fee > 0).collect();
        if positive.is_empty() {
            return self.fallback_priority_fee;
        }
        positive.sort_unstable();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = ((positive.len() as f64) * self.percentile.clamp(0.0, 1.0)).floor() as usize;
        let fee = positive[index.min(positive.len() - 1)];
        fee.clamp(self.min_priority_fee, self.max_priority_fee)
    }

    /// Converts a raw sample into a hint.
    #[must_use]
    pub fn hint_from_sample(&self, sample: &FeeSample) -> FeeHint {
        match sample {
            FeeSample::PriorityFees(samples) => FeeHint::Priority {
                micro_lamports: self.priority_fee_from_samples(samples),
            },
            FeeSample::GasPrice {
                gas_price,
                priority_fee,
            } => FeeHint::Gas {
                gas_price: *gas_price,
                priority_fee: priority_fee
                    .unwrap_or_else(|| u128::from(self.fallback_priority_gas))
                    .min(*gas_price),
            },
        }
    }

    /// Raises a hint for account-creation transactions, capped at the ceiling.
    #[must_use]
    pub fn boosted(&self, hint: FeeHint) -> FeeHint {
        match hint {
            FeeHint::Priority { micro_lamports } => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let raised = (micro_lamports as f64 * self.creation_boost).round() as u64;
                FeeHint::Priority {
                    micro_lamports: raised.min(self.max_priority_fee),
                }
            }
            gas @ FeeHint::Gas { .. } => gas,
        }
    }

    /// Adds the safety buffer to a fixed gas limit.
    #[must_use]
    pub const fn buffered_gas_limit(&self, gas: u64) -> u64 {
        gas.saturating_add(gas.saturating_mul(self.gas_buffer_percent) / 100)
    }
}

/// Produces a fee hint for the next transactions on `endpoint`.
pub async fn estimate<E>(endpoint: &E, kind: ChainKind, policy: &FeePolicy) -> FeeHint
where
    E: RpcEndpoint + ?Sized,
{
    match tokio::time::timeout(policy.timeout, endpoint.recent_fee_sample()).await {
        Ok(Ok(sample)) => {
            let hint = policy.hint_from_sample(&sample);
            #[cfg(feature = "telemetry")]
            tracing::debug!(?hint, "Estimated fee");
            hint
        }
        Ok(Err(_error)) => {
            #[cfg(feature = "telemetry")]
            tracing::warn!(error = %_error, "Fee sampling failed, using fallback");
            policy.fallback(kind)
        }
        Err(_) => {
            #[cfg(feature = "telemetry")]
            tracing::warn!("Fee sampling timed out, using fallback");
            policy.fallback(kind)
        }
    }
}
