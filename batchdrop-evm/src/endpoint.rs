//! JSON-RPC endpoint for EVM chains.
//!
//! Wraps an alloy [`RootProvider`] over throttled HTTP transports behind a
//! fallback layer, and maps node responses onto the engine's
//! [`RpcEndpoint`] contract:
//!
//! - the validity window is the signer's pending nonce
//! - a transaction is expired once the signer's mined nonce moved past it
//!   without a receipt for our hash

use std::num::NonZeroUsize;
use std::str::FromStr;

use alloy_primitives::{Address, B256, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_transport::TransportError;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport_http::Http;
use async_trait::async_trait;
use batchdrop::adapter::RpcEndpoint;
use batchdrop::chain::ChainId;
use batchdrop::error::RpcError;
use batchdrop::fee::FeeSample;
use batchdrop::submit::{LandedStatus, PollStatus, SignedPayload, SubmitMode, TxRef, ValidityWindow};
use serde::Deserialize;
use tower::ServiceBuilder;
#[cfg(feature = "telemetry")]
use tracing::Instrument;
use url::Url;

use crate::contract::IERC20;
use crate::error::EvmAdapterError;

/// Node responses meaning the exact transaction is already in the mempool.
const ALREADY_KNOWN: &[&str] = &["already known", "known transaction", "already imported"];

/// The signed nonce was already consumed.
const NONCE_TOO_LOW: &str = "nonce too low";

/// Generic message for receipts with `status = 0`.
const REVERTED: &str = "execution reverted";

/// An HTTP RPC URL with an optional requests-per-second limit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RpcUrl {
    /// Endpoint URL.
    pub url: Url,
    /// Requests per second; unlimited when absent.
    pub rate_limit: Option<u32>,
}

impl RpcUrl {
    /// An endpoint with no rate limit.
    #[must_use]
    pub const fn new(url: Url) -> Self {
        Self {
            url,
            rate_limit: None,
        }
    }

    /// Sets a requests-per-second limit.
    #[must_use]
    pub const fn with_rate_limit(mut self, rate_limit: u32) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }
}

/// JSON-RPC endpoint of one EVM chain.
#[derive(Debug, Clone)]
pub struct EvmEndpoint {
    chain: ChainId,
    provider: RootProvider,
}

impl EvmEndpoint {
    /// Creates an RPC client over throttled HTTP transports behind a fallback layer.
    ///
    /// Non-HTTP(S) URLs are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EvmAdapterError::NoEndpoints`] if no HTTP transport remains.
    pub fn rpc_client(chain: &ChainId, endpoints: &[RpcUrl]) -> Result<RpcClient, EvmAdapterError> {
        let transports = endpoints
            .iter()
            .filter(|endpoint| matches!(endpoint.url.scheme(), "http" | "https"))
            .map(|endpoint| {
                #[cfg(feature = "telemetry")]
                tracing::info!(chain = %chain, rpc_url = %endpoint.url, rate_limit = ?endpoint.rate_limit, "Using HTTP transport");
                ServiceBuilder::new()
                    .layer(ThrottleLayer::new(endpoint.rate_limit.unwrap_or(u32::MAX)))
                    .service(Http::new(endpoint.url.clone()))
            })
            .collect::<Vec<_>>();
        let active = NonZeroUsize::new(transports.len())
            .ok_or_else(|| EvmAdapterError::NoEndpoints(chain.to_string()))?;
        let fallback = ServiceBuilder::new()
            .layer(FallbackLayer::default().with_active_transport_count(active))
            .service(transports);
        Ok(RpcClient::new(fallback, false))
    }

    /// Connects to `endpoints` for `chain`.
    ///
    /// # Errors
    ///
    /// Returns [`EvmAdapterError::NoEndpoints`] if no HTTP transport is configured.
    pub fn new(chain: ChainId, endpoints: &[RpcUrl]) -> Result<Self, EvmAdapterError> {
        let client = Self::rpc_client(&chain, endpoints)?;
        Ok(Self {
            chain,
            provider: RootProvider::new(client),
        })
    }

    /// The chain this endpoint serves.
    #[must_use]
    pub const fn chain(&self) -> &ChainId {
        &self.chain
    }

    /// The underlying alloy provider.
    #[must_use]
    pub const fn provider(&self) -> &RootProvider {
        &self.provider
    }

    /// Reads ERC-20 `decimals()`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if the call fails or the token does not implement it.
    pub async fn token_decimals(&self, token: Address) -> Result<u8, RpcError> {
        IERC20::new(token, self.provider.clone())
            .decimals()
            .call()
            .await
            .map_err(RpcError::transport)
    }

    /// Reads ERC-20 `allowance(owner, spender)`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if the call fails.
    pub async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, RpcError> {
        IERC20::new(token, self.provider.clone())
            .allowance(owner, spender)
            .call()
            .await
            .map_err(RpcError::transport)
    }

    async fn receipt_status(&self, hash: B256) -> Result<LandedStatus, RpcError> {
        let fut = self.provider.get_transaction_receipt(hash);
        #[cfg(feature = "telemetry")]
        let receipt = fut
            .instrument(tracing::debug_span!("get_transaction_receipt", tx = %hash))
            .await;
        #[cfg(not(feature = "telemetry"))]
        let receipt = fut.await;
        Ok(match receipt.map_err(rpc_error)? {
            Some(receipt) if receipt.status() => LandedStatus::Landed,
            Some(_) => LandedStatus::Reverted(REVERTED.to_owned()),
            None => LandedStatus::Unknown,
        })
    }
}

#[async_trait]
impl RpcEndpoint for EvmEndpoint {
    type Account = Address;

    async fn submit_transaction(
        &self,
        payload: &SignedPayload,
        _mode: SubmitMode,
    ) -> Result<(), RpcError> {
        match self.provider.send_raw_transaction(&payload.raw).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let error = rpc_error(e);
                let message = error.message().to_ascii_lowercase();
                if ALREADY_KNOWN.iter().any(|p| message.contains(p)) {
                    Ok(())
                } else if message.contains(NONCE_TOO_LOW) {
                    Err(RpcError::ValidityWindowExceeded(error.message().to_owned()))
                } else {
                    Err(error)
                }
            }
        }
    }

    async fn confirmation_status(&self, payload: &SignedPayload) -> Result<PollStatus, RpcError> {
        let hash = parse_hash(&payload.reference)?;
        match self.receipt_status(hash).await? {
            LandedStatus::Landed => return Ok(PollStatus::Confirmed),
            LandedStatus::Reverted(reason) => return Ok(PollStatus::Reverted(reason)),
            LandedStatus::Unknown => {}
        }
        let Some(nonce) = payload.window.nonce else {
            return Ok(PollStatus::Pending);
        };
        let signer = Address::from_str(&payload.signer).map_err(RpcError::transport)?;
        let mined = self
            .provider
            .get_transaction_count(signer)
            .latest()
            .await
            .map_err(rpc_error)?;
        // The nonce was consumed by some transaction, but not by this one (yet).
        if mined > nonce {
            Ok(PollStatus::Expired)
        } else {
            Ok(PollStatus::Pending)
        }
    }

    async fn transaction_status(&self, reference: &TxRef) -> Result<LandedStatus, RpcError> {
        self.receipt_status(parse_hash(reference)?).await
    }

    async fn fee_paid(&self, reference: &TxRef) -> Result<Option<u128>, RpcError> {
        let receipt = self
            .provider
            .get_transaction_receipt(parse_hash(reference)?)
            .await
            .map_err(rpc_error)?;
        Ok(receipt.map(|receipt| {
            u128::from(receipt.gas_used).saturating_mul(receipt.effective_gas_price)
        }))
    }

    async fn recent_fee_sample(&self) -> Result<FeeSample, RpcError> {
        let gas_price = self.provider.get_gas_price().await.map_err(rpc_error)?;
        let priority_fee = self.provider.get_max_priority_fee_per_gas().await.ok();
        Ok(FeeSample::GasPrice {
            gas_price,
            priority_fee,
        })
    }

    async fn accounts_exist(&self, accounts: &[Address]) -> Result<Vec<bool>, RpcError> {
        Ok(vec![true; accounts.len()])
    }

    async fn latest_validity_window(&self, signer: &Address) -> Result<ValidityWindow, RpcError> {
        let nonce = self
            .provider
            .get_transaction_count(*signer)
            .pending()
            .await
            .map_err(rpc_error)?;
        Ok(ValidityWindow {
            anchor: nonce.to_string(),
            last_valid_height: None,
            nonce: Some(nonce),
        })
    }
}

fn parse_hash(reference: &TxRef) -> Result<B256, RpcError> {
    B256::from_str(reference.as_str())
        .map_err(|e| RpcError::transport(format!("invalid transaction hash {reference}: {e}")))
}

/// Node error responses are rejections; everything else is transport.
fn rpc_error(error: TransportError) -> RpcError {
    match error.as_error_resp() {
        Some(payload) => RpcError::rejected(&payload.message),
        None => RpcError::transport(error),
    }
}
