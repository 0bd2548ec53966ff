//! JSON-RPC endpoint for Solana clusters.
//!
//! - the validity window is a recent blockhash and its last valid block height
//! - a transaction is expired once the cluster's block height passed that height
//! - the authoritative lookup searches the full signature-status history

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use batchdrop::adapter::RpcEndpoint;
use batchdrop::chain::ChainId;
use batchdrop::error::RpcError;
use batchdrop::fee::FeeSample;
use batchdrop::submit::{LandedStatus, PollStatus, SignedPayload, SubmitMode, TxRef, ValidityWindow};
use serde::Deserialize;
use serde_json::json;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::RpcRequest;
use solana_commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;

use crate::program::SolanaToken;

/// Keys accepted by one `getMultipleAccounts` call.
pub const MAX_MULTIPLE_ACCOUNTS: usize = 100;

/// Default per-request HTTP timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The part of a `getTransaction` response the fee lookup reads.
#[derive(Debug, Deserialize)]
struct LandedTransaction {
    meta: Option<TransactionMeta>,
}

#[derive(Debug, Deserialize)]
struct TransactionMeta {
    fee: u64,
}

/// JSON-RPC endpoint of one Solana cluster.
#[derive(Clone)]
pub struct SolanaEndpoint {
    chain: ChainId,
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl fmt::Debug for SolanaEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaEndpoint")
            .field("chain", &self.chain)
            .field("url", &self.client.url())
            .field("commitment", &self.commitment)
            .finish()
    }
}

impl SolanaEndpoint {
    /// Connects to `url` at `confirmed` commitment.
    #[must_use]
    pub fn new(chain: ChainId, url: impl Into<String>) -> Self {
        let commitment = CommitmentConfig::confirmed();
        let client = RpcClient::new_with_timeout_and_commitment(url.into(), DEFAULT_TIMEOUT, commitment);
        Self {
            chain,
            client: Arc::new(client),
            commitment,
        }
    }

    /// The cluster this endpoint serves.
    #[must_use]
    pub const fn chain(&self) -> &ChainId {
        &self.chain
    }

    /// The underlying RPC client.
    #[must_use]
    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    /// Reads a mint account and detects its token program.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if the account cannot be fetched, or a rejection when it
    /// is not a mint.
    pub async fn fetch_mint(&self, mint: &Pubkey) -> Result<SolanaToken, RpcError> {
        let account = self.client.get_account(mint).await.map_err(rpc_error)?;
        SolanaToken::from_mint_account(*mint, &account.owner, &account.data)
            .map_err(RpcError::Rejected)
    }

    fn status_of(err: Option<impl fmt::Display>, confirmed: bool) -> LandedStatus {
        match err {
            Some(err) => LandedStatus::Reverted(err.to_string()),
            None if confirmed => LandedStatus::Landed,
            None => LandedStatus::Unknown,
        }
    }
}

#[async_trait]
impl RpcEndpoint for SolanaEndpoint {
    type Account = Pubkey;

    async fn submit_transaction(
        &self,
        payload: &SignedPayload,
        mode: SubmitMode,
    ) -> Result<(), RpcError> {
        let tx: VersionedTransaction =
            bincode::deserialize(&payload.raw).map_err(|e| RpcError::transport(e.to_string()))?;
        // Replays skip preflight: a landed transaction fails simulation as already processed.
        let config = RpcSendTransactionConfig {
            skip_preflight: mode == SubmitMode::Replay,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };
        self.client
            .send_transaction_with_config(&tx, config)
            .await
            .map(|_| ())
            .map_err(rpc_error)
    }

    async fn confirmation_status(&self, payload: &SignedPayload) -> Result<PollStatus, RpcError> {
        let signature = parse_signature(&payload.reference)?;
        let statuses = self
            .client
            .get_signature_statuses(&[signature])
            .await
            .map_err(rpc_error)?
            .value;
        if let Some(Some(status)) = statuses.into_iter().next() {
            let confirmed = status.satisfies_commitment(self.commitment);
            return Ok(match Self::status_of(status.err, confirmed) {
                LandedStatus::Landed => PollStatus::Confirmed,
                LandedStatus::Reverted(reason) => PollStatus::Reverted(reason),
                LandedStatus::Unknown => PollStatus::Pending,
            });
        }

        let Some(last_valid) = payload.window.last_valid_height else {
            return Ok(PollStatus::Pending);
        };
        let height = self
            .client
            .get_block_height_with_commitment(self.commitment)
            .await
            .map_err(rpc_error)?;
        if height > last_valid {
            Ok(PollStatus::Expired)
        } else {
            Ok(PollStatus::Pending)
        }
    }

    async fn transaction_status(&self, reference: &TxRef) -> Result<LandedStatus, RpcError> {
        let signature = parse_signature(reference)?;
        let statuses = self
            .client
            .get_signature_statuses_with_history(&[signature])
            .await
            .map_err(rpc_error)?
            .value;
        Ok(match statuses.into_iter().next() {
            Some(Some(status)) => {
                let confirmed = status.satisfies_commitment(self.commitment);
                Self::status_of(status.err, confirmed)
            }
            _ => LandedStatus::Unknown,
        })
    }

    async fn fee_paid(&self, reference: &TxRef) -> Result<Option<u128>, RpcError> {
        let signature = parse_signature(reference)?;
        let params = json!([
            signature.to_string(),
            {
                "encoding": "json",
                "commitment": self.commitment.commitment.to_string(),
                "maxSupportedTransactionVersion": 0
            }
        ]);
        let landed: Option<LandedTransaction> = self
            .client
            .send(RpcRequest::GetTransaction, params)
            .await
            .map_err(rpc_error)?;
        Ok(landed
            .and_then(|tx| tx.meta)
            .map(|meta| u128::from(meta.fee)))
    }

    async fn recent_fee_sample(&self) -> Result<FeeSample, RpcError> {
        let fees = self
            .client
            .get_recent_prioritization_fees(&[])
            .await
            .map_err(rpc_error)?;
        Ok(FeeSample::PriorityFees(
            fees.into_iter().map(|fee| fee.prioritization_fee).collect(),
        ))
    }

    async fn accounts_exist(&self, accounts: &[Pubkey]) -> Result<Vec<bool>, RpcError> {
        let mut exists = Vec::with_capacity(accounts.len());
        for chunk in accounts.chunks(MAX_MULTIPLE_ACCOUNTS) {
            let found = self
                .client
                .get_multiple_accounts_with_commitment(chunk, self.commitment)
                .await
                .map_err(rpc_error)?
                .value;
            if found.len() != chunk.len() {
                return Err(RpcError::transport(format!(
                    "getMultipleAccounts returned {} entries for {} keys",
                    found.len(),
                    chunk.len()
                )));
            }
            exists.extend(found.iter().map(Option::is_some));
        }
        #[cfg(feature = "telemetry")]
        tracing::debug!(
            accounts = accounts.len(),
            missing = exists.iter().filter(|e| !**e).count(),
            "Checked account existence"
        );
        Ok(exists)
    }

    async fn latest_validity_window(&self, _signer: &Pubkey) -> Result<ValidityWindow, RpcError> {
        let (blockhash, last_valid_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(rpc_error)?;
        Ok(ValidityWindow {
            anchor: blockhash.to_string(),
            last_valid_height: Some(last_valid_height),
            nonce: None,
        })
    }
}

fn parse_signature(reference: &TxRef) -> Result<Signature, RpcError> {
    Signature::from_str(reference.as_str())
        .map_err(|e| RpcError::transport(format!("invalid signature {reference}: {e}")))
}

/// Node answers are rejections; everything else is transport.
fn rpc_error(error: ClientError) -> RpcError {
    let rejected = matches!(
        error.kind(),
        ClientErrorKind::RpcError(_) | ClientErrorKind::TransactionError(_)
    );
    if rejected {
        RpcError::rejected(error)
    } else {
        RpcError::transport(error)
    }
}
