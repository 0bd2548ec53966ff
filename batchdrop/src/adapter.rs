//! Chain adapter and RPC endpoint contracts.
//!
//! The engine is chain-agnostic; everything that depends on a chain's wire format
//! lives behind two traits:
//!
//! - [`RpcEndpoint`] - the network calls the pipeline suspends on
//! - [`ChainAdapter`] - address derivation, batch budgets and transaction building
//!
//! Both are injected per disbursement, which keeps connection lifetimes explicit
//! and lets tests drive the pipeline with fakes.

use std::fmt;

use async_trait::async_trait;

use crate::batch::{Batch, BatchLimits};
use crate::chain::{ChainId, ChainKind};
use crate::error::{RpcError, SetupError, SignError};
use crate::fee::{FeeHint, FeeSample};
use crate::outcome::TransactionRecord;
use crate::resolve::{ResolvedRecipient, ResolvedTarget};
use crate::submit::{
    LandedStatus, PollStatus, SignedPayload, SubmitMode, Submitter, TxRef, ValidityWindow,
};

/// Design ceiling for account-creation transactions.
pub const CREATION_BATCH_CEILING: usize = 5;

/// Network calls the disbursement pipeline depends on.
#[async_trait]
pub trait RpcEndpoint: Send + Sync {
    /// Chain account type used in existence queries and validity-window lookups.
    type Account: Clone + Send + Sync + 'static;

    /// Broadcasts a signed payload.
    ///
    /// [`SubmitMode::Replay`] re-sends bytes that were already broadcast; nodes
    /// deduplicate by transaction identity, so a replay has no second effect.
    async fn submit_transaction(
        &self,
        payload: &SignedPayload,
        mode: SubmitMode,
    ) -> Result<(), RpcError>;

    /// Polls the confirmation state of a broadcast payload.
    ///
    /// Returns [`PollStatus::Expired`] when the payload's validity window has
    /// passed without a confirmation being observed.
    async fn confirmation_status(&self, payload: &SignedPayload) -> Result<PollStatus, RpcError>;

    /// Authoritative lookup of a transaction by reference, including history.
    async fn transaction_status(&self, reference: &TxRef) -> Result<LandedStatus, RpcError>;

    /// Native-currency fee a landed transaction paid, in base units (lamports or wei).
    ///
    /// `None` when the transaction is unknown or the chain does not report fees.
    async fn fee_paid(&self, _reference: &TxRef) -> Result<Option<u128>, RpcError> {
        Ok(None)
    }

    /// Samples the recent fee market.
    async fn recent_fee_sample(&self) -> Result<FeeSample, RpcError>;

    /// Reports, for each account, whether it exists on-chain.
    ///
    /// One logical batched query; the result has the same length and order as `accounts`.
    async fn accounts_exist(&self, accounts: &[Self::Account]) -> Result<Vec<bool>, RpcError>;

    /// Fetches a fresh validity window (recent blockhash or next nonce) for `signer`.
    async fn latest_validity_window(
        &self,
        signer: &Self::Account,
    ) -> Result<ValidityWindow, RpcError>;
}

/// Chain-specific strategy composed by the [`Disburser`](crate::Disburser).
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Parsed account/address type.
    type Account: Clone + fmt::Display + Send + Sync + 'static;
    /// RPC endpoint handle.
    type Endpoint: RpcEndpoint<Account = Self::Account>;

    /// Chain served by this adapter.
    fn chain_id(&self) -> &ChainId;

    /// Chain family, used for fee fallbacks.
    fn kind(&self) -> ChainKind;

    /// The endpoint this adapter was constructed with.
    fn endpoint(&self) -> &Self::Endpoint;

    /// Fee payer and signer of every transaction.
    fn signer(&self) -> &Self::Account;

    /// Decimals of the token being disbursed.
    fn decimals(&self) -> u8;

    /// Derives the destination account for a recipient address. Must not touch the network.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the address cannot receive this token.
    fn resolve(&self, address: &str) -> Result<ResolvedTarget<Self::Account>, String>;

    /// Rejects amounts the chain cannot represent.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason for unrepresentable amounts.
    fn check_amount(&self, _amount: u128) -> Result<(), String> {
        Ok(())
    }

    /// Whether destination accounts may need to be created before a transfer.
    fn requires_preconditions(&self) -> bool {
        false
    }

    /// Budget of one transfer transaction.
    fn transfer_limits(&self) -> BatchLimits;

    /// Budget of one account-creation transaction.
    fn creation_limits(&self) -> BatchLimits {
        BatchLimits::new(0, 1, u64::MAX).with_max_recipients(CREATION_BATCH_CEILING)
    }

    /// One-time setup before any transfer (contract deployment, allowance).
    ///
    /// Setup transactions go through the same submitter as batches. The returned
    /// records are appended to the report.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] when setup cannot complete; every resolved recipient
    /// is then reported failed.
    async fn prepare(
        &self,
        _submitter: &Submitter<'_, Self::Endpoint>,
        _recipients: &[ResolvedRecipient<Self::Account>],
    ) -> Result<Vec<TransactionRecord>, SetupError> {
        Ok(Vec::new())
    }

    /// Builds and signs a transaction creating the batch's destination accounts.
    ///
    /// # Errors
    ///
    /// Returns [`SignError`] when the transaction cannot be built or signed.
    async fn sign_creation(
        &self,
        _batch: &Batch<Self::Account>,
        _fee: &FeeHint,
        _window: &ValidityWindow,
    ) -> Result<SignedPayload, SignError> {
        Err(SignError::new("account creation is not supported on this chain"))
    }

    /// Builds and signs a transaction paying every recipient in the batch.
    ///
    /// # Errors
    ///
    /// Returns [`SignError`] when the transaction cannot be built or signed.
    async fn sign_transfer(
        &self,
        batch: &Batch<Self::Account>,
        fee: &FeeHint,
        window: &ValidityWindow,
    ) -> Result<SignedPayload, SignError>;
}
