//! In-memory chain used by unit tests.
//!
//! [`FakeEndpoint`] behaves like a deduplicating ledger: a payload's effect is
//! applied once no matter how often it is delivered. Behavior is scripted per
//! batch through the reference prefix `"{stage}-{batch_index}"`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::adapter::{ChainAdapter, RpcEndpoint};
use crate::batch::{Batch, BatchLimits};
use crate::chain::{ChainId, ChainKind};
use crate::error::{RpcError, SetupError, SignError};
use crate::fee::{FeeHint, FeeSample};
use crate::outcome::TransactionRecord;
use crate::resolve::{ResolvedRecipient, ResolvedTarget};
use crate::submit::{
    LandedStatus, PayloadSigner, PollStatus, SignedPayload, SubmitMode, Submitter, TxRef,
    ValidityWindow,
};

/// Fee every applied transaction pays.
pub(crate) const FAKE_FEE: u128 = 5_000;

/// Scripted chain behavior for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Behavior {
    /// Confirms on the n-th poll.
    ConfirmAfter(u32),
    /// Lands and fails with the given error.
    Revert(String),
    /// The initial submission is refused with the given error.
    RejectSubmit(String),
    /// Polling reports expiry; the history lookup finds it landed.
    ExpireButLanded,
    /// Polling reports expiry; the history lookup finds nothing.
    ExpireUnlanded,
    /// Pending for n polls, then expired; never landed.
    ExpireAfter(u32),
    /// The first signed payload expires unlanded; later ones confirm at once.
    ExpireUnlandedOnce,
    /// Polling fails with a window-exceeded error; the history lookup finds it landed.
    PollErrorButLanded,
    /// Polling never sees it; the history lookup finds it landed.
    SilentlyLanded,
    /// Never seen anywhere.
    NeverSeen,
}

#[derive(Debug, Default)]
struct Ledger {
    behaviors: HashMap<String, Behavior>,
    fail_fees: bool,
    fail_existence: bool,
    existing: HashSet<String>,
    windows: u32,
    deliveries: HashMap<TxRef, u32>,
    applied: HashMap<TxRef, u32>,
    polls: HashMap<TxRef, u32>,
    status_checks: HashMap<TxRef, u32>,
    first_by_prefix: HashMap<String, TxRef>,
}

impl Ledger {
    fn behavior(&mut self, reference: &TxRef) -> (Behavior, bool) {
        let prefix = reference
            .as_str()
            .rsplit_once('-')
            .map_or(reference.as_str(), |(prefix, _)| prefix)
            .to_owned();
        let first = self
            .first_by_prefix
            .entry(prefix.clone())
            .or_insert_with(|| reference.clone());
        let is_first = first == reference;
        let behavior = self
            .behaviors
            .get(&prefix)
            .cloned()
            .unwrap_or(Behavior::ConfirmAfter(1));
        (behavior, is_first)
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeEndpoint {
    ledger: Mutex<Ledger>,
}

impl FakeEndpoint {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap()
    }

    pub(crate) fn script(&self, prefix: &str, behavior: Behavior) {
        self.ledger().behaviors.insert(prefix.to_owned(), behavior);
    }

    pub(crate) fn fail_fee_sampling(&self) {
        self.ledger().fail_fees = true;
    }

    pub(crate) fn fail_existence_checks(&self) {
        self.ledger().fail_existence = true;
    }

    pub(crate) fn mark_existing(&self, account: &str) {
        self.ledger().existing.insert(account.to_owned());
    }

    /// Distinct signed payloads that reached the endpoint.
    pub(crate) fn signatures_issued(&self) -> usize {
        self.ledger().deliveries.len()
    }

    pub(crate) fn windows_issued(&self) -> u32 {
        self.ledger().windows
    }

    pub(crate) fn deliveries(&self, reference: &TxRef) -> u32 {
        self.ledger().deliveries.get(reference).copied().unwrap_or(0)
    }

    pub(crate) fn applied(&self, reference: &TxRef) -> u32 {
        self.ledger().applied.get(reference).copied().unwrap_or(0)
    }

    pub(crate) fn polls(&self, reference: &TxRef) -> u32 {
        self.ledger().polls.get(reference).copied().unwrap_or(0)
    }

    pub(crate) fn status_checks(&self, reference: &TxRef) -> u32 {
        self.ledger().status_checks.get(reference).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RpcEndpoint for FakeEndpoint {
    type Account = String;

    async fn submit_transaction(
        &self,
        payload: &SignedPayload,
        mode: SubmitMode,
    ) -> Result<(), RpcError> {
        let mut ledger = self.ledger();
        let reference = payload.reference.clone();
        *ledger.deliveries.entry(reference.clone()).or_default() += 1;
        let (behavior, _) = ledger.behavior(&reference);
        if let Behavior::RejectSubmit(message) = behavior {
            if mode == SubmitMode::Initial {
                return Err(RpcError::rejected(message));
            }
            return Ok(());
        }
        ledger.applied.entry(reference).or_insert(1);
        Ok(())
    }

    async fn confirmation_status(&self, payload: &SignedPayload) -> Result<PollStatus, RpcError> {
        let mut ledger = self.ledger();
        let reference = payload.reference.clone();
        let polls = {
            let count = ledger.polls.entry(reference.clone()).or_default();
            *count += 1;
            *count
        };
        let (behavior, is_first) = ledger.behavior(&reference);
        Ok(match behavior {
            Behavior::ConfirmAfter(n) if polls >= n => PollStatus::Confirmed,
            Behavior::Revert(reason) => PollStatus::Reverted(reason),
            Behavior::ExpireButLanded | Behavior::ExpireUnlanded => PollStatus::Expired,
            Behavior::ExpireAfter(n) if polls > n => PollStatus::Expired,
            Behavior::ExpireUnlandedOnce if is_first => PollStatus::Expired,
            Behavior::ExpireUnlandedOnce => PollStatus::Confirmed,
            Behavior::PollErrorButLanded => {
                return Err(RpcError::transport(
                    "Signature has expired: block height exceeded",
                ));
            }
            Behavior::ConfirmAfter(_)
            | Behavior::ExpireAfter(_)
            | Behavior::RejectSubmit(_)
            | Behavior::SilentlyLanded
            | Behavior::NeverSeen => PollStatus::Pending,
        })
    }

    async fn transaction_status(&self, reference: &TxRef) -> Result<LandedStatus, RpcError> {
        let mut ledger = self.ledger();
        *ledger.status_checks.entry(reference.clone()).or_default() += 1;
        let polls = ledger.polls.get(reference).copied().unwrap_or(0);
        let (behavior, is_first) = ledger.behavior(reference);
        Ok(match behavior {
            Behavior::ConfirmAfter(n) if polls >= n => LandedStatus::Landed,
            Behavior::Revert(reason) => LandedStatus::Reverted(reason),
            Behavior::ExpireButLanded
            | Behavior::PollErrorButLanded
            | Behavior::SilentlyLanded => LandedStatus::Landed,
            Behavior::ExpireUnlandedOnce if !is_first => LandedStatus::Landed,
            Behavior::ConfirmAfter(_)
            | Behavior::RejectSubmit(_)
            | Behavior::ExpireUnlanded
            | Behavior::ExpireAfter(_)
            | Behavior::ExpireUnlandedOnce
            | Behavior::NeverSeen => LandedStatus::Unknown,
        })
    }

    async fn fee_paid(&self, reference: &TxRef) -> Result<Option<u128>, RpcError> {
        let ledger = self.ledger();
        Ok(ledger.applied.contains_key(reference).then_some(FAKE_FEE))
    }

    async fn recent_fee_sample(&self) -> Result<FeeSample, RpcError> {
        if self.ledger().fail_fees {
            return Err(RpcError::transport("fee endpoint unavailable"));
        }
        Ok(FeeSample::PriorityFees(vec![15_000; 10]))
    }

    async fn accounts_exist(&self, accounts: &[String]) -> Result<Vec<bool>, RpcError> {
        let ledger = self.ledger();
        if ledger.fail_existence {
            return Err(RpcError::rejected("unauthorized"));
        }
        Ok(accounts
            .iter()
            .map(|account| ledger.existing.contains(account))
            .collect())
    }

    async fn latest_validity_window(&self, _signer: &String) -> Result<ValidityWindow, RpcError> {
        let mut ledger = self.ledger();
        ledger.windows += 1;
        Ok(ValidityWindow {
            anchor: format!("w{}", ledger.windows),
            last_valid_height: Some(u64::from(ledger.windows) + 150),
            nonce: None,
        })
    }
}

/// Signs a fixed prefix against whatever window it is given.
pub(crate) struct StaticSigner {
    prefix: String,
    payer: String,
}

impl StaticSigner {
    pub(crate) fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            payer: "payer".to_owned(),
        }
    }
}

#[async_trait]
impl PayloadSigner<String> for StaticSigner {
    fn signer(&self) -> &String {
        &self.payer
    }

    async fn sign(&self, window: &ValidityWindow) -> Result<SignedPayload, SignError> {
        Ok(SignedPayload {
            reference: TxRef::new(format!("{}-{}", self.prefix, window.anchor)),
            raw: self.prefix.as_bytes().to_vec(),
            signer: self.payer.clone(),
            window: window.clone(),
        })
    }
}

/// Adapter over [`FakeEndpoint`] whose addresses are ASCII alphanumeric strings.
pub(crate) struct FakeAdapter {
    chain: ChainId,
    endpoint: FakeEndpoint,
    payer: String,
    max_amount: Option<u128>,
    preconditions: bool,
    transfer_limits: BatchLimits,
    setup_failure: Option<String>,
}

impl FakeAdapter {
    pub(crate) fn new() -> Self {
        Self {
            chain: ChainId::new("solana", "fake"),
            endpoint: FakeEndpoint::new(),
            payer: "payer".to_owned(),
            max_amount: None,
            preconditions: false,
            transfer_limits: BatchLimits::new(0, 1, u64::MAX),
            setup_failure: None,
        }
    }

    pub(crate) fn with_max_amount(mut self, max: u128) -> Self {
        self.max_amount = Some(max);
        self
    }

    /// Destinations become `"ata:{owner}"` and must exist before a transfer.
    pub(crate) fn with_preconditions(mut self) -> Self {
        self.preconditions = true;
        self
    }

    pub(crate) fn with_transfer_limits(mut self, limits: BatchLimits) -> Self {
        self.transfer_limits = limits;
        self
    }

    pub(crate) fn with_setup_failure(mut self, message: &str) -> Self {
        self.setup_failure = Some(message.to_owned());
        self
    }

    fn payload(&self, stage: &str, batch: &Batch<String>, window: &ValidityWindow) -> SignedPayload {
        let body: Vec<&str> = batch.recipients.iter().map(|r| r.destination.as_str()).collect();
        SignedPayload {
            reference: TxRef::new(format!("{stage}-{}-{}", batch.index, window.anchor)),
            raw: body.join(",").into_bytes(),
            signer: self.payer.clone(),
            window: window.clone(),
        }
    }
}

#[async_trait]
impl ChainAdapter for FakeAdapter {
    type Account = String;
    type Endpoint = FakeEndpoint;

    fn chain_id(&self) -> &ChainId {
        &self.chain
    }

    fn kind(&self) -> ChainKind {
        ChainKind::Solana
    }

    fn endpoint(&self) -> &FakeEndpoint {
        &self.endpoint
    }

    fn signer(&self) -> &String {
        &self.payer
    }

    fn decimals(&self) -> u8 {
        6
    }

    fn resolve(&self, address: &str) -> Result<ResolvedTarget<String>, String> {
        if address.is_empty() || !address.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("{address:?} is not alphanumeric"));
        }
        let owner = address.to_owned();
        if self.preconditions {
            Ok(ResolvedTarget {
                destination: format!("ata:{owner}"),
                owner,
            })
        } else {
            Ok(ResolvedTarget::direct(owner))
        }
    }

    fn check_amount(&self, amount: u128) -> Result<(), String> {
        match self.max_amount {
            Some(max) if amount > max => Err(format!("exceeds {max}")),
            _ => Ok(()),
        }
    }

    fn requires_preconditions(&self) -> bool {
        self.preconditions
    }

    fn transfer_limits(&self) -> BatchLimits {
        self.transfer_limits
    }

    async fn prepare(
        &self,
        _submitter: &Submitter<'_, FakeEndpoint>,
        _recipients: &[ResolvedRecipient<String>],
    ) -> Result<Vec<TransactionRecord>, SetupError> {
        match &self.setup_failure {
            Some(message) => Err(SetupError::new(message)),
            None => Ok(Vec::new()),
        }
    }

    async fn sign_creation(
        &self,
        batch: &Batch<String>,
        _fee: &FeeHint,
        window: &ValidityWindow,
    ) -> Result<SignedPayload, SignError> {
        Ok(self.payload("creation", batch, window))
    }

    async fn sign_transfer(
        &self,
        batch: &Batch<String>,
        _fee: &FeeHint,
        window: &ValidityWindow,
    ) -> Result<SignedPayload, SignError> {
        Ok(self.payload("transfer", batch, window))
    }
}
