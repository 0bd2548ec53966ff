//! Transaction submitter and confirmation tracker.
//!
//! Every batch (and every setup transaction) is driven through one state machine:
//!
//! ```text
//! Built -> Submitted -> { Confirmed, Expired, Failed }
//!                          Expired -> { Confirmed, Failed }   (authoritative status check)
//! ```
//!
//! Two transitions are kept strictly apart:
//!
//! - **replay**: re-broadcast the identical signed bytes. Always safe; the chain
//!   deduplicates by transaction identity.
//! - **fresh attempt**: fetch a new validity window and sign again. This creates a
//!   second valid transaction, so it is only allowed after the first one is known
//!   not to have landed, and only for callers that opt in (idempotent account
//!   creation).
//!
//! A submitted transaction is never abandoned without an authoritative status
//! check, including on cancellation. Nor is it declared failed while its
//! validity window is still open: once the poll budget is spent, the submitter
//! keeps watching until the window closes or `pending_timeout` passes.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::adapter::RpcEndpoint;
use crate::error::{FailureKind, RpcError, SignError};
use crate::retry::{ErrorClass, RetryPolicy, classify};

/// Reason attached to batches whose validity window passed without landing.
pub const EXPIRED_REASON: &str = "transaction expired before confirmation";

/// Awaits a future, optionally instrumenting it with a tracing span.
macro_rules! traced {
    ($fut:expr, $span:expr) => {{
        #[cfg(feature = "telemetry")]
        {
            use tracing::Instrument;
            $fut.instrument($span).await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            $fut.await
        }
    }};
}

/// Chain-native transaction identifier (signature or hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(String);

impl TxRef {
    /// Wraps a transaction identifier.
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The time-bounded reference a signed transaction cites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityWindow {
    /// Recent blockhash (Solana) or nonce (EVM), as text.
    pub anchor: String,
    /// Last block height at which the transaction can still be accepted.
    pub last_valid_height: Option<u64>,
    /// Sender nonce the transaction consumes.
    pub nonce: Option<u64>,
}

/// A transaction signed and serialized exactly once.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// Identity of the transaction.
    pub reference: TxRef,
    /// Wire bytes, re-sent verbatim on replay.
    pub raw: Vec<u8>,
    /// Fee payer, as text.
    pub signer: String,
    /// Window the transaction was signed against.
    pub window: ValidityWindow,
}

impl fmt::Debug for SignedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedPayload")
            .field("reference", &self.reference)
            .field("bytes", &self.raw.len())
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

/// Whether a broadcast is the first one or a replay of identical bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// First broadcast; nodes may run preflight checks.
    Initial,
    /// Re-broadcast of bytes already sent.
    Replay,
}

/// Result of one confirmation poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Not yet confirmed, window still open.
    Pending,
    /// Confirmed successfully.
    Confirmed,
    /// Included but failed on-chain, with the chain's error payload.
    Reverted(String),
    /// The validity window passed without an observed confirmation.
    Expired,
}

/// Result of an authoritative status lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LandedStatus {
    /// Included and successful at confirmed commitment or better.
    Landed,
    /// Included and failed.
    Reverted(String),
    /// Not known to the chain.
    Unknown,
}

/// Pipeline stage a transaction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// One-time setup (contract deployment, allowance).
    Setup,
    /// Destination account creation.
    Creation,
    /// Recipient transfers.
    Transfer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Creation => f.write_str("creation"),
            Self::Transfer => f.write_str("transfer"),
        }
    }
}

/// Identifies one submission for logs and records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionLabel {
    /// Pipeline stage.
    pub stage: Stage,
    /// Batch index within the stage.
    pub batch_index: usize,
}

impl SubmissionLabel {
    /// Creates a label.
    #[must_use]
    pub const fn new(stage: Stage, batch_index: usize) -> Self {
        Self { stage, batch_index }
    }
}

impl fmt::Display for SubmissionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.stage, self.batch_index)
    }
}

/// States of the submission state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    /// Signed, not yet broadcast.
    Built,
    /// Broadcast at least once (or possibly in flight).
    Submitted,
    /// Confirmed on-chain.
    Confirmed,
    /// Validity window passed; awaiting authoritative check.
    Expired,
    /// Definitely not successful.
    Failed,
}

impl SubmissionState {
    const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Built, Self::Submitted | Self::Expired | Self::Failed)
                | (
                    Self::Submitted,
                    Self::Confirmed | Self::Expired | Self::Failed
                )
                | (Self::Expired, Self::Confirmed | Self::Failed)
        )
    }
}

/// Mutable state of one signed payload's confirmation loop.
///
/// Owned by the submitter for the lifetime of one attempt and never shared.
#[derive(Debug)]
pub struct SubmissionAttempt {
    /// Which batch this attempt carries.
    pub label: SubmissionLabel,
    /// The bytes being driven to a terminal state.
    pub payload: SignedPayload,
    /// When the payload was first broadcast.
    pub first_submitted_at: Option<Instant>,
    /// Failed RPC interactions so far.
    pub retry_count: u32,
    /// Replays of the identical payload so far.
    pub replay_count: u32,
    /// Most recent RPC error text.
    pub last_error: Option<String>,
    state: SubmissionState,
}

impl SubmissionAttempt {
    /// Creates an attempt in the `Built` state.
    #[must_use]
    pub const fn new(label: SubmissionLabel, payload: SignedPayload) -> Self {
        Self {
            label,
            payload,
            first_submitted_at: None,
            retry_count: 0,
            replay_count: 0,
            last_error: None,
            state: SubmissionState::Built,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SubmissionState {
        self.state
    }

    fn transition(&mut self, next: SubmissionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {next:?}",
            self.state
        );
        #[cfg(feature = "telemetry")]
        tracing::debug!(
            batch = %self.label,
            tx = %self.payload.reference,
            from = ?self.state,
            to = ?next,
            "Submission state change"
        );
        self.state = next;
    }

    fn record_error(&mut self, error: &RpcError) {
        self.retry_count += 1;
        self.last_error = Some(error.message().to_owned());
    }
}

/// Terminal result of driving one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The transaction landed successfully.
    Confirmed {
        /// Landed transaction.
        reference: TxRef,
    },
    /// The batch did not succeed.
    Failed {
        /// Last signed transaction, if one was built.
        reference: Option<TxRef>,
        /// Failure class reported on every recipient of the batch.
        kind: FailureKind,
        /// Actionable reason.
        reason: String,
    },
}

impl Settlement {
    /// Reference of the transaction, if one was built.
    #[must_use]
    pub const fn reference(&self) -> Option<&TxRef> {
        match self {
            Self::Confirmed { reference } => Some(reference),
            Self::Failed { reference, .. } => reference.as_ref(),
        }
    }

    /// Returns `true` for a confirmed settlement.
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    fn failed(reference: Option<TxRef>, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::Failed {
            reference,
            kind,
            reason: reason.into(),
        }
    }
}

/// Builds the signed payload for a submission, given a fresh validity window.
#[async_trait]
pub trait PayloadSigner<A>: Send + Sync {
    /// The account that signs and pays.
    fn signer(&self) -> &A;

    /// Builds, signs and serializes the transaction once.
    async fn sign(&self, window: &ValidityWindow) -> Result<SignedPayload, SignError>;
}

/// Confirmation loop tunables.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitterConfig {
    /// Confirmation polls before the final status check.
    pub max_iterations: u32,
    /// Re-broadcast the identical payload every this many polls.
    pub rebroadcast_every: u32,
    /// Delay between polls while the transaction is pending.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "poll_interval_ms")]
    pub poll_interval: Duration,
    /// Fresh (re-signed) attempts allowed for account-creation batches after an
    /// expiry that did not land.
    pub creation_fresh_attempts: u32,
    /// Upper bound on any single RPC call.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "rpc_timeout_ms")]
    pub rpc_timeout: Duration,
    /// How long to keep watching, after the poll budget, a transaction whose
    /// validity window is still open.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "pending_timeout_ms")]
    pub pending_timeout: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            rebroadcast_every: 2,
            poll_interval: Duration::from_secs(1),
            creation_fresh_attempts: 2,
            rpc_timeout: Duration::from_secs(15),
            pending_timeout: Duration::from_secs(300),
        }
    }
}

enum Drive {
    Settled(Settlement),
    ExpiredUnlanded(TxRef),
}

/// Drives signed payloads to a terminal state against one endpoint.
pub struct Submitter<'a, E> {
    endpoint: &'a E,
    config: &'a SubmitterConfig,
    retry: &'a RetryPolicy,
    cancel: &'a CancellationToken,
}

impl<E> fmt::Debug for Submitter<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submitter")
            .field("config", self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<'a, E: RpcEndpoint> Submitter<'a, E> {
    /// Creates a submitter.
    #[must_use]
    pub const fn new(
        endpoint: &'a E,
        config: &'a SubmitterConfig,
        retry: &'a RetryPolicy,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            endpoint,
            config,
            retry,
            cancel,
        }
    }

    /// The endpoint transactions are sent through.
    #[must_use]
    pub const fn endpoint(&self) -> &'a E {
        self.endpoint
    }

    /// The retry policy used for RPC calls.
    #[must_use]
    pub const fn retry_policy(&self) -> &'a RetryPolicy {
        self.retry
    }

    /// Whether the operator asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Signs and drives one submission to a terminal [`Settlement`].
    ///
    /// `fresh_attempts` bounds how many times the payload may be re-signed with a
    /// new validity window after an expiry that provably did not land. Pass zero
    /// for anything that is not idempotent.
    pub async fn submit<S>(
        &self,
        label: SubmissionLabel,
        signer: &S,
        fresh_attempts: u32,
    ) -> Settlement
    where
        S: PayloadSigner<E::Account> + ?Sized,
    {
        let mut fresh_left = fresh_attempts;
        loop {
            let window = self
                .retry
                .run_until("latest_validity_window", self.cancel, || {
                    self.timed(self.endpoint.latest_validity_window(signer.signer()))
                })
                .await;
            let window = match window {
                Ok(window) => window,
                Err(e) => {
                    return Settlement::failed(
                        None,
                        rpc_failure_kind(&e),
                        format!("failed to fetch validity window: {}", e.message()),
                    );
                }
            };
            let payload = match signer.sign(&window).await {
                Ok(payload) => payload,
                Err(e) => return Settlement::failed(None, FailureKind::TerminalChain, e.to_string()),
            };

            #[cfg(feature = "telemetry")]
            let span = tracing::info_span!("submit_batch", batch = %label, tx = %payload.reference);
            let mut attempt = SubmissionAttempt::new(label, payload);
            let outcome = traced!(self.drive(&mut attempt), span);
            match outcome {
                Drive::Settled(settlement) => return settlement,
                Drive::ExpiredUnlanded(reference) => {
                    if fresh_left > 0 && !self.is_cancelled() {
                        fresh_left -= 1;
                        #[cfg(feature = "telemetry")]
                        tracing::warn!(
                            batch = %label,
                            tx = %reference,
                            remaining = fresh_left,
                            "Expired without landing, re-signing with a fresh validity window"
                        );
                        continue;
                    }
                    return Settlement::failed(
                        Some(reference),
                        FailureKind::TransientRpc,
                        EXPIRED_REASON,
                    );
                }
            }
        }
    }

    async fn drive(&self, attempt: &mut SubmissionAttempt) -> Drive {
        let reference = attempt.payload.reference.clone();
        let sent = self.timed(
            self.endpoint
                .submit_transaction(&attempt.payload, SubmitMode::Initial),
        );
        match sent.await {
            Ok(()) => {}
            Err(e) if e.is_validity_window_exceeded() => {
                attempt.record_error(&e);
                attempt.transition(SubmissionState::Expired);
                return self.resolve_expired(attempt).await;
            }
            Err(e) if classify(e.message()) == ErrorClass::Terminal => {
                attempt.record_error(&e);
                attempt.transition(SubmissionState::Failed);
                #[cfg(feature = "telemetry")]
                tracing::warn!(batch = %attempt.label, tx = %reference, error = %e, "Submission rejected");
                return Drive::Settled(Settlement::failed(
                    Some(reference),
                    FailureKind::TerminalChain,
                    e.message(),
                ));
            }
            // The bytes may still have reached a node; replays and the final
            // status check settle it.
            Err(e) => attempt.record_error(&e),
        }
        attempt.first_submitted_at = Some(Instant::now());
        attempt.transition(SubmissionState::Submitted);
        #[cfg(feature = "telemetry")]
        tracing::info!(batch = %attempt.label, tx = %reference, "Transaction submitted");

        for iteration in 0..self.config.max_iterations {
            if self.is_cancelled() {
                break;
            }
            if iteration > 0 && iteration % self.config.rebroadcast_every.max(1) == 0 {
                self.replay(attempt).await;
            }

            let polled = self.timed(self.endpoint.confirmation_status(&attempt.payload));
            let wait = match polled.await {
                Ok(PollStatus::Confirmed) => {
                    attempt.transition(SubmissionState::Confirmed);
                    return Drive::Settled(confirmed(attempt));
                }
                Ok(PollStatus::Reverted(reason)) => {
                    attempt.transition(SubmissionState::Failed);
                    return Drive::Settled(reverted(attempt, reason));
                }
                Ok(PollStatus::Expired) => {
                    attempt.transition(SubmissionState::Expired);
                    return self.resolve_expired(attempt).await;
                }
                Err(e) if e.is_validity_window_exceeded() => {
                    attempt.record_error(&e);
                    attempt.transition(SubmissionState::Expired);
                    return self.resolve_expired(attempt).await;
                }
                Ok(PollStatus::Pending) => self.config.poll_interval,
                Err(e) => {
                    attempt.record_error(&e);
                    if classify(e.message()) == ErrorClass::Terminal {
                        break;
                    }
                    self.retry.delay(attempt.retry_count).max(self.config.poll_interval)
                }
            };

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
        }

        self.final_check(attempt).await
    }

    /// Re-broadcasts the identical payload.
    async fn replay(&self, attempt: &mut SubmissionAttempt) {
        attempt.replay_count += 1;
        let replay = self.timed(
            self.endpoint
                .submit_transaction(&attempt.payload, SubmitMode::Replay),
        );
        if let Err(_e) = replay.await {
            #[cfg(feature = "telemetry")]
            tracing::debug!(batch = %attempt.label, tx = %attempt.payload.reference, error = %_e, "Replay not accepted");
        }
    }

    /// Authoritative check after the validity window passed.
    async fn resolve_expired(&self, attempt: &mut SubmissionAttempt) -> Drive {
        let reference = attempt.payload.reference.clone();
        match self.authoritative_status(&reference).await {
            Ok(LandedStatus::Landed) => {
                attempt.transition(SubmissionState::Confirmed);
                Drive::Settled(confirmed(attempt))
            }
            Ok(LandedStatus::Reverted(reason)) => {
                attempt.transition(SubmissionState::Failed);
                Drive::Settled(reverted(attempt, reason))
            }
            Ok(LandedStatus::Unknown) => {
                attempt.transition(SubmissionState::Failed);
                #[cfg(feature = "telemetry")]
                tracing::warn!(batch = %attempt.label, tx = %reference, "Expired before confirmation");
                Drive::ExpiredUnlanded(reference)
            }
            Err(e) => {
                attempt.transition(SubmissionState::Failed);
                Drive::Settled(Settlement::failed(
                    Some(reference),
                    FailureKind::TransientRpc,
                    format!(
                        "validity window passed and the status check failed: {}",
                        e.message()
                    ),
                ))
            }
        }
    }

    /// Mandatory last look before declaring failure.
    ///
    /// A transaction the chain does not know yet, but whose window is still open,
    /// is watched until the window closes instead of being reported failed.
    async fn final_check(&self, attempt: &mut SubmissionAttempt) -> Drive {
        let reference = attempt.payload.reference.clone();
        let mut watched = false;
        loop {
            match self.authoritative_status(&reference).await {
                Ok(LandedStatus::Landed) => {
                    attempt.transition(SubmissionState::Confirmed);
                    return Drive::Settled(confirmed(attempt));
                }
                Ok(LandedStatus::Reverted(reason)) => {
                    attempt.transition(SubmissionState::Failed);
                    return Drive::Settled(reverted(attempt, reason));
                }
                Ok(LandedStatus::Unknown) if !watched && !self.is_cancelled() => {
                    watched = true;
                    if let Some(drive) = self.watch_open_window(attempt).await {
                        return drive;
                    }
                }
                Ok(LandedStatus::Unknown) => {
                    attempt.transition(SubmissionState::Failed);
                    let reason = self.unconfirmed_reason(attempt, watched);
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(batch = %attempt.label, tx = %reference, %reason, "Confirmation failed");
                    return Drive::Settled(Settlement::failed(
                        Some(reference),
                        FailureKind::TransientRpc,
                        reason,
                    ));
                }
                Err(e) => {
                    attempt.transition(SubmissionState::Failed);
                    return Drive::Settled(Settlement::failed(
                        Some(reference),
                        FailureKind::TransientRpc,
                        format!("final status check failed: {}", e.message()),
                    ));
                }
            }
        }
    }

    /// Polls past the iteration budget while the validity window stays open.
    ///
    /// Returns `None` when the transaction is still undecided at `pending_timeout`
    /// or on cancellation.
    async fn watch_open_window(&self, attempt: &mut SubmissionAttempt) -> Option<Drive> {
        let deadline = Instant::now() + self.config.pending_timeout;
        let mut polls: u32 = 0;
        #[cfg(feature = "telemetry")]
        tracing::info!(
            batch = %attempt.label,
            tx = %attempt.payload.reference,
            timeout_ms = u64::try_from(self.config.pending_timeout.as_millis()).unwrap_or(u64::MAX),
            "Poll budget spent, watching until the validity window closes"
        );
        while Instant::now() < deadline {
            let polled = self.timed(self.endpoint.confirmation_status(&attempt.payload));
            match polled.await {
                Ok(PollStatus::Confirmed) => {
                    attempt.transition(SubmissionState::Confirmed);
                    return Some(Drive::Settled(confirmed(attempt)));
                }
                Ok(PollStatus::Reverted(reason)) => {
                    attempt.transition(SubmissionState::Failed);
                    return Some(Drive::Settled(reverted(attempt, reason)));
                }
                Ok(PollStatus::Expired) => {
                    attempt.transition(SubmissionState::Expired);
                    return Some(self.resolve_expired(attempt).await);
                }
                Err(e) if e.is_validity_window_exceeded() => {
                    attempt.record_error(&e);
                    attempt.transition(SubmissionState::Expired);
                    return Some(self.resolve_expired(attempt).await);
                }
                Ok(PollStatus::Pending) => {}
                Err(e) => attempt.record_error(&e),
            }

            polls += 1;
            if polls % self.config.rebroadcast_every.max(1) == 0 {
                self.replay(attempt).await;
            }
            let wait = self
                .config
                .poll_interval
                .min(deadline.saturating_duration_since(Instant::now()));
            tokio::select! {
                () = self.cancel.cancelled() => return None,
                () = tokio::time::sleep(wait) => {}
            }
        }
        None
    }

    fn unconfirmed_reason(&self, attempt: &SubmissionAttempt, watched: bool) -> String {
        let mut reason = if self.is_cancelled() {
            "cancelled before confirmation; transaction not found on-chain".to_owned()
        } else if watched {
            format!(
                "still unconfirmed after {}s with its validity window open; \
                 transaction not found on-chain but may still land",
                self.config.pending_timeout.as_secs()
            )
        } else {
            format!(
                "not confirmed after {} polls; transaction not found on-chain",
                self.config.max_iterations
            )
        };
        if let Some(last) = &attempt.last_error {
            reason.push_str(" (last error: ");
            reason.push_str(last);
            reason.push(')');
        }
        reason
    }

    // Not cut short by cancellation: the outcome must be definite.
    async fn authoritative_status(&self, reference: &TxRef) -> Result<LandedStatus, RpcError> {
        self.retry
            .run("transaction_status", || {
                self.timed(self.endpoint.transaction_status(reference))
            })
            .await
    }

    /// Bounds an RPC future by the configured per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns the future's own error, or [`RpcError::Transport`] on timeout.
    pub async fn timed<T>(
        &self,
        fut: impl Future<Output = Result<T, RpcError>>,
    ) -> Result<T, RpcError> {
        tokio::time::timeout(self.config.rpc_timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(RpcError::transport(format!(
                    "request timed out after {}ms",
                    self.config.rpc_timeout.as_millis()
                )))
            })
    }
}

fn confirmed(attempt: &SubmissionAttempt) -> Settlement {
    #[cfg(feature = "telemetry")]
    tracing::info!(
        batch = %attempt.label,
        tx = %attempt.payload.reference,
        replays = attempt.replay_count,
        elapsed_ms = attempt
            .first_submitted_at
            .map(|t| u64::try_from(t.elapsed().as_millis()).unwrap_or(u64::MAX)),
        "Transaction confirmed"
    );
    Settlement::Confirmed {
        reference: attempt.payload.reference.clone(),
    }
}

fn reverted(attempt: &SubmissionAttempt, reason: String) -> Settlement {
    #[cfg(feature = "telemetry")]
    tracing::warn!(batch = %attempt.label, tx = %attempt.payload.reference, %reason, "Transaction failed on-chain");
    Settlement::failed(
        Some(attempt.payload.reference.clone()),
        FailureKind::TerminalChain,
        format!("transaction failed on-chain: {reason}"),
    )
}

fn rpc_failure_kind(error: &RpcError) -> FailureKind {
    match classify(error.message()) {
        ErrorClass::Terminal => FailureKind::TerminalChain,
        ErrorClass::Retryable => FailureKind::TransientRpc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{Behavior, FakeEndpoint, StaticSigner};

    fn harness() -> (SubmitterConfig, RetryPolicy, CancellationToken) {
        (
            SubmitterConfig::default(),
            RetryPolicy::default(),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirms_after_polls() {
        let endpoint = FakeEndpoint::new();
        endpoint.script("transfer-0", Behavior::ConfirmAfter(3));
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        assert!(settlement.is_confirmed());
        assert_eq!(endpoint.signatures_issued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_has_single_ledger_effect() {
        let endpoint = FakeEndpoint::new();
        endpoint.script("transfer-0", Behavior::ConfirmAfter(8));
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        let reference = settlement.reference().unwrap().clone();
        assert!(settlement.is_confirmed());
        assert!(endpoint.deliveries(&reference) > 1, "payload was replayed");
        assert_eq!(endpoint.applied(&reference), 1);
        assert_eq!(endpoint.signatures_issued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_then_landed_is_success() {
        let endpoint = FakeEndpoint::new();
        endpoint.script("transfer-0", Behavior::ExpireButLanded);
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        assert!(settlement.is_confirmed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_then_absent_fails_without_resubmission() {
        let endpoint = FakeEndpoint::new();
        endpoint.script("transfer-0", Behavior::ExpireUnlanded);
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        let Settlement::Failed { reason, kind, .. } = settlement else {
            panic!("expected failure");
        };
        assert!(reason.contains("expired before confirmation"));
        assert_eq!(kind, FailureKind::TransientRpc);
        assert_eq!(endpoint.signatures_issued(), 1);
        assert_eq!(endpoint.windows_issued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_error_from_poll_is_resolved_by_status_check() {
        let endpoint = FakeEndpoint::new();
        endpoint.script("transfer-0", Behavior::PollErrorButLanded);
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        assert!(settlement.is_confirmed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_attempt_only_when_allowed() {
        let endpoint = FakeEndpoint::new();
        endpoint.script("creation-0", Behavior::ExpireUnlandedOnce);
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("creation-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Creation, 0), &signer, 2)
            .await;
        assert!(settlement.is_confirmed());
        assert_eq!(endpoint.signatures_issued(), 2);
        assert_eq!(endpoint.windows_issued(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_loop_runs_final_check() {
        let endpoint = FakeEndpoint::new();
        endpoint.script("transfer-0", Behavior::SilentlyLanded);
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        assert!(settlement.is_confirmed());
        assert_eq!(
            endpoint.polls(settlement.reference().unwrap()),
            config.max_iterations
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_loop_without_landing_fails() {
        let endpoint = FakeEndpoint::new();
        endpoint.script("transfer-0", Behavior::NeverSeen);
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        let Settlement::Failed { reason, kind, .. } = settlement else {
            panic!("expected failure");
        };
        assert_eq!(kind, FailureKind::TransientRpc);
        assert!(reason.starts_with("still unconfirmed after 300s with its validity window open"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_window_is_watched_past_poll_budget() {
        let endpoint = FakeEndpoint::new();
        endpoint.script("transfer-0", Behavior::ConfirmAfter(25));
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        let reference = settlement.reference().unwrap().clone();
        assert!(settlement.is_confirmed());
        assert_eq!(endpoint.polls(&reference), 25);
        assert!(endpoint.deliveries(&reference) > 5, "replays continue while watching");
        assert_eq!(endpoint.signatures_issued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_closing_after_poll_budget_is_resolved() {
        let endpoint = FakeEndpoint::new();
        endpoint.script("transfer-0", Behavior::ExpireAfter(15));
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        let Settlement::Failed { reason, .. } = settlement else {
            panic!("expected failure");
        };
        assert_eq!(reason, EXPIRED_REASON);
        assert_eq!(endpoint.signatures_issued(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_is_terminal() {
        let endpoint = FakeEndpoint::new();
        endpoint.script("transfer-0", Behavior::Revert("custom program error: 0x1".into()));
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        let Settlement::Failed { reason, kind, .. } = settlement else {
            panic!("expected failure");
        };
        assert_eq!(kind, FailureKind::TerminalChain);
        assert!(reason.contains("custom program error: 0x1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_submit_error_is_not_polled() {
        let endpoint = FakeEndpoint::new();
        endpoint.script(
            "transfer-0",
            Behavior::RejectSubmit("insufficient funds for rent".into()),
        );
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        let reference = settlement.reference().unwrap().clone();
        assert!(matches!(
            settlement,
            Settlement::Failed { kind: FailureKind::TerminalChain, .. }
        ));
        assert_eq!(endpoint.polls(&reference), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_preflight_failure_is_never_replayed() {
        let endpoint = FakeEndpoint::new();
        endpoint.script(
            "transfer-0",
            Behavior::RejectSubmit(
                "RPC response error -32002: Transaction simulation failed: \
                 Error processing Instruction 2: custom program error: 0x1"
                    .into(),
            ),
        );
        let (config, retry, cancel) = harness();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        let reference = settlement.reference().unwrap().clone();
        let Settlement::Failed { kind, reason, .. } = settlement else {
            panic!("expected failure");
        };
        assert_eq!(kind, FailureKind::TerminalChain);
        assert!(reason.contains("custom program error: 0x1"));
        assert_eq!(endpoint.deliveries(&reference), 1);
        assert_eq!(endpoint.polls(&reference), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_still_checks_status() {
        let endpoint = FakeEndpoint::new();
        endpoint.script("transfer-0", Behavior::SilentlyLanded);
        let (config, retry, cancel) = harness();
        cancel.cancel();
        let submitter = Submitter::new(&endpoint, &config, &retry, &cancel);
        let signer = StaticSigner::new("transfer-0");

        let settlement = submitter
            .submit(SubmissionLabel::new(Stage::Transfer, 0), &signer, 0)
            .await;
        assert!(settlement.is_confirmed());
        assert_eq!(endpoint.status_checks(settlement.reference().unwrap()), 1);
    }
}
