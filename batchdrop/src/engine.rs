//! The disbursement orchestrator.
//!
//! [`Disburser`] composes the pipeline stages against one [`ChainAdapter`]:
//!
//! 1. resolve every line; rejected lines fail with [`FailureKind::InvalidInput`]
//! 2. run the adapter's one-time setup
//! 3. create missing destination accounts, in their own batches
//! 4. partition the remaining recipients and submit each batch
//! 5. aggregate one outcome per input line into a [`DisbursementReport`]
//!
//! Batches run sequentially. A failed batch never aborts the ones after it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::adapter::{ChainAdapter, RpcEndpoint};
use crate::amount::format_units;
use crate::batch::{Batch, partition};
use crate::config::EngineConfig;
use crate::error::{DisburseError, FailureKind, SignError};
use crate::fee::{FeeHint, estimate};
use crate::observer::{DisbursementObserver, NoopObserver, Progress};
use crate::outcome::{
    DisbursementReport, DisbursementStatus, OutcomeLedger, RecipientOutcome,
    TransactionRecord,
};
use crate::request::{DisbursementRequest, RecipientLine};
use crate::resolve::{Precondition, ResolvedRecipient, resolve_all};
use crate::submit::{
    PayloadSigner, Settlement, SignedPayload, Stage, SubmissionLabel, Submitter, ValidityWindow,
};

/// Reason reported for recipients whose batch was never submitted.
pub const CANCELLED_REASON: &str = "cancelled before submission";

/// Runs disbursements on one chain.
pub struct Disburser<C> {
    adapter: C,
    config: EngineConfig,
    observer: Arc<dyn DisbursementObserver>,
    cancel: CancellationToken,
}

impl<C: ChainAdapter> fmt::Debug for Disburser<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disburser")
            .field("chain", self.adapter.chain_id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Mutable state of one disbursement run.
struct Run<'r> {
    lines: &'r [RecipientLine],
    ledger: OutcomeLedger,
    transactions: Vec<TransactionRecord>,
    delivered: u128,
}

impl<C: ChainAdapter> Disburser<C> {
    /// Creates a disburser with default configuration and no observer.
    pub fn new(adapter: C) -> Self {
        Self {
            adapter,
            config: EngineConfig::default(),
            observer: Arc::new(NoopObserver),
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs an observer notified of every outcome and batch.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DisbursementObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Uses `cancel` to stop submitting new batches.
    ///
    /// Batches already submitted are still driven to a terminal state.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The chain adapter.
    pub const fn adapter(&self) -> &C {
        &self.adapter
    }

    /// The engine configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one disbursement to completion.
    ///
    /// Every recipient line yields exactly one outcome, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`DisburseError`] only for request-wide problems detected before any
    /// transaction is built. Per-recipient failures are reported in the result.
    pub async fn disburse(
        &self,
        request: &DisbursementRequest,
    ) -> Result<DisbursementReport, DisburseError> {
        self.validate(request)?;

        let lines = request.recipients.as_slice();
        #[cfg(feature = "telemetry")]
        tracing::info!(
            chain = %request.chain,
            token = %request.token,
            recipients = lines.len(),
            "Starting disbursement"
        );

        let mut run = Run {
            lines,
            ledger: OutcomeLedger::new(lines.len()),
            transactions: Vec::new(),
            delivered: 0,
        };

        let resolution = resolve_all(&self.adapter, lines);
        for rejection in resolution.rejected {
            self.record(
                &mut run,
                RecipientOutcome::failed(
                    rejection.index,
                    &lines[rejection.index],
                    FailureKind::InvalidInput,
                    rejection.reason,
                    None,
                ),
            );
        }

        let submitter = Submitter::new(
            self.adapter.endpoint(),
            &self.config.submitter,
            &self.config.retry,
            &self.cancel,
        );

        let mut pending = resolution.resolved;
        if !pending.is_empty() {
            pending = self.prepare(&submitter, &mut run, pending).await;
        }
        if self.adapter.requires_preconditions() && !pending.is_empty() {
            pending = self
                .materialize_preconditions(&submitter, &mut run, pending, request.batch_size_hint)
                .await;
        }
        if !pending.is_empty() {
            self.transfer(&submitter, &mut run, pending, request.batch_size_hint)
                .await;
        }

        let report = self.aggregate(request, run);
        #[cfg(feature = "telemetry")]
        tracing::info!(
            status = ?report.status,
            succeeded = report.success_count,
            failed = report.failure_count,
            total = %report.total_amount,
            "Disbursement finished"
        );
        Ok(report)
    }

    fn validate(&self, request: &DisbursementRequest) -> Result<(), DisburseError> {
        self.config.validate()?;
        if request.recipients.is_empty() {
            return Err(DisburseError::EmptyRequest);
        }
        if &request.chain != self.adapter.chain_id() {
            return Err(DisburseError::ChainMismatch {
                request: request.chain.clone(),
                adapter: self.adapter.chain_id().clone(),
            });
        }
        match &request.credentials {
            Some(secret) if !secret.is_unset() => Ok(()),
            _ => Err(DisburseError::MissingCredentials),
        }
    }

    async fn prepare(
        &self,
        submitter: &Submitter<'_, C::Endpoint>,
        run: &mut Run<'_>,
        pending: Vec<ResolvedRecipient<C::Account>>,
    ) -> Vec<ResolvedRecipient<C::Account>> {
        if submitter.is_cancelled() {
            self.fail_all(run, &pending, FailureKind::TransientRpc, CANCELLED_REASON);
            return Vec::new();
        }
        match self.adapter.prepare(submitter, &pending).await {
            Ok(records) => {
                for record in records {
                    let record = self.with_fee(submitter, record).await;
                    run.transactions.push(record);
                }
                pending
            }
            Err(e) => {
                #[cfg(feature = "telemetry")]
                tracing::error!(error = %e, "Setup failed");
                let reason = format!("setup failed: {e}");
                self.fail_all(run, &pending, FailureKind::PreconditionFailure, &reason);
                Vec::new()
            }
        }
    }

    /// Creates missing destination accounts and returns the recipients ready for transfer.
    async fn materialize_preconditions(
        &self,
        submitter: &Submitter<'_, C::Endpoint>,
        run: &mut Run<'_>,
        pending: Vec<ResolvedRecipient<C::Account>>,
        hint: Option<usize>,
    ) -> Vec<ResolvedRecipient<C::Account>> {
        let lines = run.lines;
        let destinations: Vec<C::Account> =
            pending.iter().map(|r| r.destination.clone()).collect();
        let endpoint = self.adapter.endpoint();
        let existence = self
            .config
            .retry
            .run_until("accounts_exist", &self.cancel, || {
                submitter.timed(endpoint.accounts_exist(&destinations))
            })
            .await;
        let exists = match existence {
            Ok(exists) if exists.len() == destinations.len() => exists,
            Ok(exists) => {
                let reason = format!(
                    "account existence check returned {} results for {} accounts",
                    exists.len(),
                    destinations.len()
                );
                self.fail_all(run, &pending, FailureKind::TransientRpc, &reason);
                return Vec::new();
            }
            Err(e) => {
                let reason = format!("account existence check failed: {}", e.message());
                self.fail_all(run, &pending, FailureKind::TransientRpc, &reason);
                return Vec::new();
            }
        };

        let (present, absent): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .zip(exists)
            .partition(|(_, exists)| *exists);
        let mut ready: Vec<ResolvedRecipient<C::Account>> =
            present.into_iter().map(|(r, _)| r).collect();
        let missing: Vec<ResolvedRecipient<C::Account>> = absent
            .into_iter()
            .map(|(mut r, _)| {
                r.precondition = Precondition::Required;
                r
            })
            .collect();
        if missing.is_empty() {
            return ready;
        }

        let limits = self.adapter.creation_limits();
        let batches = partition(missing, limits.clamp(hint, limits.max_batch_size()));
        #[cfg(feature = "telemetry")]
        tracing::info!(
            accounts = batches.iter().map(Batch::len).sum::<usize>(),
            batches = batches.len(),
            "Creating missing destination accounts"
        );
        let fee = self.config.fees.boosted(
            estimate(self.adapter.endpoint(), self.adapter.kind(), &self.config.fees).await,
        );
        let total_batches = batches.len();
        let mut confirmed_so_far = 0;
        for batch in batches {
            let label = SubmissionLabel::new(Stage::Creation, batch.index);
            if submitter.is_cancelled() {
                self.fail_all(run, &batch.recipients, FailureKind::TransientRpc, CANCELLED_REASON);
                self.progress(label, total_batches, confirmed_so_far);
                continue;
            }
            if batch.index > 0 {
                self.pause().await;
            }

            let signer = BatchSigner {
                adapter: &self.adapter,
                batch: &batch,
                fee,
                stage: Stage::Creation,
            };
            let settlement = submitter
                .submit(label, &signer, self.config.submitter.creation_fresh_attempts)
                .await;
            let record = TransactionRecord::from_settlement(label, &settlement, batch.len());
            run.transactions.push(self.with_fee(submitter, record).await);
            match settlement {
                Settlement::Confirmed { .. } => {
                    confirmed_so_far += batch.len();
                    ready.extend(batch.recipients.into_iter().map(|mut r| {
                        r.precondition = Precondition::Created;
                        r
                    }));
                }
                Settlement::Failed {
                    reference, reason, ..
                } => {
                    let reason = format!("destination account creation failed: {reason}");
                    for recipient in &batch.recipients {
                        self.record(
                            run,
                            RecipientOutcome::failed(
                                recipient.index,
                                &lines[recipient.index],
                                FailureKind::PreconditionFailure,
                                reason.clone(),
                                reference.clone(),
                            ),
                        );
                    }
                }
            }
            self.progress(label, total_batches, confirmed_so_far);
        }

        ready.sort_by_key(|r| r.index);
        ready
    }

    async fn transfer(
        &self,
        submitter: &Submitter<'_, C::Endpoint>,
        run: &mut Run<'_>,
        pending: Vec<ResolvedRecipient<C::Account>>,
        hint: Option<usize>,
    ) {
        let lines = run.lines;
        let size = self
            .adapter
            .transfer_limits()
            .clamp(hint, self.config.default_batch_size);
        let batches = partition(pending, size);
        let total_batches = batches.len();
        #[cfg(feature = "telemetry")]
        tracing::info!(batch_size = size, batches = total_batches, "Submitting transfers");

        let fee = estimate(self.adapter.endpoint(), self.adapter.kind(), &self.config.fees).await;
        let mut confirmed_so_far = 0;
        for batch in batches {
            let label = SubmissionLabel::new(Stage::Transfer, batch.index);
            if submitter.is_cancelled() {
                self.fail_all(run, &batch.recipients, FailureKind::TransientRpc, CANCELLED_REASON);
                self.progress(label, total_batches, confirmed_so_far);
                continue;
            }
            if batch.index > 0 {
                self.pause().await;
            }

            let signer = BatchSigner {
                adapter: &self.adapter,
                batch: &batch,
                fee,
                stage: Stage::Transfer,
            };
            let settlement = submitter.submit(label, &signer, 0).await;
            let record = TransactionRecord::from_settlement(label, &settlement, batch.len());
            run.transactions.push(self.with_fee(submitter, record).await);
            match settlement {
                Settlement::Confirmed { reference } => {
                    confirmed_so_far += batch.len();
                    run.delivered = run.delivered.saturating_add(batch.total_amount());
                    for recipient in &batch.recipients {
                        self.record(
                            run,
                            RecipientOutcome::success(
                                recipient.index,
                                &lines[recipient.index],
                                reference.clone(),
                            ),
                        );
                    }
                }
                Settlement::Failed {
                    reference,
                    kind,
                    reason,
                } => {
                    for recipient in &batch.recipients {
                        self.record(
                            run,
                            RecipientOutcome::failed(
                                recipient.index,
                                &lines[recipient.index],
                                kind,
                                reason.clone(),
                                reference.clone(),
                            ),
                        );
                    }
                }
            }
            self.progress(label, total_batches, confirmed_so_far);
        }
    }

    fn progress(&self, label: SubmissionLabel, total_batches: usize, confirmed_so_far: usize) {
        self.observer.on_progress(Progress {
            stage: label.stage,
            batch_index: label.batch_index,
            total_batches,
            confirmed_so_far,
        });
    }

    /// Fills in the fee a submitted transaction paid. Lookup failures leave it empty.
    async fn with_fee(
        &self,
        submitter: &Submitter<'_, C::Endpoint>,
        mut record: TransactionRecord,
    ) -> TransactionRecord {
        let Some(reference) = &record.reference else {
            return record;
        };
        if record.fee_paid.is_some() {
            return record;
        }
        match submitter.timed(self.adapter.endpoint().fee_paid(reference)).await {
            Ok(fee) => record.fee_paid = fee,
            Err(_e) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(tx = %reference, error = %_e, "Fee lookup failed");
            }
        }
        record
    }

    /// Waits the inter-batch delay, returning early on cancellation.
    async fn pause(&self) {
        if self.config.inter_batch_delay.is_zero() {
            return;
        }
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = tokio::time::sleep(self.config.inter_batch_delay) => {}
        }
    }

    fn fail_all(
        &self,
        run: &mut Run<'_>,
        recipients: &[ResolvedRecipient<C::Account>],
        kind: FailureKind,
        reason: &str,
    ) {
        let lines = run.lines;
        for recipient in recipients {
            self.record(
                run,
                RecipientOutcome::failed(
                    recipient.index,
                    &lines[recipient.index],
                    kind,
                    reason,
                    None,
                ),
            );
        }
    }

    fn record(&self, run: &mut Run<'_>, outcome: RecipientOutcome) {
        if run.ledger.is_recorded(outcome.index) {
            #[cfg(feature = "telemetry")]
            tracing::warn!(index = outcome.index, "Duplicate outcome ignored");
            return;
        }
        self.observer.on_outcome(&outcome);
        run.ledger.record(outcome);
    }

    fn aggregate(&self, request: &DisbursementRequest, run: Run<'_>) -> DisbursementReport {
        let outcomes = run.ledger.finish(run.lines);
        let success_count = outcomes.iter().filter(|o| o.is_success()).count();
        DisbursementReport {
            chain: request.chain.clone(),
            token: request.token.clone(),
            status: DisbursementStatus::from_counts(success_count, outcomes.len()),
            failure_count: outcomes.len() - success_count,
            success_count,
            outcomes,
            total_fees_paid: run
                .transactions
                .iter()
                .filter_map(|t| t.fee_paid)
                .fold(0, u128::saturating_add),
            transactions: run.transactions,
            total_amount: format_units(run.delivered, self.adapter.decimals()),
        }
    }
}

/// Signs one batch through the adapter for the submitter.
struct BatchSigner<'a, C: ChainAdapter> {
    adapter: &'a C,
    batch: &'a Batch<C::Account>,
    fee: FeeHint,
    stage: Stage,
}

#[async_trait]
impl<C: ChainAdapter> PayloadSigner<C::Account> for BatchSigner<'_, C> {
    fn signer(&self) -> &C::Account {
        self.adapter.signer()
    }

    async fn sign(&self, window: &ValidityWindow) -> Result<SignedPayload, SignError> {
        match self.stage {
            Stage::Creation => self.adapter.sign_creation(self.batch, &self.fee, window).await,
            Stage::Transfer => self.adapter.sign_transfer(self.batch, &self.fee, window).await,
            Stage::Setup => Err(SignError::new("setup transactions are signed by the adapter")),
        }
    }
}
