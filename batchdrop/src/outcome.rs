//! Per-recipient outcomes and the final disbursement report.

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

use crate::chain::ChainId;
use crate::error::FailureKind;
use crate::request::{RecipientLine, TokenSpec};
use crate::submit::{Settlement, Stage, SubmissionLabel, TxRef};

/// Terminal state of a recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Funds landed in a confirmed transaction.
    Success,
    /// The recipient was not paid.
    Failed,
}

/// Exactly one of these exists per input recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientOutcome {
    /// Position of the line in the request.
    pub index: usize,
    /// Address as supplied.
    pub address: String,
    /// Amount as supplied.
    pub amount: String,
    /// Terminal state.
    pub status: OutcomeStatus,
    /// Failure class, present when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    /// Human-readable reason, present when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Transaction carrying the transfer, when one was built.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TxRef>,
}

impl RecipientOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn success(index: usize, line: &RecipientLine, transaction: TxRef) -> Self {
        Self {
            index,
            address: line.address.clone(),
            amount: line.amount.clone(),
            status: OutcomeStatus::Success,
            kind: None,
            error: None,
            transaction: Some(transaction),
        }
    }

    /// A failed outcome.
    pub fn failed(
        index: usize,
        line: &RecipientLine,
        kind: FailureKind,
        error: impl Into<String>,
        transaction: Option<TxRef>,
    ) -> Self {
        Self {
            index,
            address: line.address.clone(),
            amount: line.amount.clone(),
            status: OutcomeStatus::Failed,
            kind: Some(kind),
            error: Some(error.into()),
            transaction,
        }
    }

    /// Returns `true` for a successful outcome.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Collects outcomes keyed by input index.
///
/// A slot is written at most once; later writes for the same index are ignored,
/// so no recipient can be reported twice.
#[derive(Debug)]
pub struct OutcomeLedger {
    slots: Vec<Option<RecipientOutcome>>,
}

impl OutcomeLedger {
    /// Creates a ledger for `len` recipients.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Records an outcome. Returns `false` if the slot was already filled or out of range.
    pub fn record(&mut self, outcome: RecipientOutcome) -> bool {
        match self.slots.get_mut(outcome.index) {
            Some(slot @ None) => {
                *slot = Some(outcome);
                true
            }
            _ => false,
        }
    }

    /// Whether the recipient at `index` already has an outcome.
    #[must_use]
    pub fn is_recorded(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(Option::is_some)
    }

    /// Returns outcomes in input order, filling any gap with a failure.
    #[must_use]
    pub fn finish(self, lines: &[RecipientLine]) -> Vec<RecipientOutcome> {
        self.slots
            .into_iter()
            .zip(lines)
            .enumerate()
            .map(|(index, (slot, line))| {
                slot.unwrap_or_else(|| {
                    RecipientOutcome::failed(
                        index,
                        line,
                        FailureKind::TransientRpc,
                        "recipient was never processed",
                        None,
                    )
                })
            })
            .collect()
    }
}

/// Aggregate status of a disbursement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisbursementStatus {
    /// Every recipient succeeded.
    Success,
    /// Some recipients succeeded.
    Partial,
    /// No recipient succeeded.
    Failed,
}

impl DisbursementStatus {
    /// Derives the status from success and total counts.
    #[must_use]
    pub const fn from_counts(succeeded: usize, total: usize) -> Self {
        if total > 0 && succeeded == total {
            Self::Success
        } else if succeeded > 0 {
            Self::Partial
        } else {
            Self::Failed
        }
    }
}

/// One transaction attempted during a disbursement.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Pipeline stage.
    pub stage: Stage,
    /// Batch index within the stage.
    pub batch_index: usize,
    /// Last transaction reference, when one was built.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<TxRef>,
    /// Whether the transaction was confirmed.
    pub status: OutcomeStatus,
    /// Number of recipients carried.
    pub recipients: usize,
    /// Reason for failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Native-currency fee paid, in base units, when the chain reported it.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_paid: Option<u128>,
}

impl TransactionRecord {
    /// Records a settled submission carrying `recipients` recipients.
    #[must_use]
    pub fn from_settlement(label: SubmissionLabel, settlement: &Settlement, recipients: usize) -> Self {
        let (status, error) = match settlement {
            Settlement::Confirmed { .. } => (OutcomeStatus::Success, None),
            Settlement::Failed { reason, .. } => (OutcomeStatus::Failed, Some(reason.clone())),
        };
        Self {
            stage: label.stage,
            batch_index: label.batch_index,
            reference: settlement.reference().cloned(),
            status,
            recipients,
            error,
            fee_paid: None,
        }
    }
}

/// Summary returned by [`Disburser::disburse`](crate::Disburser::disburse).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisbursementReport {
    /// Chain disbursed on.
    pub chain: ChainId,
    /// Token disbursed.
    pub token: TokenSpec,
    /// Aggregate status.
    pub status: DisbursementStatus,
    /// One outcome per input line, in input order.
    pub outcomes: Vec<RecipientOutcome>,
    /// Every transaction attempted, in submission order.
    pub transactions: Vec<TransactionRecord>,
    /// Sum of successfully delivered amounts, in display units.
    pub total_amount: String,
    /// Sum of reported transaction fees, in native base units.
    #[serde_as(as = "DisplayFromStr")]
    pub total_fees_paid: u128,
    /// Number of successful recipients.
    pub success_count: usize,
    /// Number of failed recipients.
    pub failure_count: usize,
}

impl DisbursementReport {
    /// Outcomes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &RecipientOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(n: usize) -> Vec<RecipientLine> {
        (0..n)
            .map(|i| RecipientLine::new(format!("addr{i}"), "1"))
            .collect()
    }

    #[test]
    fn test_ledger_rejects_duplicates_and_fills_gaps() {
        let lines = lines(3);
        let mut ledger = OutcomeLedger::new(3);
        assert!(ledger.record(RecipientOutcome::success(0, &lines[0], TxRef::new("a"))));
        assert!(!ledger.record(RecipientOutcome::failed(
            0,
            &lines[0],
            FailureKind::TerminalChain,
            "late",
            None
        )));
        assert!(!ledger.record(RecipientOutcome::success(9, &lines[0], TxRef::new("b"))));
        assert!(ledger.is_recorded(0));
        assert!(!ledger.is_recorded(1));

        let outcomes = ledger.finish(&lines);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_success());
        assert_eq!(outcomes[1].status, OutcomeStatus::Failed);
        assert_eq!(outcomes[2].address, "addr2");
    }

    #[test]
    fn test_status_from_counts() {
        assert_eq!(DisbursementStatus::from_counts(3, 3), DisbursementStatus::Success);
        assert_eq!(DisbursementStatus::from_counts(1, 3), DisbursementStatus::Partial);
        assert_eq!(DisbursementStatus::from_counts(0, 3), DisbursementStatus::Failed);
    }

    #[test]
    fn test_outcome_json_shape() {
        let line = RecipientLine::new("alice", "2.5");
        let outcome = RecipientOutcome::failed(
            4,
            &line,
            FailureKind::InvalidInput,
            "invalid address: bad",
            None,
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "invalid_input");
        assert_eq!(json["amount"], "2.5");
        assert!(json.get("transaction").is_none());
    }

    #[test]
    fn test_fee_serializes_as_decimal_string() {
        let settlement = Settlement::Confirmed {
            reference: TxRef::new("0xabc"),
        };
        let mut record =
            TransactionRecord::from_settlement(SubmissionLabel::new(Stage::Transfer, 1), &settlement, 3);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("feePaid").is_none());

        record.fee_paid = Some(21_000_000_000_000);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["feePaid"], "21000000000000");
        assert_eq!(json["batchIndex"], 1);
        let back: TransactionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
