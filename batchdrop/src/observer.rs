//! Outcome stream and progress callbacks.
//!
//! Observers are notified synchronously from the pipeline task. They must not
//! block; [`ChannelObserver`] forwards events to another task for anything slow.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::outcome::RecipientOutcome;
use crate::submit::Stage;

/// Progress after a batch reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Stage the batch belongs to.
    pub stage: Stage,
    /// Zero-based index of the batch that just finished.
    pub batch_index: usize,
    /// Batches in this stage.
    pub total_batches: usize,
    /// Recipients confirmed so far in this stage.
    pub confirmed_so_far: usize,
}

/// Receives outcomes as they become final.
pub trait DisbursementObserver: Send + Sync {
    /// Called once per recipient when its outcome is final.
    fn on_outcome(&self, _outcome: &RecipientOutcome) {}

    /// Called after each batch.
    fn on_progress(&self, _progress: Progress) {}
}

/// Ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DisbursementObserver for NoopObserver {}

/// Event forwarded by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisbursementEvent {
    /// A recipient's outcome became final.
    Outcome(RecipientOutcome),
    /// A batch finished.
    Progress(Progress),
}

/// Forwards every event into an unbounded channel.
///
/// A closed receiver is ignored: the disbursement keeps running.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: UnboundedSender<DisbursementEvent>,
}

impl ChannelObserver {
    /// Wraps a channel sender.
    #[must_use]
    pub const fn new(tx: UnboundedSender<DisbursementEvent>) -> Self {
        Self { tx }
    }
}

impl DisbursementObserver for ChannelObserver {
    fn on_outcome(&self, outcome: &RecipientOutcome) {
        let _ = self.tx.send(DisbursementEvent::Outcome(outcome.clone()));
    }

    fn on_progress(&self, progress: Progress) {
        let _ = self.tx.send(DisbursementEvent::Progress(progress));
    }
}
