//! Observable single-slot classification state.
//!
//! The slot holds exactly one [`ClassificationOutcome`]. Every write is
//! stamped against the latest [`SubmissionId`]: `begin` and `reset` open a
//! new submission, and `settle` only lands if its id is still the latest and
//! the slot is still `Running`. The check and the write happen under the
//! same lock, so a slow, superseded submission can never overwrite a newer
//! one.

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Monotonic sequence number of a submission (or reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubmissionId(pub u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an observer sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClassificationOutcome {
    /// No image submitted yet, or cleared.
    #[default]
    Idle,
    /// An image is being processed.
    Running,
    Succeeded {
        display_label: String,
        confidence: f32,
    },
    Failed {
        reason: ErrorKind,
        message: String,
    },
}

impl ClassificationOutcome {
    /// `Succeeded` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClassificationOutcome::Succeeded { .. } | ClassificationOutcome::Failed { .. }
        )
    }
}

#[derive(Debug, Default)]
struct Slot {
    outcome: ClassificationOutcome,
    latest: u64,
    observers: Vec<Sender<ClassificationOutcome>>,
}

impl Slot {
    fn publish(&mut self, outcome: ClassificationOutcome) {
        self.outcome = outcome;
        let value = &self.outcome;
        self.observers.retain(|tx| tx.send(value.clone()).is_ok());
    }
}

/// Shared handle to the classification state. Clones observe the same slot.
#[derive(Debug, Clone, Default)]
pub struct ResultState {
    slot: Arc<Mutex<Slot>>,
}

impl ResultState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current outcome.
    pub fn current(&self) -> ClassificationOutcome {
        self.lock().outcome.clone()
    }

    /// Id of the most recent submission or reset, if any.
    pub fn latest(&self) -> Option<SubmissionId> {
        match self.lock().latest {
            0 => None,
            n => Some(SubmissionId(n)),
        }
    }

    /// Receive every outcome written from now on, in write order.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<ClassificationOutcome> {
        let (tx, rx) = mpsc::channel();
        self.lock().observers.push(tx);
        rx
    }

    /// Open a new submission and move to `Running`.
    pub fn begin(&self) -> SubmissionId {
        let mut slot = self.lock();
        slot.latest += 1;
        let id = SubmissionId(slot.latest);
        slot.publish(ClassificationOutcome::Running);
        tracing::debug!(submission = %id, "classification running");
        id
    }

    /// Publish the terminal outcome of `id`.
    ///
    /// Returns false, leaving the slot untouched, when `id` has been
    /// superseded, was already settled, or `outcome` is not terminal.
    pub fn settle(&self, id: SubmissionId, outcome: ClassificationOutcome) -> bool {
        let mut slot = self.lock();
        if id.0 != slot.latest {
            tracing::debug!(submission = %id, latest = slot.latest, "discarding stale result");
            return false;
        }
        if !outcome.is_terminal() || slot.outcome != ClassificationOutcome::Running {
            tracing::warn!(submission = %id, ?outcome, "refusing non-terminal or repeated settle");
            return false;
        }
        slot.publish(outcome);
        true
    }

    /// Return to `Idle`; anything still in flight becomes stale.
    pub fn reset(&self) -> SubmissionId {
        let mut slot = self.lock();
        slot.latest += 1;
        let id = SubmissionId(slot.latest);
        slot.publish(ClassificationOutcome::Idle);
        tracing::debug!(submission = %id, "classification state cleared");
        id
    }
}
