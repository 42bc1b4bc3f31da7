//! Write lifecycle tracking.
//!
//! Each mood selection creates a [`WriteAttempt`] identified by a
//! monotonically increasing [`AttemptId`]. Attempts move forward only:
//!
//! ```text
//! Idle -> Submitting -> Submitted(handle) -> Confirmed
//!              |               |
//!              +-> Failed      +-> Failed
//! ```
//!
//! The tracker keeps a small arena of recent attempts. Any notification is
//! looked up by attempt id and validated against the attempt's current state,
//! so a redelivered or out-of-order notification produces no event.

use std::collections::VecDeque;

use baselog_core::{MoodValue, Slot};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::WriteFailure;
use crate::remote::{Account, TxHandle};

/// Number of attempt records kept for lookups by id.
const HISTORY: usize = 8;

/// Generation number of a write attempt. Later selections have larger ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttemptId(u64);

impl AttemptId {
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Idle,
    Submitting,
    Submitted,
    Confirmed,
    Failed,
}

impl WriteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    /// Whether the write is still waiting on the ledger.
    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Submitting | Self::Submitted)
    }
}

impl std::fmt::Display for WriteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Submitting => write!(f, "Submitting"),
            Self::Submitted => write!(f, "Submitted"),
            Self::Confirmed => write!(f, "Confirmed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress of reconciling an attempt with the ledger.
///
/// Independent of [`WriteState`]: a confirmed write may still be waiting for
/// its data to become readable, and exhaustion is not a write failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStatus {
    NotStarted,
    Polling,
    Reconciled { read: usize },
    Exhausted { reads: usize },
    Cancelled,
}

impl ReconcileStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::NotStarted | Self::Polling)
    }
}

/// One tracked mood write.
#[derive(Debug, Clone)]
pub struct WriteAttempt {
    pub id: AttemptId,
    pub mood: MoodValue,
    pub slot: Slot,
    pub account: Account,
    pub state: WriteState,
    pub handle: Option<TxHandle>,
    pub failure: Option<WriteFailure>,
    pub reconcile: ReconcileStatus,
    /// When the attempt reached a terminal state.
    pub settled_at: Option<Instant>,
}

/// A lifecycle transition of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Submitting,
    Submitted(TxHandle),
    Confirmed,
    Failed(WriteFailure),
}

impl Transition {
    fn target(&self) -> WriteState {
        match self {
            Self::Submitting => WriteState::Submitting,
            Self::Submitted(_) => WriteState::Submitted,
            Self::Confirmed => WriteState::Confirmed,
            Self::Failed(_) => WriteState::Failed,
        }
    }
}

/// Emitted once per transition per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub attempt: AttemptId,
    pub transition: Transition,
}

/// Owns the write attempts and the notion of "current".
///
/// The newest attempt is current until a newer selection supersedes it.
/// Retirement only hides a settled attempt from [`current`](Self::current);
/// it stays current for side-effect checks.
#[derive(Debug, Default)]
pub struct LifecycleTracker {
    last_id: u64,
    retired: bool,
    attempts: VecDeque<WriteAttempt>,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new attempt (`Idle -> Submitting`), superseding the current one.
    pub fn begin(&mut self, mood: MoodValue, slot: Slot, account: Account) -> LifecycleEvent {
        let prev = self.latest();
        self.last_id += 1;
        let id = AttemptId(self.last_id);

        if let Some(prev) = prev {
            debug!(attempt = %id, superseded = %prev, "New selection supersedes attempt");
        }

        if self.attempts.len() == HISTORY {
            self.attempts.pop_front();
        }
        self.attempts.push_back(WriteAttempt {
            id,
            mood,
            slot,
            account,
            state: WriteState::Submitting,
            handle: None,
            failure: None,
            reconcile: ReconcileStatus::NotStarted,
            settled_at: None,
        });
        self.retired = false;

        LifecycleEvent {
            attempt: id,
            transition: Transition::Submitting,
        }
    }

    /// `Submitting -> Submitted(handle)`.
    pub fn handle_received(&mut self, id: AttemptId, handle: TxHandle) -> Option<LifecycleEvent> {
        self.advance(id, Transition::Submitted(handle))
    }

    /// `Submitted -> Confirmed`.
    pub fn confirmed(&mut self, id: AttemptId) -> Option<LifecycleEvent> {
        self.advance(id, Transition::Confirmed)
    }

    /// `Submitting -> Failed` or `Submitted -> Failed`.
    pub fn failed(&mut self, id: AttemptId, failure: WriteFailure) -> Option<LifecycleEvent> {
        self.advance(id, Transition::Failed(failure))
    }

    /// Apply a transition if it is legal from the attempt's current state.
    ///
    /// Returns `None` for unknown ids, repeated notifications and any
    /// transition that would not move the attempt forward.
    pub fn advance(&mut self, id: AttemptId, transition: Transition) -> Option<LifecycleEvent> {
        let attempt = self.attempt_mut(id)?;
        let from = attempt.state;
        let to = transition.target();

        let legal = matches!(
            (from, to),
            (WriteState::Submitting, WriteState::Submitted)
                | (WriteState::Submitting, WriteState::Failed)
                | (WriteState::Submitted, WriteState::Confirmed)
                | (WriteState::Submitted, WriteState::Failed)
        );
        if !legal {
            trace!(attempt = %id, %from, %to, "Ignoring transition");
            return None;
        }

        match &transition {
            Transition::Submitted(handle) => attempt.handle = Some(handle.clone()),
            Transition::Failed(failure) => attempt.failure = Some(failure.clone()),
            Transition::Submitting | Transition::Confirmed => {}
        }
        if to.is_terminal() {
            attempt.settled_at = Some(Instant::now());
        }
        attempt.state = to;

        debug!(attempt = %id, %from, %to, "Write transition");
        Some(LifecycleEvent {
            attempt: id,
            transition,
        })
    }

    /// Record reconciliation progress. Finished statuses are never overwritten.
    pub fn set_reconcile(&mut self, id: AttemptId, status: ReconcileStatus) -> bool {
        match self.attempt_mut(id) {
            Some(attempt) if !attempt.reconcile.is_finished() => {
                attempt.reconcile = status;
                true
            }
            _ => false,
        }
    }

    /// Retire a settled current attempt, returning the tracker to `Idle`.
    pub fn retire(&mut self, id: AttemptId) -> bool {
        let settled = self.get(id).is_some_and(|a| a.state.is_terminal());
        if settled && self.is_current(id) && !self.retired {
            debug!(attempt = %id, "Retiring settled attempt");
            self.retired = true;
            true
        } else {
            false
        }
    }

    /// Whether `id` has not been superseded, i.e. side effects may act for it.
    pub fn is_current(&self, id: AttemptId) -> bool {
        self.last_id == id.0
    }

    /// The attempt to report on, `None` when idle or retired.
    pub fn current(&self) -> Option<&WriteAttempt> {
        if self.retired {
            return None;
        }
        self.latest().and_then(|id| self.get(id))
    }

    /// State of the current attempt, `Idle` when there is none.
    pub fn state(&self) -> WriteState {
        self.current().map_or(WriteState::Idle, |a| a.state)
    }

    /// Id of the most recently started attempt, whether current or not.
    pub fn latest(&self) -> Option<AttemptId> {
        (self.last_id > 0).then_some(AttemptId(self.last_id))
    }

    pub fn get(&self, id: AttemptId) -> Option<&WriteAttempt> {
        self.attempts.iter().find(|a| a.id == id)
    }

    fn attempt_mut(&mut self, id: AttemptId) -> Option<&mut WriteAttempt> {
        self.attempts.iter_mut().find(|a| a.id == id)
    }
}
