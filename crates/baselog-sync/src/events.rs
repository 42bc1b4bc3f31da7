//! Events published by the engine.
//!
//! Subscribers (a grid renderer, a status banner, a logger) receive these on
//! a broadcast channel instead of being wired into the write path.

use baselog_core::{MoodValue, Slot};

use crate::lifecycle::{AttemptId, LifecycleEvent};

/// Something observable happened to a write attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The user picked a mood and a write is about to be sent.
    Selected {
        attempt: AttemptId,
        mood: MoodValue,
        slot: Slot,
    },

    /// A lifecycle transition of the attempt.
    Lifecycle(LifecycleEvent),

    /// A reconciliation read failed at transport level or returned a malformed payload.
    ReadFailed {
        attempt: AttemptId,
        read: usize,
        reason: String,
    },

    /// An authoritative projection for the attempt was committed.
    Reconciled { attempt: AttemptId, read: usize },

    /// Every scheduled read ran without an acceptable result.
    ReconcileExhausted { attempt: AttemptId, reads: usize },

    /// The attempt was settled long enough ago that it is no longer current.
    Retired { attempt: AttemptId },
}

impl SyncEvent {
    /// The attempt the event belongs to.
    pub fn attempt(&self) -> AttemptId {
        match self {
            SyncEvent::Selected { attempt, .. } => *attempt,
            SyncEvent::Lifecycle(ev) => ev.attempt,
            SyncEvent::ReadFailed { attempt, .. } => *attempt,
            SyncEvent::Reconciled { attempt, .. } => *attempt,
            SyncEvent::ReconcileExhausted { attempt, .. } => *attempt,
            SyncEvent::Retired { attempt } => *attempt,
        }
    }
}
