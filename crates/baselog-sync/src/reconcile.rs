//! Reconciliation - polling the ledger until it reflects a submitted write.
//!
//! A sequence starts on the `Submitted` transition, not on confirmation:
//! data can be readable before the confirmation watcher reports. Reads run
//! after each delay of the configured [`RetrySchedule`](crate::RetrySchedule)
//! and the sequence stops at the first acceptable authoritative payload.
//!
//! Cancellation happens at two levels. The sequence's token is cancelled when
//! a newer selection starts, which drops any pending timer or read. Every
//! result is also checked against the attempt generation before it touches
//! the store, so a read that completes after cancellation is discarded.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use baselog_core::{GridProjection, MoodValue, Slot};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::AcceptPolicy;
use crate::engine::Shared;
use crate::events::SyncEvent;
use crate::lifecycle::{AttemptId, ReconcileStatus};
use crate::remote::{Account, Ledger, LoggedDay, ReadOutcome, RemoteError};

/// How a reconciliation sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The n-th read produced the committed authoritative projection.
    Reconciled { read: usize },
    /// Every read ran without an acceptable result.
    Exhausted { reads: usize },
    /// A newer selection superseded the attempt.
    Cancelled,
}

/// What a sequence waits to see on the ledger.
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub attempt: AttemptId,
    pub account: Account,
    pub slot: Slot,
    pub mood: MoodValue,
}

#[derive(Debug)]
struct Sequence {
    attempt: AttemptId,
    token: CancellationToken,
}

/// Runs at most one reconciliation sequence at a time.
pub struct ReconciliationScheduler {
    ledger: Arc<dyn Ledger>,
    shared: Arc<Shared>,
    active: Mutex<Option<Sequence>>,
}

impl ReconciliationScheduler {
    pub(crate) fn new(ledger: Arc<dyn Ledger>, shared: Arc<Shared>) -> Self {
        Self {
            ledger,
            shared,
            active: Mutex::new(None),
        }
    }

    /// Attempt whose sequence is running, if any.
    pub fn active(&self) -> Option<AttemptId> {
        self.sequence().as_ref().map(|s| s.attempt)
    }

    /// Start polling for `target`. Returns `false` if a sequence for this
    /// attempt already ran or the attempt was superseded.
    pub(crate) fn on_submitted(self: &Arc<Self>, target: Target) -> bool {
        {
            let mut tracker = self.shared.tracker();
            let not_started = tracker
                .get(target.attempt)
                .is_some_and(|a| a.reconcile == ReconcileStatus::NotStarted);
            if !not_started || !tracker.is_current(target.attempt) {
                debug!(
                    attempt = %target.attempt,
                    "Reconciliation already started or attempt superseded"
                );
                return false;
            }
            tracker.set_reconcile(target.attempt, ReconcileStatus::Polling);
        }

        let token = CancellationToken::new();
        if let Some(previous) = self.sequence().replace(Sequence {
            attempt: target.attempt,
            token: token.clone(),
        }) {
            previous.token.cancel();
        }

        info!(
            attempt = %target.attempt,
            reads = self.shared.config.schedule.attempts(),
            "Starting reconciliation"
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let attempt = target.attempt;
            let outcome = this.run(target, token).await;
            this.finish(attempt);
            debug!(%attempt, ?outcome, "Reconciliation finished");
        });
        true
    }

    /// Cancel the running sequence if it belongs to an attempt older than `newer`.
    pub(crate) fn cancel_before(&self, newer: AttemptId) {
        let cancelled = {
            let mut active = self.sequence();
            match active.take() {
                Some(seq) if seq.attempt < newer => {
                    seq.token.cancel();
                    Some(seq.attempt)
                }
                other => {
                    *active = other;
                    None
                }
            }
        };

        if let Some(attempt) = cancelled {
            debug!(%attempt, superseded_by = %newer, "Cancelling reconciliation");
            self.shared
                .tracker()
                .set_reconcile(attempt, ReconcileStatus::Cancelled);
        }
    }

    async fn run(&self, target: Target, token: CancellationToken) -> ReconcileOutcome {
        let schedule = self.shared.config.schedule.clone();

        for (i, delay) in schedule.delays().iter().enumerate() {
            let read = i + 1;

            if or_cancel(tokio::time::sleep(*delay), &token).await.is_none() {
                return ReconcileOutcome::Cancelled;
            }

            trace!(attempt = %target.attempt, read, "Authoritative read");
            let Some(result) = or_cancel(self.ledger.read(&target.account), &token).await else {
                return ReconcileOutcome::Cancelled;
            };

            if let Some(outcome) = self.apply(&target, read, result, &token) {
                return outcome;
            }
        }

        let reads = schedule.attempts();
        let exhausted = {
            let mut tracker = self.shared.tracker();
            tracker.is_current(target.attempt)
                && !token.is_cancelled()
                && tracker.set_reconcile(target.attempt, ReconcileStatus::Exhausted { reads })
        };
        if !exhausted {
            return ReconcileOutcome::Cancelled;
        }

        // The optimistic projection stays on screen; this is not a user-facing error.
        info!(
            attempt = %target.attempt,
            reads,
            "Reconciliation exhausted, keeping optimistic projection"
        );
        self.shared.emit(SyncEvent::ReconcileExhausted {
            attempt: target.attempt,
            reads,
        });
        ReconcileOutcome::Exhausted { reads }
    }

    /// Handle one read result. `Some` ends the sequence.
    fn apply(
        &self,
        target: &Target,
        read: usize,
        result: Result<ReadOutcome, RemoteError>,
        token: &CancellationToken,
    ) -> Option<ReconcileOutcome> {
        let mut tracker = self.shared.tracker();
        if token.is_cancelled() || !tracker.is_current(target.attempt) {
            debug!(attempt = %target.attempt, read, "Discarding read for superseded attempt");
            return Some(ReconcileOutcome::Cancelled);
        }

        let days = match result {
            Ok(ReadOutcome::Available(days)) => days,
            Ok(ReadOutcome::NotAvailable) => {
                debug!(attempt = %target.attempt, read, "No authoritative data yet");
                return None;
            }
            Err(e) => {
                drop(tracker);
                self.read_failed(target.attempt, read, e.to_string());
                return None;
            }
        };

        let now = self.shared.clock.now();
        let projection = match accept(&days, target, self.shared.config.accept, now) {
            Ok(Some(projection)) => projection,
            Ok(None) => {
                debug!(attempt = %target.attempt, read, "Ledger does not reflect the write yet");
                return None;
            }
            Err(e) => {
                drop(tracker);
                self.read_failed(target.attempt, read, format!("malformed payload: {e}"));
                return None;
            }
        };

        self.shared
            .store
            .commit_authoritative(Some(target.attempt), projection);
        tracker.set_reconcile(target.attempt, ReconcileStatus::Reconciled { read });
        drop(tracker);

        info!(attempt = %target.attempt, read, "Reconciled with ledger");
        self.shared.emit(SyncEvent::Reconciled {
            attempt: target.attempt,
            read,
        });
        Some(ReconcileOutcome::Reconciled { read })
    }

    fn read_failed(&self, attempt: AttemptId, read: usize, reason: String) {
        warn!(%attempt, read, %reason, "Reconciliation read failed, continuing schedule");
        self.shared.emit(SyncEvent::ReadFailed {
            attempt,
            read,
            reason,
        });
    }

    fn finish(&self, attempt: AttemptId) {
        let mut active = self.sequence();
        if active.as_ref().is_some_and(|s| s.attempt == attempt) {
            *active = None;
        }
    }

    fn sequence(&self) -> MutexGuard<'_, Option<Sequence>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build an authoritative projection from raw ledger days.
///
/// Returns `None` for an empty payload. Unknown moods or out-of-range days
/// are errors, never defaulted.
pub fn authoritative_projection(
    days: &[LoggedDay],
    obtained_at: DateTime<Utc>,
) -> baselog_core::Result<Option<GridProjection>> {
    if days.is_empty() {
        return Ok(None);
    }
    let cells = days
        .iter()
        .map(|d| Ok((Slot::try_from(d.day_index)?, MoodValue::new(d.mood_value)?)))
        .collect::<baselog_core::Result<Vec<_>>>()?;
    GridProjection::authoritative(cells, obtained_at).map(Some)
}

fn accept(
    days: &[LoggedDay],
    target: &Target,
    policy: AcceptPolicy,
    now: DateTime<Utc>,
) -> baselog_core::Result<Option<GridProjection>> {
    let Some(projection) = authoritative_projection(days, now)? else {
        return Ok(None);
    };
    let accepted = match policy {
        AcceptPolicy::AnyData => true,
        AcceptPolicy::ReflectsWrite => projection.get(target.slot) == Some(target.mood),
    };
    Ok(accepted.then_some(projection))
}

async fn or_cancel<F: Future>(fut: F, token: &CancellationToken) -> Option<F::Output> {
    tokio::select! {
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}
