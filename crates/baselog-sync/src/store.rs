//! Grid state store - what the grid currently displays.
//!
//! Two writers exist: the optimistic projector (one cell, on handle
//! received) and reconciliation (a whole authoritative projection). Rules:
//!
//! - An authoritative projection always replaces what is shown.
//! - An optimistic write is applied on top of the current projection, so it
//!   only ever touches its own slot.
//! - An optimistic write for an attempt no newer than the attempt whose
//!   reconciliation produced the current authoritative projection is dropped.
//!
//! Readers get the latest committed projection synchronously, or subscribe
//! to a `watch` channel that fires on every committed change.

use std::sync::{Mutex, MutexGuard, PoisonError};

use baselog_core::{project, GridProjection, MoodValue, Slot};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::lifecycle::AttemptId;

/// Projection shown before an attempt's optimistic write, for retraction.
#[derive(Debug)]
struct Overlay {
    attempt: AttemptId,
    before: GridProjection,
}

#[derive(Debug, Default)]
struct Meta {
    /// Newest attempt whose reconciliation committed an authoritative projection.
    authoritative_for: Option<AttemptId>,
    overlay: Option<Overlay>,
}

/// Single source of truth for the displayed grid.
#[derive(Debug)]
pub struct GridStore {
    tx: watch::Sender<GridProjection>,
    meta: Mutex<Meta>,
}

impl Default for GridStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GridStore {
    /// Store holding the "no data yet" sentinel.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(GridProjection::empty());
        Self {
            tx,
            meta: Mutex::new(Meta::default()),
        }
    }

    /// Latest committed projection.
    pub fn current(&self) -> GridProjection {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every committed change.
    pub fn subscribe(&self) -> watch::Receiver<GridProjection> {
        self.tx.subscribe()
    }

    /// Fill `slot` with `mood` on top of the current projection.
    ///
    /// Returns `false` when an authoritative projection from the same or a
    /// newer attempt is already shown.
    pub fn apply_optimistic(
        &self,
        attempt: AttemptId,
        mood: MoodValue,
        slot: Slot,
        now: DateTime<Utc>,
    ) -> bool {
        let mut meta = self.meta();
        if meta.authoritative_for.is_some_and(|a| a >= attempt) {
            debug!(%attempt, "Dropping optimistic write older than authoritative projection");
            return false;
        }

        let before = self.current();
        let next = project(mood, slot, Some(&before), now);
        if meta.overlay.as_ref().map(|o| o.attempt) != Some(attempt) {
            meta.overlay = Some(Overlay { attempt, before });
        }
        self.tx.send_replace(next);

        debug!(%attempt, %slot, %mood, "Optimistic projection applied");
        true
    }

    /// Replace the grid with an authoritative projection.
    ///
    /// `origin` is the attempt whose reconciliation produced it, `None` for
    /// a plain refresh. Only reconciliation may replace an optimistic
    /// projection; a refresh over one is refused. Subscribers are only
    /// notified when the cells or the source actually change.
    pub fn commit_authoritative(
        &self,
        origin: Option<AttemptId>,
        projection: GridProjection,
    ) -> bool {
        if !projection.is_authoritative() {
            warn!("Refusing to commit a non-authoritative projection as authoritative");
            return false;
        }

        let mut meta = self.meta();
        if origin.is_none() && self.tx.borrow().is_optimistic() {
            debug!("Keeping optimistic projection, refresh needs reconciliation to replace it");
            return false;
        }
        if origin.is_some() {
            meta.authoritative_for = meta.authoritative_for.max(origin);
        }
        meta.overlay = None;

        let filled = projection.filled_count();
        let changed = self.tx.send_if_modified(|shown| {
            let changed = shown.source() != projection.source() || !shown.same_cells(&projection);
            *shown = projection;
            changed
        });

        debug!(?origin, filled, changed, "Authoritative projection committed");
        true
    }

    /// Undo `attempt`'s optimistic write if it is still what is shown.
    pub fn retract(&self, attempt: AttemptId) -> bool {
        let mut meta = self.meta();
        let showing_optimistic = self.tx.borrow().is_optimistic();
        match meta.overlay.take() {
            Some(overlay) if overlay.attempt == attempt && showing_optimistic => {
                debug!(%attempt, "Retracting optimistic projection");
                self.tx.send_replace(overlay.before);
                true
            }
            other => {
                meta.overlay = other;
                false
            }
        }
    }

    fn meta(&self) -> MutexGuard<'_, Meta> {
        self.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleTracker;
    use crate::remote::Account;

    fn ids(n: usize) -> Vec<AttemptId> {
        let mut tracker = LifecycleTracker::new();
        (0..n)
            .map(|_| {
                tracker
                    .begin(mood(0), slot(0), Account::new("0xabc"))
                    .attempt
            })
            .collect()
    }

    fn slot(i: u16) -> Slot {
        Slot::new(i).unwrap()
    }

    fn mood(v: u8) -> MoodValue {
        MoodValue::new(v).unwrap()
    }

    fn authoritative(cells: &[(u16, u8)]) -> GridProjection {
        let cells = cells.iter().map(|&(s, m)| (slot(s), mood(m)));
        GridProjection::authoritative(cells, Utc::now()).unwrap()
    }

    #[test]
    fn starts_with_no_data_sentinel() {
        let store = GridStore::new();
        assert!(store.current().is_unset());
    }

    #[test]
    fn optimistic_write_is_visible_immediately() {
        let store = GridStore::new();
        let id = ids(1)[0];

        assert!(store.apply_optimistic(id, mood(2), slot(10), Utc::now()));
        let shown = store.current();
        assert!(shown.is_optimistic());
        assert_eq!(shown.get(slot(10)), Some(mood(2)));
    }

    #[test]
    fn optimistic_write_keeps_authoritative_cells() {
        let store = GridStore::new();
        let id = ids(1)[0];
        store.commit_authoritative(None, authoritative(&[(1, 0), (2, 1)]));

        store.apply_optimistic(id, mood(6), slot(2), Utc::now());
        let shown = store.current();
        assert_eq!(shown.get(slot(1)), Some(mood(0)));
        assert_eq!(shown.get(slot(2)), Some(mood(6)));
    }

    #[test]
    fn authoritative_precedence_over_late_optimistic() {
        let store = GridStore::new();
        let ids = ids(2);
        store.commit_authoritative(Some(ids[1]), authoritative(&[(10, 3)]));

        assert!(!store.apply_optimistic(ids[0], mood(1), slot(10), Utc::now()));
        assert!(!store.apply_optimistic(ids[1], mood(1), slot(10), Utc::now()));
        let shown = store.current();
        assert!(shown.is_authoritative());
        assert_eq!(shown.get(slot(10)), Some(mood(3)));
    }

    #[test]
    fn newer_attempt_may_project_over_authoritative() {
        let store = GridStore::new();
        let ids = ids(2);
        store.commit_authoritative(Some(ids[0]), authoritative(&[(10, 3)]));

        assert!(store.apply_optimistic(ids[1], mood(4), slot(11), Utc::now()));
        let shown = store.current();
        assert!(shown.is_optimistic());
        assert_eq!(shown.get(slot(10)), Some(mood(3)));
        assert_eq!(shown.get(slot(11)), Some(mood(4)));
    }

    #[test]
    fn commit_rejects_optimistic_projection() {
        let store = GridStore::new();
        let p = project(mood(1), slot(1), None, Utc::now());
        assert!(!store.commit_authoritative(None, p));
        assert!(store.current().is_unset());
    }

    #[test]
    fn identical_authoritative_commit_does_not_notify() {
        let store = GridStore::new();
        let mut rx = store.subscribe();

        store.commit_authoritative(None, authoritative(&[(4, 4)]));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        store.commit_authoritative(None, authoritative(&[(4, 4)]));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn refresh_never_replaces_optimistic_projection() {
        let store = GridStore::new();
        let ids = ids(2);
        store.apply_optimistic(ids[0], mood(2), slot(10), Utc::now());
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        assert!(!store.commit_authoritative(None, authoritative(&[(3, 1)])));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.current().get(slot(10)), Some(mood(2)));

        // reconciliation still may
        assert!(store.commit_authoritative(Some(ids[0]), authoritative(&[(10, 2)])));
        assert!(store.current().is_authoritative());
        assert!(store.commit_authoritative(None, authoritative(&[(10, 2), (3, 1)])));
    }

    #[test]
    fn retract_restores_previous_projection() {
        let store = GridStore::new();
        let id = ids(1)[0];
        store.commit_authoritative(None, authoritative(&[(1, 1)]));
        let before = store.current();

        store.apply_optimistic(id, mood(5), slot(2), Utc::now());
        assert!(store.retract(id));
        assert_eq!(store.current(), before);
        assert!(!store.retract(id));
    }

    #[test]
    fn retract_ignored_after_authoritative_commit() {
        let store = GridStore::new();
        let ids = ids(2);
        store.apply_optimistic(ids[0], mood(5), slot(2), Utc::now());
        store.commit_authoritative(Some(ids[0]), authoritative(&[(2, 5)]));

        assert!(!store.retract(ids[0]));
        assert!(store.current().is_authoritative());
        // a different attempt never retracts someone else's projection
        store.apply_optimistic(ids[1], mood(1), slot(3), Utc::now());
        assert!(!store.retract(ids[0]));
        assert!(store.current().is_optimistic());
    }
}
