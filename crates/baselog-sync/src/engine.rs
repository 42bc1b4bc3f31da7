//! The sync engine - wires selection, lifecycle, projection and reconciliation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use baselog_core::{GridProjection, MoodValue, Slot};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{FailurePolicy, SyncConfig};
use crate::error::{Error, PreconditionError, Result, WriteFailure};
use crate::events::SyncEvent;
use crate::lifecycle::{
    AttemptId, LifecycleTracker, ReconcileStatus, Transition, WriteAttempt, WriteState,
};
use crate::reconcile::{authoritative_projection, ReconciliationScheduler, Target};
use crate::remote::{Confirmation, Ledger, ReadOutcome, TxHandle, Wallet};
use crate::store::GridStore;

/// Capacity of the event channel. Slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 64;

/// State shared by the engine and its background tasks.
pub(crate) struct Shared {
    pub config: SyncConfig,
    pub store: GridStore,
    pub clock: Arc<dyn Clock>,
    tracker: Mutex<LifecycleTracker>,
    events: broadcast::Sender<SyncEvent>,
}

impl Shared {
    pub fn new(config: SyncConfig, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            store: GridStore::new(),
            clock,
            tracker: Mutex::new(LifecycleTracker::new()),
            events,
        }
    }

    /// Lock the tracker. Never hold the guard across an `.await`.
    pub fn tracker(&self) -> MutexGuard<'_, LifecycleTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn emit(&self, event: SyncEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Move `id` to a terminal state and start its observation window.
    fn settle(self: &Arc<Self>, id: AttemptId, failure: Option<WriteFailure>) -> bool {
        let retract = failure.is_some() && self.config.failure_policy == FailurePolicy::Retract;

        let event = {
            let mut tracker = self.tracker();
            let event = match failure {
                Some(failure) => tracker.failed(id, failure),
                None => tracker.confirmed(id),
            };
            let Some(event) = event else {
                return false;
            };
            if retract && tracker.is_current(id) {
                self.store.retract(id);
            }
            event
        };

        match &event.transition {
            Transition::Failed(reason) => warn!(attempt = %id, %reason, "Write failed"),
            _ => info!(attempt = %id, "Write confirmed"),
        }
        self.emit(SyncEvent::Lifecycle(event));
        self.schedule_retirement(id);
        true
    }

    fn schedule_retirement(self: &Arc<Self>, id: AttemptId) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(shared.config.observation_window).await;
            let retired = shared.tracker().retire(id);
            if retired {
                shared.emit(SyncEvent::Retired { attempt: id });
            }
        });
    }
}

/// Optimistic write and reconcile engine for one user's mood grid.
///
/// Must be used from within a tokio runtime: confirmation watching,
/// reconciliation and retirement run as spawned tasks.
pub struct SyncEngine {
    shared: Arc<Shared>,
    ledger: Arc<dyn Ledger>,
    wallet: Arc<dyn Wallet>,
    scheduler: Arc<ReconciliationScheduler>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig, ledger: Arc<dyn Ledger>, wallet: Arc<dyn Wallet>) -> Self {
        Self::with_clock(config, ledger, wallet, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SyncConfig,
        ledger: Arc<dyn Ledger>,
        wallet: Arc<dyn Wallet>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let shared = Arc::new(Shared::new(config, clock));
        let scheduler = Arc::new(ReconciliationScheduler::new(
            Arc::clone(&ledger),
            Arc::clone(&shared),
        ));

        Self {
            shared,
            ledger,
            wallet,
            scheduler,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// The projection currently displayed.
    pub fn current(&self) -> GridProjection {
        self.shared.store.current()
    }

    /// Notified whenever the displayed projection changes.
    pub fn subscribe_projection(&self) -> watch::Receiver<GridProjection> {
        self.shared.store.subscribe()
    }

    /// Selection, lifecycle and reconciliation events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    /// State of the current attempt, `Idle` when none.
    pub fn state(&self) -> WriteState {
        self.shared.tracker().state()
    }

    /// Snapshot of the current attempt for a status banner.
    pub fn status(&self) -> Option<WriteAttempt> {
        self.shared.tracker().current().cloned()
    }

    /// Snapshot of a recent attempt, current or not.
    pub fn attempt(&self, id: AttemptId) -> Option<WriteAttempt> {
        self.shared.tracker().get(id).cloned()
    }

    /// Attempt whose reconciliation sequence is running, if any.
    pub fn reconciling(&self) -> Option<AttemptId> {
        self.scheduler.active()
    }

    /// Slot of the current local day.
    pub fn today(&self) -> Slot {
        Slot::for_date(self.shared.clock.today())
    }

    /// Log `mood` for today.
    ///
    /// Returns once the ledger has accepted the write and the optimistic
    /// projection is shown. Confirmation and reconciliation continue in the
    /// background and are reported through [`subscribe`](Self::subscribe).
    pub async fn select(&self, mood: u8) -> Result<AttemptId> {
        let mood = MoodValue::new(mood)?;
        let slot = self.today();

        let account = self.wallet.current_account().ok_or(PreconditionError::NoAccount)?;
        if !self.wallet.can_submit(&account) {
            return Err(PreconditionError::CannotSubmit(account).into());
        }
        let required = self.shared.config.required_chain_id;
        self.wallet
            .ensure_required_network(&account, required)
            .await
            .map_err(|e| PreconditionError::WrongNetwork {
                required,
                reason: e.to_string(),
            })?;

        let begin = self.shared.tracker().begin(mood, slot, account.clone());
        let id = begin.attempt;
        self.scheduler.cancel_before(id);

        info!(attempt = %id, %slot, %mood, %account, "Mood selected");
        self.shared.emit(SyncEvent::Selected {
            attempt: id,
            mood,
            slot,
        });
        self.shared.emit(SyncEvent::Lifecycle(begin));

        match self.ledger.write(&account, slot, mood).await {
            Ok(handle) => {
                self.handle_received(id, handle);
                Ok(id)
            }
            Err(e) => {
                let reason = e.to_string();
                self.shared
                    .settle(id, Some(WriteFailure::SubmissionRejected(reason.clone())));
                Err(Error::SubmissionRejected(reason))
            }
        }
    }

    /// Record the handle for `id`.
    ///
    /// Projects the write into the store, starts reconciliation and the
    /// confirmation watcher. A redelivered handle, or a handle for an attempt
    /// that is no longer submitting, is ignored and returns `false`.
    pub fn handle_received(&self, id: AttemptId, handle: TxHandle) -> bool {
        let (event, target) = {
            let mut tracker = self.shared.tracker();
            let Some(event) = tracker.handle_received(id, handle.clone()) else {
                debug!(attempt = %id, %handle, "Ignoring redelivered handle");
                return false;
            };
            let Some(attempt) = tracker.get(id) else {
                return false;
            };
            let target = Target {
                attempt: id,
                account: attempt.account.clone(),
                slot: attempt.slot,
                mood: attempt.mood,
            };
            if tracker.is_current(id) {
                self.shared
                    .store
                    .apply_optimistic(id, target.mood, target.slot, self.shared.clock.now());
            }
            (event, target)
        };

        info!(attempt = %id, %handle, "Write submitted");
        self.shared.emit(SyncEvent::Lifecycle(event));
        self.scheduler.on_submitted(target);
        self.watch_confirmation(id, handle);
        true
    }

    /// Read the account's grid once and show it.
    ///
    /// Returns `Ok(false)` when there is nothing to show yet or when a
    /// selection owns the grid. A selection owns it from `select` until its
    /// reconciliation commits, so an optimistic projection is never replaced
    /// here, even after reconciliation gave up or the write failed.
    pub async fn refresh(&self) -> Result<bool> {
        let account = self.wallet.current_account().ok_or(PreconditionError::NoAccount)?;
        let generation = self.shared.tracker().latest();

        let days = match self.ledger.read(&account).await? {
            ReadOutcome::Available(days) => days,
            ReadOutcome::NotAvailable => {
                debug!(%account, "Refresh found no data");
                return Ok(false);
            }
        };
        let Some(projection) = authoritative_projection(&days, self.shared.clock.now())? else {
            return Ok(false);
        };

        let tracker = self.shared.tracker();
        let busy = tracker.latest().and_then(|id| tracker.get(id)).is_some_and(|a| {
            a.state == WriteState::Submitting || a.reconcile == ReconcileStatus::Polling
        });
        if tracker.latest() != generation || busy || self.shared.store.current().is_optimistic() {
            debug!(%account, "Discarding refresh, a selection owns the grid");
            return Ok(false);
        }

        let committed = self.shared.store.commit_authoritative(None, projection);
        drop(tracker);
        if committed {
            info!(%account, days = days.len(), "Grid refreshed");
        }
        Ok(committed)
    }

    fn watch_confirmation(&self, id: AttemptId, handle: TxHandle) {
        let shared = Arc::clone(&self.shared);
        let ledger = Arc::clone(&self.ledger);
        tokio::spawn(async move {
            let timeout = shared.config.confirmation_timeout;
            let failure = match tokio::time::timeout(timeout, ledger.watch(&handle)).await {
                Ok(Confirmation::Confirmed) => None,
                Ok(Confirmation::Failed(reason)) => Some(WriteFailure::ConfirmationFailed(reason)),
                Err(_) => Some(WriteFailure::ConfirmationTimeout(timeout)),
            };
            shared.settle(id, failure);
        });
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .field("reconciling", &self.reconciling())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::config::RetrySchedule;
    use crate::remote::{LoggedDay, RemoteError};
    use crate::testing::{FixedClock, ScriptedLedger, StaticWallet};

    fn engine(
        config: SyncConfig,
        ledger: &Arc<ScriptedLedger>,
        wallet: StaticWallet,
    ) -> SyncEngine {
        SyncEngine::with_clock(
            config,
            Arc::clone(ledger) as Arc<dyn Ledger>,
            Arc::new(wallet),
            Arc::new(FixedClock::at_slot(10)),
        )
    }

    fn slot(i: u16) -> Slot {
        Slot::new(i).unwrap()
    }

    fn mood(v: u8) -> MoodValue {
        MoodValue::new(v).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn select_shows_optimistic_projection_immediately() {
        let ledger = Arc::new(ScriptedLedger::new());
        let engine = engine(SyncConfig::default(), &ledger, StaticWallet::connected("0xabc"));

        let id = engine.select(2).await.unwrap();

        let shown = engine.current();
        assert!(shown.is_optimistic());
        assert_eq!(shown.get(slot(10)), Some(mood(2)));
        assert_eq!(shown.filled_count(), 1);
        assert_eq!(engine.state(), WriteState::Submitted);
        assert_eq!(engine.reconciling(), Some(id));
        assert_eq!(ledger.read_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconciles_on_second_read() {
        let ledger = Arc::new(ScriptedLedger::new());
        ledger.push_not_available();
        ledger.push_available(vec![LoggedDay::new(10, 2)]);
        let engine = engine(SyncConfig::default(), &ledger, StaticWallet::connected("0xabc"));

        let id = engine.select(2).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let shown = engine.current();
        assert!(shown.is_authoritative());
        assert_eq!(shown.get(slot(10)), Some(mood(2)));
        assert_eq!(ledger.read_count(), 2);
        assert_eq!(
            engine.attempt(id).unwrap().reconcile,
            ReconcileStatus::Reconciled { read: 2 }
        );
        assert_eq!(engine.reconciling(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn precondition_failures_send_nothing() {
        let ledger = Arc::new(ScriptedLedger::new());

        let no_account = engine(SyncConfig::default(), &ledger, StaticWallet::disconnected());
        let err = no_account.select(1).await.unwrap_err();
        assert!(matches!(err, Error::Precondition(PreconditionError::NoAccount)));

        let blocked = engine(SyncConfig::default(), &ledger, StaticWallet::blocked("0xabc"));
        let err = blocked.select(1).await.unwrap_err();
        assert!(matches!(err, Error::Precondition(PreconditionError::CannotSubmit(_))));

        let wrong = engine(SyncConfig::default(), &ledger, StaticWallet::on_wrong_network("0xabc"));
        let err = wrong.select(1).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Precondition(PreconditionError::WrongNetwork { required: 84532, .. })
        ));

        assert_eq!(ledger.write_count(), 0);
        assert_eq!(wrong.state(), WriteState::Idle);
        assert!(wrong.current().is_unset());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_mood_is_rejected_before_any_io() {
        let ledger = Arc::new(ScriptedLedger::new());
        let engine = engine(SyncConfig::default(), &ledger, StaticWallet::connected("0xabc"));

        let err = engine.select(8).await.unwrap_err();
        assert!(matches!(err, Error::Core(baselog_core::Error::UnknownMood(8))));
        assert_eq!(ledger.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn redelivered_handle_is_ignored() {
        let ledger = Arc::new(ScriptedLedger::new());
        let engine = engine(SyncConfig::default(), &ledger, StaticWallet::connected("0xabc"));
        let mut events = engine.subscribe();

        let id = engine.select(2).await.unwrap();
        let handle = engine.attempt(id).unwrap().handle.unwrap();
        assert!(!engine.handle_received(id, handle));

        let mut submitted = 0;
        while let Ok(ev) = events.try_recv() {
            if let SyncEvent::Lifecycle(l) = ev {
                if matches!(l.transition, Transition::Submitted(_)) {
                    submitted += 1;
                }
            }
        }
        assert_eq!(submitted, 1);
        assert_eq!(engine.reconciling(), Some(id));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_timeout_keeps_optimistic_projection() {
        let ledger = Arc::new(ScriptedLedger::new());
        ledger.confirm_never();
        let config = SyncConfig::default()
            .with_confirmation_timeout(Duration::from_secs(5))
            .with_schedule(RetrySchedule::fixed(Duration::from_secs(1)));
        let engine = engine(config, &ledger, StaticWallet::connected("0xabc"));

        let id = engine.select(4).await.unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        let attempt = engine.attempt(id).unwrap();
        assert_eq!(attempt.state, WriteState::Failed);
        assert_eq!(
            attempt.failure,
            Some(WriteFailure::ConfirmationTimeout(Duration::from_secs(5)))
        );
        assert!(engine.current().is_optimistic());
        assert_eq!(engine.current().get(slot(10)), Some(mood(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn retract_policy_restores_previous_grid() {
        let ledger = Arc::new(ScriptedLedger::new());
        ledger.confirm_with(Duration::from_secs(1), Confirmation::Failed("reverted".into()));
        let config = SyncConfig::default().with_failure_policy(FailurePolicy::Retract);
        let engine = engine(config, &ledger, StaticWallet::connected("0xabc"));

        ledger.push_available(vec![LoggedDay::new(3, 0)]);
        assert!(engine.refresh().await.unwrap());
        let before = engine.current();

        let id = engine.select(6).await.unwrap();
        assert!(engine.current().is_optimistic());
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(engine.attempt(id).unwrap().state, WriteState::Failed);
        assert_eq!(engine.current(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_attempt_retires_after_observation_window() {
        let ledger = Arc::new(ScriptedLedger::new());
        ledger.confirm_with(Duration::from_secs(1), Confirmation::Confirmed);
        let engine = engine(SyncConfig::default(), &ledger, StaticWallet::connected("0xabc"));
        let mut events = engine.subscribe();

        let id = engine.select(0).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(engine.status().unwrap().state, WriteState::Confirmed);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(engine.status().is_none());
        assert_eq!(engine.state(), WriteState::Idle);

        let mut retired = false;
        while let Ok(ev) = events.try_recv() {
            retired |= ev == SyncEvent::Retired { attempt: id };
        }
        assert!(retired);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_loads_grid_when_idle() {
        let ledger = Arc::new(ScriptedLedger::new());
        let engine = engine(SyncConfig::default(), &ledger, StaticWallet::connected("0xabc"));

        assert!(!assert_ok!(engine.refresh().await));
        ledger.push_available(vec![LoggedDay::new(1, 1), LoggedDay::new(2, 3)]);
        assert!(assert_ok!(engine.refresh().await));

        let shown = engine.current();
        assert!(shown.is_authoritative());
        assert_eq!(shown.filled_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_does_not_override_pending_selection() {
        let ledger = Arc::new(ScriptedLedger::new());
        let engine = engine(SyncConfig::default(), &ledger, StaticWallet::connected("0xabc"));

        engine.select(5).await.unwrap();
        ledger.push_available(vec![LoggedDay::new(1, 1)]);
        assert!(!engine.refresh().await.unwrap());
        assert!(engine.current().is_optimistic());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_surfaces_read_errors() {
        let ledger = Arc::new(ScriptedLedger::new());
        ledger.push_read(Duration::ZERO, Err(RemoteError::Transport("rpc down".into())));
        let engine = engine(SyncConfig::default(), &ledger, StaticWallet::connected("0xabc"));

        let err = assert_err!(engine.refresh().await);
        assert!(matches!(err, Error::Read(RemoteError::Transport(_))));
    }
}
