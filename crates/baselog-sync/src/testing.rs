//! Test doubles for the engine's collaborators.
//!
//! Available in this crate's tests and, through the `testing` feature, to
//! other crates' tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use baselog_core::{MoodValue, Slot};
use chrono::{DateTime, NaiveDate, Utc};

use crate::clock::Clock;
use crate::remote::{
    Account, Confirmation, Ledger, LoggedDay, ReadOutcome, RemoteError, TxHandle, Wallet,
};

type Scripted<T> = (Duration, Result<T, RemoteError>);

/// A ledger that answers from queued scripts.
///
/// Writes return a fresh handle and reads return `NotAvailable` once their
/// queues are empty. Confirmations arrive after 2s unless configured
/// otherwise.
#[derive(Debug)]
pub struct ScriptedLedger {
    writes: Mutex<VecDeque<Scripted<TxHandle>>>,
    reads: Mutex<VecDeque<Scripted<ReadOutcome>>>,
    confirmation: Mutex<(Duration, Option<Confirmation>)>,
    written: Mutex<Vec<(Account, Slot, MoodValue)>>,
    write_calls: AtomicUsize,
    read_calls: AtomicUsize,
    watch_calls: AtomicUsize,
}

impl Default for ScriptedLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self {
            writes: Mutex::new(VecDeque::new()),
            reads: Mutex::new(VecDeque::new()),
            confirmation: Mutex::new((Duration::from_secs(2), Some(Confirmation::Confirmed))),
            written: Mutex::new(Vec::new()),
            write_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            watch_calls: AtomicUsize::new(0),
        }
    }

    pub fn push_write(&self, delay: Duration, result: Result<TxHandle, RemoteError>) {
        lock(&self.writes).push_back((delay, result));
    }

    /// The next write is declined before a handle exists.
    pub fn reject_next_write(&self, reason: &str) {
        self.push_write(Duration::ZERO, Err(RemoteError::Rejected(reason.to_string())));
    }

    pub fn push_read(&self, delay: Duration, result: Result<ReadOutcome, RemoteError>) {
        lock(&self.reads).push_back((delay, result));
    }

    pub fn push_available(&self, days: Vec<LoggedDay>) {
        self.push_read(Duration::ZERO, Ok(ReadOutcome::Available(days)));
    }

    pub fn push_not_available(&self) {
        self.push_read(Duration::ZERO, Ok(ReadOutcome::NotAvailable));
    }

    /// Every watched handle resolves to `outcome` after `delay`.
    pub fn confirm_with(&self, delay: Duration, outcome: Confirmation) {
        *lock(&self.confirmation) = (delay, Some(outcome));
    }

    /// Watched handles never resolve.
    pub fn confirm_never(&self) {
        *lock(&self.confirmation) = (Duration::ZERO, None);
    }

    pub fn write_count(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn watch_count(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Arguments of every write call, in order.
    pub fn written(&self) -> Vec<(Account, Slot, MoodValue)> {
        lock(&self.written).clone()
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn write(
        &self,
        account: &Account,
        slot: Slot,
        mood: MoodValue,
    ) -> Result<TxHandle, RemoteError> {
        let n = self.write_calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.written).push((account.clone(), slot, mood));

        let next = lock(&self.writes).pop_front();
        let (delay, result) = next
            .unwrap_or_else(|| (Duration::ZERO, Ok(TxHandle::new(format!("0x{n:064x}")))));
        tokio::time::sleep(delay).await;
        result
    }

    async fn watch(&self, _handle: &TxHandle) -> Confirmation {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        let (delay, outcome) = lock(&self.confirmation).clone();
        match outcome {
            Some(outcome) => {
                tokio::time::sleep(delay).await;
                outcome
            }
            None => std::future::pending().await,
        }
    }

    async fn read(&self, _account: &Account) -> Result<ReadOutcome, RemoteError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.reads).pop_front();
        let (delay, result) = next.unwrap_or((Duration::ZERO, Ok(ReadOutcome::NotAvailable)));
        tokio::time::sleep(delay).await;
        result
    }
}

/// A wallet with a fixed answer to every question.
#[derive(Debug, Clone)]
pub struct StaticWallet {
    account: Option<Account>,
    can_submit: bool,
    network_error: Option<String>,
}

impl StaticWallet {
    pub fn connected(address: &str) -> Self {
        Self {
            account: Some(Account::new(address)),
            can_submit: true,
            network_error: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            account: None,
            can_submit: false,
            network_error: None,
        }
    }

    /// Connected, but submitting is not allowed.
    pub fn blocked(address: &str) -> Self {
        Self {
            can_submit: false,
            ..Self::connected(address)
        }
    }

    /// Connected, but the network switch is refused.
    pub fn on_wrong_network(address: &str) -> Self {
        Self {
            network_error: Some("user rejected network switch".to_string()),
            ..Self::connected(address)
        }
    }
}

#[async_trait]
impl Wallet for StaticWallet {
    fn current_account(&self) -> Option<Account> {
        self.account.clone()
    }

    fn can_submit(&self, account: &Account) -> bool {
        self.can_submit && self.account.as_ref() == Some(account)
    }

    async fn ensure_required_network(
        &self,
        _account: &Account,
        _chain_id: u64,
    ) -> Result<(), RemoteError> {
        match &self.network_error {
            Some(reason) => Err(RemoteError::Rejected(reason.clone())),
            None => Ok(()),
        }
    }
}

/// A clock stopped at noon UTC on a fixed date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    today: NaiveDate,
}

impl FixedClock {
    pub fn on(today: NaiveDate) -> Self {
        Self { today }
    }

    /// A date in 2025 whose slot is `slot`.
    ///
    /// # Panics
    /// If `slot` is not a valid slot index.
    pub fn at_slot(slot: u16) -> Self {
        let today = NaiveDate::from_yo_opt(2025, u32::from(slot) + 1)
            .filter(|_| slot < baselog_core::CYCLE_LEN)
            .expect("slot out of range");
        Self::on(today)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.today.and_time(chrono::NaiveTime::MIN).and_utc() + chrono::TimeDelta::hours(12)
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_maps_to_requested_slot() {
        for i in [0, 10, 364] {
            let clock = FixedClock::at_slot(i);
            assert_eq!(Slot::for_date(clock.today()).index(), i);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reads_default_to_not_available() {
        let ledger = ScriptedLedger::new();
        ledger.push_available(vec![LoggedDay::new(1, 1)]);

        let account = Account::new("0xabc");
        assert!(matches!(ledger.read(&account).await, Ok(ReadOutcome::Available(_))));
        assert_eq!(ledger.read(&account).await, Ok(ReadOutcome::NotAvailable));
        assert_eq!(ledger.read_count(), 2);
    }
}
