//! In-memory ledger and wallet.
//!
//! The ledger behaves like an indexed chain: a write is accepted after a
//! short latency, confirmed later, and only becomes readable once indexing
//! catches up.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use baselog_core::{MoodValue, Slot};
use baselog_sync::{
    Account, Confirmation, Ledger, LoggedDay, ReadOutcome, RemoteError, TxHandle, Wallet,
};
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Timing of the simulated chain.
#[derive(Debug, Clone, Copy)]
pub struct Latency {
    /// Time until a write returns its handle.
    pub write: Duration,
    /// Time from handle to confirmation.
    pub confirm: Duration,
    /// Time from handle until the write shows up in reads.
    pub index_lag: Duration,
    /// Upper bound of random extra indexing lag.
    pub jitter: Duration,
}

impl Default for Latency {
    fn default() -> Self {
        Self {
            write: Duration::from_millis(300),
            confirm: Duration::from_secs(2),
            index_lag: Duration::from_millis(2500),
            jitter: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Logged {
    mood: u8,
    readable_at: Instant,
}

#[derive(Debug, Default)]
struct Chain {
    days: HashMap<Account, BTreeMap<u64, Logged>>,
    pending: HashMap<TxHandle, Instant>,
}

/// A ledger kept in memory.
#[derive(Debug)]
pub struct SimulatedLedger {
    latency: Latency,
    chain: Mutex<Chain>,
    nonce: AtomicU64,
    reject: Mutex<Option<String>>,
}

impl SimulatedLedger {
    pub fn new(latency: Latency) -> Self {
        Self {
            latency,
            chain: Mutex::new(Chain::default()),
            nonce: AtomicU64::new(0),
            reject: Mutex::new(None),
        }
    }

    /// Store days for `account` that are readable right away.
    pub fn seed(&self, account: &Account, days: impl IntoIterator<Item = (Slot, MoodValue)>) {
        let now = Instant::now();
        let mut chain = self.chain();
        let logged = chain.days.entry(account.clone()).or_default();
        for (slot, mood) in days {
            logged.insert(
                slot.day_index(),
                Logged {
                    mood: mood.value(),
                    readable_at: now,
                },
            );
        }
    }

    /// Seed `count` random days ending the day before `today`.
    pub fn seed_history(&self, account: &Account, today: Slot, count: u16) {
        let mut rng = rand::thread_rng();
        let days: Vec<_> = (1..=count.min(today.index()))
            .filter_map(|back| {
                let slot = Slot::new(today.index() - back).ok()?;
                let mood = MoodValue::new(rng.gen_range(0..8)).ok()?;
                Some((slot, mood))
            })
            .collect();
        self.seed(account, days);
    }

    /// Decline every following write with `reason`.
    pub fn reject_writes(&self, reason: impl Into<String>) {
        *self.reject.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    fn chain(&self) -> MutexGuard<'_, Chain> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tx_hash(&self, account: &Account, slot: Slot, mood: MoodValue) -> TxHandle {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut hasher = blake3::Hasher::new();
        hasher.update(account.0.as_bytes());
        hasher.update(&slot.day_index().to_be_bytes());
        hasher.update(&[mood.value()]);
        hasher.update(&nonce.to_be_bytes());
        TxHandle::new(format!("0x{}", hex::encode(hasher.finalize().as_bytes())))
    }

    fn jitter(&self) -> Duration {
        let max = self.latency.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

#[async_trait]
impl Ledger for SimulatedLedger {
    async fn write(
        &self,
        account: &Account,
        slot: Slot,
        mood: MoodValue,
    ) -> Result<TxHandle, RemoteError> {
        tokio::time::sleep(self.latency.write).await;

        let rejected = self.reject.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(reason) = rejected {
            debug!(%account, %reason, "Simulated write rejected");
            return Err(RemoteError::Rejected(reason));
        }

        let handle = self.tx_hash(account, slot, mood);
        let now = Instant::now();
        let readable_at = now + self.latency.index_lag + self.jitter();

        let mut chain = self.chain();
        chain.days.entry(account.clone()).or_default().insert(
            slot.day_index(),
            Logged {
                mood: mood.value(),
                readable_at,
            },
        );
        chain.pending.insert(handle.clone(), now + self.latency.confirm);

        debug!(%account, %slot, %handle, "Simulated write accepted");
        Ok(handle)
    }

    async fn watch(&self, handle: &TxHandle) -> Confirmation {
        let confirm_at = self.chain().pending.get(handle).copied();
        match confirm_at {
            Some(at) => {
                tokio::time::sleep_until(at).await;
                self.chain().pending.remove(handle);
                Confirmation::Confirmed
            }
            None => Confirmation::Failed(format!("unknown transaction {handle}")),
        }
    }

    async fn read(&self, account: &Account) -> Result<ReadOutcome, RemoteError> {
        let now = Instant::now();
        let chain = self.chain();
        let days: Vec<LoggedDay> = chain
            .days
            .get(account)
            .into_iter()
            .flatten()
            .filter(|(_, l)| l.readable_at <= now)
            .map(|(&day, l)| LoggedDay::new(day, l.mood))
            .collect();

        trace!(%account, days = days.len(), "Simulated read");
        if days.is_empty() {
            Ok(ReadOutcome::NotAvailable)
        } else {
            Ok(ReadOutcome::Available(days))
        }
    }
}

/// A wallet that is always connected to the required network.
#[derive(Debug, Clone)]
pub struct LocalWallet {
    account: Account,
}

impl LocalWallet {
    /// Wallet with an address derived from `seed`.
    pub fn from_seed(seed: &str) -> Self {
        let digest = blake3::hash(seed.as_bytes());
        Self {
            account: Account::new(format!("0x{}", hex::encode(&digest.as_bytes()[..20]))),
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }
}

#[async_trait]
impl Wallet for LocalWallet {
    fn current_account(&self) -> Option<Account> {
        Some(self.account.clone())
    }

    fn can_submit(&self, account: &Account) -> bool {
        *account == self.account
    }

    async fn ensure_required_network(
        &self,
        _account: &Account,
        _chain_id: u64,
    ) -> Result<(), RemoteError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(i: u16) -> Slot {
        Slot::new(i).unwrap()
    }

    fn mood(v: u8) -> MoodValue {
        MoodValue::new(v).unwrap()
    }

    #[test]
    fn wallet_address_looks_like_an_address() {
        let wallet = LocalWallet::from_seed("alice");
        assert_eq!(wallet.account().0.len(), 42);
        assert!(wallet.account().0.starts_with("0x"));
        assert_eq!(wallet.account(), LocalWallet::from_seed("alice").account());
    }

    #[tokio::test(start_paused = true)]
    async fn write_becomes_readable_after_index_lag() {
        let ledger = SimulatedLedger::new(Latency {
            write: Duration::from_millis(100),
            confirm: Duration::from_secs(1),
            index_lag: Duration::from_secs(3),
            jitter: Duration::ZERO,
        });
        let account = Account::new("0xabc");

        let handle = ledger.write(&account, slot(10), mood(2)).await.unwrap();
        assert!(handle.0.starts_with("0x"));
        assert_eq!(handle.0.len(), 66);
        assert_eq!(ledger.read(&account).await, Ok(ReadOutcome::NotAvailable));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(
            ledger.read(&account).await,
            Ok(ReadOutcome::Available(vec![LoggedDay::new(10, 2)]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn handles_are_unique_and_confirm() {
        let ledger = SimulatedLedger::new(Latency::default());
        let account = Account::new("0xabc");

        let a = ledger.write(&account, slot(1), mood(1)).await.unwrap();
        let b = ledger.write(&account, slot(1), mood(1)).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(ledger.watch(&a).await, Confirmation::Confirmed);
        assert!(matches!(
            ledger.watch(&TxHandle::new("0xdead")).await,
            Confirmation::Failed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_history_is_readable_immediately() {
        let ledger = SimulatedLedger::new(Latency::default());
        let account = Account::new("0xabc");
        ledger.seed_history(&account, slot(10), 5);

        match ledger.read(&account).await.unwrap() {
            ReadOutcome::Available(days) => {
                assert_eq!(days.len(), 5);
                assert!(days.iter().all(|d| (5..10).contains(&d.day_index)));
            }
            ReadOutcome::NotAvailable => panic!("expected seeded days"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_writes_store_nothing() {
        let ledger = SimulatedLedger::new(Latency::default());
        let account = Account::new("0xabc");
        ledger.reject_writes("user rejected");

        assert!(matches!(
            ledger.write(&account, slot(1), mood(1)).await,
            Err(RemoteError::Rejected(_))
        ));
        assert_eq!(ledger.read(&account).await, Ok(ReadOutcome::NotAvailable));
    }
}
