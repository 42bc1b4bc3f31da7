//! Contracts with the collaborators outside the engine.
//!
//! The ledger (write, confirmation watch, read) and the wallet (account,
//! submit predicate, network switch) are black boxes reached through these
//! traits.

use async_trait::async_trait;
use baselog_core::{MoodValue, Slot};
use thiserror::Error;

/// Opaque account identifier, e.g. a wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Account(pub String);

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation handle returned when the ledger accepts a write for processing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxHandle(pub String);

impl TxHandle {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }
}

impl std::fmt::Display for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One day as stored by the ledger, in raw wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggedDay {
    pub day_index: u64,
    pub mood_value: u8,
}

impl LoggedDay {
    pub fn new(day_index: u64, mood_value: u8) -> Self {
        Self {
            day_index,
            mood_value,
        }
    }
}

/// Result of an authoritative read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The ledger returned data for the account.
    Available(Vec<LoggedDay>),
    /// Nothing readable yet. Expected while indexing catches up.
    NotAvailable,
}

/// Final word of the confirmation watcher on a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Failed(String),
}

/// Transport-level failures reported by collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request was declined, e.g. the user refused to sign.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The request could not be completed.
    #[error("transport: {0}")]
    Transport(String),
}

/// The remote mood ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submit `logMood(slot, mood)` for `account`.
    ///
    /// Returns once the ledger has accepted the write for processing; this
    /// is not a confirmation.
    async fn write(
        &self,
        account: &Account,
        slot: Slot,
        mood: MoodValue,
    ) -> Result<TxHandle, RemoteError>;

    /// Wait for the outcome of a submitted write.
    async fn watch(&self, handle: &TxHandle) -> Confirmation;

    /// Read the account's logged days.
    async fn read(&self, account: &Account) -> Result<ReadOutcome, RemoteError>;
}

/// The wallet connection.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Currently connected account, if any.
    fn current_account(&self) -> Option<Account>;

    /// Whether `account` may submit a write right now.
    fn can_submit(&self, account: &Account) -> bool;

    /// Switch to `chain_id` if needed.
    async fn ensure_required_network(
        &self,
        account: &Account,
        chain_id: u64,
    ) -> Result<(), RemoteError>;
}
