//! Error types for baselog-sync.

use std::time::Duration;

use thiserror::Error;

use crate::remote::{Account, RemoteError};

/// Result type for baselog-sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced synchronously to the caller of an engine operation.
#[derive(Debug, Error)]
pub enum Error {
    /// The wallet is not ready to submit; nothing was sent.
    #[error("precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    /// Invalid mood value, slot or authoritative payload.
    #[error(transparent)]
    Core(#[from] baselog_core::Error),

    /// The ledger declined the write before issuing a handle.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// A direct authoritative read failed at transport level.
    #[error("read failed: {0}")]
    Read(#[from] RemoteError),

    /// Configuration could not be parsed or validated.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// True when the user can fix the problem and simply retry.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

/// Wallet-side reasons a selection cannot be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("no account connected")]
    NoAccount,

    #[error("account {0} cannot submit right now")]
    CannotSubmit(Account),

    #[error("not on required network {required}: {reason}")]
    WrongNetwork { required: u64, reason: String },
}

/// Why a write attempt ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteFailure {
    /// Declined before a handle was issued.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// A handle was issued but no confirmation arrived in time.
    #[error("confirmation timed out after {0:?}")]
    ConfirmationTimeout(Duration),

    /// The confirmation watcher reported a failed transaction.
    #[error("confirmation failed: {0}")]
    ConfirmationFailed(String),
}

/// Configuration problems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("retry schedule: {0}")]
    InvalidSchedule(String),

    #[error("{key}: invalid value {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
