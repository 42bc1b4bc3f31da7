//! BaseLog Sync
//!
//! Optimistic write and reconcile engine for the mood grid.
//!
//! A selection goes through these stages:
//!
//! 1. **Preconditions**: account connected, allowed to submit, on the
//!    required network. Failures return immediately and nothing is sent.
//! 2. **Write**: the ledger accepts the write and returns a handle.
//! 3. **Projection**: in the same handler the store shows the mood in
//!    today's slot, tagged optimistic.
//! 4. **Reconciliation**: reads on a [`RetrySchedule`] until the ledger
//!    reflects the write, then the authoritative projection replaces the
//!    optimistic one.
//!
//! Confirmation is watched alongside reconciliation and only drives status.
//! A newer selection supersedes the previous attempt; late results for a
//! superseded attempt never touch the store.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! # use baselog_sync::{Ledger, Wallet};
//! use baselog_sync::{SyncConfig, SyncEngine};
//!
//! # async fn run(ledger: Arc<dyn Ledger>, wallet: Arc<dyn Wallet>) -> baselog_sync::Result<()> {
//! let engine = SyncEngine::new(SyncConfig::from_env()?, ledger, wallet);
//! let mut grid = engine.subscribe_projection();
//!
//! engine.select(2).await?;
//! grid.changed().await.ok();
//! println!("{} days logged", grid.borrow().filled_count());
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod reconcile;
pub mod remote;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use config::{AcceptPolicy, FailurePolicy, RetrySchedule, SyncConfig, DEFAULT_CHAIN_ID};
pub use engine::SyncEngine;
pub use error::{ConfigError, Error, PreconditionError, Result, WriteFailure};
pub use events::SyncEvent;
pub use lifecycle::{
    AttemptId, LifecycleEvent, ReconcileStatus, Transition, WriteAttempt, WriteState,
};
pub use reconcile::{authoritative_projection, ReconcileOutcome};
pub use remote::{
    Account, Confirmation, Ledger, LoggedDay, ReadOutcome, RemoteError, TxHandle, Wallet,
};
pub use store::GridStore;
