//! BaseLog simulator
//!
//! Drives a [`baselog_sync::SyncEngine`] against an in-memory ledger that
//! mimics an indexed chain, so the optimistic write and reconcile flow can be
//! watched from a terminal.

pub mod render;
pub mod sim;

pub use sim::{Latency, LocalWallet, SimulatedLedger};
