//! Shared setup for the end-to-end scenarios.

use std::sync::Arc;

use baselog_sync::testing::{FixedClock, ScriptedLedger, StaticWallet};
use baselog_sync::{Ledger, SyncConfig, SyncEngine, SyncEvent};
use tokio::sync::broadcast;

/// Slot that "today" maps to in every scenario.
pub const TODAY: u16 = 10;

/// Address of the connected account.
pub const ACCOUNT: &str = "0x00000000000000000000000000000000000000aa";

/// An engine wired to a scripted ledger, with its event stream.
pub struct Harness {
    pub engine: SyncEngine,
    pub ledger: Arc<ScriptedLedger>,
    pub events: broadcast::Receiver<SyncEvent>,
}

impl Harness {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_wallet(config, StaticWallet::connected(ACCOUNT))
    }

    pub fn with_wallet(config: SyncConfig, wallet: StaticWallet) -> Self {
        let ledger = Arc::new(ScriptedLedger::new());
        let engine = SyncEngine::with_clock(
            config,
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            Arc::new(wallet),
            Arc::new(FixedClock::at_slot(TODAY)),
        );
        let events = engine.subscribe();
        Self { engine, ledger, events }
    }

    /// Everything published so far.
    pub fn drain(&mut self) -> Vec<SyncEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}
