//! BaseLog simulator binary
//!
//! Usage: `baselog-sim [mood] [index_lag_ms] [--json] [--reject]`

use std::env;
use std::sync::Arc;
use std::time::Duration;

use baselog_sim::{render, Latency, LocalWallet, SimulatedLedger};
use baselog_sync::{SyncConfig, SyncEngine, SyncEvent, Transition};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    baselog_logging::init(baselog_logging::DEFAULT_FILTER);

    // Parse command line args
    let args: Vec<String> = env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");
    let reject = args.iter().any(|a| a == "--reject");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let mood: u8 = positional.first().and_then(|s| s.parse().ok()).unwrap_or(2);
    let index_lag_ms: u64 = positional.get(1).and_then(|s| s.parse().ok()).unwrap_or(2500);

    let config = SyncConfig::from_env()?;
    let latency = Latency {
        index_lag: Duration::from_millis(index_lag_ms),
        jitter: Duration::from_millis(index_lag_ms / 5),
        ..Latency::default()
    };

    let wallet = LocalWallet::from_seed("baselog-sim");
    let ledger = Arc::new(SimulatedLedger::new(latency));
    if reject {
        ledger.reject_writes("user rejected the request");
    }

    let engine = SyncEngine::new(config.clone(), ledger.clone(), Arc::new(wallet.clone()));
    let today = engine.today();
    ledger.seed_history(wallet.account(), today, 14);

    if !json {
        println!("BaseLog simulator");
        println!("=================");
        println!("Account:  {}", wallet.account());
        println!("Today:    slot {today}");
        println!("Index lag: {index_lag_ms} ms, reads: {:?}", config.schedule.delays());
        println!();
    }

    engine.refresh().await?;
    if !json {
        println!("Loaded: {}", render::summary(&engine.current()));
    }

    let mut events = engine.subscribe();
    let attempt = match engine.select(mood).await {
        Ok(id) => id,
        Err(e) if e.is_precondition() => return Err(e.into()),
        Err(e) => {
            let shown = engine.current();
            if json {
                let report = render::Report::new(engine.status().as_ref(), &shown);
                println!("{}", report.to_json()?);
            } else {
                println!("Write failed: {e}");
                println!("{}", render::summary(&shown));
            }
            return Ok(());
        }
    };

    // Wait for both the write to settle and reconciliation to finish
    let deadline =
        config.schedule.total().max(config.confirmation_timeout) + Duration::from_secs(1);
    let wait = async {
        let (mut settled, mut reconciled) = (false, false);
        while !(settled && reconciled) {
            match events.recv().await {
                Ok(event) if event.attempt() == attempt => {
                    if !json {
                        println!("  {}", describe(&event));
                    }
                    match event {
                        SyncEvent::Lifecycle(ev) => {
                            settled |= matches!(
                                ev.transition,
                                Transition::Confirmed | Transition::Failed(_)
                            );
                        }
                        SyncEvent::Reconciled { .. } | SyncEvent::ReconcileExhausted { .. } => {
                            reconciled = true
                        }
                        _ => {}
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    };
    if tokio::time::timeout(deadline, wait).await.is_err() {
        tracing::warn!(%attempt, "Gave up waiting for the attempt to settle");
    }

    let shown = engine.current();
    if json {
        let attempt = engine.attempt(attempt);
        println!("{}", render::Report::new(attempt.as_ref(), &shown).to_json()?);
    } else {
        println!();
        println!("{}", render::summary(&shown));
        print!("{}", render::grid(&shown, today));
    }

    Ok(())
}

fn describe(event: &SyncEvent) -> String {
    match event {
        SyncEvent::Selected { mood, slot, .. } => format!("selected {mood} for slot {slot}"),
        SyncEvent::Lifecycle(ev) => format!("{:?}", ev.transition),
        SyncEvent::ReadFailed { read, reason, .. } => format!("read {read} failed: {reason}"),
        SyncEvent::Reconciled { read, .. } => format!("reconciled on read {read}"),
        SyncEvent::ReconcileExhausted { reads, .. } => {
            format!("ledger not indexed after {reads} reads, keeping local value")
        }
        SyncEvent::Retired { .. } => "retired".to_string(),
    }
}
