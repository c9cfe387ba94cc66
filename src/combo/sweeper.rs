//! Background eviction of idle combo chains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use super::ComboTracker;
use crate::types::now_millis;

/// Handle for stopping the background sweeper
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    running: Arc<AtomicBool>,
}

impl SweeperHandle {
    /// Ask the sweeper to stop
    pub async fn shutdown(&self) {
        // Receiver may already be gone if the task exited
        self.shutdown_tx.send(()).await.ok();
    }

    /// Whether the sweeper task is still looping
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Spawn a task that evicts idle chains every `sweep_interval_ms`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(tracker: Arc<ComboTracker>) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    let running = Arc::new(AtomicBool::new(true));
    let running_task = Arc::clone(&running);
    let period = Duration::from_millis(tracker.config().sweep_interval_ms.max(1));

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = tracker.evict_idle(now_millis());
                    if removed > 0 {
                        debug!(removed, remaining = tracker.tracked_users(), "evicted idle combo chains");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        running_task.store(false, Ordering::Relaxed);
    });

    SweeperHandle {
        shutdown_tx,
        running,
    }
}
