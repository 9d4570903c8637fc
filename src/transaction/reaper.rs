use super::registry::TransactionRegistry;
use crate::core::{IndexError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Background task rolling back expired transactions.
pub struct TransactionReaper {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl TransactionReaper {
    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signals the reaper to stop and waits for the current pass to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| IndexError::Execution(format!("reaper join: {}", err)))?;
        }
        debug!("Transaction reaper stopped");
        Ok(())
    }
}

impl Drop for TransactionReaper {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Start reaping `registry` every `interval`, first pass one interval from
/// now. A pass that overruns the interval swallows the ticks it missed.
pub fn spawn_reaper(registry: Arc<TransactionRegistry>, interval: Duration) -> TransactionReaper {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    break;
                }
                _ = ticker.tick() => {
                    let report = registry.reap_expired().await;
                    if report.failed > 0 {
                        warn!(failed = report.failed, "Reaper pass had failed rollbacks");
                    }
                }
            }
        }
    });

    debug!(interval_ms = interval.as_millis() as u64, "Transaction reaper started");
    TransactionReaper {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}
