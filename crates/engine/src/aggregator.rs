//! Failure aggregator: folds failure events into per-project daily counters.
//!
//! Push-driven counterpart to the reconciliation roller: increments give
//! low-latency approximate freshness, the roller's periodic recompute gives
//! eventual exactness. Increments are commutative counter adds, so
//! concurrent deliveries for the same key never race-lose an update.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use vigil_core::{EventKind, ExecutionEvent};
use vigil_store::{StatsRepository, StoreError};

pub struct FailureAggregator {
    stats: Arc<dyn StatsRepository>,
}

impl FailureAggregator {
    pub fn new(stats: Arc<dyn StatsRepository>) -> Self {
        Self { stats }
    }

    /// Fold one event into the daily counters.
    ///
    /// The date comes from the execution's end time, falling back to its
    /// start time. Events of an unexpected kind are discarded with a log
    /// line — never an error that could kill the consumer loop.
    pub async fn apply(&self, event: &ExecutionEvent) -> Result<(), StoreError> {
        match event.kind() {
            EventKind::ExecutionFailed | EventKind::ExecutionMissed => {
                let execution = event.execution();
                let date = execution.stat_date();
                self.stats
                    .increment_failure_stat(execution.project_id, date)
                    .await?;
                debug!(
                    project_id = %execution.project_id,
                    date = %date,
                    kind = %event.kind(),
                    "failure counter incremented"
                );
                Ok(())
            }
            other => {
                warn!(kind = %other, "unexpected event kind on failure stream — discarding");
                Ok(())
            }
        }
    }

    /// Consume failure events until the bus closes or shutdown is signalled.
    ///
    /// Store errors are logged and the loop keeps going; the roller will
    /// repair whatever the lost increment skewed.
    pub async fn run(
        &self,
        mut failed_rx: mpsc::Receiver<ExecutionEvent>,
        mut missed_rx: mpsc::Receiver<ExecutionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("failure aggregator started");

        // Each stream is tracked separately: one closing must not end the
        // loop while the other still has buffered deliveries to drain.
        let mut failed_open = true;
        let mut missed_open = true;

        while failed_open || missed_open {
            let event = tokio::select! {
                maybe = failed_rx.recv(), if failed_open => {
                    match maybe {
                        Some(event) => event,
                        None => {
                            failed_open = false;
                            continue;
                        }
                    }
                }
                maybe = missed_rx.recv(), if missed_open => {
                    match maybe {
                        Some(event) => event,
                        None => {
                            missed_open = false;
                            continue;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            if let Err(e) = self.apply(&event).await {
                warn!(
                    kind = %event.kind(),
                    project_id = %event.execution().project_id,
                    error = %e,
                    "failed to update failure stat — roller will reconcile"
                );
            }
        }

        info!("failure aggregator stopped");
    }
}
