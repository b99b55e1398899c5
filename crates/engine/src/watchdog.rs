//! Missed-execution watchdog.
//!
//! The absence of a signal cannot be detected reactively — no event arrives
//! for "nothing happened" — so this loop polls: on every scan it compares
//! each active task's most recently elapsed expected window against the
//! recorded executions, and synthesizes a missed execution when the grace
//! deadline has passed with nothing observed. Creation goes through the
//! repository's idempotency guard, so overlapping scans produce exactly one
//! record and one event per (task, window).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use vigil_core::ExecutionEvent;
use vigil_store::{ExecutionRepository, TaskRepository};

use crate::bus::EventBus;
use crate::evaluator;

/// Summary of one watchdog scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Active tasks examined.
    pub scanned: usize,
    /// Missed executions synthesized this scan.
    pub missed: usize,
    /// Tasks skipped because of evaluation or store errors.
    pub errors: usize,
}

pub struct Watchdog {
    tasks: Arc<dyn TaskRepository>,
    executions: Arc<dyn ExecutionRepository>,
    bus: Arc<EventBus>,
    scan_interval: Duration,
}

impl Watchdog {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        executions: Arc<dyn ExecutionRepository>,
        bus: Arc<EventBus>,
        scan_interval: Duration,
    ) -> Self {
        Self {
            tasks,
            executions,
            bus,
            scan_interval,
        }
    }

    /// Examine every active task once, as of `now`.
    ///
    /// Per-task failures are logged and skipped; a scan never aborts early
    /// and never terminates the loop.
    pub async fn scan_once(&self, now: DateTime<Utc>) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();

        let tasks = match self.tasks.list_active_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "failed to list active tasks — retrying next scan");
                outcome.errors += 1;
                return outcome;
            }
        };

        for task in tasks {
            outcome.scanned += 1;

            let window = match evaluator::last_elapsed_window(&task.schedule, now) {
                Ok(Some(window)) => window,
                Ok(None) => {
                    debug!(task_id = %task.id, "no elapsed window — schedule dormant");
                    continue;
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "schedule failed to evaluate — skipping task");
                    outcome.errors += 1;
                    continue;
                }
            };

            let deadline = window.end + task.grace();
            if now <= deadline {
                // Still inside the window or its grace period.
                continue;
            }

            match self
                .executions
                .find_by_task_and_window(task.id, window.start, deadline)
                .await
            {
                Ok(Some(_)) => {
                    debug!(task_id = %task.id, window_start = %window.start, "window satisfied");
                }
                Ok(None) => match self.executions.record_missed(&task, window.start).await {
                    Ok((execution, true)) => {
                        outcome.missed += 1;
                        info!(
                            task_id = %task.id,
                            task = %task.name,
                            window_start = %window.start,
                            "no execution observed — recording missed"
                        );
                        self.bus.publish(ExecutionEvent::ExecutionMissed {
                            execution,
                            task: task.clone(),
                        });
                    }
                    // Another scan already synthesized this window.
                    Ok((_, false)) => {}
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "failed to record missed execution");
                        outcome.errors += 1;
                    }
                },
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "execution lookup failed — retrying next scan");
                    outcome.errors += 1;
                }
            }
        }

        outcome
    }

    /// Scan on a fixed interval until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.scan_interval.as_secs(), "watchdog started");
        let mut ticker = tokio::time::interval(self.scan_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.scan_once(Utc::now()).await;
                    if outcome.missed > 0 || outcome.errors > 0 {
                        info!(
                            scanned = outcome.scanned,
                            missed = outcome.missed,
                            errors = outcome.errors,
                            "watchdog scan complete"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("watchdog stopped");
    }
}
