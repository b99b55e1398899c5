//! Reconciliation roller: periodic full recompute of daily failure counters.
//!
//! Incremental counts drift when bus deliveries are dropped or the process
//! restarts mid-stream. On a coarse interval (and once at startup) this loop
//! recounts failures per project straight from the execution history — the
//! ground truth — and overwrites the counters. The recompute is idempotent,
//! so running it twice converges to the same value.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use uuid::Uuid;
use vigil_store::{ExecutionRepository, StatsRepository, TaskRepository};

/// Summary of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RollOutcome {
    /// (project, date) keys recomputed and written.
    pub recomputed: usize,
    /// Keys that failed; each was logged and the pass continued.
    pub errors: usize,
}

pub struct ReconciliationRoller {
    tasks: Arc<dyn TaskRepository>,
    executions: Arc<dyn ExecutionRepository>,
    stats: Arc<dyn StatsRepository>,
    interval: Duration,
}

impl ReconciliationRoller {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        executions: Arc<dyn ExecutionRepository>,
        stats: Arc<dyn StatsRepository>,
        interval: Duration,
    ) -> Self {
        Self {
            tasks,
            executions,
            stats,
            interval,
        }
    }

    /// The UTC dates one pass covers: today and yesterday. Yesterday is
    /// included for stragglers that finish around the date boundary.
    fn dates_for(now: DateTime<Utc>) -> [NaiveDate; 2] {
        let today = now.date_naive();
        [today, today.pred_opt().unwrap_or(today)]
    }

    /// Recompute every (project, recent date) counter from the execution
    /// history. A failing key is logged and skipped; it never aborts the
    /// rest of the batch.
    pub async fn run_once(&self, now: DateTime<Utc>) -> RollOutcome {
        let mut outcome = RollOutcome::default();

        let projects = match self.tasks.list_all_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                warn!(error = %e, "failed to list projects — retrying next cycle");
                outcome.errors += 1;
                return outcome;
            }
        };

        for project_id in projects {
            for date in Self::dates_for(now) {
                match self.reconcile_key(project_id, date).await {
                    Ok(()) => outcome.recomputed += 1,
                    Err(e) => {
                        warn!(
                            project_id = %project_id,
                            date = %date,
                            error = %e,
                            "failed to reconcile failure stat"
                        );
                        outcome.errors += 1;
                    }
                }
            }
        }

        info!(
            recomputed = outcome.recomputed,
            errors = outcome.errors,
            "reconciliation pass complete"
        );
        outcome
    }

    async fn reconcile_key(
        &self,
        project_id: Uuid,
        date: NaiveDate,
    ) -> Result<(), vigil_store::StoreError> {
        let total = self.executions.count_failures_on(project_id, date).await?;
        self.stats
            .upsert_failure_stat(project_id, date, total)
            .await
    }

    /// Reconcile once at startup, then on the configured interval until
    /// shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "reconciliation roller started");
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("reconciliation roller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vigil_core::{ExecutionOutcome, ScheduleConfig, Task, TaskStatus};
    use vigil_store::{MemoryExecutionRepository, MemoryStatsRepository, MemoryTaskRepository};

    fn task(project_id: Uuid) -> Task {
        Task {
            id: Uuid::new_v4(),
            project_id,
            name: "ledger-close".to_string(),
            status: TaskStatus::Active,
            schedule: ScheduleConfig::OneOff {
                execute_at: Utc::now(),
            },
            grace_secs: 60,
        }
    }

    fn harness() -> (
        ReconciliationRoller,
        Arc<MemoryTaskRepository>,
        Arc<MemoryExecutionRepository>,
        Arc<MemoryStatsRepository>,
    ) {
        let tasks = Arc::new(MemoryTaskRepository::new());
        let executions = Arc::new(MemoryExecutionRepository::new());
        let stats = Arc::new(MemoryStatsRepository::new());
        let roller = ReconciliationRoller::new(
            tasks.clone(),
            executions.clone(),
            stats.clone(),
            Duration::from_secs(21_600),
        );
        (roller, tasks, executions, stats)
    }

    #[tokio::test]
    async fn recompute_converges_after_dropped_increments() {
        let (roller, tasks, executions, stats) = harness();
        let project_id = Uuid::new_v4();
        let task = task(project_id);
        tasks.insert(task.clone());

        let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let date = now.date_naive();

        // Three failures persisted; pretend every incremental event was lost,
        // so the counter still reads zero.
        for minute in 0..3 {
            let started = Utc.with_ymd_and_hms(2025, 5, 10, 9, minute, 0).unwrap();
            let execution = executions.record_start(&task, started).await.unwrap();
            executions
                .record_outcome(execution.id, ExecutionOutcome::Failed, started)
                .await
                .unwrap();
        }
        assert_eq!(stats.get_failure_stat(project_id, date).await.unwrap(), 0);

        let outcome = roller.run_once(now).await;
        assert_eq!(outcome.errors, 0);
        assert_eq!(stats.get_failure_stat(project_id, date).await.unwrap(), 3);

        // Idempotent: a second pass lands on the same value.
        roller.run_once(now).await;
        assert_eq!(stats.get_failure_stat(project_id, date).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn recompute_overwrites_inflated_counters() {
        let (roller, tasks, executions, stats) = harness();
        let project_id = Uuid::new_v4();
        let task = task(project_id);
        tasks.insert(task.clone());

        let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let date = now.date_naive();

        // One real missed execution, but the counter was bumped twice
        // (duplicated delivery).
        executions
            .record_missed(&task, Utc.with_ymd_and_hms(2025, 5, 10, 9, 0, 0).unwrap())
            .await
            .unwrap();
        stats.increment_failure_stat(project_id, date).await.unwrap();
        stats.increment_failure_stat(project_id, date).await.unwrap();
        assert_eq!(stats.get_failure_stat(project_id, date).await.unwrap(), 2);

        roller.run_once(now).await;
        assert_eq!(stats.get_failure_stat(project_id, date).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pass_covers_today_and_yesterday_per_project() {
        let (roller, tasks, executions, stats) = harness();
        let project_a = Uuid::new_v4();
        let project_b = Uuid::new_v4();
        let task_a = task(project_a);
        let task_b = task(project_b);
        tasks.insert(task_a.clone());
        tasks.insert(task_b.clone());

        let now = Utc.with_ymd_and_hms(2025, 5, 10, 1, 0, 0).unwrap();
        let today = now.date_naive();
        let yesterday = today.pred_opt().unwrap();

        // Project A missed one yesterday; project B missed one today.
        executions
            .record_missed(&task_a, Utc.with_ymd_and_hms(2025, 5, 9, 23, 0, 0).unwrap())
            .await
            .unwrap();
        executions
            .record_missed(&task_b, Utc.with_ymd_and_hms(2025, 5, 10, 0, 30, 0).unwrap())
            .await
            .unwrap();

        let outcome = roller.run_once(now).await;
        assert_eq!(outcome.recomputed, 4);

        assert_eq!(stats.get_failure_stat(project_a, yesterday).await.unwrap(), 1);
        assert_eq!(stats.get_failure_stat(project_a, today).await.unwrap(), 0);
        assert_eq!(stats.get_failure_stat(project_b, today).await.unwrap(), 1);
        assert_eq!(stats.get_failure_stat(project_b, yesterday).await.unwrap(), 0);
    }
}
