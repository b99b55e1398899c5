//! Repository trait definitions.
//!
//! These are the boundary contracts the engine consumes; persistence
//! technology lives behind them. Per-key atomicity (counter adds, upserts,
//! idempotency-guarded creation) is the implementation's responsibility.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use vigil_core::{Execution, ExecutionOutcome, FailureStatRecord, Task};

use crate::error::StoreError;

/// Durable store of execution records.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Record that an execution of `task` started at `started_at`.
    async fn record_start(
        &self,
        task: &Task,
        started_at: DateTime<Utc>,
    ) -> Result<Execution, StoreError>;

    /// Move a running execution to a terminal outcome. The transition may
    /// happen at most once; anything else is an `InvalidTransition`.
    async fn record_outcome(
        &self,
        execution_id: Uuid,
        outcome: ExecutionOutcome,
        ended_at: DateTime<Utc>,
    ) -> Result<Execution, StoreError>;

    /// Earliest execution of `task_id` whose start time falls within
    /// `[start, end]` (inclusive).
    async fn find_by_task_and_window(
        &self,
        task_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Execution>, StoreError>;

    /// Create a synthetic missed execution for an expected window.
    ///
    /// Idempotent on `(task id, window start)`: a duplicate request is a
    /// no-op that returns the existing record and `false`.
    async fn record_missed(
        &self,
        task: &Task,
        window_start: DateTime<Utc>,
    ) -> Result<(Execution, bool), StoreError>;

    /// Count failed and missed executions for a project on a UTC date.
    async fn count_failures_on(
        &self,
        project_id: Uuid,
        date: NaiveDate,
    ) -> Result<u64, StoreError>;

    /// All executions recorded for a task, oldest first.
    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Execution>, StoreError>;
}

/// Store of per-project daily failure counters.
#[async_trait]
pub trait StatsRepository: Send + Sync {
    /// Atomically add one failure to the `(project, date)` counter.
    ///
    /// Must be a commutative counter add, not a read-modify-write of a full
    /// record, so concurrent deliveries for the same key never race-lose.
    async fn increment_failure_stat(
        &self,
        project_id: Uuid,
        date: NaiveDate,
    ) -> Result<(), StoreError>;

    /// Overwrite the `(project, date)` counter with a recomputed total.
    async fn upsert_failure_stat(
        &self,
        project_id: Uuid,
        date: NaiveDate,
        total: u64,
    ) -> Result<(), StoreError>;

    async fn get_failure_stat(
        &self,
        project_id: Uuid,
        date: NaiveDate,
    ) -> Result<u64, StoreError>;

    /// All non-zero daily records for a project, oldest date first. This is
    /// the read contract reporting collaborators consume.
    async fn list_failure_stats(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<FailureStatRecord>, StoreError>;
}

/// Read-only view of the task inventory.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Tasks with `Active` status, in no particular order.
    async fn list_active_tasks(&self) -> Result<Vec<Task>, StoreError>;

    /// Distinct project ids across all known tasks, active or not.
    async fn list_all_projects(&self) -> Result<Vec<Uuid>, StoreError>;
}
