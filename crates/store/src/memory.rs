//! In-memory repository implementations.
//!
//! Backing store for tests, the worker binary, and embedded deployments.
//! Counter adds and the missed-execution idempotency check run under the
//! map lock, which is what gives each key its atomicity here; a SQL-backed
//! implementation would use `INSERT .. ON CONFLICT` for the same effect.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use tracing::debug;

use vigil_core::{Execution, ExecutionOutcome, FailureStatRecord, Task, TaskStatus};

use crate::error::StoreError;
use crate::traits::{ExecutionRepository, StatsRepository, TaskRepository};

// ── Executions ──────────────────────────────────────────────────────

#[derive(Default)]
struct ExecutionState {
    by_id: HashMap<Uuid, Execution>,
    /// Idempotency index: (task id, window start) -> synthesized execution id.
    missed_windows: HashMap<(Uuid, DateTime<Utc>), Uuid>,
}

/// In-memory [`ExecutionRepository`].
#[derive(Default)]
pub struct MemoryExecutionRepository {
    state: Mutex<ExecutionState>,
}

impl MemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for MemoryExecutionRepository {
    async fn record_start(
        &self,
        task: &Task,
        started_at: DateTime<Utc>,
    ) -> Result<Execution, StoreError> {
        let execution = Execution::started(task, started_at);
        let mut state = self.state.lock().expect("execution store lock");
        state.by_id.insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn record_outcome(
        &self,
        execution_id: Uuid,
        outcome: ExecutionOutcome,
        ended_at: DateTime<Utc>,
    ) -> Result<Execution, StoreError> {
        let mut state = self.state.lock().expect("execution store lock");
        let execution = state
            .by_id
            .get_mut(&execution_id)
            .ok_or(StoreError::ExecutionNotFound(execution_id))?;

        if !execution.can_transition_to(outcome) {
            return Err(StoreError::InvalidTransition {
                from: execution.outcome,
                to: outcome,
            });
        }

        execution.outcome = outcome;
        execution.ended_at = Some(ended_at);
        Ok(execution.clone())
    }

    async fn find_by_task_and_window(
        &self,
        task_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Execution>, StoreError> {
        let state = self.state.lock().expect("execution store lock");
        let found = state
            .by_id
            .values()
            .filter(|e| e.task_id == task_id && e.started_at >= start && e.started_at <= end)
            .min_by_key(|e| e.started_at)
            .cloned();
        Ok(found)
    }

    async fn record_missed(
        &self,
        task: &Task,
        window_start: DateTime<Utc>,
    ) -> Result<(Execution, bool), StoreError> {
        let mut state = self.state.lock().expect("execution store lock");
        let key = (task.id, window_start);

        if let Some(existing_id) = state.missed_windows.get(&key) {
            debug!(task_id = %task.id, window_start = %window_start, "missed execution already recorded");
            let existing = state
                .by_id
                .get(existing_id)
                .cloned()
                .ok_or(StoreError::ExecutionNotFound(*existing_id))?;
            return Ok((existing, false));
        }

        let execution = Execution::missed(task, window_start);
        state.missed_windows.insert(key, execution.id);
        state.by_id.insert(execution.id, execution.clone());
        Ok((execution, true))
    }

    async fn count_failures_on(
        &self,
        project_id: Uuid,
        date: NaiveDate,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().expect("execution store lock");
        let count = state
            .by_id
            .values()
            .filter(|e| {
                e.project_id == project_id && e.outcome.is_failure() && e.stat_date() == date
            })
            .count();
        Ok(count as u64)
    }

    async fn list_for_task(&self, task_id: Uuid) -> Result<Vec<Execution>, StoreError> {
        let state = self.state.lock().expect("execution store lock");
        let mut executions: Vec<Execution> = state
            .by_id
            .values()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect();
        executions.sort_by_key(|e| e.started_at);
        Ok(executions)
    }
}

// ── Failure stats ───────────────────────────────────────────────────

/// In-memory [`StatsRepository`].
#[derive(Default)]
pub struct MemoryStatsRepository {
    counters: Mutex<HashMap<(Uuid, NaiveDate), u64>>,
}

impl MemoryStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsRepository for MemoryStatsRepository {
    async fn increment_failure_stat(
        &self,
        project_id: Uuid,
        date: NaiveDate,
    ) -> Result<(), StoreError> {
        let mut counters = self.counters.lock().expect("stats store lock");
        *counters.entry((project_id, date)).or_insert(0) += 1;
        Ok(())
    }

    async fn upsert_failure_stat(
        &self,
        project_id: Uuid,
        date: NaiveDate,
        total: u64,
    ) -> Result<(), StoreError> {
        let mut counters = self.counters.lock().expect("stats store lock");
        counters.insert((project_id, date), total);
        Ok(())
    }

    async fn get_failure_stat(
        &self,
        project_id: Uuid,
        date: NaiveDate,
    ) -> Result<u64, StoreError> {
        let counters = self.counters.lock().expect("stats store lock");
        Ok(counters.get(&(project_id, date)).copied().unwrap_or(0))
    }

    async fn list_failure_stats(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<FailureStatRecord>, StoreError> {
        let counters = self.counters.lock().expect("stats store lock");
        let mut records: Vec<FailureStatRecord> = counters
            .iter()
            .filter(|((project, _), &failures)| *project == project_id && failures > 0)
            .map(|(&(project_id, date), &failures)| FailureStatRecord {
                project_id,
                date,
                failures,
            })
            .collect();
        records.sort_by_key(|r| r.date);
        Ok(records)
    }
}

// ── Tasks ───────────────────────────────────────────────────────────

/// In-memory [`TaskRepository`], seeded from the task-definition loader.
#[derive(Default)]
pub struct MemoryTaskRepository {
    tasks: RwLock<HashMap<Uuid, Task>>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a task.
    pub fn insert(&self, task: Task) {
        self.tasks
            .write()
            .expect("task store lock")
            .insert(task.id, task);
    }

    pub fn len(&self) -> usize {
        self.tasks.read().expect("task store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().expect("task store lock").is_empty()
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn list_active_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().expect("task store lock");
        Ok(tasks
            .values()
            .filter(|t| t.status == TaskStatus::Active)
            .cloned()
            .collect())
    }

    async fn list_all_projects(&self) -> Result<Vec<Uuid>, StoreError> {
        let tasks = self.tasks.read().expect("task store lock");
        let projects: BTreeSet<Uuid> = tasks.values().map(|t| t.project_id).collect();
        Ok(projects.into_iter().collect())
    }
}
