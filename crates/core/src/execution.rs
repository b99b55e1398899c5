//! Execution records: one observed (or synthesized) run of a monitored task.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::Task;

/// Terminal state of an execution.
///
/// `Missed` executions are synthesized by the watchdog when no report arrived
/// for an expected window; every other outcome originates upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Running,
    Succeeded,
    Failed,
    Missed,
}

impl ExecutionOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionOutcome::Running)
    }

    /// Whether this outcome counts toward daily failure stats.
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionOutcome::Failed | ExecutionOutcome::Missed)
    }
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionOutcome::Running => "running",
            ExecutionOutcome::Succeeded => "succeeded",
            ExecutionOutcome::Failed => "failed",
            ExecutionOutcome::Missed => "missed",
        };
        write!(f, "{}", s)
    }
}

/// One run of a task, reported by an external agent or synthesized by the
/// watchdog. Immutable once terminal, except `Running` moving to
/// `Succeeded`/`Failed` exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub task_id: Uuid,
    pub project_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: ExecutionOutcome,
}

impl Execution {
    /// A fresh running execution reported by an external agent.
    pub fn started(task: &Task, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task.id,
            project_id: task.project_id,
            started_at,
            ended_at: None,
            outcome: ExecutionOutcome::Running,
        }
    }

    /// A synthetic missed execution anchored at its expected window start.
    pub fn missed(task: &Task, window_start: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task.id,
            project_id: task.project_id,
            started_at: window_start,
            ended_at: Some(window_start),
            outcome: ExecutionOutcome::Missed,
        }
    }

    /// The UTC calendar date this execution is aggregated under: end time,
    /// falling back to start time when the execution never ended.
    pub fn stat_date(&self) -> NaiveDate {
        self.ended_at.unwrap_or(self.started_at).date_naive()
    }

    /// Whether the `Running -> terminal` transition to `outcome` is legal.
    pub fn can_transition_to(&self, outcome: ExecutionOutcome) -> bool {
        self.outcome == ExecutionOutcome::Running
            && matches!(
                outcome,
                ExecutionOutcome::Succeeded | ExecutionOutcome::Failed
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ScheduleConfig, TaskStatus};
    use chrono::TimeZone;

    fn task() -> Task {
        Task {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "nightly-backup".to_string(),
            status: TaskStatus::Active,
            schedule: ScheduleConfig::OneOff {
                execute_at: Utc::now(),
            },
            grace_secs: 300,
        }
    }

    #[test]
    fn stat_date_prefers_end_time() {
        let mut execution = Execution::started(&task(), Utc.with_ymd_and_hms(2025, 1, 1, 23, 50, 0).unwrap());
        execution.ended_at = Some(Utc.with_ymd_and_hms(2025, 1, 2, 0, 10, 0).unwrap());
        assert_eq!(
            execution.stat_date(),
            chrono::NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
        );
    }

    #[test]
    fn stat_date_falls_back_to_start_time() {
        let execution = Execution::started(&task(), Utc.with_ymd_and_hms(2025, 1, 1, 23, 50, 0).unwrap());
        assert_eq!(
            execution.stat_date(),
            chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
    }

    #[test]
    fn running_transitions_to_terminal_only() {
        let execution = Execution::started(&task(), Utc::now());
        assert!(execution.can_transition_to(ExecutionOutcome::Succeeded));
        assert!(execution.can_transition_to(ExecutionOutcome::Failed));
        assert!(!execution.can_transition_to(ExecutionOutcome::Running));
        assert!(!execution.can_transition_to(ExecutionOutcome::Missed));
    }

    #[test]
    fn terminal_executions_never_transition() {
        let missed = Execution::missed(&task(), Utc::now());
        assert!(!missed.can_transition_to(ExecutionOutcome::Succeeded));
        assert!(!missed.can_transition_to(ExecutionOutcome::Failed));
    }
}
