//! Execution-lifecycle events distributed over the in-process bus.
//!
//! Events are ephemeral: durability of facts lives in the execution and
//! failure-stat records, and the reconciliation roller restores any counter
//! drift caused by lost deliveries.

use serde::{Deserialize, Serialize};

use crate::execution::{Execution, ExecutionOutcome};
use crate::task::Task;

/// Kinds of execution-lifecycle events, used for subscription routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ExecutionStarted,
    ExecutionSucceeded,
    ExecutionFailed,
    ExecutionMissed,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::ExecutionStarted => "execution_started",
            EventKind::ExecutionSucceeded => "execution_succeeded",
            EventKind::ExecutionFailed => "execution_failed",
            EventKind::ExecutionMissed => "execution_missed",
        };
        write!(f, "{}", s)
    }
}

/// An execution-lifecycle event carrying the execution and a snapshot of its
/// parent task at emission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStarted { execution: Execution, task: Task },
    ExecutionSucceeded { execution: Execution, task: Task },
    ExecutionFailed { execution: Execution, task: Task },
    ExecutionMissed { execution: Execution, task: Task },
}

impl ExecutionEvent {
    /// Build the event matching an execution's current outcome.
    pub fn from_outcome(execution: Execution, task: Task) -> Self {
        match execution.outcome {
            ExecutionOutcome::Running => ExecutionEvent::ExecutionStarted { execution, task },
            ExecutionOutcome::Succeeded => ExecutionEvent::ExecutionSucceeded { execution, task },
            ExecutionOutcome::Failed => ExecutionEvent::ExecutionFailed { execution, task },
            ExecutionOutcome::Missed => ExecutionEvent::ExecutionMissed { execution, task },
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ExecutionEvent::ExecutionStarted { .. } => EventKind::ExecutionStarted,
            ExecutionEvent::ExecutionSucceeded { .. } => EventKind::ExecutionSucceeded,
            ExecutionEvent::ExecutionFailed { .. } => EventKind::ExecutionFailed,
            ExecutionEvent::ExecutionMissed { .. } => EventKind::ExecutionMissed,
        }
    }

    pub fn execution(&self) -> &Execution {
        match self {
            ExecutionEvent::ExecutionStarted { execution, .. }
            | ExecutionEvent::ExecutionSucceeded { execution, .. }
            | ExecutionEvent::ExecutionFailed { execution, .. }
            | ExecutionEvent::ExecutionMissed { execution, .. } => execution,
        }
    }

    pub fn task(&self) -> &Task {
        match self {
            ExecutionEvent::ExecutionStarted { task, .. }
            | ExecutionEvent::ExecutionSucceeded { task, .. }
            | ExecutionEvent::ExecutionFailed { task, .. }
            | ExecutionEvent::ExecutionMissed { task, .. } => task,
        }
    }
}
