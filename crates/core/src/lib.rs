pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod stats;
pub mod task;

pub use config::Config;
pub use error::ConfigError;
pub use event::{EventKind, ExecutionEvent};
pub use execution::{Execution, ExecutionOutcome};
pub use stats::FailureStatRecord;
pub use task::{Exclusion, ScheduleConfig, Task, TaskStatus, TimeRange};
