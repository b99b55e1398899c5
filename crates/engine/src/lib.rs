//! Execution monitoring engine.
//!
//! This crate provides:
//! - `evaluator`: pure schedule evaluation (expected execution windows)
//! - `bus`: in-process typed pub/sub for execution-lifecycle events
//! - `watchdog`: poll-driven missed-execution detection
//! - `aggregator`: push-driven per-project daily failure counters
//! - `roller`: periodic full recomputation of those counters
//! - `tasks`: YAML task-definition loader
//! - `supervisor`: owns the background loops and their shutdown signal

pub mod aggregator;
pub mod bus;
pub mod evaluator;
pub mod roller;
pub mod supervisor;
pub mod tasks;
pub mod watchdog;

pub use aggregator::FailureAggregator;
pub use bus::EventBus;
pub use evaluator::{last_elapsed_window, next_window, EvalError, Window};
pub use roller::ReconciliationRoller;
pub use supervisor::{EngineHandle, Supervisor};
pub use watchdog::Watchdog;
