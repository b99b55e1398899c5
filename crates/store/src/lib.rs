//! Repository contracts for the vigil monitoring engine.
//!
//! This crate provides:
//! - `ExecutionRepository`, `StatsRepository`, and `TaskRepository` traits
//! - In-memory implementations backing tests, the worker binary, and
//!   embedded deployments
//!
//! All mutations are idempotent, key-scoped operations (increment-by-key,
//! upsert-by-key, create-guarded-by-idempotency-key) so concurrent writers
//! from different engine loops never need cross-loop locking.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::StoreError;
pub use memory::{MemoryExecutionRepository, MemoryStatsRepository, MemoryTaskRepository};
pub use traits::{ExecutionRepository, StatsRepository, TaskRepository};
