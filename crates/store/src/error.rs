use thiserror::Error;
use uuid::Uuid;

use vigil_core::ExecutionOutcome;

/// Errors surfaced by repository implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("invalid outcome transition: {from} -> {to}")]
    InvalidTransition {
        from: ExecutionOutcome,
        to: ExecutionOutcome,
    },

    /// Transient failure (connectivity, timeout). Callers retry on their
    /// next scheduled iteration rather than crashing.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
