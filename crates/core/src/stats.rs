//! Per-project daily failure counters.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Failure counter for one project on one UTC calendar date.
///
/// Updated incrementally by the failure aggregator and overwritten wholesale
/// by the reconciliation roller; the last writer for a key within a
/// reconciliation cycle wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureStatRecord {
    pub project_id: Uuid,
    pub date: NaiveDate,
    pub failures: u64,
}
