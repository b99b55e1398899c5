use thiserror::Error;

/// Task/schedule configuration errors.
///
/// Surfaced at the boundary where a definition is loaded or validated so the
/// task's owner sees them; a bad definition is never silently defaulted.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("invalid time of day '{0}': expected HH:MM or HH:MM:SS")]
    InvalidTimeOfDay(String),

    #[error("invalid time range: start {start} must be before end {end}")]
    InvalidTimeRange { start: String, end: String },

    #[error("day-of-week value {0} out of range 0-6")]
    InvalidWeekday(u8),

    #[error("days_of_week allow-list is empty, the task could never run")]
    EmptyDaysOfWeek,
}
