//! Task and schedule definition types with serde deserialization.
//!
//! A [`Task`] describes one externally-run job the engine monitors. Its
//! [`ScheduleConfig`] is either a cron-driven recurring schedule evaluated in
//! the task's own timezone, or a single absolute instant. The two shapes are
//! an enum, so "recurring carries a cron expression and timezone, one-off
//! carries an instant, never both" holds by construction; the residual
//! invariants (parseable cron, known timezone, well-formed range) are checked
//! by [`ScheduleConfig::validate`].

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

// ── Cron normalization ──────────────────────────────────────────────

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
/// Task definitions may use standard 5-field cron: `min hour day-of-month month day-of-week`.
pub fn normalize_cron(cron_5field: &str) -> String {
    let trimmed = cron_5field.trim();
    let field_count = trimmed.split_whitespace().count();
    if field_count == 5 {
        format!("0 {}", trimmed)
    } else {
        // Already 6-field or non-standard; pass through as-is.
        trimmed.to_string()
    }
}

// ── Time of day / time range ────────────────────────────────────────

/// Parse an `HH:MM` or `HH:MM:SS` time-of-day string.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| ConfigError::InvalidTimeOfDay(s.to_string()))
}

/// Daily local-time window restricting which cron firings count as expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "time_of_day")]
    pub start: NaiveTime,
    #[serde(with = "time_of_day")]
    pub end: NaiveTime,
}

mod time_of_day {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_time_of_day(&raw).map_err(de::Error::custom)
    }
}

// ── Exclusions ──────────────────────────────────────────────────────

/// A day on which expected firings are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Exclusion {
    /// A specific calendar day, local to the task's timezone.
    Date(NaiveDate),
    /// A weekday, 0 = Sunday through 6 = Saturday.
    Weekday(u8),
}

// ── Schedule config ─────────────────────────────────────────────────

/// When a task is expected to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleConfig {
    /// Cron-driven recurring schedule, evaluated in the task's timezone.
    Recurring {
        /// 5- or 6-field cron expression (seconds prepended when absent).
        cron: String,
        /// IANA timezone name, e.g. "Europe/Berlin".
        timezone: String,
        /// Daily window restricting which firings count as expected.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_range: Option<TimeRange>,
        /// Allow-list of weekdays (0 = Sunday through 6 = Saturday). A day
        /// must be allow-listed AND not excluded to count.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        days_of_week: Option<BTreeSet<u8>>,
        /// Calendar days or weekdays on which firings are skipped.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        exclusions: Vec<Exclusion>,
    },
    /// A single absolute execution instant.
    OneOff { execute_at: DateTime<Utc> },
}

impl ScheduleConfig {
    /// Check the residual invariants the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ScheduleConfig::Recurring {
                cron,
                timezone,
                time_range,
                days_of_week,
                exclusions,
            } => {
                let normalized = normalize_cron(cron);
                Schedule::from_str(&normalized).map_err(|e| ConfigError::InvalidCron {
                    expr: cron.clone(),
                    message: e.to_string(),
                })?;

                timezone
                    .parse::<Tz>()
                    .map_err(|_| ConfigError::UnknownTimezone(timezone.clone()))?;

                if let Some(range) = time_range {
                    if range.start >= range.end {
                        return Err(ConfigError::InvalidTimeRange {
                            start: range.start.format("%H:%M").to_string(),
                            end: range.end.format("%H:%M").to_string(),
                        });
                    }
                }

                if let Some(days) = days_of_week {
                    if days.is_empty() {
                        return Err(ConfigError::EmptyDaysOfWeek);
                    }
                    if let Some(&bad) = days.iter().find(|&&d| d > 6) {
                        return Err(ConfigError::InvalidWeekday(bad));
                    }
                }

                for exclusion in exclusions {
                    if let Exclusion::Weekday(d) = exclusion {
                        if *d > 6 {
                            return Err(ConfigError::InvalidWeekday(*d));
                        }
                    }
                }

                Ok(())
            }
            ScheduleConfig::OneOff { .. } => Ok(()),
        }
    }
}

// ── Task ────────────────────────────────────────────────────────────

/// Lifecycle state of a monitored task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Active,
    Paused,
    Disabled,
}

/// One externally-run job being monitored.
///
/// Created and updated by the management API; read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub status: TaskStatus,
    pub schedule: ScheduleConfig,
    /// Seconds past an expected window's end before the watchdog declares
    /// the execution missed.
    pub grace_secs: u64,
}

impl Task {
    pub fn grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.grace_secs as i64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.schedule.validate()
    }
}
