//! Pure schedule evaluation: expected execution windows from schedule
//! definitions.
//!
//! The evaluator is stateless — identical inputs always yield identical
//! outputs — so the watchdog can be tested with synthetic clocks. Cron
//! expressions are driven in the task's own timezone via `chrono-tz`, which
//! is where daylight-saving rules live: a nonexistent local time is skipped
//! forward to the next valid instant, an ambiguous one resolves to its
//! earlier UTC occurrence.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use vigil_core::task::{normalize_cron, Exclusion, ScheduleConfig, TimeRange};

/// Maximum look-ahead when searching for the next expected window. A
/// schedule with no firing inside this horizon is treated as dormant, not
/// as an error.
const MAX_LOOKAHEAD_DAYS: i64 = 366;

/// Cap on cursor advances within one search. Each advance skips at least to
/// the next local day (or into that day's time range), so this comfortably
/// covers the full look-ahead horizon.
const MAX_SEARCH_STEPS: usize = 1_000;

/// Cap on windows walked per look-back tier in [`last_elapsed_window`].
const MAX_LOOKBACK_WINDOWS: usize = 4_096;

/// Look-back horizons for [`last_elapsed_window`], shortest first. The scan
/// stops at the first tier that contains any window, which bounds iterator
/// work for dense crons while still finding monthly or yearly schedules.
fn lookback_tiers() -> [Duration; 4] {
    [
        Duration::hours(1),
        Duration::days(1),
        Duration::days(35),
        Duration::days(MAX_LOOKAHEAD_DAYS),
    ]
}

/// One expected execution window, in UTC.
///
/// Without a daily time range the window is the firing instant
/// (`start == end`); with one, all firings inside the range on a local day
/// coalesce into a single window `[first in-range firing, range end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Schedule evaluation errors. These mirror the validation done at the
/// definition boundary; a task that passed [`ScheduleConfig::validate`]
/// never produces them.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
}

/// The next expected window containing a valid cron firing at or after
/// `after` (for a one-off, its instant while still ahead). `Ok(None)` means
/// the schedule is dormant: a one-off whose instant already passed, or a
/// recurring schedule with no valid firing within the look-ahead horizon.
pub fn next_window(
    config: &ScheduleConfig,
    after: DateTime<Utc>,
) -> Result<Option<Window>, EvalError> {
    match config {
        ScheduleConfig::OneOff { execute_at } => {
            if *execute_at >= after {
                Ok(Some(Window {
                    start: *execute_at,
                    end: *execute_at,
                }))
            } else {
                Ok(None)
            }
        }
        ScheduleConfig::Recurring { .. } => {
            let parts = RecurringParts::compile(config)?;
            Ok(parts.find_next(after, after + Duration::days(MAX_LOOKAHEAD_DAYS)))
        }
    }
}

/// The most recent window whose start is at or before `now`, or `Ok(None)`
/// if no window started within the look-back horizon. This is what the
/// watchdog compares observed executions against.
pub fn last_elapsed_window(
    config: &ScheduleConfig,
    now: DateTime<Utc>,
) -> Result<Option<Window>, EvalError> {
    match config {
        ScheduleConfig::OneOff { execute_at } => {
            if *execute_at <= now {
                Ok(Some(Window {
                    start: *execute_at,
                    end: *execute_at,
                }))
            } else {
                Ok(None)
            }
        }
        ScheduleConfig::Recurring { .. } => {
            let parts = RecurringParts::compile(config)?;
            for lookback in lookback_tiers() {
                let mut cursor = now - lookback;
                let mut last = None;
                for _ in 0..MAX_LOOKBACK_WINDOWS {
                    match parts.find_next(cursor, now) {
                        Some(window) if window.start <= now => {
                            cursor = parts.advance_past(&window);
                            last = Some(window);
                        }
                        _ => break,
                    }
                }
                if last.is_some() {
                    return Ok(last);
                }
            }
            Ok(None)
        }
    }
}

// ── Recurring schedule internals ────────────────────────────────────

struct RecurringParts<'a> {
    schedule: Schedule,
    tz: Tz,
    time_range: Option<&'a TimeRange>,
    days_of_week: Option<&'a BTreeSet<u8>>,
    exclusions: &'a [Exclusion],
}

impl<'a> RecurringParts<'a> {
    fn compile(config: &'a ScheduleConfig) -> Result<Self, EvalError> {
        let ScheduleConfig::Recurring {
            cron,
            timezone,
            time_range,
            days_of_week,
            exclusions,
        } = config
        else {
            unreachable!("compile is only called for recurring schedules");
        };

        let normalized = normalize_cron(cron);
        let schedule = Schedule::from_str(&normalized).map_err(|e| EvalError::InvalidCron {
            expr: cron.clone(),
            message: e.to_string(),
        })?;
        let tz: Tz = timezone
            .parse()
            .map_err(|_| EvalError::UnknownTimezone(timezone.clone()))?;

        Ok(Self {
            schedule,
            tz,
            time_range: time_range.as_ref(),
            days_of_week: days_of_week.as_ref(),
            exclusions: exclusions.as_slice(),
        })
    }

    /// Whether a local calendar day passes the day-of-week allow-list and
    /// the exclusion list. Both must agree for the day to count.
    fn day_allowed(&self, date: NaiveDate) -> bool {
        let dow = date.weekday().num_days_from_sunday() as u8;
        if let Some(allowed) = self.days_of_week {
            if !allowed.contains(&dow) {
                return false;
            }
        }
        for exclusion in self.exclusions {
            match exclusion {
                Exclusion::Date(d) if *d == date => return false,
                Exclusion::Weekday(w) if *w == dow => return false,
                _ => {}
            }
        }
        true
    }

    /// Earliest window whose end is at or past `from`, with no candidate
    /// firing beyond `horizon`.
    fn find_next(&self, from: DateTime<Utc>, horizon: DateTime<Utc>) -> Option<Window> {
        let mut cursor = from;
        for _ in 0..MAX_SEARCH_STEPS {
            let fire = self.first_firing_at_or_after(cursor)?;
            let fire_utc = fire.with_timezone(&Utc);
            if fire_utc > horizon {
                return None;
            }

            let local_date = fire.date_naive();
            if !self.day_allowed(local_date) {
                cursor = self.start_of_next_local_day(local_date)?;
                continue;
            }

            let Some(range) = self.time_range else {
                return Some(Window {
                    start: fire_utc,
                    end: fire_utc,
                });
            };

            let local_time = fire.time();
            if local_time < range.start {
                cursor = self.resolve_local(local_date, range.start)?;
                continue;
            }
            if local_time > range.end {
                cursor = self.start_of_next_local_day(local_date)?;
                continue;
            }

            // Inside the daily range: all in-range firings on this day form
            // one window, anchored at the day's first in-range firing so the
            // window identity is stable no matter where the search started.
            let range_open = self.resolve_local(local_date, range.start)?;
            let start = self
                .first_firing_at_or_after(range_open)
                .map(|f| f.with_timezone(&Utc))
                .unwrap_or(fire_utc);
            let end = self.resolve_local(local_date, range.end)?;
            return Some(Window { start, end });
        }
        None
    }

    /// Cursor position just past a window, for walking windows in order.
    fn advance_past(&self, window: &Window) -> DateTime<Utc> {
        if self.time_range.is_some() {
            let local_date = window.start.with_timezone(&self.tz).date_naive();
            self.start_of_next_local_day(local_date)
                .unwrap_or(window.end + Duration::seconds(1))
        } else {
            window.start + Duration::seconds(1)
        }
    }

    fn first_firing_at_or_after(&self, at: DateTime<Utc>) -> Option<DateTime<Tz>> {
        // The cron iterator is exclusive of its anchor; back off one second
        // so a firing exactly at `at` is included.
        let probe = (at - Duration::seconds(1)).with_timezone(&self.tz);
        self.schedule.after(&probe).next()
    }

    fn start_of_next_local_day(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.resolve_local(date.succ_opt()?, NaiveTime::MIN)
    }

    /// Resolve a local date+time in the schedule's timezone. A nonexistent
    /// local time (DST gap) is pushed forward to the next valid instant; an
    /// ambiguous one (DST overlap) resolves to its earlier occurrence.
    fn resolve_local(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        let mut naive = date.and_time(time);
        for _ in 0..=16 {
            match self.tz.from_local_datetime(&naive) {
                LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
                LocalResult::Ambiguous(earlier, _) => return Some(earlier.with_timezone(&Utc)),
                LocalResult::None => naive += Duration::minutes(15),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn recurring(cron: &str, timezone: &str) -> ScheduleConfig {
        ScheduleConfig::Recurring {
            cron: cron.to_string(),
            timezone: timezone.to_string(),
            time_range: None,
            days_of_week: None,
            exclusions: Vec::new(),
        }
    }

    fn with_range(cron: &str, timezone: &str, start: (u32, u32), end: (u32, u32)) -> ScheduleConfig {
        ScheduleConfig::Recurring {
            cron: cron.to_string(),
            timezone: timezone.to_string(),
            time_range: Some(TimeRange {
                start: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
                end: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            }),
            days_of_week: None,
            exclusions: Vec::new(),
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    // -- next_window: plain recurring --------------------------------------

    #[test]
    fn next_window_daily_cron() {
        let config = recurring("0 0 10 * * *", "UTC");

        let before = next_window(&config, utc(2025, 1, 15, 9, 0, 0)).unwrap().unwrap();
        assert_eq!(before.start, utc(2025, 1, 15, 10, 0, 0));
        assert_eq!(before.end, before.start);

        let after = next_window(&config, utc(2025, 1, 15, 10, 0, 1)).unwrap().unwrap();
        assert_eq!(after.start, utc(2025, 1, 16, 10, 0, 0));
    }

    #[test]
    fn next_window_includes_firing_exactly_at_after() {
        let config = recurring("0 0 10 * * *", "UTC");
        let window = next_window(&config, utc(2025, 1, 15, 10, 0, 0)).unwrap().unwrap();
        assert_eq!(window.start, utc(2025, 1, 15, 10, 0, 0));
    }

    #[test]
    fn next_window_is_monotonic() {
        let config = recurring("0 30 6 * * *", "Europe/Berlin");
        let samples = [
            utc(2025, 5, 1, 0, 0, 0),
            utc(2025, 5, 1, 4, 29, 59),
            utc(2025, 5, 1, 4, 30, 1),
            utc(2025, 5, 3, 12, 0, 0),
            utc(2025, 5, 10, 23, 59, 59),
        ];
        let mut previous: Option<DateTime<Utc>> = None;
        for at in samples {
            let window = next_window(&config, at).unwrap().unwrap();
            if let Some(prev) = previous {
                assert!(window.start >= prev, "window start regressed at {}", at);
            }
            previous = Some(window.start);
        }
    }

    // -- next_window: time range -------------------------------------------

    #[test]
    fn time_range_pushes_past_closed_range_to_next_day() {
        // Every second, but only 09:00-12:00 counts. Evaluated at 13:00 the
        // next expected window opens at 09:00 the following day.
        let config = with_range("* * * * * *", "UTC", (9, 0), (12, 0));
        let window = next_window(&config, utc(2025, 1, 1, 13, 0, 0)).unwrap().unwrap();
        assert_eq!(window.start, utc(2025, 1, 2, 9, 0, 0));
        assert_eq!(window.end, utc(2025, 1, 2, 12, 0, 0));
    }

    #[test]
    fn time_range_window_is_anchored_at_first_in_range_firing() {
        // Daily at 09:30 inside a 09:00-12:00 range: the window starts at
        // the firing, not at the range boundary.
        let config = with_range("0 30 9 * * *", "UTC", (9, 0), (12, 0));
        let window = next_window(&config, utc(2025, 1, 1, 0, 0, 0)).unwrap().unwrap();
        assert_eq!(window.start, utc(2025, 1, 1, 9, 30, 0));
        assert_eq!(window.end, utc(2025, 1, 1, 12, 0, 0));
    }

    #[test]
    fn time_range_window_identity_is_stable_mid_range() {
        // Evaluated from inside the range, the same day's window comes back
        // with the same canonical start.
        let config = with_range("* * * * * *", "UTC", (9, 0), (12, 0));
        let window = next_window(&config, utc(2025, 1, 2, 10, 30, 0)).unwrap().unwrap();
        assert_eq!(window.start, utc(2025, 1, 2, 9, 0, 0));
        assert_eq!(window.end, utc(2025, 1, 2, 12, 0, 0));
    }

    // -- next_window: day filters ------------------------------------------

    #[test]
    fn days_of_week_allow_list_skips_weekend() {
        // 2025-01-04 is a Saturday; Monday the 6th is the next allowed day.
        let mut config = recurring("0 0 9 * * *", "UTC");
        if let ScheduleConfig::Recurring { days_of_week, .. } = &mut config {
            *days_of_week = Some([1u8, 2, 3, 4, 5].into_iter().collect());
        }
        let window = next_window(&config, utc(2025, 1, 4, 0, 0, 0)).unwrap().unwrap();
        assert_eq!(window.start, utc(2025, 1, 6, 9, 0, 0));
    }

    #[test]
    fn excluded_calendar_day_is_skipped() {
        let mut config = recurring("0 0 9 * * *", "UTC");
        if let ScheduleConfig::Recurring { exclusions, .. } = &mut config {
            exclusions.push(Exclusion::Date(
                NaiveDate::from_ymd_opt(2025, 12, 25).unwrap(),
            ));
        }
        let window = next_window(&config, utc(2025, 12, 25, 0, 0, 0)).unwrap().unwrap();
        assert_eq!(window.start, utc(2025, 12, 26, 9, 0, 0));
    }

    #[test]
    fn excluded_weekday_is_skipped() {
        // 2025-01-05 is a Sunday (weekday 0).
        let mut config = recurring("0 0 9 * * *", "UTC");
        if let ScheduleConfig::Recurring { exclusions, .. } = &mut config {
            exclusions.push(Exclusion::Weekday(0));
        }
        let window = next_window(&config, utc(2025, 1, 5, 0, 0, 0)).unwrap().unwrap();
        assert_eq!(window.start, utc(2025, 1, 6, 9, 0, 0));
    }

    #[test]
    fn schedule_with_every_day_excluded_is_dormant() {
        let mut config = recurring("0 0 9 * * *", "UTC");
        if let ScheduleConfig::Recurring { exclusions, .. } = &mut config {
            for dow in 0..7 {
                exclusions.push(Exclusion::Weekday(dow));
            }
        }
        assert_eq!(next_window(&config, utc(2025, 1, 1, 0, 0, 0)).unwrap(), None);
    }

    // -- next_window: DST --------------------------------------------------

    #[test]
    fn spring_forward_gap_skips_to_next_valid_local_time() {
        // 02:30 does not exist on 2025-03-09 in New York; the next valid
        // 02:30 is on March 10 (EDT, UTC-4).
        let config = recurring("0 30 2 * * *", "America/New_York");
        let window = next_window(&config, utc(2025, 3, 9, 5, 0, 0)).unwrap().unwrap();
        assert_eq!(window.start, utc(2025, 3, 10, 6, 30, 0));
    }

    #[test]
    fn local_timezone_offsets_are_respected() {
        // 06:30 Berlin in summer is 04:30 UTC.
        let config = recurring("0 30 6 * * *", "Europe/Berlin");
        let window = next_window(&config, utc(2025, 7, 1, 0, 0, 0)).unwrap().unwrap();
        assert_eq!(window.start, utc(2025, 7, 1, 4, 30, 0));
    }

    // -- next_window: one-off ----------------------------------------------

    #[test]
    fn oneoff_exists_until_its_instant_passes() {
        let at = utc(2025, 3, 1, 0, 0, 0);
        let config = ScheduleConfig::OneOff { execute_at: at };

        let window = next_window(&config, at - Duration::days(1)).unwrap().unwrap();
        assert_eq!(window.start, at);
        assert_eq!(window.end, at);

        assert_eq!(next_window(&config, at + Duration::seconds(1)).unwrap(), None);
    }

    // -- last_elapsed_window -----------------------------------------------

    #[test]
    fn last_elapsed_daily_cron() {
        let config = recurring("0 0 10 * * *", "UTC");

        let after_firing = last_elapsed_window(&config, utc(2025, 1, 15, 11, 0, 0))
            .unwrap()
            .unwrap();
        assert_eq!(after_firing.start, utc(2025, 1, 15, 10, 0, 0));

        let before_firing = last_elapsed_window(&config, utc(2025, 1, 15, 9, 0, 0))
            .unwrap()
            .unwrap();
        assert_eq!(before_firing.start, utc(2025, 1, 14, 10, 0, 0));
    }

    #[test]
    fn last_elapsed_with_time_range_uses_canonical_day_window() {
        let config = with_range("* * * * * *", "UTC", (9, 0), (12, 0));
        let window = last_elapsed_window(&config, utc(2025, 1, 2, 15, 0, 0))
            .unwrap()
            .unwrap();
        assert_eq!(window.start, utc(2025, 1, 2, 9, 0, 0));
        assert_eq!(window.end, utc(2025, 1, 2, 12, 0, 0));
    }

    #[test]
    fn last_elapsed_finds_sparse_monthly_firing() {
        // First of the month at midnight; mid-month the 35-day tier finds it.
        let config = recurring("0 0 0 1 * *", "UTC");
        let window = last_elapsed_window(&config, utc(2025, 6, 18, 12, 0, 0))
            .unwrap()
            .unwrap();
        assert_eq!(window.start, utc(2025, 6, 1, 0, 0, 0));
    }

    #[test]
    fn last_elapsed_oneoff() {
        let at = utc(2025, 3, 1, 0, 0, 0);
        let config = ScheduleConfig::OneOff { execute_at: at };

        assert_eq!(last_elapsed_window(&config, at - Duration::hours(1)).unwrap(), None);
        let window = last_elapsed_window(&config, at + Duration::days(400))
            .unwrap()
            .unwrap();
        assert_eq!(window.start, at);
    }

    // -- errors ------------------------------------------------------------

    #[test]
    fn invalid_cron_and_timezone_are_typed_errors() {
        let bad_cron = recurring("nope", "UTC");
        assert!(matches!(
            next_window(&bad_cron, Utc::now()).unwrap_err(),
            EvalError::InvalidCron { .. }
        ));

        let bad_tz = recurring("* * * * *", "Atlantis/Sunken_City");
        assert!(matches!(
            next_window(&bad_tz, Utc::now()).unwrap_err(),
            EvalError::UnknownTimezone(_)
        ));
    }
}
