//! Time utilities: the TEXT timestamp format used by every table, plus
//! day-range helpers for operator-day queries.

use crate::errors::{AppError, AppResult};
use chrono::{Days, NaiveDate, NaiveDateTime};

pub const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";
pub const DAY_FMT: &str = "%Y-%m-%d";

pub fn fmt_ts(ts: NaiveDateTime) -> String {
    ts.format(TS_FMT).to_string()
}

pub fn parse_ts(s: &str) -> AppResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FMT)
        .map_err(|_| AppError::InvalidTimestamp(s.to_string()))
}

pub fn fmt_day(day: NaiveDate) -> String {
    day.format(DAY_FMT).to_string()
}

pub fn parse_day(s: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(s, DAY_FMT).map_err(|_| AppError::InvalidDate(s.to_string()))
}

/// Half-open `[start, end)` bounds of a calendar day, already formatted for
/// use in `created_at` range predicates.
pub fn day_bounds(day: NaiveDate) -> (String, String) {
    let start = day.and_hms_opt(0, 0, 0).unwrap_or_default();
    let end = day
        .checked_add_days(Days::new(1))
        .unwrap_or(day)
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();
    (fmt_ts(start), fmt_ts(end))
}
