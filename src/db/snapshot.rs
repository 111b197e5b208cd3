//! Daily Snapshot Store: the mutable one-row-per-(operator, day) cache the
//! live dashboard reads. Count changes go through the dedicated operations
//! below (increment on hit, zero on reset); assignment edits merge fields.

use crate::errors::{AppError, AppResult};
use crate::models::snapshot::{DailySnapshot, SnapshotFields};
use crate::models::status::WorkStatus;
use crate::utils::time::{fmt_day, fmt_ts, parse_day, parse_ts};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

fn map_row(row: &Row) -> Result<DailySnapshot> {
    let date_str: String = row.get("counter_date")?;
    let day = parse_day(&date_str).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(AppError::InvalidDate(date_str.clone())),
        )
    })?;

    let status_str: String = row.get("status")?;
    let status = WorkStatus::from_db_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(AppError::InvalidStatus(status_str.clone())),
        )
    })?;

    Ok(DailySnapshot {
        operator_id: row.get("operator_id")?,
        day,
        count: row.get("count")?,
        first_hit: parse_opt_ts(row.get("first_hit")?)?,
        last_hit: parse_opt_ts(row.get("last_hit")?)?,
        step: row.get("step")?,
        part: row.get("part")?,
        status,
        remarks: row.get("remarks")?,
    })
}

fn parse_opt_ts(v: Option<String>) -> Result<Option<NaiveDateTime>> {
    match v {
        None => Ok(None),
        Some(s) => parse_ts(&s).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        }),
    }
}

pub fn get(conn: &Connection, operator_id: i64, day: NaiveDate) -> AppResult<Option<DailySnapshot>> {
    let mut stmt = conn.prepare_cached(
        "SELECT * FROM daily_counters WHERE counter_date = ?1 AND operator_id = ?2",
    )?;
    Ok(stmt
        .query_row(params![fmt_day(day), operator_id], map_row)
        .optional()?)
}

/// Increment semantics for the hit path: creates the row on the day's first
/// hit, otherwise adds to the running count and maintains first/last hit.
/// Returns the new daily total.
pub fn record_hit(
    conn: &Connection,
    operator_id: i64,
    day: NaiveDate,
    amount: i64,
    at: NaiveDateTime,
) -> AppResult<i64> {
    let at_str = fmt_ts(at);
    conn.execute(
        "INSERT INTO daily_counters (counter_date, operator_id, count, first_hit, last_hit)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(counter_date, operator_id) DO UPDATE SET
           count     = count + excluded.count,
           last_hit  = excluded.last_hit,
           first_hit = COALESCE(first_hit, excluded.first_hit)",
        params![fmt_day(day), operator_id, amount, at_str],
    )?;

    let total: i64 = conn.query_row(
        "SELECT count FROM daily_counters WHERE counter_date = ?1 AND operator_id = ?2",
        params![fmt_day(day), operator_id],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Set semantics for assignment edits: merges the supplied fields into the
/// row, creating it with defaults (count 0, step "Counting", status pending)
/// when absent. `None` fields are left untouched.
pub fn apply_fields(
    conn: &Connection,
    operator_id: i64,
    day: NaiveDate,
    fields: &SnapshotFields,
) -> AppResult<()> {
    conn.execute(
        "INSERT INTO daily_counters
           (counter_date, operator_id, count, first_hit, last_hit, step, part, status, remarks)
         VALUES (?1, ?2, 0, NULL, NULL,
                 COALESCE(?3, 'Counting'), COALESCE(?4, ''),
                 COALESCE(?5, 'pending'), COALESCE(?6, ''))
         ON CONFLICT(counter_date, operator_id) DO UPDATE SET
           step    = COALESCE(?3, step),
           part    = COALESCE(?4, part),
           status  = COALESCE(?5, status),
           remarks = COALESCE(?6, remarks)",
        params![
            fmt_day(day),
            operator_id,
            fields.step,
            fields.part,
            fields.status.map(|s| s.to_db_str()),
            fields.remarks,
        ],
    )?;
    Ok(())
}

/// Zero count/first_hit/last_hit, leaving step/part/status/remarks untouched.
/// Used by the device-reset path, which must not look like a new assignment.
/// Returns the count as it was before the reset.
pub fn reset_counts(conn: &Connection, operator_id: i64, day: NaiveDate) -> AppResult<i64> {
    let previous: i64 = conn
        .query_row(
            "SELECT count FROM daily_counters WHERE counter_date = ?1 AND operator_id = ?2",
            params![fmt_day(day), operator_id],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);

    conn.execute(
        "INSERT INTO daily_counters (counter_date, operator_id, count, first_hit, last_hit)
         VALUES (?1, ?2, 0, NULL, NULL)
         ON CONFLICT(counter_date, operator_id) DO UPDATE SET
           count = 0, first_hit = NULL, last_hit = NULL",
        params![fmt_day(day), operator_id],
    )?;
    Ok(previous)
}
