//! Event Log Store: append-only access to the three event streams.
//!
//! Hits and device resets are never updated or deleted. Context rows expose
//! exactly one mutation, `close_segment`, settable only from open to
//! complete. Everything else is INSERT + ordered SELECT.

use crate::errors::{AppError, AppResult};
use crate::models::event::{ContextChangeEvent, DayEvent, DeviceResetEvent, HitEvent};
use crate::models::status::WorkStatus;
use crate::utils::time::{day_bounds, fmt_ts, parse_ts};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

/// Appends reject timestamps further than this into the future.
pub const CLOCK_SKEW_TOLERANCE_SECS: i64 = 120;

/// Fields of a context row to be appended (id is assigned by the store).
#[derive(Debug, Clone)]
pub struct NewContext {
    pub operator_id: i64,
    pub project: String,
    pub department: String,
    pub step: String,
    pub part: String,
    pub status: WorkStatus,
    pub remarks: String,
    pub at: NaiveDateTime,
}

fn validate_append(conn: &Connection, operator_id: i64, at: NaiveDateTime) -> AppResult<()> {
    let known: Option<i64> = conn
        .query_row(
            "SELECT id FROM operators WHERE id = ?1",
            [operator_id],
            |row| row.get(0),
        )
        .optional()?;
    if known.is_none() {
        return Err(AppError::OperatorNotFound(operator_id));
    }

    let horizon = Local::now().naive_local() + Duration::seconds(CLOCK_SKEW_TOLERANCE_SECS);
    if at > horizon {
        return Err(AppError::InvalidTimestamp(format!(
            "{} is in the future",
            fmt_ts(at)
        )));
    }
    Ok(())
}

pub fn append_hit(
    conn: &Connection,
    operator_id: i64,
    amount: i64,
    total_after: i64,
    at: NaiveDateTime,
) -> AppResult<i64> {
    if amount <= 0 {
        return Err(AppError::InvalidArgument(format!(
            "hit amount must be positive, got {amount}"
        )));
    }
    validate_append(conn, operator_id, at)?;

    conn.execute(
        "INSERT INTO hit_log (operator_id, amount, total_after, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![operator_id, amount, total_after, fmt_ts(at)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn append_context(conn: &Connection, ctx: &NewContext) -> AppResult<i64> {
    validate_append(conn, ctx.operator_id, ctx.at)?;

    conn.execute(
        "INSERT INTO context_log
           (operator_id, project, department, step, part, status, remarks, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            ctx.operator_id,
            ctx.project,
            ctx.department,
            ctx.step,
            ctx.part,
            ctx.status.to_db_str(),
            ctx.remarks,
            fmt_ts(ctx.at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// A reset marker pins the context active at the instant it was written;
/// `ctx_id` must be 0 ("no segment yet today") or an existing context row of
/// the same operator created at or before the reset.
pub fn append_reset(
    conn: &Connection,
    operator_id: i64,
    ctx_id: i64,
    note: &str,
    at: NaiveDateTime,
) -> AppResult<i64> {
    validate_append(conn, operator_id, at)?;

    if ctx_id != 0 {
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM context_log
                 WHERE id = ?1 AND operator_id = ?2 AND created_at <= ?3",
                params![ctx_id, operator_id, fmt_ts(at)],
                |row| row.get(0),
            )
            .optional()?;
        if found.is_none() {
            return Err(AppError::InvalidArgument(format!(
                "reset references unknown context {ctx_id} for operator {operator_id}"
            )));
        }
    }

    conn.execute(
        "INSERT INTO device_reset_log (operator_id, ctx_id, note, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![operator_id, ctx_id, note, fmt_ts(at)],
    )?;
    Ok(conn.last_insert_rowid())
}

/// The one permitted post-hoc edit to the context stream: mark an open
/// context as complete. A no-op if the row is already complete.
pub fn close_segment(conn: &Connection, ctx_id: i64) -> AppResult<()> {
    conn.execute(
        "UPDATE context_log SET status = 'complete' WHERE id = ?1 AND status <> 'complete'",
        [ctx_id],
    )?;
    Ok(())
}

/// Latest non-complete context of the day, if any. Used to rebuild the
/// coordinator's open-context cache after a miss.
pub fn find_open_context(
    conn: &Connection,
    operator_id: i64,
    day: NaiveDate,
) -> AppResult<Option<i64>> {
    let (start, end) = day_bounds(day);
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM context_log
             WHERE operator_id = ?1 AND created_at >= ?2 AND created_at < ?3
               AND status <> 'complete'
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
            params![operator_id, start, end],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Timestamp of the day's earliest hit, straight from the immutable log
/// (the snapshot's first_hit is nulled by resets and cannot be trusted for
/// retroactive synthesis).
pub fn first_hit_at(
    conn: &Connection,
    operator_id: i64,
    day: NaiveDate,
) -> AppResult<Option<NaiveDateTime>> {
    let (start, end) = day_bounds(day);
    let ts: Option<String> = conn
        .query_row(
            "SELECT MIN(created_at) FROM hit_log
             WHERE operator_id = ?1 AND created_at >= ?2 AND created_at < ?3",
            params![operator_id, start, end],
            |row| row.get(0),
        )
        .optional()?
        .flatten();
    match ts {
        None => Ok(None),
        Some(s) => Ok(Some(parse_ts(&s)?)),
    }
}

fn map_hit(row: &Row) -> Result<HitEvent> {
    Ok(HitEvent {
        id: row.get("id")?,
        operator_id: row.get("operator_id")?,
        amount: row.get("amount")?,
        total_after: row.get("total_after")?,
        at: ts_col(row, "created_at")?,
    })
}

fn map_context(row: &Row) -> Result<ContextChangeEvent> {
    let status_str: String = row.get("status")?;
    let status = WorkStatus::from_db_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(AppError::InvalidStatus(status_str.clone())),
        )
    })?;

    Ok(ContextChangeEvent {
        id: row.get("id")?,
        operator_id: row.get("operator_id")?,
        project: row.get("project")?,
        department: row.get("department")?,
        step: row.get("step")?,
        part: row.get("part")?,
        status,
        remarks: row.get("remarks")?,
        at: ts_col(row, "created_at")?,
    })
}

fn map_reset(row: &Row) -> Result<DeviceResetEvent> {
    Ok(DeviceResetEvent {
        id: row.get("id")?,
        operator_id: row.get("operator_id")?,
        ctx_id: row.get("ctx_id")?,
        note: row.get("note")?,
        at: ts_col(row, "created_at")?,
    })
}

fn ts_col(row: &Row, col: &str) -> Result<NaiveDateTime> {
    let s: String = row.get(col)?;
    parse_ts(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// All three event kinds for one operator-day, merged and sorted by
/// timestamp ascending. Events at the identical instant order context
/// before reset before hit, so the merged stream reads naturally; segment
/// attribution itself only depends on the timestamps.
pub fn load_day(conn: &Connection, operator_id: i64, day: NaiveDate) -> AppResult<Vec<DayEvent>> {
    let (start, end) = day_bounds(day);
    let mut events: Vec<DayEvent> = Vec::new();

    let mut stmt = conn.prepare_cached(
        "SELECT * FROM context_log
         WHERE operator_id = ?1 AND created_at >= ?2 AND created_at < ?3
         ORDER BY created_at ASC, id ASC",
    )?;
    for r in stmt.query_map(params![operator_id, &start, &end], map_context)? {
        events.push(DayEvent::Context(r?));
    }

    let mut stmt = conn.prepare_cached(
        "SELECT * FROM device_reset_log
         WHERE operator_id = ?1 AND created_at >= ?2 AND created_at < ?3
         ORDER BY created_at ASC, id ASC",
    )?;
    for r in stmt.query_map(params![operator_id, &start, &end], map_reset)? {
        events.push(DayEvent::Reset(r?));
    }

    let mut stmt = conn.prepare_cached(
        "SELECT * FROM hit_log
         WHERE operator_id = ?1 AND created_at >= ?2 AND created_at < ?3
         ORDER BY created_at ASC, id ASC",
    )?;
    for r in stmt.query_map(params![operator_id, &start, &end], map_hit)? {
        events.push(DayEvent::Hit(r?));
    }

    let rank = |e: &DayEvent| match e {
        DayEvent::Context(_) => 0u8,
        DayEvent::Reset(_) => 1,
        DayEvent::Hit(_) => 2,
    };
    events.sort_by(|a, b| {
        a.timestamp()
            .cmp(&b.timestamp())
            .then_with(|| rank(a).cmp(&rank(b)))
    });

    Ok(events)
}
