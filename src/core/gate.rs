//! Change Notification Gate.
//!
//! A single monotonic marker advanced by every successful mutation, plus the
//! per-operator refresh-suppression handshake that keeps a poll-driven
//! dashboard from overwriting an edit in flight. The gate says *that*
//! something changed, never *what*; transport (poll, SSE, push) is the
//! consumer's concern.

use crate::errors::{AppError, AppResult};
use rusqlite::{Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub const LAST_CHANGE_KEY: &str = "last_change";

/// Advance the marker. Runs inside the calling mutation's transaction so the
/// bump commits or rolls back with it. Strictly monotonic: the wall clock
/// when it moved forward, previous value + 1 otherwise.
pub fn touch(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "INSERT INTO app_kv (k, v, updated_at)
         VALUES (?1, strftime('%s','now'), datetime('now'))
         ON CONFLICT(k) DO UPDATE SET
           v = MAX(v + 1, excluded.v),
           updated_at = excluded.updated_at",
        [LAST_CHANGE_KEY],
    )?;
    Ok(())
}

/// Current marker value; 0 before the first mutation.
pub fn last_changed_at(conn: &Connection) -> AppResult<i64> {
    let v: Option<i64> = conn
        .query_row(
            "SELECT v FROM app_kv WHERE k = ?1",
            [LAST_CHANGE_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(v.unwrap_or(0))
}

#[derive(Default)]
struct RefreshInner {
    /// Open edit guards per operator (an operator can have nested guards).
    in_flight: HashMap<i64, u32>,
    /// Operators whose last guard dropped and who are owed exactly one
    /// externally-triggered refresh.
    due: HashSet<i64>,
}

/// Per-operator "edit outstanding" flag set. While an operator has an edit
/// in flight, the dashboard's poll loop must skip refreshing that operator;
/// when the edit completes the operator becomes due for a single refresh.
#[derive(Default)]
pub struct RefreshGate {
    inner: Mutex<RefreshInner>,
}

impl RefreshGate {
    fn lock(&self) -> std::sync::MutexGuard<'_, RefreshInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Mark an edit as outstanding. Suppression lasts until the returned
    /// guard is dropped.
    pub fn begin_edit(&self, operator_id: i64) -> EditGuard<'_> {
        let mut inner = self.lock();
        *inner.in_flight.entry(operator_id).or_insert(0) += 1;
        // an operator being edited again is no longer merely "due"
        inner.due.remove(&operator_id);
        EditGuard {
            gate: self,
            operator_id,
        }
    }

    pub fn is_suppressed(&self, operator_id: i64) -> bool {
        self.lock().in_flight.contains_key(&operator_id)
    }

    /// Drain the operators owed a refresh. Each operator appears at most
    /// once per completed edit; calling again without new edits yields
    /// nothing.
    pub fn take_due(&self) -> Vec<i64> {
        let mut due: Vec<i64> = self.lock().due.drain().collect();
        due.sort_unstable();
        due
    }
}

pub struct EditGuard<'a> {
    gate: &'a RefreshGate,
    operator_id: i64,
}

impl Drop for EditGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.gate.lock();
        if let Some(n) = inner.in_flight.get_mut(&self.operator_id) {
            *n -= 1;
            if *n == 0 {
                inner.in_flight.remove(&self.operator_id);
                inner.due.insert(self.operator_id);
            }
        }
    }
}

/// Bounded-wait per-operator serialization for the mutation coordinator.
/// Mutations on the same operator take turns; different operators proceed
/// independently.
#[derive(Default)]
pub struct OperatorLocks {
    busy: Mutex<HashSet<i64>>,
}

impl OperatorLocks {
    pub fn acquire(
        &self,
        operator_id: i64,
        max_wait: std::time::Duration,
    ) -> AppResult<OperatorGuard<'_>> {
        let deadline = std::time::Instant::now() + max_wait;
        loop {
            {
                let mut busy = match self.busy.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if busy.insert(operator_id) {
                    return Ok(OperatorGuard {
                        locks: self,
                        operator_id,
                    });
                }
            }
            if std::time::Instant::now() >= deadline {
                return Err(AppError::Conflict(operator_id));
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
    }
}

pub struct OperatorGuard<'a> {
    locks: &'a OperatorLocks,
    operator_id: i64,
}

impl std::fmt::Debug for OperatorGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorGuard")
            .field("operator_id", &self.operator_id)
            .finish()
    }
}

impl Drop for OperatorGuard<'_> {
    fn drop(&mut self) {
        let mut busy = match self.locks.busy.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        busy.remove(&self.operator_id);
    }
}
