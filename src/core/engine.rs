//! Mutation Coordinator and public service boundary.
//!
//! The engine is the only writer to the event log and the snapshot store.
//! Each mutation is one rusqlite transaction: log appends, snapshot upsert,
//! audit row and notification-gate bump commit together or not at all.
//! Concurrent mutations on the same operator are serialized through a
//! bounded-wait lock; different operators proceed independently.

use crate::config::Config;
use crate::core::gate::{self, EditGuard, OperatorLocks, RefreshGate};
use crate::core::report::{self, ReportRow};
use crate::db::event_log::{self, NewContext};
use crate::db::log::audit;
use crate::db::pool::DbPool;
use crate::db::{initialize, operators, snapshot};
use crate::errors::{AppError, AppResult};
use crate::models::snapshot::{DailySnapshot, SnapshotFields};
use crate::models::status::WorkStatus;
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const DEFAULT_LOCK_WAIT_MS: u64 = 500;

/// Result of `record_hit`.
#[derive(Debug, Clone, Copy)]
pub struct HitOutcome {
    pub new_total: i64,
}

/// Result of `record_device_reset`.
#[derive(Debug, Clone, Copy)]
pub struct ResetOutcome {
    /// Context the reset was pinned to (0 = no context yet today).
    pub ctx_id: i64,
    pub previous_total: i64,
}

/// Assignment edit. `None` means "leave unchanged": project/department fall
/// back to the operator master, status defaults to `reset` (the original
/// boundary marker), the text fields stay empty and inherit through the
/// reconciler's snapshot fallback.
#[derive(Debug, Clone, Default)]
pub struct AssignmentChange {
    pub project: Option<String>,
    pub department: Option<String>,
    pub step: Option<String>,
    pub part: Option<String>,
    pub status: Option<WorkStatus>,
    pub remarks: Option<String>,
}

/// O(1) "find open segment": per-operator pointer to the day's currently
/// open context, refreshed from the log on miss and updated only after a
/// successful commit.
#[derive(Default)]
struct OpenContexts {
    inner: Mutex<HashMap<i64, (NaiveDate, Option<i64>)>>,
}

impl OpenContexts {
    fn lock(&self) -> MutexGuard<'_, HashMap<i64, (NaiveDate, Option<i64>)>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn get(
        &self,
        conn: &rusqlite::Connection,
        operator_id: i64,
        day: NaiveDate,
    ) -> AppResult<Option<i64>> {
        if let Some((cached_day, ctx)) = self.lock().get(&operator_id)
            && *cached_day == day
        {
            return Ok(*ctx);
        }
        let ctx = event_log::find_open_context(conn, operator_id, day)?;
        self.lock().insert(operator_id, (day, ctx));
        Ok(ctx)
    }

    fn set(&self, operator_id: i64, day: NaiveDate, ctx: Option<i64>) {
        self.lock().insert(operator_id, (day, ctx));
    }
}

pub struct Engine {
    pool: Mutex<DbPool>,
    locks: OperatorLocks,
    open_ctx: OpenContexts,
    refresh: RefreshGate,
    lock_wait: Duration,
}

impl Engine {
    pub fn open(path: &str) -> AppResult<Self> {
        let pool = DbPool::new(path)?;
        initialize::init_db(&pool.conn)?;
        Ok(Self::from_pool(pool, DEFAULT_LOCK_WAIT_MS))
    }

    pub fn with_config(cfg: &Config) -> AppResult<Self> {
        let pool = DbPool::new(&cfg.database)?;
        initialize::init_db(&pool.conn)?;
        Ok(Self::from_pool(pool, cfg.lock_wait_ms))
    }

    /// In-memory engine, used by tests.
    pub fn in_memory() -> AppResult<Self> {
        let pool = DbPool::in_memory()?;
        initialize::init_db(&pool.conn)?;
        Ok(Self::from_pool(pool, DEFAULT_LOCK_WAIT_MS))
    }

    fn from_pool(pool: DbPool, lock_wait_ms: u64) -> Self {
        Self {
            pool: Mutex::new(pool),
            locks: OperatorLocks::default(),
            open_ctx: OpenContexts::default(),
            refresh: RefreshGate::default(),
            lock_wait: Duration::from_millis(lock_wait_ms),
        }
    }

    fn lock_pool(&self) -> AppResult<MutexGuard<'_, DbPool>> {
        self.pool
            .lock()
            .map_err(|_| AppError::Other("database mutex poisoned".into()))
    }

    // ------------------------------------------------
    // Mutations
    // ------------------------------------------------

    pub fn record_hit(&self, operator_id: i64, amount: i64) -> AppResult<HitOutcome> {
        self.record_hit_at(operator_id, amount, Local::now().naive_local())
    }

    /// Append a hit and increment the daily snapshot in one unit.
    pub fn record_hit_at(
        &self,
        operator_id: i64,
        amount: i64,
        at: NaiveDateTime,
    ) -> AppResult<HitOutcome> {
        if amount <= 0 {
            return Err(AppError::InvalidArgument(format!(
                "hit amount must be positive, got {amount}"
            )));
        }

        let _op = self.locks.acquire(operator_id, self.lock_wait)?;
        let mut pool = self.lock_pool()?;
        let tx = pool.conn.transaction()?;

        operators::get_operator(&tx, operator_id)?;
        let day = at.date();
        let new_total = snapshot::record_hit(&tx, operator_id, day, amount, at)?;
        event_log::append_hit(&tx, operator_id, amount, new_total, at)?;
        audit(
            &tx,
            "hit",
            &operator_id.to_string(),
            &format!("+{amount} units (total {new_total})"),
        )?;
        gate::touch(&tx)?;
        tx.commit()?;

        Ok(HitOutcome { new_total })
    }

    pub fn record_device_reset(&self, operator_id: i64, note: &str) -> AppResult<ResetOutcome> {
        self.record_device_reset_at(operator_id, note, Local::now().naive_local())
    }

    /// Physical-counter zeroing: appends a reset marker pinned to the
    /// currently open context (or 0) and zeroes the snapshot counts. Does
    /// not open a new segment and leaves step/part/status/remarks alone.
    pub fn record_device_reset_at(
        &self,
        operator_id: i64,
        note: &str,
        at: NaiveDateTime,
    ) -> AppResult<ResetOutcome> {
        let _op = self.locks.acquire(operator_id, self.lock_wait)?;
        let mut pool = self.lock_pool()?;
        let tx = pool.conn.transaction()?;

        operators::get_operator(&tx, operator_id)?;
        let day = at.date();
        let ctx_id = self.open_ctx.get(&tx, operator_id, day)?.unwrap_or(0);
        event_log::append_reset(&tx, operator_id, ctx_id, note, at)?;
        let previous_total = snapshot::reset_counts(&tx, operator_id, day)?;
        audit(
            &tx,
            "device-reset",
            &operator_id.to_string(),
            &format!("ctx {ctx_id}, {previous_total} units cleared"),
        )?;
        gate::touch(&tx)?;
        tx.commit()?;

        Ok(ResetOutcome {
            ctx_id,
            previous_total,
        })
    }

    pub fn apply_assignment_change(
        &self,
        operator_id: i64,
        change: &AssignmentChange,
    ) -> AppResult<i64> {
        self.apply_assignment_change_at(operator_id, change, Local::now().naive_local())
    }

    /// Supervisor edit: opens a new context segment, closes the previously
    /// open one, updates the operator master when project/department moved,
    /// and rewrites the snapshot with the new fields and a zeroed count.
    ///
    /// If no context was open but the day already has hits, a retroactive
    /// `complete` context is synthesized at the first hit's timestamp so the
    /// reconciler can attribute those hits. This is the one compensating
    /// write in the system; everything else is a plain append.
    ///
    /// Returns the id of the newly opened context.
    pub fn apply_assignment_change_at(
        &self,
        operator_id: i64,
        change: &AssignmentChange,
        at: NaiveDateTime,
    ) -> AppResult<i64> {
        let _op = self.locks.acquire(operator_id, self.lock_wait)?;
        let mut pool = self.lock_pool()?;
        let tx = pool.conn.transaction()?;

        let master = operators::get_operator(&tx, operator_id)?;
        let day = at.date();
        let prev_open = self.open_ctx.get(&tx, operator_id, day)?;
        let snap_before = snapshot::get(&tx, operator_id, day)?;

        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        let project = non_empty(&change.project).unwrap_or_else(|| master.project.clone());
        let department = non_empty(&change.department).unwrap_or_else(|| master.department.clone());
        let status = change.status.unwrap_or(WorkStatus::Reset);
        let step = change.step.clone().unwrap_or_default();
        let part = change.part.clone().unwrap_or_default();
        let remarks = change.remarks.clone().unwrap_or_default();

        if project != master.project || department != master.department {
            operators::update_assignment(&tx, operator_id, &project, &department)?;
        }

        match prev_open {
            Some(prev_id) => event_log::close_segment(&tx, prev_id)?,
            None => {
                if let Some(first_hit) = event_log::first_hit_at(&tx, operator_id, day)? {
                    let before = snap_before.as_ref();
                    event_log::append_context(
                        &tx,
                        &NewContext {
                            operator_id,
                            project: master.project.clone(),
                            department: master.department.clone(),
                            step: before.map(|s| s.step.clone()).unwrap_or_default(),
                            part: before.map(|s| s.part.clone()).unwrap_or_default(),
                            status: WorkStatus::Complete,
                            remarks: "auto-complete on assignment change".into(),
                            at: first_hit,
                        },
                    )?;
                }
            }
        }

        let new_id = event_log::append_context(
            &tx,
            &NewContext {
                operator_id,
                project,
                department,
                step,
                part,
                status,
                remarks,
                at,
            },
        )?;

        snapshot::apply_fields(
            &tx,
            operator_id,
            day,
            &SnapshotFields {
                step: change.step.clone(),
                part: change.part.clone(),
                status: Some(status),
                remarks: change.remarks.clone(),
            },
        )?;
        snapshot::reset_counts(&tx, operator_id, day)?;
        audit(
            &tx,
            "assignment-change",
            &operator_id.to_string(),
            &format!("opened ctx {new_id}"),
        )?;
        gate::touch(&tx)?;
        tx.commit()?;

        self.open_ctx.set(operator_id, day, Some(new_id));
        Ok(new_id)
    }

    /// Supervisor bulk reset: device-reset every active operator that still
    /// carries a count today. Each operator is its own atomic unit, so one
    /// failing operator does not undo the others.
    pub fn reset_all_today(&self, note: &str) -> AppResult<Vec<(i64, ResetOutcome)>> {
        let today = Local::now().date_naive();
        let ops = {
            let pool = self.lock_pool()?;
            operators::list_active_operators(&pool.conn)?
        };

        let mut outcomes = Vec::new();
        for op in ops {
            let count = {
                let pool = self.lock_pool()?;
                snapshot::get(&pool.conn, op.id, today)?
                    .map(|s| s.count)
                    .unwrap_or(0)
            };
            if count > 0 {
                let outcome =
                    self.record_device_reset_at(op.id, note, Local::now().naive_local())?;
                outcomes.push((op.id, outcome));
            }
        }
        Ok(outcomes)
    }

    // ------------------------------------------------
    // Reads
    // ------------------------------------------------

    pub fn get_snapshot(&self, operator_id: i64, day: NaiveDate) -> AppResult<DailySnapshot> {
        let pool = self.lock_pool()?;
        operators::get_operator(&pool.conn, operator_id)?;
        snapshot::get(&pool.conn, operator_id, day)?.ok_or(AppError::SnapshotNotFound {
            operator_id,
            day: day.to_string(),
        })
    }

    /// Exact historical view: reconciled work segments for every active
    /// operator on `day`, ordered by operator id then segment start.
    pub fn get_report(&self, day: NaiveDate) -> AppResult<Vec<ReportRow>> {
        let pool = self.lock_pool()?;
        report::project(&pool.conn, day)
    }

    pub fn last_changed_at(&self) -> AppResult<i64> {
        let pool = self.lock_pool()?;
        gate::last_changed_at(&pool.conn)
    }

    // ------------------------------------------------
    // Refresh suppression handshake
    // ------------------------------------------------

    /// Flag an edit as outstanding for `operator_id`; the dashboard's poll
    /// loop must skip that operator until the guard drops.
    pub fn begin_edit(&self, operator_id: i64) -> EditGuard<'_> {
        self.refresh.begin_edit(operator_id)
    }

    pub fn refresh_suppressed(&self, operator_id: i64) -> bool {
        self.refresh.is_suppressed(operator_id)
    }

    /// Operators owed exactly one refresh after their edits completed.
    pub fn take_refresh_due(&self) -> Vec<i64> {
        self.refresh.take_due()
    }

    // ------------------------------------------------
    // Roster seam (roster CRUD itself is out of scope)
    // ------------------------------------------------

    pub fn add_operator(&self, code: &str, name: &str) -> AppResult<i64> {
        let pool = self.lock_pool()?;
        operators::add_operator(&pool.conn, code, name)
    }
}
