use rusqlite::{Connection, OptionalExtension, Result};

/// Ensure that the `log` table exists (internal audit trail).
fn ensure_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS log (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            date      TEXT NOT NULL,
            operation TEXT NOT NULL,
            target    TEXT DEFAULT '',
            message   TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn create_operators_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS operators (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            code        TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            project     TEXT NOT NULL DEFAULT '',
            department  TEXT NOT NULL DEFAULT '',
            is_active   INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )?;
    Ok(())
}

/// The three append-only event streams. `hit_log` and `device_reset_log`
/// never see UPDATE; `context_log.status` is the single mutable column
/// (open → complete, see event_log::close_segment).
fn create_event_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS hit_log (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            operator_id  INTEGER NOT NULL,
            amount       INTEGER NOT NULL CHECK(amount > 0),
            total_after  INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS context_log (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            operator_id  INTEGER NOT NULL,
            project      TEXT NOT NULL DEFAULT '',
            department   TEXT NOT NULL DEFAULT '',
            step         TEXT NOT NULL DEFAULT '',
            part         TEXT NOT NULL DEFAULT '',
            status       TEXT NOT NULL DEFAULT 'pending'
                         CHECK(status IN ('on-progress','pending','complete','reset')),
            remarks      TEXT NOT NULL DEFAULT '',
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS device_reset_log (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            operator_id  INTEGER NOT NULL,
            ctx_id       INTEGER NOT NULL DEFAULT 0,
            note         TEXT NOT NULL DEFAULT '',
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_hit_log_op_at ON hit_log(operator_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_context_log_op_at ON context_log(operator_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_reset_log_op_at ON device_reset_log(operator_id, created_at);
        "#,
    )?;
    Ok(())
}

/// Daily snapshot rows, one per (day, operator). Created lazily on first
/// hit or edit; the UNIQUE key makes the upsert paths safe.
fn create_daily_counters_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS daily_counters (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            counter_date  TEXT NOT NULL,
            operator_id   INTEGER NOT NULL,
            count         INTEGER NOT NULL DEFAULT 0 CHECK(count >= 0),
            first_hit     TEXT,
            last_hit      TEXT,
            step          TEXT NOT NULL DEFAULT 'Counting',
            part          TEXT NOT NULL DEFAULT '',
            status        TEXT NOT NULL DEFAULT 'pending',
            remarks       TEXT NOT NULL DEFAULT '',
            UNIQUE(counter_date, operator_id)
        );

        CREATE INDEX IF NOT EXISTS idx_counters_date ON daily_counters(counter_date);
        "#,
    )?;
    Ok(())
}

/// Key/value side table holding the change-notification marker.
fn create_app_kv_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS app_kv (
            k          TEXT PRIMARY KEY,
            v          INTEGER NOT NULL,
            updated_at TEXT NOT NULL DEFAULT ''
        );
        "#,
    )?;
    Ok(())
}

/// Check if the legacy `work_log` table (pre-0.3 schema) is still around.
fn work_log_table_exists(conn: &Connection) -> Result<bool> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name='work_log'")?;
    let exists: Option<String> = stmt.query_row([], |row| row.get(0)).optional()?;
    Ok(exists.is_some())
}

/// Drop obsolete tables as part of the 0.3.0 migration.
fn align_db_schemas_to_030_version(conn: &Connection) -> Result<()> {
    if work_log_table_exists(conn)? {
        conn.execute_batch("DROP TABLE work_log;")?;
        conn.execute(
            "INSERT INTO log (date, operation, target, message)
             VALUES (datetime('now'), 'migration_applied', 'work_log',
                     'Dropped obsolete work_log table')",
            [],
        )?;
    }
    Ok(())
}

/// Public entry point: run all pending migrations.
///
/// Invoked by db::init_db().
pub fn run_pending_migrations(conn: &Connection) -> Result<()> {
    ensure_log_table(conn)?;
    create_operators_table(conn)?;
    create_event_tables(conn)?;
    create_daily_counters_table(conn)?;
    create_app_kv_table(conn)?;
    align_db_schemas_to_030_version(conn)?;
    Ok(())
}
