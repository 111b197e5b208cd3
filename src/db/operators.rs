use crate::errors::{AppError, AppResult};
use crate::models::operator::Operator;
use rusqlite::{Connection, OptionalExtension, Result, Row, params};

fn map_row(row: &Row) -> Result<Operator> {
    Ok(Operator {
        id: row.get("id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        project: row.get("project")?,
        department: row.get("department")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
    })
}

/// Seeding seam for the out-of-scope roster layer (and for tests).
pub fn add_operator(conn: &Connection, code: &str, name: &str) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO operators (code, name) VALUES (?1, ?2)",
        params![code, name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_operator(conn: &Connection, operator_id: i64) -> AppResult<Operator> {
    let mut stmt = conn.prepare_cached("SELECT * FROM operators WHERE id = ?1")?;
    stmt.query_row([operator_id], map_row)
        .optional()?
        .ok_or(AppError::OperatorNotFound(operator_id))
}

pub fn list_active_operators(conn: &Connection) -> AppResult<Vec<Operator>> {
    let mut stmt =
        conn.prepare_cached("SELECT * FROM operators WHERE is_active = 1 ORDER BY id ASC")?;
    let rows = stmt.query_map([], map_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Master-record side effect of an assignment change: a non-empty project
/// or department that differs from the current value replaces it.
pub fn update_assignment(
    conn: &Connection,
    operator_id: i64,
    project: &str,
    department: &str,
) -> AppResult<()> {
    let n = conn.execute(
        "UPDATE operators SET project = ?1, department = ?2 WHERE id = ?3",
        params![project, department, operator_id],
    )?;
    if n == 0 {
        return Err(AppError::OperatorNotFound(operator_id));
    }
    Ok(())
}
