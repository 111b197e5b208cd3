use serde::Serialize;

/// Operator master record. Rows are created by the roster layer (out of
/// scope here); the core only reads them and updates `project`/`department`
/// as a side effect of assignment changes.
#[derive(Debug, Clone, Serialize)]
pub struct Operator {
    pub id: i64,
    pub code: String,       // ⇔ operators.code (stable badge code)
    pub name: String,       // ⇔ operators.name
    pub project: String,    // ⇔ operators.project (current assignment)
    pub department: String, // ⇔ operators.department
    pub is_active: bool,    // ⇔ operators.is_active
}
