use super::status::WorkStatus;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Mutable daily snapshot, one row per (operator, day). This is the
/// fast-read materialized view the live dashboard consumes; the immutable
/// event log stays the ground truth for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct DailySnapshot {
    pub operator_id: i64,
    pub day: NaiveDate,                   // ⇔ daily_counters.counter_date
    pub count: i64,                       // ⇔ daily_counters.count (never < 0)
    pub first_hit: Option<NaiveDateTime>, // ⇔ daily_counters.first_hit
    pub last_hit: Option<NaiveDateTime>,  // ⇔ daily_counters.last_hit
    pub step: String,
    pub part: String,
    pub status: WorkStatus,
    pub remarks: String,
}

impl DailySnapshot {
    /// A row counts as "data" for reconciliation purposes when anything
    /// beyond the creation defaults has been recorded on it.
    pub fn has_data(&self) -> bool {
        self.count != 0
            || self.first_hit.is_some()
            || !self.part.is_empty()
            || !self.remarks.is_empty()
    }
}

/// Field set for assignment edits against the snapshot. `None` means
/// "leave unchanged"; count semantics are handled by dedicated store
/// operations (increment on hit, zero on reset), never through this patch.
#[derive(Debug, Clone, Default)]
pub struct SnapshotFields {
    pub step: Option<String>,
    pub part: Option<String>,
    pub status: Option<WorkStatus>,
    pub remarks: Option<String>,
}
