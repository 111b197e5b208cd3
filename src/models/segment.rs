use super::status::WorkStatus;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Derived work segment: one contiguous assignment period for one operator,
/// bounded by context changes. Never persisted; rebuilt from the event log
/// by the reconciler on every report.
#[derive(Debug, Clone, Serialize)]
pub struct WorkSegment {
    pub operator_id: i64,
    pub day: NaiveDate,
    /// Owning context row id; 0 for the synthetic pre-context segment.
    pub ctx_id: i64,
    pub project: String,
    pub department: String,
    pub step: String,
    pub part: String,
    pub status: WorkStatus,
    pub remarks: String,
    /// First counted hit (or the reset marker when a reset erased all hits).
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    /// Units counted at or after the segment's effective floor.
    pub qty: i64,
}
