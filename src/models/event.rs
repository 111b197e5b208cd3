use super::status::WorkStatus;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// One production increment from the counting device. Append-only.
#[derive(Debug, Clone, Serialize)]
pub struct HitEvent {
    pub id: i64,
    pub operator_id: i64,
    pub amount: i64,      // ⇔ hit_log.amount (always > 0)
    pub total_after: i64, // ⇔ hit_log.total_after (running daily total)
    pub at: NaiveDateTime,
}

/// Opens a new work segment for the operator. Append-only except for the
/// single open → complete status transition applied when the next context
/// supersedes this one.
#[derive(Debug, Clone, Serialize)]
pub struct ContextChangeEvent {
    pub id: i64,
    pub operator_id: i64,
    pub project: String,
    pub department: String,
    pub step: String,
    pub part: String,
    pub status: WorkStatus,
    pub remarks: String,
    pub at: NaiveDateTime,
}

/// Marker written when the physical counter was zeroed. Does not open a
/// new segment; `ctx_id` is pinned at write time to the context that was
/// active at that instant (0 if none existed yet that day).
#[derive(Debug, Clone, Serialize)]
pub struct DeviceResetEvent {
    pub id: i64,
    pub operator_id: i64,
    pub ctx_id: i64,
    pub note: String,
    pub at: NaiveDateTime,
}

/// Tagged union over the three event streams of one operator-day.
/// The reconciler matches on this exhaustively.
#[derive(Debug, Clone, Serialize)]
pub enum DayEvent {
    Hit(HitEvent),
    Context(ContextChangeEvent),
    Reset(DeviceResetEvent),
}

impl DayEvent {
    pub fn timestamp(&self) -> NaiveDateTime {
        match self {
            DayEvent::Hit(e) => e.at,
            DayEvent::Context(e) => e.at,
            DayEvent::Reset(e) => e.at,
        }
    }

    pub fn operator_id(&self) -> i64 {
        match self {
            DayEvent::Hit(e) => e.operator_id,
            DayEvent::Context(e) => e.operator_id,
            DayEvent::Reset(e) => e.operator_id,
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.timestamp().date()
    }
}
