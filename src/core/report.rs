//! Report Projector: the exportable view of one day.
//!
//! Read-only and thin: loads each active operator's event log and snapshot,
//! runs the reconciler, and attaches the employee columns the export layer
//! expects. Serialization to CSV/XLSX is the consumer's concern.

use crate::core::reconciler::{self, DayContext};
use crate::db::{event_log, operators, snapshot};
use crate::errors::AppResult;
use crate::models::segment::WorkSegment;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

/// One exportable row: a reconciled work segment plus the operator's
/// identity columns.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub operator_code: String,
    pub employee: String,
    #[serde(flatten)]
    pub segment: WorkSegment,
}

/// Reconciled rows for `day`, ordered by operator id then segment start.
/// Operators without events and without snapshot data contribute no rows.
pub fn project(conn: &Connection, day: NaiveDate) -> AppResult<Vec<ReportRow>> {
    let mut rows = Vec::new();

    for op in operators::list_active_operators(conn)? {
        let events = event_log::load_day(conn, op.id, day)?;
        let snap = snapshot::get(conn, op.id, day)?;
        let ctx = DayContext {
            operator_id: op.id,
            snapshot: snap.as_ref(),
            master_project: &op.project,
            master_department: &op.department,
        };
        for segment in reconciler::reconcile(day, &ctx, &events) {
            rows.push(ReportRow {
                operator_code: op.code.clone(),
                employee: op.name.clone(),
                segment,
            });
        }
    }

    Ok(rows)
}
