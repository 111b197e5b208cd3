//! Segment Reconciler: turns one operator-day's merged event stream into an
//! ordered sequence of work segments.
//!
//! Pure and synchronous; safe to run repeatedly and concurrently. The same
//! function backs both ad-hoc audits and the report projector, so the exact
//! historical view can never drift from the export.
//!
//! The central rule: a device reset zeroes the *displayed* quantity without
//! fragmenting assignment history. Each context range keeps at most one
//! effective floor (the latest reset pinned to that context); only hits at
//! or after the floor count toward the segment's quantity.

use crate::models::event::{ContextChangeEvent, DayEvent, DeviceResetEvent, HitEvent};
use crate::models::segment::WorkSegment;
use crate::models::snapshot::DailySnapshot;
use crate::models::status::WorkStatus;
use chrono::{Days, NaiveDate, NaiveDateTime};

/// Per-day inputs beyond the event stream: the snapshot and the operator
/// master fields, used as field-by-field fallbacks for context rows that
/// were opened before their assignment fields were filled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DayContext<'a> {
    pub operator_id: i64,
    pub snapshot: Option<&'a DailySnapshot>,
    pub master_project: &'a str,
    pub master_department: &'a str,
}

/// One time range owned by a context (or by no context, for the synthetic
/// pre-context stretch of the day).
struct Range<'a> {
    ctx: Option<&'a ContextChangeEvent>,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

fn pick<'a>(primary: &'a str, fallback: &'a str) -> &'a str {
    if primary.is_empty() { fallback } else { primary }
}

/// Reconcile the event list of one operator-day into ordered work segments.
/// `events` must all belong to the same operator and day, timestamp-sorted
/// ascending (as produced by `db::event_log::load_day`).
pub fn reconcile(day: NaiveDate, ctx: &DayContext<'_>, events: &[DayEvent]) -> Vec<WorkSegment> {
    let mut contexts: Vec<&ContextChangeEvent> = Vec::new();
    let mut resets: Vec<&DeviceResetEvent> = Vec::new();
    let mut hits: Vec<&HitEvent> = Vec::new();

    for ev in events {
        match ev {
            DayEvent::Context(c) => contexts.push(c),
            DayEvent::Reset(r) => resets.push(r),
            DayEvent::Hit(h) => hits.push(h),
        }
    }

    let day_start = day.and_hms_opt(0, 0, 0).unwrap_or_default();
    let day_end = day
        .checked_add_days(Days::new(1))
        .unwrap_or(day)
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default();

    // Partition the day into consecutive context ranges. The stretch before
    // the first context (or the whole day when none exists) belongs to the
    // synthetic range with ctx id 0.
    let mut ranges: Vec<Range<'_>> = Vec::new();
    let first_ctx_at = contexts.first().map(|c| c.at).unwrap_or(day_end);
    ranges.push(Range {
        ctx: None,
        start: day_start,
        end: first_ctx_at,
    });
    for (i, c) in contexts.iter().enumerate() {
        let end = contexts.get(i + 1).map(|n| n.at).unwrap_or(day_end);
        ranges.push(Range {
            ctx: Some(c),
            start: c.at,
            end,
        });
    }

    let mut segments = Vec::new();

    for range in &ranges {
        let ctx_id = range.ctx.map(|c| c.id).unwrap_or(0);

        // Latest reset pinned to this context and falling inside the range.
        // A reset whose ctx id does not match any range is simply ignored.
        let floor = resets
            .iter()
            .filter(|r| r.ctx_id == ctx_id && r.at >= range.start && r.at < range.end)
            .map(|r| r.at)
            .max();
        let had_reset = floor.is_some();
        let floor = floor.unwrap_or(range.start);

        // Hits in range, upper bound strictly exclusive: a hit at the exact
        // instant of the next context change belongs to the later segment.
        let in_range: Vec<&HitEvent> = hits
            .iter()
            .copied()
            .filter(|h| h.at >= range.start && h.at < range.end)
            .collect();
        let counted: Vec<&HitEvent> = in_range
            .iter()
            .copied()
            .filter(|h| h.at >= floor)
            .collect();

        let qty: i64 = counted.iter().map(|h| h.amount).sum();
        let start_time = counted
            .iter()
            .map(|h| h.at)
            .min()
            .or(if had_reset { Some(floor) } else { None });
        let end_time = counted
            .iter()
            .map(|h| h.at)
            .max()
            .or(if had_reset { Some(floor) } else { None });

        let snap = ctx.snapshot;
        let segment = match range.ctx {
            Some(c) => WorkSegment {
                operator_id: ctx.operator_id,
                day,
                ctx_id,
                project: pick(&c.project, ctx.master_project).to_string(),
                department: pick(&c.department, ctx.master_department).to_string(),
                step: pick(&c.step, snap.map(|s| s.step.as_str()).unwrap_or("")).to_string(),
                part: pick(&c.part, snap.map(|s| s.part.as_str()).unwrap_or("")).to_string(),
                status: c.status,
                remarks: pick(&c.remarks, snap.map(|s| s.remarks.as_str()).unwrap_or(""))
                    .to_string(),
                start_time,
                end_time,
                qty,
            },
            None => {
                // Synthetic segment: emitted only when there is something to
                // show. With contexts present, leftover pre-context hits or
                // resets justify a row; with none at all, a snapshot that
                // carries data still represents the day.
                let justified = !in_range.is_empty()
                    || had_reset
                    || (contexts.is_empty() && snap.map(|s| s.has_data()).unwrap_or(false));
                if !justified {
                    continue;
                }
                WorkSegment {
                    operator_id: ctx.operator_id,
                    day,
                    ctx_id: 0,
                    project: ctx.master_project.to_string(),
                    department: ctx.master_department.to_string(),
                    step: snap.map(|s| s.step.clone()).unwrap_or_default(),
                    part: snap.map(|s| s.part.clone()).unwrap_or_default(),
                    status: snap.map(|s| s.status).unwrap_or(WorkStatus::Pending),
                    remarks: snap.map(|s| s.remarks.clone()).unwrap_or_default(),
                    start_time,
                    end_time,
                    qty,
                }
            }
        };
        segments.push(segment);
    }

    segments
}
