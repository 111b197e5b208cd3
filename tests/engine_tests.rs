mod common;
use common::{day, open_engine, ts};

use tallyboard::models::status::WorkStatus;
use tallyboard::{AppError, AssignmentChange};

#[test]
fn record_hit_accumulates_daily_total() {
    let (engine, _db) = open_engine("hit_accumulates");
    let op = engine.add_operator("OP-7", "Dewi").unwrap();

    let first = engine
        .record_hit_at(op, 3, ts("2026-08-20 09:05:00"))
        .unwrap();
    assert_eq!(first.new_total, 3);

    let second = engine
        .record_hit_at(op, 2, ts("2026-08-20 09:10:00"))
        .unwrap();
    assert_eq!(second.new_total, 5);

    let snap = engine.get_snapshot(op, day("2026-08-20")).unwrap();
    assert_eq!(snap.count, 5);
    assert_eq!(snap.first_hit, Some(ts("2026-08-20 09:05:00")));
    assert_eq!(snap.last_hit, Some(ts("2026-08-20 09:10:00")));
}

#[test]
fn record_hit_rejects_non_positive_amount() {
    let (engine, _db) = open_engine("hit_non_positive");
    let op = engine.add_operator("OP-1", "Sari").unwrap();

    let err = engine
        .record_hit_at(op, 0, ts("2026-08-20 09:00:00"))
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));

    let err = engine
        .record_hit_at(op, -4, ts("2026-08-20 09:00:00"))
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));
}

#[test]
fn record_hit_rejects_future_timestamps() {
    let (engine, _db) = open_engine("hit_future_ts");
    let op = engine.add_operator("OP-1", "Sari").unwrap();

    let far_future = chrono::Local::now().naive_local() + chrono::Duration::minutes(10);
    let err = engine.record_hit_at(op, 1, far_future).unwrap_err();
    assert!(matches!(err, AppError::InvalidTimestamp(_)));
}

#[test]
fn failed_mutation_leaves_both_stores_untouched() {
    let (engine, db_path) = open_engine("atomicity");
    engine.add_operator("OP-1", "Sari").unwrap();

    let err = engine
        .record_hit_at(999, 3, ts("2026-08-20 09:00:00"))
        .unwrap_err();
    assert!(matches!(err, AppError::OperatorNotFound(999)));

    let before = engine.last_changed_at().unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let hits: i64 = conn
        .query_row("SELECT COUNT(*) FROM hit_log", [], |r| r.get(0))
        .unwrap();
    let counters: i64 = conn
        .query_row("SELECT COUNT(*) FROM daily_counters", [], |r| r.get(0))
        .unwrap();
    assert_eq!(hits, 0);
    assert_eq!(counters, 0);
    assert_eq!(before, 0); // the gate never advanced either
}

#[test]
fn device_reset_zeroes_counts_but_keeps_assignment_fields() {
    let (engine, _db) = open_engine("device_reset");
    let op = engine.add_operator("OP-7", "Dewi").unwrap();

    let change = AssignmentChange {
        project: Some("Alpha".into()),
        step: Some("Welding".into()),
        part: Some("A-1".into()),
        status: Some(WorkStatus::OnProgress),
        ..Default::default()
    };
    let ctx_id = engine
        .apply_assignment_change_at(op, &change, ts("2026-08-20 08:00:00"))
        .unwrap();

    engine.record_hit_at(op, 4, ts("2026-08-20 09:00:00")).unwrap();
    let outcome = engine
        .record_device_reset_at(op, "device reset", ts("2026-08-20 09:30:00"))
        .unwrap();
    assert_eq!(outcome.previous_total, 4);
    assert_eq!(outcome.ctx_id, ctx_id);

    let snap = engine.get_snapshot(op, day("2026-08-20")).unwrap();
    assert_eq!(snap.count, 0);
    assert_eq!(snap.first_hit, None);
    assert_eq!(snap.last_hit, None);
    assert_eq!(snap.step, "Welding");
    assert_eq!(snap.part, "A-1");
}

#[test]
fn counts_never_go_negative() {
    let (engine, _db) = open_engine("non_negative");
    let op = engine.add_operator("OP-7", "Dewi").unwrap();

    engine.record_hit_at(op, 5, ts("2026-08-20 09:00:00")).unwrap();
    let r1 = engine
        .record_device_reset_at(op, "first", ts("2026-08-20 09:10:00"))
        .unwrap();
    assert_eq!(r1.previous_total, 5);

    // resetting an already-zeroed day stays at zero
    let r2 = engine
        .record_device_reset_at(op, "second", ts("2026-08-20 09:11:00"))
        .unwrap();
    assert_eq!(r2.previous_total, 0);
    assert_eq!(engine.get_snapshot(op, day("2026-08-20")).unwrap().count, 0);

    engine.record_hit_at(op, 2, ts("2026-08-20 09:20:00")).unwrap();
    assert_eq!(engine.get_snapshot(op, day("2026-08-20")).unwrap().count, 2);
}

#[test]
fn assignment_change_closes_the_previous_context() {
    let (engine, db_path) = open_engine("close_previous");
    let op = engine.add_operator("OP-7", "Dewi").unwrap();

    let first = engine
        .apply_assignment_change_at(
            op,
            &AssignmentChange {
                project: Some("Alpha".into()),
                status: Some(WorkStatus::OnProgress),
                ..Default::default()
            },
            ts("2026-08-20 08:00:00"),
        )
        .unwrap();
    let second = engine
        .apply_assignment_change_at(
            op,
            &AssignmentChange {
                project: Some("Beta".into()),
                status: Some(WorkStatus::OnProgress),
                ..Default::default()
            },
            ts("2026-08-20 11:00:00"),
        )
        .unwrap();
    assert_ne!(first, second);

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let open: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM context_log WHERE status <> 'complete'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    let total: i64 = conn
        .query_row("SELECT COUNT(*) FROM context_log", [], |r| r.get(0))
        .unwrap();
    assert_eq!(open, 1);
    assert_eq!(total, 2);

    let first_status: String = conn
        .query_row(
            "SELECT status FROM context_log WHERE id = ?1",
            [first],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(first_status, "complete");
}

#[test]
fn assignment_change_updates_operator_master_project() {
    let (engine, db_path) = open_engine("master_update");
    let op = engine.add_operator("OP-7", "Dewi").unwrap();

    engine
        .apply_assignment_change_at(
            op,
            &AssignmentChange {
                project: Some("Gamma".into()),
                department: Some("Paint".into()),
                ..Default::default()
            },
            ts("2026-08-20 08:00:00"),
        )
        .unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let (project, department): (String, String) = conn
        .query_row(
            "SELECT project, department FROM operators WHERE id = ?1",
            [op],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(project, "Gamma");
    assert_eq!(department, "Paint");
}

#[test]
fn first_change_of_day_synthesizes_prior_context() {
    // Scenario: hits exist before any context; the first assignment change
    // must retroactively cover them with a completed context.
    let (engine, db_path) = open_engine("retro_synthesis");
    let op = engine.add_operator("OP-7", "Dewi").unwrap();

    engine.record_hit_at(op, 4, ts("2026-08-20 08:00:00")).unwrap();
    engine
        .apply_assignment_change_at(
            op,
            &AssignmentChange {
                project: Some("Beta".into()),
                status: Some(WorkStatus::OnProgress),
                ..Default::default()
            },
            ts("2026-08-20 10:00:00"),
        )
        .unwrap();

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let (synth_status, synth_at): (String, String) = conn
        .query_row(
            "SELECT status, created_at FROM context_log ORDER BY created_at ASC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(synth_status, "complete");
    assert_eq!(synth_at, "2026-08-20 08:00:00"); // pinned to the first hit

    let rows = engine.get_report(day("2026-08-20")).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].segment.qty, 4);
    assert_eq!(rows[1].segment.project, "Beta");
    assert_eq!(rows[1].segment.qty, 0);
}

#[test]
fn operator_without_events_yields_no_report_rows() {
    let (engine, _db) = open_engine("no_events_no_rows");
    engine.add_operator("OP-7", "Dewi").unwrap();

    let rows = engine.get_report(day("2026-08-20")).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn report_matches_reset_semantics_end_to_end() {
    let (engine, _db) = open_engine("report_reset");
    let op = engine.add_operator("OP-7", "Dewi").unwrap();

    engine
        .apply_assignment_change_at(
            op,
            &AssignmentChange {
                project: Some("Alpha".into()),
                status: Some(WorkStatus::OnProgress),
                ..Default::default()
            },
            ts("2026-08-20 09:00:00"),
        )
        .unwrap();
    engine.record_hit_at(op, 3, ts("2026-08-20 09:05:00")).unwrap();
    engine.record_hit_at(op, 2, ts("2026-08-20 09:10:00")).unwrap();
    engine
        .record_device_reset_at(op, "device reset", ts("2026-08-20 09:12:00"))
        .unwrap();
    engine.record_hit_at(op, 5, ts("2026-08-20 09:15:00")).unwrap();

    let rows = engine.get_report(day("2026-08-20")).unwrap();
    assert_eq!(rows.len(), 1);

    let seg = &rows[0].segment;
    assert_eq!(seg.project, "Alpha");
    assert_eq!(seg.qty, 5);
    assert_eq!(seg.start_time, Some(ts("2026-08-20 09:15:00")));
    assert_eq!(seg.end_time, Some(ts("2026-08-20 09:15:00")));

    // the live snapshot agrees with the reconstructed segment
    assert_eq!(engine.get_snapshot(op, day("2026-08-20")).unwrap().count, 5);
}

#[test]
fn projection_is_idempotent() {
    let (engine, _db) = open_engine("idempotent_projection");
    let op = engine.add_operator("OP-7", "Dewi").unwrap();

    engine
        .apply_assignment_change_at(
            op,
            &AssignmentChange {
                project: Some("Alpha".into()),
                ..Default::default()
            },
            ts("2026-08-20 09:00:00"),
        )
        .unwrap();
    engine.record_hit_at(op, 3, ts("2026-08-20 10:00:00")).unwrap();
    engine
        .record_device_reset_at(op, "device reset", ts("2026-08-20 10:30:00"))
        .unwrap();

    let first = serde_json::to_value(engine.get_report(day("2026-08-20")).unwrap()).unwrap();
    let second = serde_json::to_value(engine.get_report(day("2026-08-20")).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn report_is_ordered_by_operator_then_start() {
    let (engine, _db) = open_engine("report_order");
    let op_a = engine.add_operator("OP-1", "Sari").unwrap();
    let op_b = engine.add_operator("OP-2", "Budi").unwrap();

    engine.record_hit_at(op_b, 2, ts("2026-08-20 08:00:00")).unwrap();
    engine.record_hit_at(op_a, 1, ts("2026-08-20 09:00:00")).unwrap();
    engine
        .apply_assignment_change_at(
            op_a,
            &AssignmentChange {
                project: Some("Beta".into()),
                ..Default::default()
            },
            ts("2026-08-20 10:00:00"),
        )
        .unwrap();

    let rows = engine.get_report(day("2026-08-20")).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].segment.operator_id, op_a);
    assert_eq!(rows[1].segment.operator_id, op_a);
    // op_a's retroactive segment precedes the newly opened one
    assert!(rows[0].segment.ctx_id < rows[1].segment.ctx_id);
    assert_eq!(rows[0].segment.qty, 1);
    assert_eq!(rows[2].segment.operator_id, op_b);
}

#[test]
fn snapshot_lookup_reports_missing_data_distinctly() {
    let (engine, _db) = open_engine("snapshot_not_found");
    let op = engine.add_operator("OP-7", "Dewi").unwrap();

    let err = engine.get_snapshot(op, day("2026-08-20")).unwrap_err();
    assert!(matches!(err, AppError::SnapshotNotFound { .. }));

    let err = engine.get_snapshot(999, day("2026-08-20")).unwrap_err();
    assert!(matches!(err, AppError::OperatorNotFound(999)));
}

#[test]
fn every_mutation_advances_the_gate_monotonically() {
    let (engine, _db) = open_engine("gate_monotonic");
    let op = engine.add_operator("OP-7", "Dewi").unwrap();

    let mut seen = vec![engine.last_changed_at().unwrap()];

    engine.record_hit_at(op, 1, ts("2026-08-20 09:00:00")).unwrap();
    seen.push(engine.last_changed_at().unwrap());

    engine
        .apply_assignment_change_at(
            op,
            &AssignmentChange {
                project: Some("Alpha".into()),
                ..Default::default()
            },
            ts("2026-08-20 09:05:00"),
        )
        .unwrap();
    seen.push(engine.last_changed_at().unwrap());

    engine
        .record_device_reset_at(op, "device reset", ts("2026-08-20 09:10:00"))
        .unwrap();
    seen.push(engine.last_changed_at().unwrap());

    for pair in seen.windows(2) {
        assert!(pair[0] < pair[1], "gate must strictly advance: {seen:?}");
    }
}

#[test]
fn bulk_reset_only_touches_operators_with_counts() {
    let (engine, db_path) = open_engine("bulk_reset");
    let op_a = engine.add_operator("OP-1", "Sari").unwrap();
    let op_b = engine.add_operator("OP-2", "Budi").unwrap();

    engine.record_hit(op_a, 6).unwrap();

    let outcomes = engine.reset_all_today("bulk-reset").unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0, op_a);
    assert_eq!(outcomes[0].1.previous_total, 6);

    let today = chrono::Local::now().date_naive();
    assert_eq!(engine.get_snapshot(op_a, today).unwrap().count, 0);

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let resets_b: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM device_reset_log WHERE operator_id = ?1",
            [op_b],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(resets_b, 0);
}
