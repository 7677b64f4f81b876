use chrono::NaiveDate;
use cyclenote_core::db::open_db_in_memory;
use cyclenote_core::{
    ConflictScope, CycleConfig, CycleService, CycleServiceError, FixedClock, IntervalRecord,
    RecordFilter, SubjectContext,
};
use rusqlite::Connection;
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn service_with(conn: &Connection, config: CycleConfig) -> CycleService<'_, FixedClock> {
    CycleService::try_with_clock(conn, config, FixedClock::at_date(date(2024, 2, 10))).unwrap()
}

fn service(conn: &Connection) -> CycleService<'_, FixedClock> {
    service_with(conn, CycleConfig::default())
}

fn subject() -> SubjectContext {
    SubjectContext::new(Uuid::new_v4(), Some(Uuid::new_v4()))
}

fn forecasts(
    service: &CycleService<'_, FixedClock>,
    ctx: &SubjectContext,
) -> Vec<IntervalRecord> {
    let mut records = service
        .list_records(ctx, &RecordFilter::predicted())
        .unwrap();
    records.reverse();
    records
}

fn forecast_shape(records: &[IntervalRecord]) -> Vec<(NaiveDate, Option<NaiveDate>, Option<i64>)> {
    records
        .iter()
        .map(|record| (record.start_date, record.end_date, record.cycle_length))
        .collect()
}

fn seed_two_cycles(service: &CycleService<'_, FixedClock>, ctx: &SubjectContext) {
    service
        .create_record(ctx, date(2024, 1, 1), Some(date(2024, 1, 5)))
        .unwrap();
    service
        .create_record(ctx, date(2024, 1, 29), Some(date(2024, 2, 2)))
        .unwrap();
}

#[test]
fn completed_history_yields_three_chained_forecasts() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ctx = subject();
    seed_two_cycles(&service, &ctx);

    let chain = forecasts(&service, &ctx);
    assert_eq!(
        forecast_shape(&chain),
        vec![
            (date(2024, 2, 26), Some(date(2024, 3, 1)), Some(28)),
            (date(2024, 3, 25), Some(date(2024, 3, 29)), Some(28)),
            (date(2024, 4, 22), Some(date(2024, 4, 26)), Some(28)),
        ]
    );
    assert!(chain.iter().all(|record| record.is_predicted));
    assert!(chain
        .iter()
        .all(|record| record.subject_id == ctx.subject_id && record.group_id == ctx.group_id));
}

#[test]
fn regenerate_twice_yields_identical_forecast_sets() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ctx = subject();
    seed_two_cycles(&service, &ctx);

    let first = service.regenerate_predictions(&ctx).unwrap();
    let second = service.regenerate_predictions(&ctx).unwrap();

    assert_eq!(first.cleared, 3);
    assert_eq!(second.cleared, 3);
    assert_eq!(
        forecast_shape(&first.generated),
        forecast_shape(&second.generated)
    );
    assert_eq!(forecast_shape(&forecasts(&service, &ctx)), forecast_shape(&second.generated));
}

#[test]
fn regenerate_without_history_is_a_no_op() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ctx = subject();

    let report = service.regenerate_predictions(&ctx).unwrap();
    assert_eq!(report.cleared, 0);
    assert!(report.generated.is_empty());
}

#[test]
fn ongoing_record_does_not_touch_forecasts() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ctx = subject();
    seed_two_cycles(&service, &ctx);
    let before = forecasts(&service, &ctx);

    service.create_record(&ctx, date(2024, 6, 1), None).unwrap();

    assert_eq!(forecasts(&service, &ctx), before);
}

#[test]
fn deleting_latest_record_clears_forecasts_when_history_runs_out() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ctx = subject();
    seed_two_cycles(&service, &ctx);

    let latest = service
        .list_records(&ctx, &RecordFilter::actual())
        .unwrap()
        .remove(0);
    service.delete_record(&ctx, latest.id).unwrap();

    assert!(forecasts(&service, &ctx).is_empty());
    assert!(!service.get_prediction(&ctx).unwrap().can_predict());
}

#[test]
fn deleting_latest_record_rebuilds_from_remaining_history() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ctx = subject();

    // Newest first, so no forecast ever sits near the next entry.
    service
        .create_record(&ctx, date(2024, 2, 26), Some(date(2024, 3, 1)))
        .unwrap();
    service
        .create_record(&ctx, date(2024, 1, 29), Some(date(2024, 2, 2)))
        .unwrap();
    service
        .create_record(&ctx, date(2024, 1, 1), Some(date(2024, 1, 5)))
        .unwrap();
    assert_eq!(forecasts(&service, &ctx)[0].start_date, date(2024, 3, 25));

    let latest = service
        .list_records(&ctx, &RecordFilter::actual())
        .unwrap()
        .remove(0);
    assert_eq!(latest.start_date, date(2024, 2, 26));
    service.delete_record(&ctx, latest.id).unwrap();

    let chain = forecasts(&service, &ctx);
    assert_eq!(chain.len(), 3);
    assert_eq!(chain[0].start_date, date(2024, 2, 26));
    assert_eq!(chain[2].start_date, date(2024, 4, 22));
}

#[test]
fn completing_and_reopening_a_record_rebuilds_forecasts() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ctx = subject();

    service
        .create_record(&ctx, date(2024, 1, 1), Some(date(2024, 1, 5)))
        .unwrap();
    let ongoing = service.create_record(&ctx, date(2024, 1, 29), None).unwrap();
    assert!(forecasts(&service, &ctx).is_empty());

    service
        .update_record(&ctx, ongoing.id, date(2024, 1, 29), Some(date(2024, 2, 2)))
        .unwrap();
    assert_eq!(forecasts(&service, &ctx).len(), 3);

    service
        .update_record(&ctx, ongoing.id, date(2024, 1, 29), None)
        .unwrap();
    assert!(forecasts(&service, &ctx).is_empty());
}

#[test]
fn forecasts_block_nearby_entries_by_default() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ctx = subject();
    seed_two_cycles(&service, &ctx);
    let first_forecast = forecasts(&service, &ctx).remove(0);

    let err = service
        .create_record(&ctx, date(2024, 2, 27), Some(date(2024, 3, 2)))
        .unwrap_err();
    assert!(
        matches!(err, CycleServiceError::Conflict { existing, .. } if existing == first_forecast.id)
    );
}

#[test]
fn actual_only_scope_lets_entries_replace_forecasts() {
    let conn = open_db_in_memory().unwrap();
    let config = CycleConfig {
        conflict_scope: ConflictScope::ActualOnly,
        ..CycleConfig::default()
    };
    let service = service_with(&conn, config);
    let ctx = subject();
    seed_two_cycles(&service, &ctx);

    let third = service
        .create_record(&ctx, date(2024, 2, 27), Some(date(2024, 3, 2)))
        .unwrap();
    assert_eq!(third.cycle_length, Some(29));

    // intervals 29 and 28 average to 28.5, rounded up
    let chain = forecasts(&service, &ctx);
    assert_eq!(chain.len(), 3);
    assert_eq!(chain[0].start_date, date(2024, 3, 27));
    assert_eq!(chain[0].cycle_length, Some(29));
}

#[test]
fn out_of_range_averages_leave_no_forecasts_but_still_predict() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ctx = subject();

    service
        .create_record(&ctx, date(2024, 1, 1), Some(date(2024, 1, 5)))
        .unwrap();
    service
        .create_record(&ctx, date(2024, 3, 1), Some(date(2024, 3, 5)))
        .unwrap();

    assert!(forecasts(&service, &ctx).is_empty());
    let prediction = service.get_prediction(&ctx).unwrap();
    let summary = prediction.summary().expect("two completed records");
    assert_eq!(summary.average_cycle_length, 60);
}

#[test]
fn history_window_limits_analysed_records() {
    let conn = open_db_in_memory().unwrap();
    let config = CycleConfig {
        history_window: 2,
        conflict_scope: ConflictScope::ActualOnly,
        ..CycleConfig::default()
    };
    let service = service_with(&conn, config);
    let ctx = subject();

    service
        .create_record(&ctx, date(2024, 1, 1), Some(date(2024, 1, 5)))
        .unwrap();
    service
        .create_record(&ctx, date(2024, 1, 23), Some(date(2024, 1, 27)))
        .unwrap();
    service
        .create_record(&ctx, date(2024, 2, 23), Some(date(2024, 2, 27)))
        .unwrap();

    let prediction = service.get_prediction(&ctx).unwrap();
    let summary = prediction.summary().expect("enough history");
    assert_eq!(summary.average_cycle_length, 31);
    assert_eq!(summary.based_on_cycles, 1);
}

#[test]
fn forecasts_of_one_subject_leave_others_untouched() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let first = subject();
    let second = subject();
    seed_two_cycles(&service, &first);
    seed_two_cycles(&service, &second);
    let second_before = forecasts(&service, &second);

    service.regenerate_predictions(&first).unwrap();

    assert_eq!(forecasts(&service, &second), second_before);
    assert_eq!(forecasts(&service, &first).len(), 3);
}

#[test]
fn failed_rebuild_keeps_previous_forecasts_and_still_commits_the_write() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let ctx = subject();
    seed_two_cycles(&service, &ctx);
    let before = forecasts(&service, &ctx);

    conn.execute_batch(
        "CREATE TRIGGER reject_forecast_inserts
         BEFORE INSERT ON interval_records
         WHEN NEW.is_predicted = 1
         BEGIN
             SELECT RAISE(ABORT, 'forecast writes disabled');
         END;",
    )
    .unwrap();

    let created = service
        .create_record(&ctx, date(2024, 6, 1), Some(date(2024, 6, 5)))
        .unwrap();

    let actual = service.list_records(&ctx, &RecordFilter::actual()).unwrap();
    assert_eq!(actual.len(), 3);
    assert_eq!(actual[0].id, created.id);
    assert_eq!(forecasts(&service, &ctx), before);
}
