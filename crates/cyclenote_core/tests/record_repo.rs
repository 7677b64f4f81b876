use chrono::NaiveDate;
use cyclenote_core::db::open_db_in_memory;
use cyclenote_core::{
    CycleConfig, CycleRecordRepository, FixedClock, IntervalRecord, RecordFilter, RepoError,
    SqliteCycleRecordRepository, SubjectContext, ValidationError,
};
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn subject() -> SubjectContext {
    SubjectContext::new(Uuid::new_v4(), Some(Uuid::new_v4()))
}

#[test]
fn save_and_get_roundtrip_stamps_timestamps_from_clock() {
    let conn = open_db_in_memory().unwrap();
    let config = CycleConfig::default();
    let clock = FixedClock::from_epoch_ms(1_700_000_000_000);
    let repo = SqliteCycleRecordRepository::with_parts(&conn, &config, &clock);
    let ctx = subject();

    let record = IntervalRecord::new_actual(&ctx, date(2024, 1, 1), Some(date(2024, 1, 5)));
    let saved = repo.save_record(&record).unwrap();
    assert_eq!(saved.created_at, 1_700_000_000_000);
    assert_eq!(saved.updated_at, 1_700_000_000_000);

    let loaded = repo.get_record(ctx.subject_id, record.id).unwrap().unwrap();
    assert_eq!(loaded, saved);
    assert_eq!(loaded.group_id, ctx.group_id);
    assert_eq!(loaded.duration(), Some(5));
}

#[test]
fn save_existing_record_keeps_created_at() {
    let conn = open_db_in_memory().unwrap();
    let config = CycleConfig::default();
    let first_clock = FixedClock::from_epoch_ms(1_000);
    let later_clock = FixedClock::from_epoch_ms(2_000);
    let ctx = subject();

    let saved = SqliteCycleRecordRepository::with_parts(&conn, &config, &first_clock)
        .save_record(&IntervalRecord::new_actual(&ctx, date(2024, 1, 1), None))
        .unwrap();

    let repo = SqliteCycleRecordRepository::with_parts(&conn, &config, &later_clock);
    let mut edited = saved.clone();
    edited.end_date = Some(date(2024, 1, 6));
    let resaved = repo.save_record(&edited).unwrap();
    assert_eq!(resaved.created_at, 1_000);
    assert_eq!(resaved.updated_at, 2_000);

    let loaded = repo.get_record(ctx.subject_id, saved.id).unwrap().unwrap();
    assert_eq!(loaded.end_date, Some(date(2024, 1, 6)));
    assert_eq!(loaded.created_at, 1_000);
}

#[test]
fn validation_failure_blocks_save() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCycleRecordRepository::new(&conn);
    let ctx = subject();

    let too_long = IntervalRecord::new_actual(&ctx, date(2024, 1, 1), Some(date(2024, 1, 20)));
    let err = repo.save_record(&too_long).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::DurationOutOfRange { duration: 20 })
    ));
    assert_eq!(repo.count_records(ctx.subject_id, None).unwrap(), 0);
}

#[test]
fn get_record_is_scoped_to_owner() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCycleRecordRepository::new(&conn);
    let owner = subject();
    let stranger = subject();

    let record = repo
        .save_record(&IntervalRecord::new_actual(&owner, date(2024, 1, 1), None))
        .unwrap();

    assert!(repo.get_record(stranger.subject_id, record.id).unwrap().is_none());
    assert!(repo.get_record(owner.subject_id, record.id).unwrap().is_some());
}

#[test]
fn save_cannot_take_over_another_subjects_record() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCycleRecordRepository::new(&conn);
    let owner = subject();
    let stranger = subject();

    let record = repo
        .save_record(&IntervalRecord::new_actual(&owner, date(2024, 1, 1), None))
        .unwrap();
    let mut hijacked = record.clone();
    hijacked.subject_id = stranger.subject_id;
    hijacked.start_date = date(2024, 1, 2);

    let err = repo.save_record(&hijacked).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == record.id));
    let untouched = repo.get_record(owner.subject_id, record.id).unwrap().unwrap();
    assert_eq!(untouched.start_date, date(2024, 1, 1));
}

#[test]
fn list_by_subject_orders_newest_first_and_applies_filters() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCycleRecordRepository::new(&conn);
    let ctx = subject();

    for start in [date(2024, 1, 1), date(2024, 3, 1), date(2024, 2, 1)] {
        repo.save_record(&IntervalRecord::new_actual(&ctx, start, None))
            .unwrap();
    }
    repo.save_record(&IntervalRecord::new_predicted(
        &ctx,
        date(2024, 4, 1),
        date(2024, 4, 5),
        30,
    ))
    .unwrap();

    let all = repo.list_by_subject(ctx.subject_id, &RecordFilter::default()).unwrap();
    let starts: Vec<_> = all.iter().map(|record| record.start_date).collect();
    assert_eq!(
        starts,
        vec![
            date(2024, 4, 1),
            date(2024, 3, 1),
            date(2024, 2, 1),
            date(2024, 1, 1)
        ]
    );

    let actual = repo.list_by_subject(ctx.subject_id, &RecordFilter::actual()).unwrap();
    assert_eq!(actual.len(), 3);
    assert!(actual.iter().all(IntervalRecord::is_actual));

    let predicted = repo
        .list_by_subject(ctx.subject_id, &RecordFilter::predicted())
        .unwrap();
    assert_eq!(predicted.len(), 1);

    let february_to_march = repo
        .list_by_subject(
            ctx.subject_id,
            &RecordFilter::between(date(2024, 2, 1), date(2024, 3, 1)),
        )
        .unwrap();
    assert_eq!(february_to_march.len(), 2);
}

#[test]
fn list_recent_completed_skips_ongoing_predicted_and_deleted() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCycleRecordRepository::new(&conn);
    let ctx = subject();

    let oldest = repo
        .save_record(&IntervalRecord::new_actual(
            &ctx,
            date(2024, 1, 1),
            Some(date(2024, 1, 5)),
        ))
        .unwrap();
    let middle = repo
        .save_record(&IntervalRecord::new_actual(
            &ctx,
            date(2024, 1, 29),
            Some(date(2024, 2, 2)),
        ))
        .unwrap();
    let deleted = repo
        .save_record(&IntervalRecord::new_actual(
            &ctx,
            date(2024, 2, 26),
            Some(date(2024, 3, 1)),
        ))
        .unwrap();
    repo.save_record(&IntervalRecord::new_actual(&ctx, date(2024, 3, 25), None))
        .unwrap();
    repo.save_record(&IntervalRecord::new_predicted(
        &ctx,
        date(2024, 4, 22),
        date(2024, 4, 26),
        28,
    ))
    .unwrap();
    repo.soft_delete_many(&[deleted.id]).unwrap();

    let completed = repo.list_recent_completed(ctx.subject_id, 6).unwrap();
    let ids: Vec<_> = completed.iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![middle.id, oldest.id]);

    let limited = repo.list_recent_completed(ctx.subject_id, 1).unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, middle.id);
}

#[test]
fn list_in_range_includes_both_bounds() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCycleRecordRepository::new(&conn);
    let ctx = subject();

    for start in [date(2024, 1, 1), date(2024, 1, 8), date(2024, 1, 15), date(2024, 1, 16)] {
        repo.save_record(&IntervalRecord::new_actual(&ctx, start, None))
            .unwrap();
    }

    let hits = repo
        .list_in_range(ctx.subject_id, date(2024, 1, 1), date(2024, 1, 15))
        .unwrap();
    assert_eq!(hits.len(), 3);
}

#[test]
fn soft_delete_many_tombstones_and_counts_only_visible_rows() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCycleRecordRepository::new(&conn);
    let ctx = subject();

    let first = repo
        .save_record(&IntervalRecord::new_actual(&ctx, date(2024, 1, 1), None))
        .unwrap();
    let second = repo
        .save_record(&IntervalRecord::new_actual(&ctx, date(2024, 2, 1), None))
        .unwrap();

    assert_eq!(repo.soft_delete_many(&[]).unwrap(), 0);
    assert_eq!(repo.soft_delete_many(&[first.id, second.id]).unwrap(), 2);
    assert_eq!(repo.soft_delete_many(&[first.id]).unwrap(), 0);

    assert!(repo.get_record(ctx.subject_id, first.id).unwrap().is_none());
    assert_eq!(repo.count_records(ctx.subject_id, None).unwrap(), 0);

    let tombstones: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM interval_records WHERE is_deleted = 1;",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tombstones, 2);
}

#[test]
fn list_by_group_returns_every_member_of_the_group() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCycleRecordRepository::new(&conn);
    let group = Uuid::new_v4();
    let member = SubjectContext::new(Uuid::new_v4(), Some(group));
    let outsider = subject();

    repo.save_record(&IntervalRecord::new_actual(&member, date(2024, 1, 1), None))
        .unwrap();
    repo.save_record(&IntervalRecord::new_actual(&outsider, date(2024, 1, 1), None))
        .unwrap();

    let shared = repo.list_by_group(group, &RecordFilter::default()).unwrap();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].subject_id, member.subject_id);
}

#[test]
fn count_records_splits_actual_and_predicted() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteCycleRecordRepository::new(&conn);
    let ctx = subject();

    repo.save_record(&IntervalRecord::new_actual(&ctx, date(2024, 1, 1), None))
        .unwrap();
    repo.save_record(&IntervalRecord::new_predicted(
        &ctx,
        date(2024, 2, 1),
        date(2024, 2, 5),
        31,
    ))
    .unwrap();

    assert_eq!(repo.count_records(ctx.subject_id, Some(false)).unwrap(), 1);
    assert_eq!(repo.count_records(ctx.subject_id, Some(true)).unwrap(), 1);
    assert_eq!(repo.count_records(ctx.subject_id, None).unwrap(), 2);
}
