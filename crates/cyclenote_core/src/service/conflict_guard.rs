//! Start-date conflict detection.
//!
//! # Invariants
//! - A candidate conflicts with any visible record of the same subject whose
//!   start lies within `conflict_window_days` on either side (inclusive).
//! - The record being edited never conflicts with itself.

use crate::config::{ConflictScope, CycleConfig};
use crate::model::record::{IntervalRecord, RecordId, SubjectId};
use crate::repo::record_repo::{CycleRecordRepository, RepoResult};
use chrono::{Days, NaiveDate};

/// Returns the nearest blocking record for `start_date`, if any.
pub fn find_conflict<R>(
    repo: &R,
    config: &CycleConfig,
    subject_id: SubjectId,
    start_date: NaiveDate,
    exclude: Option<RecordId>,
) -> RepoResult<Option<IntervalRecord>>
where
    R: CycleRecordRepository + ?Sized,
{
    let window = Days::new(config.conflict_window_days.unsigned_abs());
    let from = start_date.checked_sub_days(window).unwrap_or(NaiveDate::MIN);
    let to = start_date.checked_add_days(window).unwrap_or(NaiveDate::MAX);

    let nearest = repo
        .list_in_range(subject_id, from, to)?
        .into_iter()
        .filter(|record| Some(record.id) != exclude)
        .filter(|record| match config.conflict_scope {
            ConflictScope::AllRecords => true,
            ConflictScope::ActualOnly => record.is_actual(),
        })
        .min_by_key(|record| (record.start_date - start_date).num_days().abs());

    Ok(nearest)
}
