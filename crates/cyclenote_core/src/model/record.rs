//! Interval record domain model.
//!
//! # Responsibility
//! - Define the canonical record for both user-entered and forecasted intervals.
//! - Validate the date and cycle-length rules of a single record.
//!
//! # Invariants
//! - `id` is stable and never reused for another record.
//! - `is_deleted` is the source of truth for tombstone state.
//! - `end_date` is never earlier than `start_date` when set.
//! - Completed records have a duration inside the configured bounds.

use crate::config::CycleConfig;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one interval record.
pub type RecordId = Uuid;

/// Identifier of the tracked individual, verified by the access layer.
pub type SubjectId = Uuid;

/// Identifier of a sharing scope (e.g. a partner) with read access.
pub type GroupId = Uuid;

/// Caller identity handed in by the access-control layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectContext {
    pub subject_id: SubjectId,
    /// Sharing scope stamped on every record the subject writes.
    pub group_id: Option<GroupId>,
}

impl SubjectContext {
    pub fn new(subject_id: SubjectId, group_id: Option<GroupId>) -> Self {
        Self {
            subject_id,
            group_id,
        }
    }
}

/// Which structural rule a record breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// `end_date` lies before `start_date`.
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    /// Inclusive day count of a completed record is out of bounds.
    DurationOutOfRange { duration: i64 },
    /// Days since the previous start are out of bounds.
    CycleLengthOutOfRange { cycle_length: i64 },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndBeforeStart { start, end } => {
                write!(f, "end date {end} is earlier than start date {start}")
            }
            Self::DurationOutOfRange { duration } => {
                write!(f, "interval duration of {duration} days is out of range")
            }
            Self::CycleLengthOutOfRange { cycle_length } => {
                write!(f, "cycle length of {cycle_length} days is out of range")
            }
        }
    }
}

impl Error for ValidationError {}

/// One recorded or forecasted interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalRecord {
    pub id: RecordId,
    pub subject_id: SubjectId,
    pub group_id: Option<GroupId>,
    pub start_date: NaiveDate,
    /// `None` while the interval is ongoing.
    pub end_date: Option<NaiveDate>,
    /// Days since the previous actual record started.
    pub cycle_length: Option<i64>,
    pub is_predicted: bool,
    /// Soft delete tombstone.
    pub is_deleted: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

impl IntervalRecord {
    /// Creates a user-entered record with a generated stable ID.
    ///
    /// Timestamps start at zero; the repository stamps them on save.
    pub fn new_actual(
        ctx: &SubjectContext,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id: ctx.subject_id,
            group_id: ctx.group_id,
            start_date,
            end_date,
            cycle_length: None,
            is_predicted: false,
            is_deleted: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Creates a forecast record. Forecasts are always completed.
    pub fn new_predicted(
        ctx: &SubjectContext,
        start_date: NaiveDate,
        end_date: NaiveDate,
        cycle_length: i64,
    ) -> Self {
        Self {
            end_date: Some(end_date),
            cycle_length: Some(cycle_length),
            is_predicted: true,
            ..Self::new_actual(ctx, start_date, None)
        }
    }

    /// Inclusive day count, or `None` while ongoing.
    pub fn duration(&self) -> Option<i64> {
        self.end_date.map(|end| inclusive_days(self.start_date, end))
    }

    /// Whether both dates are set.
    pub fn is_completed(&self) -> bool {
        self.end_date.is_some()
    }

    pub fn is_actual(&self) -> bool {
        !self.is_predicted
    }

    /// Checks this record against the structural rules.
    pub fn validate(&self, config: &CycleConfig) -> Result<(), ValidationError> {
        validate_interval(self.start_date, self.end_date, self.cycle_length, config)
    }
}

/// Validates candidate dates and cycle length without building a record.
///
/// Start-only candidates are always structurally valid apart from the
/// optional cycle length.
pub fn validate_interval(
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    cycle_length: Option<i64>,
    config: &CycleConfig,
) -> Result<(), ValidationError> {
    if let Some(end) = end_date {
        if end < start_date {
            return Err(ValidationError::EndBeforeStart {
                start: start_date,
                end,
            });
        }
        let duration = inclusive_days(start_date, end);
        if !config.duration_in_range(duration) {
            return Err(ValidationError::DurationOutOfRange { duration });
        }
    }

    if let Some(cycle_length) = cycle_length {
        if !config.cycle_length_in_range(cycle_length) {
            return Err(ValidationError::CycleLengthOutOfRange { cycle_length });
        }
    }

    Ok(())
}

fn inclusive_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}
