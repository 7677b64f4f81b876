//! Cycle recording and prediction use-case service.
//!
//! # Responsibility
//! - Provide the create/update/delete/list/predict entry points for callers.
//! - Own transaction boundaries so a write and its forecast rebuild land
//!   together.
//!
//! # Invariants
//! - Validation and conflict checks run before any store write.
//! - User-facing writes only ever touch actual records.
//! - Forecast rebuilds triggered by a write never fail that write; a failed
//!   rebuild rolls back to the previous forecasts.
//! - Readers never observe the gap between clearing and rebuilding forecasts.

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, CycleConfig};
use crate::cycle::predictor::{Prediction, PredictionSummary};
use crate::model::record::{
    validate_interval, GroupId, IntervalRecord, RecordId, SubjectContext, SubjectId,
    ValidationError,
};
use crate::repo::record_repo::{
    CycleRecordRepository, RecordFilter, RepoError, RepoResult, SqliteCycleRecordRepository,
};
use crate::service::conflict_guard::find_conflict;
use crate::service::forecast::{ForecastManager, RegenerationReport};
use chrono::{Days, NaiveDate};
use log::{debug, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for cycle use-cases.
#[derive(Debug)]
pub enum CycleServiceError {
    /// Candidate dates break a record rule.
    Validation(ValidationError),
    /// Another record starts too close to the candidate start date.
    Conflict {
        existing: RecordId,
        existing_start: NaiveDate,
    },
    /// Unknown record, a forecast, or a record owned by someone else.
    NotFound(RecordId),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for CycleServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "invalid interval: {err}"),
            Self::Conflict {
                existing,
                existing_start,
            } => write!(
                f,
                "record {existing} starting {existing_start} is too close to the requested start date"
            ),
            Self::NotFound(id) => write!(f, "interval record not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CycleServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CycleServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound(id) => Self::NotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<ValidationError> for CycleServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<rusqlite::Error> for CycleServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

pub type CycleServiceResult<T> = Result<T, CycleServiceError>;

/// Record counts for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleStatistics {
    pub total_actual_records: u64,
    pub total_predicted_records: u64,
    pub can_predict: bool,
    /// Start of the newest actual record.
    pub last_record_date: Option<NaiveDate>,
}

/// Cycle use-case facade over one SQLite connection.
pub struct CycleService<'conn, C: Clock = SystemClock> {
    conn: &'conn Connection,
    config: CycleConfig,
    clock: C,
}

impl<'conn> CycleService<'conn, SystemClock> {
    /// Creates a service reading the system clock.
    pub fn try_new(conn: &'conn Connection, config: CycleConfig) -> Result<Self, ConfigError> {
        Self::try_with_clock(conn, config, SystemClock)
    }
}

impl<'conn, C: Clock> CycleService<'conn, C> {
    pub fn try_with_clock(
        conn: &'conn Connection,
        config: CycleConfig,
        clock: C,
    ) -> Result<Self, ConfigError> {
        config.check()?;
        Ok(Self {
            conn,
            config,
            clock,
        })
    }

    /// Records a new actual interval.
    ///
    /// # Contract
    /// - Rejects invalid dates with `Validation` and nearby starts with
    ///   `Conflict`; nothing is written in either case.
    /// - Rebuilds forecasts when the new record is completed.
    pub fn create_record(
        &self,
        ctx: &SubjectContext,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> CycleServiceResult<IntervalRecord> {
        validate_interval(start_date, end_date, None, &self.config)
            .inspect_err(|err| log_rejected("record_create", ctx.subject_id, err))?;

        let mut tx = self.begin()?;
        let saved = {
            let repo = self.repo_on(&tx);
            self.ensure_no_conflict(&repo, "record_create", ctx.subject_id, start_date, None)?;

            let mut record = IntervalRecord::new_actual(ctx, start_date, end_date);
            record.cycle_length =
                self.derive_cycle_length(&repo, ctx.subject_id, start_date, None)?;
            repo.save_record(&record)?
        };

        if saved.is_completed() {
            self.regenerate_after_write(&mut tx, ctx, "record_create");
        }
        tx.commit()?;

        info!(
            "event=record_create module=service status=ok subject_id={} record_id={} completed={}",
            ctx.subject_id,
            saved.id,
            saved.is_completed()
        );
        Ok(saved)
    }

    /// Replaces the dates of an existing actual record.
    ///
    /// # Contract
    /// - Forecast ids and other subjects' ids report `NotFound`.
    /// - The conflict check runs only when the start date moves.
    /// - Rebuilds forecasts when the record was or becomes completed.
    pub fn update_record(
        &self,
        ctx: &SubjectContext,
        record_id: RecordId,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> CycleServiceResult<IntervalRecord> {
        validate_interval(start_date, end_date, None, &self.config)
            .inspect_err(|err| log_rejected("record_update", ctx.subject_id, err))?;

        let mut tx = self.begin()?;
        let (was_completed, saved) = {
            let repo = self.repo_on(&tx);
            let existing = find_actual(&repo, ctx.subject_id, record_id)?;

            if existing.start_date != start_date {
                self.ensure_no_conflict(
                    &repo,
                    "record_update",
                    ctx.subject_id,
                    start_date,
                    Some(record_id),
                )?;
            }

            let mut updated = existing.clone();
            updated.start_date = start_date;
            updated.end_date = end_date;
            updated.cycle_length =
                self.derive_cycle_length(&repo, ctx.subject_id, start_date, Some(record_id))?;
            (existing.is_completed(), repo.save_record(&updated)?)
        };

        if was_completed || saved.is_completed() {
            self.regenerate_after_write(&mut tx, ctx, "record_update");
        }
        tx.commit()?;

        info!(
            "event=record_update module=service status=ok subject_id={} record_id={} completed={}",
            ctx.subject_id,
            saved.id,
            saved.is_completed()
        );
        Ok(saved)
    }

    /// Soft-deletes an actual record.
    pub fn delete_record(&self, ctx: &SubjectContext, record_id: RecordId) -> CycleServiceResult<()> {
        let mut tx = self.begin()?;
        let existing = {
            let repo = self.repo_on(&tx);
            let existing = find_actual(&repo, ctx.subject_id, record_id)?;
            repo.soft_delete_many(&[record_id])?;
            existing
        };

        if existing.is_completed() {
            self.regenerate_after_write(&mut tx, ctx, "record_delete");
        }
        tx.commit()?;

        info!(
            "event=record_delete module=service status=ok subject_id={} record_id={}",
            ctx.subject_id, record_id
        );
        Ok(())
    }

    /// Lists the subject's visible records, newest start first.
    pub fn list_records(
        &self,
        ctx: &SubjectContext,
        filter: &RecordFilter,
    ) -> CycleServiceResult<Vec<IntervalRecord>> {
        Ok(self.repo_on(self.conn).list_by_subject(ctx.subject_id, filter)?)
    }

    /// Lists records shared with `group_id`, for partner read access.
    pub fn list_group_records(
        &self,
        group_id: GroupId,
        filter: &RecordFilter,
    ) -> CycleServiceResult<Vec<IntervalRecord>> {
        Ok(self.repo_on(self.conn).list_by_group(group_id, filter)?)
    }

    /// Predicts the next onset from recent completed history.
    ///
    /// Missing history is reported as `Prediction::Insufficient`, not an error.
    pub fn get_prediction(&self, ctx: &SubjectContext) -> CycleServiceResult<Prediction> {
        let repo = self.repo_on(self.conn);
        let history = ForecastManager::new(&self.config).forecast(&repo, ctx.subject_id)?;

        let prediction = match history.forecast {
            Some(forecast) => Prediction::Available(PredictionSummary::from_forecast(
                &forecast,
                self.clock.today(),
            )),
            None => Prediction::Insufficient {
                completed_records: history.completed_records as u64,
            },
        };

        debug!(
            "event=prediction_get module=service status=ok subject_id={} can_predict={} completed_records={}",
            ctx.subject_id,
            prediction.can_predict(),
            history.completed_records
        );
        Ok(prediction)
    }

    /// Rebuilds the subject's forecasts from scratch.
    ///
    /// Idempotent: repeated calls without an intervening write produce the
    /// same forecast dates. Store failures surface to the caller and leave
    /// the previous forecasts in place.
    pub fn regenerate_predictions(
        &self,
        ctx: &SubjectContext,
    ) -> CycleServiceResult<RegenerationReport> {
        let tx = self.begin()?;
        let report = {
            let repo = self.repo_on(&tx);
            ForecastManager::new(&self.config).regenerate(&repo, ctx)?
        };
        tx.commit()?;

        log_regenerated("manual", ctx.subject_id, &report);
        Ok(report)
    }

    /// Summarises how much history the subject has.
    pub fn get_statistics(&self, ctx: &SubjectContext) -> CycleServiceResult<CycleStatistics> {
        let repo = self.repo_on(self.conn);
        let last_record_date = repo
            .list_by_subject(ctx.subject_id, &RecordFilter::actual())?
            .first()
            .map(|record| record.start_date);

        Ok(CycleStatistics {
            total_actual_records: repo.count_records(ctx.subject_id, Some(false))?,
            total_predicted_records: repo.count_records(ctx.subject_id, Some(true))?,
            can_predict: repo.list_recent_completed(ctx.subject_id, 2)?.len() >= 2,
            last_record_date,
        })
    }

    fn begin(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    fn repo_on<'a>(&'a self, conn: &'a Connection) -> SqliteCycleRecordRepository<'a> {
        SqliteCycleRecordRepository::with_parts(conn, &self.config, &self.clock)
    }

    fn ensure_no_conflict<R: CycleRecordRepository>(
        &self,
        repo: &R,
        event: &'static str,
        subject_id: SubjectId,
        start_date: NaiveDate,
        exclude: Option<RecordId>,
    ) -> CycleServiceResult<()> {
        let Some(existing) = find_conflict(repo, &self.config, subject_id, start_date, exclude)?
        else {
            return Ok(());
        };
        let err = CycleServiceError::Conflict {
            existing: existing.id,
            existing_start: existing.start_date,
        };
        log_rejected(event, subject_id, &err);
        Err(err)
    }

    /// Days since the nearest older actual start, or `None` when there is
    /// no such record or the gap is outside the cycle-length bounds.
    fn derive_cycle_length<R: CycleRecordRepository>(
        &self,
        repo: &R,
        subject_id: SubjectId,
        start_date: NaiveDate,
        exclude: Option<RecordId>,
    ) -> RepoResult<Option<i64>> {
        let Some(day_before) = start_date.checked_sub_days(Days::new(1)) else {
            return Ok(None);
        };
        let filter = RecordFilter {
            start_to: Some(day_before),
            ..RecordFilter::actual()
        };
        let previous = repo
            .list_by_subject(subject_id, &filter)?
            .into_iter()
            .find(|record| Some(record.id) != exclude);

        let Some(previous) = previous else {
            return Ok(None);
        };
        let gap = (start_date - previous.start_date).num_days();
        if self.config.cycle_length_in_range(gap) {
            Ok(Some(gap))
        } else {
            debug!(
                "event=cycle_length_derive module=service status=skipped subject_id={subject_id} gap_days={gap}"
            );
            Ok(None)
        }
    }

    /// Rebuilds forecasts inside a savepoint of the write's transaction.
    fn regenerate_after_write(
        &self,
        tx: &mut Transaction<'conn>,
        ctx: &SubjectContext,
        trigger: &'static str,
    ) {
        match self.try_regenerate_in(tx, ctx) {
            Ok(report) => log_regenerated(trigger, ctx.subject_id, &report),
            Err(err) => warn!(
                "event=forecast_regenerate module=service status=error trigger={} subject_id={} error_code=forecast_rebuild_failed error={}",
                trigger, ctx.subject_id, err
            ),
        }
    }

    fn try_regenerate_in(
        &self,
        tx: &mut Transaction<'conn>,
        ctx: &SubjectContext,
    ) -> RepoResult<RegenerationReport> {
        let savepoint = tx.savepoint()?;
        let report = {
            let repo = self.repo_on(&savepoint);
            ForecastManager::new(&self.config).regenerate(&repo, ctx)?
        };
        savepoint.commit()?;
        Ok(report)
    }
}

fn find_actual<R: CycleRecordRepository>(
    repo: &R,
    subject_id: SubjectId,
    record_id: RecordId,
) -> CycleServiceResult<IntervalRecord> {
    repo.get_record(subject_id, record_id)?
        .filter(IntervalRecord::is_actual)
        .ok_or(CycleServiceError::NotFound(record_id))
}

fn log_rejected(event: &'static str, subject_id: SubjectId, err: &dyn Display) {
    warn!("event={event} module=service status=rejected subject_id={subject_id} reason={err}");
}

fn log_regenerated(trigger: &'static str, subject_id: SubjectId, report: &RegenerationReport) {
    info!(
        "event=forecast_regenerate module=service status=ok trigger={} subject_id={} cleared={} generated={}",
        trigger,
        subject_id,
        report.cleared,
        report.generated.len()
    );
}
