//! Forecast maintenance.
//!
//! # Responsibility
//! - Rebuild a subject's forecast records from its completed history.
//! - Share the analyse-then-predict pipeline with read-only prediction calls.
//!
//! # Invariants
//! - Regeneration is invalidate-and-rebuild; forecasts are never patched.
//! - After a successful run the subject has either `forecast_count` chained
//!   forecasts or none at all.
//! - Callers provide the transaction; this module never commits.

use crate::config::CycleConfig;
use crate::cycle::analyzer::analyze;
use crate::cycle::predictor::{predict, CycleForecast};
use crate::model::record::{IntervalRecord, SubjectContext, SubjectId};
use crate::repo::record_repo::{CycleRecordRepository, RecordFilter, RepoResult};
use log::{debug, warn};

/// Forecast derived from the current completed history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryForecast {
    /// Completed actual records inside the history window.
    pub completed_records: usize,
    /// `None` when history is insufficient.
    pub forecast: Option<CycleForecast>,
}

/// Result of one regeneration run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegenerationReport {
    /// Forecasts tombstoned before rebuilding.
    pub cleared: usize,
    /// Forecasts written by this run, earliest first.
    pub generated: Vec<IntervalRecord>,
}

/// Rebuilds forecast records for one subject at a time.
pub struct ForecastManager<'cfg> {
    config: &'cfg CycleConfig,
}

impl<'cfg> ForecastManager<'cfg> {
    pub fn new(config: &'cfg CycleConfig) -> Self {
        Self { config }
    }

    /// Runs analysis and prediction over the recent completed history.
    pub fn forecast<R>(&self, repo: &R, subject_id: SubjectId) -> RepoResult<HistoryForecast>
    where
        R: CycleRecordRepository + ?Sized,
    {
        let history = repo.list_recent_completed(subject_id, self.config.history_window)?;
        let forecast = analyze(&history).and_then(|analysis| predict(&analysis, self.config));
        Ok(HistoryForecast {
            completed_records: history.len(),
            forecast,
        })
    }

    /// Replaces every forecast of `ctx.subject_id` with a fresh chain.
    ///
    /// # Side effects
    /// - Tombstones all visible forecasts of the subject.
    /// - Inserts up to `forecast_count` new forecasts.
    pub fn regenerate<R>(&self, repo: &R, ctx: &SubjectContext) -> RepoResult<RegenerationReport>
    where
        R: CycleRecordRepository + ?Sized,
    {
        let stale_ids: Vec<_> = repo
            .list_by_subject(ctx.subject_id, &RecordFilter::predicted())?
            .into_iter()
            .map(|record| record.id)
            .collect();
        let cleared = repo.soft_delete_many(&stale_ids)?;

        let history = self.forecast(repo, ctx.subject_id)?;
        let Some(forecast) = history.forecast else {
            debug!(
                "event=forecast_build module=forecast status=skipped reason=insufficient_data subject_id={} completed_records={}",
                ctx.subject_id, history.completed_records
            );
            return Ok(RegenerationReport {
                cleared,
                generated: Vec::new(),
            });
        };

        // A chain that breaks the record rules is dropped whole, never
        // stored unvalidated or truncated.
        let Some(chain) = self.build_chain(ctx, &forecast) else {
            warn!(
                "event=forecast_build module=forecast status=skipped reason=out_of_range subject_id={} average_cycle_length={} average_period_length={}",
                ctx.subject_id, forecast.average_cycle_length, forecast.average_period_length
            );
            return Ok(RegenerationReport {
                cleared,
                generated: Vec::new(),
            });
        };

        let generated = repo.save_records(&chain)?;
        Ok(RegenerationReport { cleared, generated })
    }

    /// Builds the chained forecasts, or `None` if any would break the
    /// record rules (e.g. an average cycle inflated by a logging gap).
    fn build_chain(
        &self,
        ctx: &SubjectContext,
        forecast: &CycleForecast,
    ) -> Option<Vec<IntervalRecord>> {
        (0..self.config.forecast_count)
            .map(|nth| {
                let start = forecast.chained_start(nth)?;
                let end = forecast.end_for(start)?;
                let record =
                    IntervalRecord::new_predicted(ctx, start, end, forecast.average_cycle_length);
                record.validate(self.config).ok()?;
                Some(record)
            })
            .collect()
    }
}
