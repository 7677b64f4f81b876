//! History analysis over recent completed records.

use crate::model::record::IntervalRecord;
use chrono::NaiveDate;

/// Measurements taken from a subject's recent completed history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleAnalysis {
    /// Days between consecutive starts, newest pair first.
    pub cycle_lengths: Vec<i64>,
    /// Inclusive day count of each record, newest first.
    pub durations: Vec<i64>,
    /// Start of the newest record analysed.
    pub latest_start: NaiveDate,
}

impl CycleAnalysis {
    /// Number of measured intervals.
    pub fn cycle_count(&self) -> usize {
        self.cycle_lengths.len()
    }
}

/// Analyses completed records.
///
/// Returns `None` when fewer than two records are given, since no interval
/// can be measured. Records are ordered newest first before measuring, so
/// callers may pass them in any order.
pub fn analyze(records: &[IntervalRecord]) -> Option<CycleAnalysis> {
    if records.len() < 2 {
        return None;
    }

    let mut ordered: Vec<&IntervalRecord> = records.iter().collect();
    ordered.sort_by(|left, right| right.start_date.cmp(&left.start_date));

    let cycle_lengths = ordered
        .windows(2)
        .map(|pair| (pair[0].start_date - pair[1].start_date).num_days())
        .collect();
    let durations = ordered
        .iter()
        .filter_map(|record| record.duration())
        .collect();

    Some(CycleAnalysis {
        cycle_lengths,
        durations,
        latest_start: ordered[0].start_date,
    })
}
