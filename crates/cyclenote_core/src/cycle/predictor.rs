//! Next-onset prediction from analysed history.
//!
//! # Invariants
//! - Averages are rounded to the nearest whole day.
//! - `uncertainty_days` is the ceiling of the population standard deviation
//!   of interval lengths.

use crate::config::CycleConfig;
use crate::cycle::analyzer::CycleAnalysis;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};

/// How consistent a subject's interval lengths are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regularity {
    Regular,
    SomewhatRegular,
    Irregular,
}

impl Regularity {
    pub fn classify(std_dev: f64, config: &CycleConfig) -> Self {
        if std_dev <= config.regular_std_dev_max {
            Self::Regular
        } else if std_dev <= config.somewhat_regular_std_dev_max {
            Self::SomewhatRegular
        } else {
            Self::Irregular
        }
    }
}

/// Raw forecast produced from one analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleForecast {
    pub next_start_date: NaiveDate,
    pub average_cycle_length: i64,
    pub average_period_length: i64,
    pub std_dev: f64,
    pub regularity: Regularity,
    pub uncertainty_days: i64,
    /// Number of intervals the averages were taken over.
    pub based_on_cycles: usize,
}

impl CycleForecast {
    /// Start of the `nth` chained onset, where `nth = 0` is `next_start_date`.
    pub fn chained_start(&self, nth: u32) -> Option<NaiveDate> {
        let offset = self.average_cycle_length.checked_mul(i64::from(nth))?;
        add_days(self.next_start_date, offset)
    }

    /// Inclusive end date of an interval starting at `start`.
    pub fn end_for(&self, start: NaiveDate) -> Option<NaiveDate> {
        add_days(start, self.average_period_length - 1)
    }
}

/// Predicts the next onset from `analysis`.
///
/// Returns `None` only when the next start would fall outside the supported
/// calendar range.
pub fn predict(analysis: &CycleAnalysis, config: &CycleConfig) -> Option<CycleForecast> {
    let average_cycle_length =
        rounded_mean(&analysis.cycle_lengths).unwrap_or(config.fallback_cycle_length_days);
    let average_period_length =
        rounded_mean(&analysis.durations).unwrap_or(config.fallback_period_length_days);
    let std_dev = population_std_dev(&analysis.cycle_lengths);

    Some(CycleForecast {
        next_start_date: add_days(analysis.latest_start, average_cycle_length)?,
        average_cycle_length,
        average_period_length,
        std_dev,
        regularity: Regularity::classify(std_dev, config),
        uncertainty_days: std_dev.ceil() as i64,
        based_on_cycles: analysis.cycle_count(),
    })
}

/// Inclusive window around the predicted start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartRange {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

/// Caller-facing prediction with the band and countdown resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionSummary {
    pub next_start_date: NaiveDate,
    pub predicted_start_range: StartRange,
    pub average_cycle_length: i64,
    pub average_period_length: i64,
    pub std_dev: f64,
    pub regularity: Regularity,
    pub uncertainty_days: i64,
    pub based_on_cycles: usize,
    /// Negative once the predicted start has passed.
    pub days_until_next_start: i64,
}

impl PredictionSummary {
    pub fn from_forecast(forecast: &CycleForecast, today: NaiveDate) -> Self {
        let band = forecast.uncertainty_days;
        Self {
            next_start_date: forecast.next_start_date,
            predicted_start_range: StartRange {
                earliest: add_days(forecast.next_start_date, -band)
                    .unwrap_or(forecast.next_start_date),
                latest: add_days(forecast.next_start_date, band)
                    .unwrap_or(forecast.next_start_date),
            },
            average_cycle_length: forecast.average_cycle_length,
            average_period_length: forecast.average_period_length,
            std_dev: forecast.std_dev,
            regularity: forecast.regularity,
            uncertainty_days: band,
            based_on_cycles: forecast.based_on_cycles,
            days_until_next_start: (forecast.next_start_date - today).num_days(),
        }
    }
}

/// Outcome of a prediction request.
///
/// Serialises with a `canPredict` flag so callers can branch without
/// treating missing history as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Available(PredictionSummary),
    Insufficient { completed_records: u64 },
}

impl Prediction {
    pub fn can_predict(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn summary(&self) -> Option<&PredictionSummary> {
        match self {
            Self::Available(summary) => Some(summary),
            Self::Insufficient { .. } => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictionView<'a> {
    can_predict: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_records: Option<u64>,
    #[serde(flatten)]
    summary: Option<&'a PredictionSummary>,
}

impl Serialize for Prediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let view = match self {
            Self::Available(summary) => PredictionView {
                can_predict: true,
                completed_records: None,
                summary: Some(summary),
            },
            Self::Insufficient { completed_records } => PredictionView {
                can_predict: false,
                completed_records: Some(*completed_records),
                summary: None,
            },
        };
        view.serialize(serializer)
    }
}

fn rounded_mean(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let sum: i64 = values.iter().sum();
    Some((sum as f64 / values.len() as f64).round() as i64)
}

fn population_std_dev(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<i64>() as f64 / count;
    let variance = values
        .iter()
        .map(|value| (*value as f64 - mean).powi(2))
        .sum::<f64>()
        / count;
    variance.sqrt()
}

fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}
