//! Tunable rules for recording and forecasting.
//!
//! # Responsibility
//! - Hold every numeric rule the validator, conflict guard and predictor use.
//! - Provide defaults matching the product rules so callers can start from
//!   `CycleConfig::default()` and override selectively.
//!
//! # Invariants
//! - `min_* <= max_*` for every bound pair (checked by `CycleConfig::check`).
//! - `history_window >= 2`, otherwise no prediction can ever be produced.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Which existing records block a new start date in the conflict guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictScope {
    /// Actual and predicted records both block.
    #[default]
    AllRecords,
    /// Only user-entered records block; forecasts never do.
    ActualOnly,
}

/// Rule set for one `CycleService` instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Number of most recent completed records fed to the analyzer.
    pub history_window: u32,
    /// Number of chained forecast records kept per subject.
    pub forecast_count: u32,
    /// Half-width in days of the conflict window around a start date.
    pub conflict_window_days: i64,
    pub conflict_scope: ConflictScope,
    pub min_duration_days: i64,
    pub max_duration_days: i64,
    pub min_cycle_length_days: i64,
    pub max_cycle_length_days: i64,
    /// Used when no interval could be measured.
    pub fallback_cycle_length_days: i64,
    /// Used when no duration could be measured.
    pub fallback_period_length_days: i64,
    /// Standard deviation at or below which a history counts as regular.
    pub regular_std_dev_max: f64,
    /// Standard deviation at or below which a history counts as somewhat regular.
    pub somewhat_regular_std_dev_max: f64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            history_window: 6,
            forecast_count: 3,
            conflict_window_days: 7,
            conflict_scope: ConflictScope::AllRecords,
            min_duration_days: 4,
            max_duration_days: 12,
            min_cycle_length_days: 21,
            max_cycle_length_days: 35,
            fallback_cycle_length_days: 28,
            fallback_period_length_days: 5,
            regular_std_dev_max: 2.0,
            somewhat_regular_std_dev_max: 4.0,
        }
    }
}

/// Rejected configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    HistoryWindowTooSmall(u32),
    EmptyRange {
        field: &'static str,
        min: i64,
        max: i64,
    },
    ThresholdsOutOfOrder {
        regular: f64,
        somewhat_regular: f64,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HistoryWindowTooSmall(value) => {
                write!(f, "history_window must be at least 2, got {value}")
            }
            Self::EmptyRange { field, min, max } => {
                write!(f, "{field} range is empty: min {min} > max {max}")
            }
            Self::ThresholdsOutOfOrder {
                regular,
                somewhat_regular,
            } => write!(
                f,
                "regular threshold {regular} exceeds somewhat-regular threshold {somewhat_regular}"
            ),
        }
    }
}

impl Error for ConfigError {}

impl CycleConfig {
    /// Verifies bound pairs and thresholds are coherent.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.history_window < 2 {
            return Err(ConfigError::HistoryWindowTooSmall(self.history_window));
        }
        for (field, min, max) in [
            ("duration", self.min_duration_days, self.max_duration_days),
            (
                "cycle_length",
                self.min_cycle_length_days,
                self.max_cycle_length_days,
            ),
        ] {
            if min > max {
                return Err(ConfigError::EmptyRange { field, min, max });
            }
        }
        if self.regular_std_dev_max > self.somewhat_regular_std_dev_max {
            return Err(ConfigError::ThresholdsOutOfOrder {
                regular: self.regular_std_dev_max,
                somewhat_regular: self.somewhat_regular_std_dev_max,
            });
        }
        Ok(())
    }

    pub(crate) fn duration_in_range(&self, days: i64) -> bool {
        (self.min_duration_days..=self.max_duration_days).contains(&days)
    }

    pub(crate) fn cycle_length_in_range(&self, days: i64) -> bool {
        (self.min_cycle_length_days..=self.max_cycle_length_days).contains(&days)
    }
}
