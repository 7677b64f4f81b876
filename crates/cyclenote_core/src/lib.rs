//! Core cycle recording and prediction engine for CycleNote.
//! This crate is the single source of truth for record invariants.

pub mod clock;
pub mod config;
pub mod cycle;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, ConflictScope, CycleConfig};
pub use cycle::analyzer::{analyze, CycleAnalysis};
pub use cycle::predictor::{
    predict, CycleForecast, Prediction, PredictionSummary, Regularity, StartRange,
};
pub use logging::{default_log_level, init_logging, init_logging_with, logging_status, LogSettings};
pub use model::record::{
    validate_interval, GroupId, IntervalRecord, RecordId, SubjectContext, SubjectId,
    ValidationError,
};
pub use repo::record_repo::{
    CycleRecordRepository, RecordFilter, RepoError, RepoResult, SqliteCycleRecordRepository,
};
pub use service::cycle_service::{
    CycleService, CycleServiceError, CycleServiceResult, CycleStatistics,
};
pub use service::forecast::{ForecastManager, HistoryForecast, RegenerationReport};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
