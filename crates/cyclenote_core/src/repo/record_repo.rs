//! Interval record repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the record store queries the cycle engine needs.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths call `IntervalRecord::validate()` before SQL mutations.
//! - Every read filters on `is_deleted = 0`.
//! - List results are ordered by `start_date DESC`, newest first.
//! - Timestamps are stamped from the injected clock, never from SQLite.

use crate::clock::{Clock, SystemClock};
use crate::config::CycleConfig;
use crate::db::DbError;
use crate::model::record::{
    GroupId, IntervalRecord, RecordId, SubjectId, ValidationError,
};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const RECORD_SELECT_SQL: &str = "SELECT
    id,
    subject_id,
    group_id,
    start_date,
    end_date,
    cycle_length,
    is_predicted,
    is_deleted,
    created_at,
    updated_at
FROM interval_records";

const RECORD_ORDER_SQL: &str = " ORDER BY start_date DESC, created_at DESC, id ASC";

static DEFAULT_CONFIG: Lazy<CycleConfig> = Lazy::new(CycleConfig::default);
static SYSTEM_CLOCK: SystemClock = SystemClock;

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for record persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Db(DbError),
    NotFound(RecordId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "interval record not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Filter options for listing records.
///
/// Date bounds apply to `start_date` and are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub start_from: Option<NaiveDate>,
    pub start_to: Option<NaiveDate>,
    /// `Some(true)` forecasts only, `Some(false)` actual only, `None` both.
    pub is_predicted: Option<bool>,
}

impl RecordFilter {
    pub fn actual() -> Self {
        Self {
            is_predicted: Some(false),
            ..Self::default()
        }
    }

    pub fn predicted() -> Self {
        Self {
            is_predicted: Some(true),
            ..Self::default()
        }
    }

    pub fn between(start_from: NaiveDate, start_to: NaiveDate) -> Self {
        Self {
            start_from: Some(start_from),
            start_to: Some(start_to),
            is_predicted: None,
        }
    }
}

/// Record store used by the cycle engine.
pub trait CycleRecordRepository {
    /// Inserts or updates one record and returns it with fresh timestamps.
    fn save_record(&self, record: &IntervalRecord) -> RepoResult<IntervalRecord>;
    /// Saves several records; atomicity is up to the caller's transaction.
    fn save_records(&self, records: &[IntervalRecord]) -> RepoResult<Vec<IntervalRecord>>;
    /// Gets one visible record owned by `subject_id`.
    fn get_record(&self, subject_id: SubjectId, id: RecordId)
        -> RepoResult<Option<IntervalRecord>>;
    fn list_by_subject(
        &self,
        subject_id: SubjectId,
        filter: &RecordFilter,
    ) -> RepoResult<Vec<IntervalRecord>>;
    /// Partner read view over every subject sharing `group_id`.
    fn list_by_group(
        &self,
        group_id: GroupId,
        filter: &RecordFilter,
    ) -> RepoResult<Vec<IntervalRecord>>;
    /// Most recent actual records that have an end date.
    fn list_recent_completed(
        &self,
        subject_id: SubjectId,
        limit: u32,
    ) -> RepoResult<Vec<IntervalRecord>>;
    /// Actual and predicted records starting inside `[start, end]`.
    fn list_in_range(
        &self,
        subject_id: SubjectId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RepoResult<Vec<IntervalRecord>>;
    /// Tombstones every listed record; returns how many were visible before.
    fn soft_delete_many(&self, ids: &[RecordId]) -> RepoResult<usize>;
    fn count_records(&self, subject_id: SubjectId, is_predicted: Option<bool>) -> RepoResult<u64>;
}

/// SQLite-backed record repository.
pub struct SqliteCycleRecordRepository<'conn> {
    conn: &'conn Connection,
    config: &'conn CycleConfig,
    clock: &'conn dyn Clock,
}

impl<'conn> SqliteCycleRecordRepository<'conn> {
    /// Uses default rules and the system clock.
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_parts(conn, &DEFAULT_CONFIG, &SYSTEM_CLOCK)
    }

    pub fn with_parts(
        conn: &'conn Connection,
        config: &'conn CycleConfig,
        clock: &'conn dyn Clock,
    ) -> Self {
        Self {
            conn,
            config,
            clock,
        }
    }

    fn query_records(&self, sql: &str, values: Vec<Value>) -> RepoResult<Vec<IntervalRecord>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }
}

impl CycleRecordRepository for SqliteCycleRecordRepository<'_> {
    fn save_record(&self, record: &IntervalRecord) -> RepoResult<IntervalRecord> {
        record.validate(self.config)?;

        let now = self.clock.now_epoch_ms();
        let mut saved = record.clone();
        if saved.created_at == 0 {
            saved.created_at = now;
        }
        saved.updated_at = now;

        self.conn
            .prepare_cached(
                "INSERT INTO interval_records (
                    id,
                    subject_id,
                    group_id,
                    start_date,
                    end_date,
                    cycle_length,
                    is_predicted,
                    is_deleted,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT (id) DO UPDATE SET
                    group_id = excluded.group_id,
                    start_date = excluded.start_date,
                    end_date = excluded.end_date,
                    cycle_length = excluded.cycle_length,
                    is_predicted = excluded.is_predicted,
                    is_deleted = excluded.is_deleted,
                    updated_at = excluded.updated_at
                WHERE interval_records.subject_id = excluded.subject_id;",
            )?
            .execute(params![
                saved.id.to_string(),
                saved.subject_id.to_string(),
                saved.group_id.map(|id| id.to_string()),
                saved.start_date,
                saved.end_date,
                saved.cycle_length,
                bool_to_int(saved.is_predicted),
                bool_to_int(saved.is_deleted),
                saved.created_at,
                saved.updated_at,
            ])
            .map_err(RepoError::from)
            .and_then(|changed| {
                if changed == 0 {
                    // Upsert hit a row owned by another subject.
                    Err(RepoError::NotFound(saved.id))
                } else {
                    Ok(())
                }
            })?;

        Ok(saved)
    }

    fn save_records(&self, records: &[IntervalRecord]) -> RepoResult<Vec<IntervalRecord>> {
        records
            .iter()
            .map(|record| self.save_record(record))
            .collect()
    }

    fn get_record(
        &self,
        subject_id: SubjectId,
        id: RecordId,
    ) -> RepoResult<Option<IntervalRecord>> {
        let sql = format!(
            "{RECORD_SELECT_SQL}
             WHERE id = ?1
               AND subject_id = ?2
               AND is_deleted = 0;"
        );
        let records = self.query_records(
            &sql,
            vec![
                Value::Text(id.to_string()),
                Value::Text(subject_id.to_string()),
            ],
        )?;
        Ok(records.into_iter().next())
    }

    fn list_by_subject(
        &self,
        subject_id: SubjectId,
        filter: &RecordFilter,
    ) -> RepoResult<Vec<IntervalRecord>> {
        let (sql, values) = filtered_sql("subject_id", subject_id, filter);
        self.query_records(&sql, values)
    }

    fn list_by_group(
        &self,
        group_id: GroupId,
        filter: &RecordFilter,
    ) -> RepoResult<Vec<IntervalRecord>> {
        let (sql, values) = filtered_sql("group_id", group_id, filter);
        self.query_records(&sql, values)
    }

    fn list_recent_completed(
        &self,
        subject_id: SubjectId,
        limit: u32,
    ) -> RepoResult<Vec<IntervalRecord>> {
        let sql = format!(
            "{RECORD_SELECT_SQL}
             WHERE subject_id = ?
               AND is_predicted = 0
               AND is_deleted = 0
               AND end_date IS NOT NULL
             {RECORD_ORDER_SQL}
             LIMIT ?;"
        );
        self.query_records(
            &sql,
            vec![
                Value::Text(subject_id.to_string()),
                Value::Integer(i64::from(limit)),
            ],
        )
    }

    fn list_in_range(
        &self,
        subject_id: SubjectId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RepoResult<Vec<IntervalRecord>> {
        let (sql, values) =
            filtered_sql("subject_id", subject_id, &RecordFilter::between(start, end));
        self.query_records(&sql, values)
    }

    fn soft_delete_many(&self, ids: &[RecordId]) -> RepoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE interval_records
             SET
                is_deleted = 1,
                updated_at = ?
             WHERE is_deleted = 0
               AND id IN ({placeholders});"
        );
        let mut values = Vec::with_capacity(ids.len() + 1);
        values.push(Value::Integer(self.clock.now_epoch_ms()));
        values.extend(ids.iter().map(|id| Value::Text(id.to_string())));

        let changed = self.conn.execute(&sql, params_from_iter(values))?;
        Ok(changed)
    }

    fn count_records(&self, subject_id: SubjectId, is_predicted: Option<bool>) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM interval_records
             WHERE subject_id = ?1
               AND is_deleted = 0
               AND (?2 IS NULL OR is_predicted = ?2);",
            params![subject_id.to_string(), is_predicted.map(bool_to_int)],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative record count `{count}`")))
    }
}

fn filtered_sql(owner_column: &str, owner: Uuid, filter: &RecordFilter) -> (String, Vec<Value>) {
    let mut sql = format!("{RECORD_SELECT_SQL} WHERE {owner_column} = ? AND is_deleted = 0");
    let mut values = vec![Value::Text(owner.to_string())];

    if let Some(start_from) = filter.start_from {
        sql.push_str(" AND start_date >= ?");
        values.push(Value::Text(start_from.to_string()));
    }
    if let Some(start_to) = filter.start_to {
        sql.push_str(" AND start_date <= ?");
        values.push(Value::Text(start_to.to_string()));
    }
    if let Some(is_predicted) = filter.is_predicted {
        sql.push_str(" AND is_predicted = ?");
        values.push(Value::Integer(bool_to_int(is_predicted)));
    }

    sql.push_str(RECORD_ORDER_SQL);
    (sql, values)
}

fn parse_record_row(row: &Row<'_>) -> RepoResult<IntervalRecord> {
    let group_id = match row.get::<_, Option<String>>("group_id")? {
        Some(value) => Some(parse_uuid(&value, "group_id")?),
        None => None,
    };

    Ok(IntervalRecord {
        id: parse_uuid(&row.get::<_, String>("id")?, "id")?,
        subject_id: parse_uuid(&row.get::<_, String>("subject_id")?, "subject_id")?,
        group_id,
        start_date: row.get("start_date")?,
        end_date: row.get("end_date")?,
        cycle_length: row.get("cycle_length")?,
        is_predicted: parse_flag(row, "is_predicted")?,
        is_deleted: parse_flag(row, "is_deleted")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{value}` in interval_records.{column}"
        ))
    })
}

fn parse_flag(row: &Row<'_>, column: &str) -> RepoResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid {column} value `{other}` in interval_records.{column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
