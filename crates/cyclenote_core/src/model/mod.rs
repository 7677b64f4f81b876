//! Domain model for recorded and forecasted cycle intervals.
//!
//! # Responsibility
//! - Define the single interval record shape shared by actual and predicted data.
//! - Own the structural validation rules for one record.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId`.
//! - Deletion is represented by soft-delete tombstones, not hard delete.
//! - Predicted records are a derived view and are only replaced in bulk.

pub mod record;
