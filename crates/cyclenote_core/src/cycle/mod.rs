//! Pure cycle statistics: history analysis and next-onset prediction.
//!
//! # Responsibility
//! - Turn completed records into interval lengths and durations.
//! - Derive a single forecast with an uncertainty band and regularity class.
//!
//! # Invariants
//! - No I/O and no wall-clock reads; equal inputs give equal outputs.
//! - Fewer than two completed records is "insufficient data", never an error.

pub mod analyzer;
pub mod predictor;
