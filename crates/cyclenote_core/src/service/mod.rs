//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate validation, conflict checks, persistence and forecast
//!   rebuilds into use-case level APIs.
//! - Keep API layers decoupled from storage details.

pub mod conflict_guard;
pub mod cycle_service;
pub mod forecast;
