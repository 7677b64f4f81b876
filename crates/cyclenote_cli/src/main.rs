//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `cyclenote_core` linkage end to end against an in-memory store.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Pass `--json` to print the prediction in its wire shape.

use chrono::NaiveDate;
use cyclenote_core::db::open_db_in_memory;
use cyclenote_core::{CycleConfig, CycleService, FixedClock, Prediction, SubjectContext};
use std::error::Error;
use uuid::Uuid;

const PROBE_TODAY: (i32, u32, u32) = (2024, 2, 10);
const PROBE_HISTORY: [((i32, u32, u32), (i32, u32, u32)); 2] = [
    ((2024, 1, 1), (2024, 1, 5)),
    ((2024, 1, 29), (2024, 2, 2)),
];

fn main() {
    let json = std::env::args().skip(1).any(|arg| arg == "--json");
    if let Err(err) = run(json) {
        eprintln!("cyclenote_cli error: {err}");
        std::process::exit(1);
    }
}

fn run(json: bool) -> Result<(), Box<dyn Error>> {
    println!("cyclenote_core version={}", cyclenote_core::core_version());

    let conn = open_db_in_memory()?;
    let service = CycleService::try_with_clock(
        &conn,
        CycleConfig::default(),
        FixedClock::at_date(date(PROBE_TODAY)?),
    )?;
    let ctx = SubjectContext::new(Uuid::new_v4(), None);

    for (start, end) in PROBE_HISTORY {
        service.create_record(&ctx, date(start)?, Some(date(end)?))?;
    }

    let prediction = service.get_prediction(&ctx)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
        return Ok(());
    }

    match prediction {
        Prediction::Available(summary) => println!(
            "next_start={} avg_cycle={} avg_period={} regularity={:?} days_until={}",
            summary.next_start_date,
            summary.average_cycle_length,
            summary.average_period_length,
            summary.regularity,
            summary.days_until_next_start
        ),
        Prediction::Insufficient { completed_records } => {
            println!("prediction unavailable completed_records={completed_records}")
        }
    }

    let stats = service.get_statistics(&ctx)?;
    println!(
        "actual={} predicted={}",
        stats.total_actual_records, stats.total_predicted_records
    );
    Ok(())
}

fn date((year, month, day): (i32, u32, u32)) -> Result<NaiveDate, String> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("invalid probe date {year}-{month}-{day}"))
}
