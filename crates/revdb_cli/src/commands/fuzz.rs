//! Fuzz command implementation.

use super::Format;
use revdb_testkit::{FuzzConfig, FuzzReport, QueryCorrectnessFuzzer};

/// Runs the query-correctness fuzzer.
pub fn run(config: FuzzConfig, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        rounds = config.rounds,
        seed = config.seed,
        events = config.events,
        queries = config.queries,
        "starting fuzz run"
    );
    let report = QueryCorrectnessFuzzer::new(config).run()?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => print_report(&report),
    }

    if report.is_success() {
        Ok(())
    } else {
        Err("Fuzzing found a mismatch".into())
    }
}

fn print_report(report: &FuzzReport) {
    println!("=== Query Correctness Fuzzing ===");
    println!("Rounds: {}", report.rounds.len());
    println!("Query executions: {}", report.executions());
    println!("Duration: {:?}", report.elapsed);
    println!();

    for round in &report.rounds {
        match &round.failure {
            None => println!(
                "  round {:>4}  seed {:<20}  {} writes, {} queries  ok",
                round.round, round.seed, round.writes, round.queries
            ),
            Some(failure) => {
                println!("  round {:>4}  seed {:<20}  FAILED", round.round, round.seed);
                println!("    {}", failure);
                println!(
                    "    replay with: revdb fuzz --rounds 1 --seed {} --events {} --queries {}",
                    round.seed, report.config.events, report.config.queries
                );
            }
        }
    }

    println!();
    if report.is_success() {
        println!("✓ All indexes agree with the reference");
    } else {
        println!("✗ Fuzzing found a mismatch");
    }
}
