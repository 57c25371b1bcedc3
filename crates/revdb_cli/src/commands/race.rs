//! Race command implementation.

use super::Format;
use revdb_testkit::{disjoint_writers, race_same_key, StressConfig};

/// Runs the same-key race and the disjoint-writer stress test.
pub fn run(config: StressConfig, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(threads = config.threads, rounds = config.rounds, "starting race");
    let same_key = race_same_key(&config)?;
    let disjoint = disjoint_writers(&config)?;

    match format {
        Format::Json => {
            let json = serde_json::json!({
                "threads": config.threads,
                "rounds": config.rounds,
                "same_key": same_key,
                "disjoint": disjoint,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Format::Text => {
            same_key.print_summary("Same-key race");
            disjoint.print_summary("Disjoint writers");
            println!();
        }
    }

    if same_key.is_success() && disjoint.is_success() {
        if format == Format::Text {
            println!("✓ Per-key guarantees held");
        }
        Ok(())
    } else {
        Err("Per-key guarantees violated".into())
    }
}
