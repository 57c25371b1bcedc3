//! revdb CLI
//!
//! Command-line drivers for the revdb correctness harnesses.
//!
//! # Commands
//!
//! - `fuzz` - Compare query results through every index against a reference
//! - `race` - Race writers on one key and on disjoint keys

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use revdb_testkit::{FuzzConfig, StressConfig};
use tracing_subscriber::EnvFilter;

/// revdb command-line tools.
#[derive(Parser)]
#[command(name = "revdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the query-correctness fuzzer
    Fuzz {
        /// Number of rounds
        #[arg(short, long, default_value = "10")]
        rounds: usize,

        /// Seed of the first round
        #[arg(short, long, default_value = "0")]
        seed: u64,

        /// Writes per round
        #[arg(short, long, default_value = "30")]
        events: usize,

        /// Queries per round
        #[arg(short, long, default_value = "30")]
        queries: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Race concurrent writers
    Race {
        /// Number of concurrent writers
        #[arg(short, long, default_value = "8")]
        threads: usize,

        /// Rounds per writer
        #[arg(short, long, default_value = "50")]
        rounds: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fuzz {
            rounds,
            seed,
            events,
            queries,
            format,
        } => {
            let config = FuzzConfig::default()
                .rounds(rounds)
                .seed(seed)
                .events(events)
                .queries(queries);
            commands::fuzz::run(config, format)?;
        }
        Commands::Race {
            threads,
            rounds,
            format,
        } => {
            commands::race::run(StressConfig { threads, rounds }, format)?;
        }
    }

    Ok(())
}
