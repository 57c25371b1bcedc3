//! CLI command implementations.

pub mod fuzz;
pub mod race;

/// Output format shared by the commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Human-readable summary.
    Text,
    /// One JSON document on stdout.
    Json,
}
