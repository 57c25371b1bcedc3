//! Concurrency stress helpers.
//!
//! These drive a storage instance from several threads at once and check
//! the per-key guarantees: racing writers claiming the same previous state
//! produce exactly one winner, and writers on different keys never interfere.

use crate::fixtures::{human, human_instance};
use revdb_core::{CoreResult, StorageInstance, Value, WriteRow};
use serde::Serialize;
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

/// Key the same-key race writes.
pub const RACE_KEY: &str = "race";

/// Result of a stress test run.
#[derive(Debug, Clone, Serialize)]
pub struct StressTestResult {
    /// Total write rows submitted.
    pub total_ops: usize,
    /// Accepted rows.
    pub successful_ops: usize,
    /// Rejected rows.
    pub failed_ops: usize,
    /// Total duration.
    #[serde(serialize_with = "serialize_millis", rename = "duration_ms")]
    pub duration: Duration,
    /// Rows per second.
    pub ops_per_second: f64,
    /// Broken guarantees, one line each.
    pub violations: Vec<String>,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(
        successful: usize,
        failed: usize,
        duration: Duration,
        violations: Vec<String>,
    ) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
            violations,
        }
    }

    /// Returns true if no guarantee was broken.
    pub fn is_success(&self) -> bool {
        self.violations.is_empty()
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total rows: {}", self.total_ops);
        println!("Accepted: {}", self.successful_ops);
        println!("Rejected: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} rows/sec", self.ops_per_second);
        for violation in &self.violations {
            println!("VIOLATION: {}", violation);
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Configuration for stress tests.
#[derive(Debug, Clone, Copy)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Rounds (same-key race) or writes per thread (disjoint writers).
    pub rounds: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            rounds: 50,
        }
    }
}

/// Races `threads` writers on [`RACE_KEY`] each round, all claiming the
/// same previous state.
///
/// Each round must accept exactly one row and raise the height by exactly one.
///
/// # Errors
///
/// Fails on engine errors other than per-row rejections.
pub fn race_same_key(config: &StressConfig) -> CoreResult<StressTestResult> {
    let instance = human_instance()?;
    let result = race_rounds(&instance, config);
    instance.close()?;
    result
}

fn race_rounds(instance: &StorageInstance, config: &StressConfig) -> CoreResult<StressTestResult> {
    instance.bulk_write(vec![WriteRow::insert(human(RACE_KEY, "Racer", "x", 0))])?;

    let threads = config.threads.max(1);
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut violations = Vec::new();

    for round in 0..config.rounds {
        let Some(current) = instance.find_by_ids(&[RACE_KEY], true)?.remove(RACE_KEY) else {
            violations.push(format!("round {round}: {RACE_KEY:?} disappeared"));
            break;
        };
        let barrier = Barrier::new(threads);

        let outcomes: Vec<CoreResult<bool>> = thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let (current, barrier) = (&current, &barrier);
                    s.spawn(move || -> CoreResult<bool> {
                        let next = current.with_field("age", Value::Integer(t as i64))?;
                        let row = WriteRow::update((**current).clone(), next);
                        barrier.wait();
                        Ok(instance.bulk_write(vec![row])?.is_success())
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let accepted = outcomes
            .into_iter()
            .collect::<CoreResult<Vec<bool>>>()?
            .into_iter()
            .filter(|ok| *ok)
            .count();
        successful += accepted;
        failed += threads - accepted;
        if accepted != 1 {
            violations.push(format!("round {round}: {accepted} writers won"));
        }

        let height = instance
            .find_by_ids(&[RACE_KEY], true)?
            .get(RACE_KEY)
            .map(|d| d.revision().height());
        let expected = current.revision().height() + 1;
        if height != Some(expected) {
            violations.push(format!("round {round}: height {height:?}, expected {expected}"));
        }
    }

    tracing::debug!(rounds = config.rounds, threads, successful, failed, "same-key race finished");
    Ok(StressTestResult::new(successful, failed, start.elapsed(), violations))
}

/// Runs `threads` writers on disjoint keys, each inserting its own key and
/// then updating it `rounds` times.
///
/// Every row must be accepted and every key must end at height `rounds + 1`.
///
/// # Errors
///
/// Fails on engine errors other than per-row rejections.
pub fn disjoint_writers(config: &StressConfig) -> CoreResult<StressTestResult> {
    let instance = human_instance()?;
    let result = disjoint_rounds(&instance, config);
    instance.close()?;
    result
}

fn disjoint_rounds(
    instance: &StorageInstance,
    config: &StressConfig,
) -> CoreResult<StressTestResult> {
    let threads = config.threads.max(1);
    let start = Instant::now();

    let outcomes: Vec<CoreResult<(usize, usize)>> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                s.spawn(move || -> CoreResult<(usize, usize)> {
                    let mut current = human(&format!("writer-{t}"), "Writer", "f", 0);
                    let mut accepted = 0;
                    let mut rejected = 0;
                    let mut row = WriteRow::insert(current.clone());
                    for round in 0..=config.rounds {
                        let result = instance.bulk_write(vec![row])?;
                        if result.is_success() {
                            accepted += 1;
                        } else {
                            rejected += 1;
                        }
                        let next = current.with_field("age", Value::Integer(round as i64 + 1))?;
                        row = WriteRow::update(current, next.clone());
                        current = next;
                    }
                    Ok((accepted, rejected))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });

    let mut successful = 0;
    let mut failed = 0;
    for outcome in outcomes {
        let (accepted, rejected) = outcome?;
        successful += accepted;
        failed += rejected;
    }

    let mut violations = Vec::new();
    if failed > 0 {
        violations.push(format!("{failed} rows rejected without contention"));
    }
    let ids: Vec<String> = (0..threads).map(|t| format!("writer-{t}")).collect();
    let found = instance.find_by_ids(ids.as_slice(), false)?;
    for id in &ids {
        let height = found.get(id).map(|d| d.revision().height());
        let expected = config.rounds as u64 + 1;
        if height != Some(expected) {
            violations.push(format!("{id}: height {height:?}, expected {expected}"));
        }
    }

    tracing::debug!(
        rounds = config.rounds,
        threads,
        successful,
        failed,
        "disjoint writers finished"
    );
    Ok(StressTestResult::new(successful, failed, start.elapsed(), violations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_race_has_one_winner_per_round() {
        let result = race_same_key(&StressConfig { threads: 4, rounds: 10 }).unwrap();
        assert!(result.is_success(), "{:?}", result.violations);
        assert_eq!(result.successful_ops, 10);
        assert_eq!(result.failed_ops, 30);
    }

    #[test]
    fn disjoint_writers_never_conflict() {
        let result = disjoint_writers(&StressConfig { threads: 4, rounds: 20 }).unwrap();
        assert!(result.is_success(), "{:?}", result.violations);
        assert_eq!(result.successful_ops, 4 * 21);
    }

    #[test]
    fn throughput_is_zero_for_empty_duration() {
        let result = StressTestResult::new(3, 1, Duration::ZERO, Vec::new());
        assert_eq!(result.total_ops, 4);
        assert_eq!(result.ops_per_second, 0.0);
    }
}
