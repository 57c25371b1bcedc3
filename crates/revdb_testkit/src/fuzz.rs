//! Query-correctness fuzzing.
//!
//! Each round opens a fresh human instance, replays a random write
//! procedure through it and through a [`ReferenceCollection`], then runs
//! random queries once per registered index. Every index must produce the
//! same id sequence as the reference.
//!
//! Round `n` of a run with seed `s` uses seed `s + n`, so a failing round
//! replays on its own with `FuzzConfig::default().seed(round_seed).rounds(1)`.

use crate::fixtures::{human_instance, HUMAN_PRIMARY_KEY};
use crate::generators::{random_procedure, random_selector, random_sort, random_window, ChangeStep};
use crate::oracle::ReferenceCollection;
use rand::rngs::StdRng;
use rand::SeedableRng;
use revdb_core::{CoreResult, Document, Query, Selector, SortField, StorageInstance, WriteRow};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Configuration for a fuzz run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FuzzConfig {
    /// Number of rounds.
    pub rounds: usize,
    /// Seed of the first round.
    pub seed: u64,
    /// Writes per round.
    pub events: usize,
    /// Queries per round.
    pub queries: usize,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            rounds: 10,
            seed: 0,
            events: 30,
            queries: 30,
        }
    }
}

impl FuzzConfig {
    /// Sets the number of rounds.
    #[must_use]
    pub const fn rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    /// Sets the seed of the first round.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the writes per round.
    #[must_use]
    pub const fn events(mut self, events: usize) -> Self {
        self.events = events;
        self
    }

    /// Sets the queries per round.
    #[must_use]
    pub const fn queries(mut self, queries: usize) -> Self {
        self.queries = queries;
        self
    }
}

/// What went wrong in a failed round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FuzzFailure {
    /// A procedure write was rejected.
    WriteRejected {
        /// Index of the step in the procedure.
        step: usize,
        /// Key the step wrote.
        id: String,
        /// Rejection status.
        status: String,
    },
    /// The live keys differ from the reference.
    LiveSetMismatch {
        /// Keys held by the reference.
        expected: Vec<String>,
        /// Keys returned by the instance.
        actual: Vec<String>,
    },
    /// A query returned a different id sequence than the reference.
    QueryMismatch {
        /// Index of the query within the round.
        query: usize,
        /// Rendered selector.
        selector: String,
        /// Rendered sort.
        sort: Vec<String>,
        /// Skip applied.
        skip: usize,
        /// Limit applied.
        limit: Option<usize>,
        /// Index hint the instance ran with.
        index: Vec<String>,
        /// Ids from the reference.
        expected: Vec<String>,
        /// Ids from the instance.
        actual: Vec<String>,
    },
}

impl fmt::Display for FuzzFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteRejected { step, id, status } => {
                write!(f, "step {step}: write to {id:?} rejected ({status})")
            }
            Self::LiveSetMismatch { expected, actual } => {
                write!(f, "live keys differ: expected {expected:?}, got {actual:?}")
            }
            Self::QueryMismatch {
                query,
                selector,
                sort,
                index,
                expected,
                actual,
                ..
            } => write!(
                f,
                "query {query} ({selector}, sort {sort:?}) via index {index:?}: \
                 expected {expected:?}, got {actual:?}"
            ),
        }
    }
}

/// Outcome of one round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    /// Round number within the run.
    pub round: usize,
    /// Seed the round ran with.
    pub seed: u64,
    /// Writes applied.
    pub writes: usize,
    /// Queries run.
    pub queries: usize,
    /// Query executions, one per query and index.
    pub executions: usize,
    /// First failure, if any.
    pub failure: Option<FuzzFailure>,
}

impl RoundReport {
    /// Returns true if the round found nothing.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Outcome of a fuzz run.
#[derive(Debug, Clone, Serialize)]
pub struct FuzzReport {
    /// Configuration the run used.
    pub config: FuzzConfig,
    /// Per-round outcomes. A run stops after the first failing round.
    pub rounds: Vec<RoundReport>,
    /// Wall-clock time of the run.
    #[serde(serialize_with = "serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
}

impl FuzzReport {
    /// Returns true if every round succeeded.
    pub fn is_success(&self) -> bool {
        self.rounds.iter().all(RoundReport::is_success)
    }

    /// Failed rounds.
    pub fn failures(&self) -> impl Iterator<Item = &RoundReport> {
        self.rounds.iter().filter(|r| !r.is_success())
    }

    /// Total query executions across all rounds.
    pub fn executions(&self) -> usize {
        self.rounds.iter().map(|r| r.executions).sum()
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Checks that query results agree with the reference through every index.
#[derive(Debug, Clone)]
pub struct QueryCorrectnessFuzzer {
    config: FuzzConfig,
}

impl QueryCorrectnessFuzzer {
    /// Creates a fuzzer.
    pub fn new(config: FuzzConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &FuzzConfig {
        &self.config
    }

    /// Runs all rounds, stopping at the first failing one.
    ///
    /// # Errors
    ///
    /// Engine errors other than per-row rejections abort the run.
    pub fn run(&self) -> CoreResult<FuzzReport> {
        let start = Instant::now();
        let mut rounds = Vec::with_capacity(self.config.rounds);
        for round in 0..self.config.rounds {
            let report = self.run_round(round)?;
            let failed = !report.is_success();
            rounds.push(report);
            if failed {
                break;
            }
        }
        Ok(FuzzReport {
            config: self.config,
            rounds,
            elapsed: start.elapsed(),
        })
    }

    /// Runs round `round` of this configuration.
    ///
    /// # Errors
    ///
    /// Engine errors other than per-row rejections abort the round.
    pub fn run_round(&self, round: usize) -> CoreResult<RoundReport> {
        let seed = self.config.seed.wrapping_add(round as u64);
        let mut rng = StdRng::seed_from_u64(seed);
        let instance = human_instance()?;
        let mut oracle = ReferenceCollection::new(HUMAN_PRIMARY_KEY);

        let mut report = RoundReport {
            round,
            seed,
            writes: 0,
            queries: 0,
            executions: 0,
            failure: None,
        };

        let result = self.drive(&instance, &mut oracle, &mut rng, &mut report);
        instance.close()?;
        report.failure = result?;

        match &report.failure {
            Some(failure) => tracing::warn!(round, seed, %failure, "fuzz round failed"),
            None => tracing::info!(
                round,
                seed,
                writes = report.writes,
                executions = report.executions,
                "fuzz round passed"
            ),
        }
        Ok(report)
    }

    fn drive(
        &self,
        instance: &StorageInstance,
        oracle: &mut ReferenceCollection,
        rng: &mut StdRng,
        report: &mut RoundReport,
    ) -> CoreResult<Option<FuzzFailure>> {
        let steps = random_procedure(rng, self.config.events);
        for (step_index, step) in steps.into_iter().enumerate() {
            if let Some(failure) = apply_step(instance, oracle, step_index, &step)? {
                return Ok(Some(failure));
            }
            report.writes += 1;
        }

        let expected = oracle.ids();
        let all = instance.prepare(
            Query::new(Selector::not_deleted()).sort_by(SortField::asc(HUMAN_PRIMARY_KEY)),
        )?;
        let actual = ids(&instance.query(&all)?);
        if actual != expected {
            return Ok(Some(FuzzFailure::LiveSetMismatch { expected, actual }));
        }

        let indexes = instance.schema().indexes.clone();
        for query_index in 0..self.config.queries {
            let selector = random_selector(rng);
            let sort = random_sort(rng);
            let (skip, limit) = random_window(rng);
            let expected = oracle.query_ids(&selector, &sort, skip, limit);
            report.queries += 1;

            for index in &indexes {
                let live = Selector::and([selector.clone(), Selector::not_deleted()]);
                let mut query = Query::new(live).skip(skip).index(index.iter().cloned());
                query.sort = sort.clone();
                query.limit = limit;

                let actual = ids(&instance.query(&instance.prepare(query)?)?);
                report.executions += 1;
                if actual != expected {
                    return Ok(Some(FuzzFailure::QueryMismatch {
                        query: query_index,
                        selector: format!("{selector:?}"),
                        sort: sort.iter().map(|s| format!("{} {}", s.field, s.direction)).collect(),
                        skip,
                        limit,
                        index: index.clone(),
                        expected,
                        actual,
                    }));
                }
            }
        }
        Ok(None)
    }
}

/// Writes one procedure step the way an application would: read the current
/// state including tombstones, derive the next state from it, and claim it as
/// previous.
fn apply_step(
    instance: &StorageInstance,
    oracle: &mut ReferenceCollection,
    step_index: usize,
    step: &ChangeStep,
) -> CoreResult<Option<FuzzFailure>> {
    let id = step.id();
    let previous = instance.find_by_ids(&[id], true)?.remove(id);

    let document = match (step, &previous) {
        (ChangeStep::Insert(record) | ChangeStep::Update(record), Some(previous)) => {
            previous.next(record.fields())?
        }
        (ChangeStep::Insert(record) | ChangeStep::Update(record), None) => {
            Document::create(id, record.fields())?
        }
        (ChangeStep::Delete { .. }, Some(previous)) => previous.next_deleted()?,
        (ChangeStep::Delete { .. }, None) => {
            return Ok(Some(FuzzFailure::WriteRejected {
                step: step_index,
                id: id.to_string(),
                status: "key to delete is missing".to_string(),
            }));
        }
    };

    let row = WriteRow {
        previous: previous.as_deref().cloned(),
        document: document.clone(),
    };
    let result = instance.bulk_write(vec![row])?;
    if let Some(error) = result.rejected.first() {
        return Ok(Some(FuzzFailure::WriteRejected {
            step: step_index,
            id: id.to_string(),
            status: error.status.to_string(),
        }));
    }

    oracle.apply(&document);
    Ok(None)
}

fn ids(documents: &[std::sync::Arc<Document>]) -> Vec<String> {
    documents.iter().map(|d| d.id().to_string()).collect()
}
