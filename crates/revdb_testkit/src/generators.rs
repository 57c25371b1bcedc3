//! Random test data generators.
//!
//! Two flavours: seeded `rand` generators for the fuzzer, whose rounds must
//! replay exactly from a seed, and proptest strategies for property tests.
//! Both draw from the same small pools so that sorts hit plenty of ties.

use crate::fixtures::{human, GENDERS, HUMAN_PRIMARY_KEY, HUMAN_SORTS, MAX_AGE};
use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use revdb_core::{Document, Selector, SortDirection, SortField, Value};

/// Names generated humans draw from. Includes non-ASCII names so that
/// string order is exercised beyond ASCII.
pub const NAMES: [&str; 10] = [
    "Alice", "Bob", "Carol", "Dave", "Eve", "Frank", "Grace", "Heidi", "Zoë", "émile",
];

/// Data of one generated human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanRecord {
    /// Primary key.
    pub id: String,
    /// Name from [`NAMES`].
    pub name: &'static str,
    /// Gender from [`GENDERS`].
    pub gender: &'static str,
    /// Age in `0..=MAX_AGE`.
    pub age: i64,
}

impl HumanRecord {
    /// Data fields of the record.
    pub fn fields(&self) -> [(&'static str, Value); 3] {
        crate::fixtures::human_fields(self.name, self.gender, self.age)
    }

    /// First state of the record as a document.
    pub fn to_document(&self) -> Document {
        human(&self.id, self.name, self.gender, self.age)
    }
}

/// One step of a write procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeStep {
    /// Create a new key.
    Insert(HumanRecord),
    /// Replace the data of a live key.
    Update(HumanRecord),
    /// Delete a live key.
    Delete {
        /// The key to delete.
        id: String,
    },
}

impl ChangeStep {
    /// Key the step writes.
    pub fn id(&self) -> &str {
        match self {
            Self::Insert(record) | Self::Update(record) => &record.id,
            Self::Delete { id } => id,
        }
    }
}

/// Random lowercase key of ten characters.
pub fn random_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..10).map(|_| char::from(rng.gen_range(b'a'..=b'z'))).collect()
}

/// Random human data under `id`.
pub fn random_record<R: Rng + ?Sized>(rng: &mut R, id: impl Into<String>) -> HumanRecord {
    HumanRecord {
        id: id.into(),
        name: pick(rng, &NAMES),
        gender: pick(rng, &GENDERS),
        age: rng.gen_range(0..=MAX_AGE),
    }
}

/// Random human with a fresh key.
pub fn random_human<R: Rng + ?Sized>(rng: &mut R) -> Document {
    let id = random_id(rng);
    random_record(rng, id).to_document()
}

/// Random sequence of `events` inserts, updates and deletes.
///
/// Updates and deletes only touch keys that are live at that point of the
/// sequence; deleted keys are not reused.
pub fn random_procedure<R: Rng + ?Sized>(rng: &mut R, events: usize) -> Vec<ChangeStep> {
    let mut live: Vec<String> = Vec::new();
    let mut steps = Vec::with_capacity(events);

    for _ in 0..events {
        let roll = rng.gen_range(0..10);
        let step = if live.is_empty() || roll < 5 {
            let mut id = random_id(rng);
            while live.contains(&id) {
                id = random_id(rng);
            }
            live.push(id.clone());
            ChangeStep::Insert(random_record(rng, id))
        } else if roll < 8 {
            let id = live[rng.gen_range(0..live.len())].clone();
            ChangeStep::Update(random_record(rng, id))
        } else {
            let id = live.swap_remove(rng.gen_range(0..live.len()));
            ChangeStep::Delete { id }
        };
        steps.push(step);
    }
    steps
}

/// Random selector over the human fields: one to three clauses, joined by
/// AND, any of which may itself be an OR or a negation.
pub fn random_selector<R: Rng + ?Sized>(rng: &mut R) -> Selector {
    let clauses = rng.gen_range(1..=3);
    let mut children: Vec<Selector> = (0..clauses).map(|_| random_clause(rng, 1)).collect();
    if children.len() == 1 {
        children.remove(0)
    } else {
        Selector::and(children)
    }
}

fn random_clause<R: Rng + ?Sized>(rng: &mut R, depth: u32) -> Selector {
    let age = rng.gen_range(0..=MAX_AGE);
    match rng.gen_range(0..12) {
        0 => Selector::eq("gender", pick(rng, &GENDERS)),
        1 => Selector::ne("gender", pick(rng, &GENDERS)),
        2 => {
            let count = rng.gen_range(0..=GENDERS.len());
            let genders: Vec<&str> = GENDERS.choose_multiple(rng, count).copied().collect();
            Selector::one_of("gender", genders)
        }
        3 => Selector::gt("age", age),
        4 => Selector::gte("age", age),
        5 => Selector::lt("age", age),
        6 => Selector::lte("age", age),
        7 => Selector::and([
            Selector::gte("age", age),
            Selector::lte("age", rng.gen_range(age..=MAX_AGE)),
        ]),
        8 => Selector::eq("name", pick(rng, &NAMES)),
        9 => Selector::gt("name", pick(rng, &NAMES)),
        10 if depth < 2 => {
            Selector::or([random_clause(rng, depth + 1), random_clause(rng, depth + 1)])
        }
        11 if depth < 2 => Selector::not(random_clause(rng, depth + 1)),
        _ => Selector::exists("age", true),
    }
}

/// Random sort from [`HUMAN_SORTS`] with random directions.
pub fn random_sort<R: Rng + ?Sized>(rng: &mut R) -> Vec<SortField> {
    let fields = pick(rng, &HUMAN_SORTS);
    fields
        .iter()
        .map(|field| SortField {
            field: (*field).to_string(),
            direction: if rng.gen_bool(0.25) {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            },
        })
        .collect()
}

/// Random `(skip, limit)` pair; most queries get neither.
pub fn random_window<R: Rng + ?Sized>(rng: &mut R) -> (usize, Option<usize>) {
    let skip = if rng.gen_bool(0.2) { rng.gen_range(1..5) } else { 0 };
    let limit = rng.gen_bool(0.3).then(|| rng.gen_range(0..10));
    (skip, limit)
}

fn pick<R: Rng + ?Sized, T: Copy>(rng: &mut R, pool: &[T]) -> T {
    pool[rng.gen_range(0..pool.len())]
}

/// Strategy for generating a human with a short key.
pub fn human_strategy() -> impl Strategy<Value = Document> {
    (
        "[a-z]{1,4}",
        prop::sample::select(NAMES.to_vec()),
        prop::sample::select(GENDERS.to_vec()),
        0..=MAX_AGE,
    )
        .prop_map(|(id, name, gender, age)| human(&id, name, gender, age))
}

/// Strategy for generating up to `max` humans with distinct keys.
pub fn humans_strategy(max: usize) -> impl Strategy<Value = Vec<Document>> {
    prop::collection::btree_map(
        "[a-z]{1,4}",
        (
            prop::sample::select(NAMES.to_vec()),
            prop::sample::select(GENDERS.to_vec()),
            0..=MAX_AGE,
        ),
        0..max,
    )
    .prop_map(|humans| {
        humans
            .into_iter()
            .map(|(id, (name, gender, age))| human(&id, name, gender, age))
            .collect()
    })
}

fn clause_strategy() -> impl Strategy<Value = Selector> {
    prop_oneof![
        prop::sample::select(GENDERS.to_vec()).prop_map(|g| Selector::eq("gender", g)),
        prop::sample::subsequence(GENDERS.to_vec(), 0..=GENDERS.len())
            .prop_map(|gs| Selector::one_of("gender", gs)),
        (0..=MAX_AGE).prop_map(|a| Selector::gte("age", a)),
        (0..=MAX_AGE).prop_map(|a| Selector::lt("age", a)),
        (0..=MAX_AGE, 0..=MAX_AGE).prop_map(|(a, b)| Selector::and([
            Selector::gt("age", a.min(b)),
            Selector::lte("age", a.max(b)),
        ])),
        prop::sample::select(NAMES.to_vec()).prop_map(|n| Selector::eq("name", n)),
        prop::sample::select(NAMES.to_vec()).prop_map(|n| Selector::lte("name", n)),
        Just(Selector::exists("age", true)),
    ]
}

/// Strategy for generating selectors over the human fields.
pub fn selector_strategy() -> impl Strategy<Value = Selector> {
    clause_strategy().prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..3).prop_map(Selector::And),
            prop::collection::vec(inner.clone(), 1..3).prop_map(Selector::Or),
            inner.prop_map(Selector::not),
        ]
    })
}

/// Strategy for generating one of the human sorts with random directions.
pub fn sort_strategy() -> impl Strategy<Value = Vec<SortField>> {
    (
        prop::sample::select(HUMAN_SORTS.to_vec()),
        prop::collection::vec(any::<bool>(), 3),
    )
        .prop_map(|(fields, descending)| {
            fields
                .iter()
                .zip(descending)
                .map(|(field, desc)| {
                    if desc {
                        SortField::desc(*field)
                    } else {
                        SortField::asc(*field)
                    }
                })
                .collect()
        })
}

/// Strategy for generating an index hint of the human schema.
pub fn human_index_strategy() -> impl Strategy<Value = Vec<String>> {
    let mut hints: Vec<Vec<String>> = vec![vec![HUMAN_PRIMARY_KEY.to_string()]];
    hints.extend(
        crate::fixtures::HUMAN_INDEXES
            .iter()
            .map(|fields| fields.iter().map(|f| (*f).to_string()).collect()),
    );
    prop::sample::select(hints)
}
