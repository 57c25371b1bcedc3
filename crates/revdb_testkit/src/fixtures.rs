//! Test fixtures and instance helpers.
//!
//! Provides the human collection used across the fuzzer, the stress helpers
//! and the integration tests.

use revdb_core::{
    CoreResult, Document, FieldType, InstanceConfig, InstanceParams, MemoryStorage, Schema,
    Storage, StorageInstance, Value,
};

/// Primary key of the human schema.
pub const HUMAN_PRIMARY_KEY: &str = "_id";

/// Genders a human may have.
pub const GENDERS: [&str; 3] = ["f", "m", "x"];

/// Highest age a generated human may have.
pub const MAX_AGE: i64 = 100;

/// Secondary indexes of the human schema, in declaration order.
pub const HUMAN_INDEXES: [&[&str]; 5] = [
    &["name", "gender", "age"],
    &["gender", "age", "name"],
    &["age", "name", "gender"],
    &["gender", "age"],
    &["name", "gender"],
];

/// The sorts the fuzzer draws from. Each ends with the primary key.
pub const HUMAN_SORTS: [&[&str]; 4] = [
    &["_id"],
    &["name", "gender", "_id"],
    &["gender", "age", "_id"],
    &["age", "name", "_id"],
];

/// Declared (not yet normalized) human schema.
pub fn human_schema() -> Schema {
    let schema = Schema::new(HUMAN_PRIMARY_KEY)
        .field("name", FieldType::String)
        .field("gender", FieldType::String)
        .field("age", FieldType::Number)
        .index([HUMAN_PRIMARY_KEY]);
    HUMAN_INDEXES
        .iter()
        .fold(schema, |schema, fields| schema.index(fields.iter().copied()))
}

/// Opens a fresh in-memory instance over the human schema.
///
/// # Errors
///
/// Fails only if the schema does not normalize.
pub fn human_instance() -> CoreResult<StorageInstance> {
    human_instance_with(InstanceConfig::default())
}

/// Opens a fresh in-memory instance over the human schema with `config`.
///
/// # Errors
///
/// Fails only if the schema does not normalize.
pub fn human_instance_with(config: InstanceConfig) -> CoreResult<StorageInstance> {
    MemoryStorage::new().create_storage_instance(
        InstanceParams::new("testkit", "humans", human_schema()).with_config(config),
    )
}

/// Runs `f` against a fresh human instance and closes it afterwards.
///
/// # Example
///
/// ```rust,ignore
/// use revdb_testkit::with_human_instance;
///
/// #[test]
/// fn my_test() {
///     with_human_instance(|humans| {
///         humans.bulk_write(vec![WriteRow::insert(human("a", "Alice", "f", 30))])?;
///         Ok(())
///     })
///     .unwrap();
/// }
/// ```
pub fn with_human_instance<F, R>(f: F) -> CoreResult<R>
where
    F: FnOnce(&StorageInstance) -> CoreResult<R>,
{
    let instance = human_instance()?;
    let result = f(&instance);
    instance.close()?;
    result
}

/// Builds the first state of a human.
///
/// # Panics
///
/// Never: human content is always encodable.
pub fn human(id: &str, name: &str, gender: &str, age: i64) -> Document {
    Document::create(id, human_fields(name, gender, age))
        .expect("human content is always encodable")
}

/// Data fields of a human.
pub fn human_fields(name: &str, gender: &str, age: i64) -> [(&'static str, Value); 3] {
    [
        ("name", Value::from(name)),
        ("gender", Value::from(gender)),
        ("age", Value::Integer(age)),
    ]
}
