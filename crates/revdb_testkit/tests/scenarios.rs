//! End-to-end write and query scenarios against a storage instance.

use revdb_core::{
    ChangeOperation, ConflictKind, CoreError, FieldType, InstanceParams, MemoryStorage, Query,
    Schema, Selector, SortField, Storage, StorageInstance, ValidationError, Value, WriteErrorStatus,
    WriteRow,
};
use revdb_testkit::{human, human_instance};

fn alice() -> revdb_core::Document {
    revdb_core::Document::create(
        "a",
        [("name", Value::from("Alice")), ("age", Value::Integer(30))],
    )
    .unwrap()
}

fn people() -> StorageInstance {
    let schema = Schema::new("_id")
        .field("name", FieldType::String)
        .field("age", FieldType::Number)
        .index(["name"])
        .index(["age", "name"]);
    MemoryStorage::new()
        .create_storage_instance(InstanceParams::new("db", "people", schema))
        .unwrap()
}

#[test]
fn insert_then_find() {
    let people = people();
    let result = people.bulk_write(vec![WriteRow::insert(alice())]).unwrap();
    assert!(result.is_success());
    assert_eq!(result.accepted[0].operation, ChangeOperation::Insert);

    let found = people.find_by_ids(&["a"], false).unwrap();
    let a = &found["a"];
    assert_eq!(a.revision().height(), 1);
    assert_eq!(a.get("name"), Some(&Value::from("Alice")));
}

#[test]
fn second_writer_on_same_previous_conflicts() {
    let people = people();
    let first = alice();
    people.bulk_write(vec![WriteRow::insert(first.clone())]).unwrap();

    let winner = first.with_field("age", 31).unwrap();
    let result = people
        .bulk_write(vec![WriteRow::update(first.clone(), winner)])
        .unwrap();
    assert!(result.is_success());
    assert_eq!(result.accepted[0].current.revision().height(), 2);

    let loser = first.with_field("age", 99).unwrap();
    let result = people.bulk_write(vec![WriteRow::update(first, loser)]).unwrap();
    let error = &result.rejected[0];
    assert_eq!(
        error.status,
        WriteErrorStatus::Conflict(ConflictKind::RevisionMismatch)
    );
    assert_eq!(error.status.code(), 409);
    let current = error.document_in_db.as_ref().unwrap();
    assert_eq!(current.revision().height(), 2);
    assert_eq!(current.get("age"), Some(&Value::Integer(31)));
}

#[test]
fn results_do_not_depend_on_index_hint() {
    let people = people();
    let names = ["Alice", "Bob", "Carol", "Dave", "Eve"];
    let rows = (0..50)
        .map(|i| {
            let doc = revdb_core::Document::create(
                format!("p{i:02}"),
                [
                    ("name", Value::from(names[i % names.len()])),
                    ("age", Value::Integer((i as i64 * 7) % 40)),
                ],
            )
            .unwrap();
            WriteRow::insert(doc)
        })
        .collect();
    assert!(people.bulk_write(rows).unwrap().is_success());

    let query = Query::new(Selector::gte("age", 18)).sort_by(SortField::asc("name"));
    let by_name = people
        .query(&people.prepare(query.clone().index(["name"])).unwrap())
        .unwrap();
    let by_age = people
        .query(&people.prepare(query.index(["age", "name"])).unwrap())
        .unwrap();

    let ids = |docs: &[std::sync::Arc<revdb_core::Document>]| {
        docs.iter().map(|d| d.id().to_string()).collect::<Vec<_>>()
    };
    assert!(!by_name.is_empty());
    assert_eq!(ids(&by_name), ids(&by_age));
    let name = |doc: &revdb_core::Document| {
        doc.get("name").and_then(Value::as_text).map(str::to_string)
    };
    assert!(by_name.windows(2).all(|w| name(&w[0]) <= name(&w[1])));
}

#[test]
fn delete_leaves_tombstone() {
    let people = people();
    let v1 = alice();
    let v2 = v1.with_field("age", 31).unwrap();
    people.bulk_write(vec![WriteRow::insert(v1.clone())]).unwrap();
    people
        .bulk_write(vec![WriteRow::update(v1, v2.clone())])
        .unwrap();

    let tombstone = v2.next_deleted().unwrap();
    let result = people
        .bulk_write(vec![WriteRow::update(v2, tombstone)])
        .unwrap();
    assert!(result.is_success());
    let event = &result.accepted[0];
    assert_eq!(event.operation, ChangeOperation::Delete);
    assert_eq!(event.current.revision().height(), 3);
    assert!(event.current.is_deleted());

    assert!(people.find_by_ids(&["a"], false).unwrap().is_empty());
    let live = people
        .prepare(Query::new(Selector::and([Selector::eq("_id", "a"), Selector::not_deleted()])))
        .unwrap();
    assert!(people.query(&live).unwrap().is_empty());

    let with_deleted = people.find_by_ids(&["a"], true).unwrap();
    assert!(with_deleted["a"].is_deleted());
}

#[test]
fn duplicate_keys_reject_whole_batch() {
    let people = people();
    let v1 = alice();
    people.bulk_write(vec![WriteRow::insert(v1.clone())]).unwrap();

    let rows = vec![
        WriteRow::update(v1.clone(), v1.with_field("age", 40).unwrap()),
        WriteRow::update(v1.clone(), v1.with_field("age", 50).unwrap()),
    ];
    let err = people.bulk_write(rows).unwrap_err();
    assert!(matches!(err, CoreError::MalformedBatch { ref id } if id == "a"));

    let found = people.find_by_ids(&["a"], false).unwrap();
    assert_eq!(found["a"].revision(), v1.revision());
    assert_eq!(people.changes_since(Default::default(), 10).unwrap().len(), 1);
}

#[test]
fn unknown_field_fails_at_prepare() {
    let people = people();
    let err = people
        .prepare(Query::new(Selector::eq("unknownField", 1)))
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Validation(ValidationError::UnknownField { ref field })
            if field == "unknownField"
    ));
    assert!(err.is_validation());
}

#[test]
fn rows_in_one_batch_are_independent() {
    let humans = human_instance().unwrap();
    let existing = human("a", "Alice", "f", 30);
    humans.bulk_write(vec![WriteRow::insert(existing)]).unwrap();

    let result = humans
        .bulk_write(vec![
            WriteRow::insert(human("a", "Again", "m", 1)),
            WriteRow::insert(human("b", "Bob", "m", 40)),
        ])
        .unwrap();
    assert_eq!(result.accepted.len(), 1);
    assert_eq!(result.accepted[0].id, "b");
    assert_eq!(
        result.rejected[0].status,
        WriteErrorStatus::Conflict(ConflictKind::DuplicateInsert)
    );
}

#[test]
fn json_queries_match_builder_queries() {
    let humans = human_instance().unwrap();
    let rows = [
        human("a", "Alice", "f", 30),
        human("b", "Bob", "m", 17),
        human("c", "Carol", "x", 64),
    ]
    .into_iter()
    .map(WriteRow::insert)
    .collect();
    humans.bulk_write(rows).unwrap();

    let json = serde_json::json!({
        "selector": { "age": { "$gte": 18 }, "gender": { "$ne": "m" } },
        "sort": [{ "age": "desc" }],
    });
    let from_json = humans.prepare(Query::from_json(&json).unwrap()).unwrap();
    let built = humans
        .prepare(
            Query::new(Selector::and([Selector::gte("age", 18), Selector::ne("gender", "m")]))
                .sort_by(SortField::desc("age")),
        )
        .unwrap();

    let ids = |q: &revdb_core::PreparedQuery| {
        humans
            .query(q)
            .unwrap()
            .iter()
            .map(|d| d.id().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&from_json), vec!["c", "a"]);
    assert_eq!(ids(&from_json), ids(&built));
}
