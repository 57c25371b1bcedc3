//! Storage instances and the factory that creates them.
//!
//! A [`StorageInstance`] is the per-collection service: every write, read,
//! query and subscription for one collection goes through it. Instances are
//! created explicitly through a [`Storage`] factory and owned by the caller;
//! cloning an instance shares it.
//!
//! # Example
//!
//! ```rust,ignore
//! use revdb_core::{InstanceParams, MemoryStorage, Storage, WriteRow, Document};
//!
//! let storage = MemoryStorage::new();
//! let humans = storage.create_storage_instance(InstanceParams::new("db", "humans", schema))?;
//!
//! let alice = Document::create("a", [("name", "Alice".into()), ("age", 30.into())])?;
//! let result = humans.bulk_write(vec![WriteRow::insert(alice)])?;
//! assert!(result.is_success());
//!
//! let found = humans.find_by_ids(&["a"], false)?;
//! humans.close()?;
//! ```

use crate::change_feed::{ChangeEvent, ChangeFeed, ChangeStream};
use crate::config::InstanceConfig;
use crate::document::{Document, LWT_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::index::IndexSet;
use crate::query::{executor, prepare, PreparedQuery, Query, Selector, SortField};
use crate::schema::Schema;
use crate::store::DocumentStore;
use crate::types::{InstanceToken, SequenceNumber, Timestamp};
use crate::write::{BulkWriteResult, WriteCoordinator, WriteRow};
use revdb_codec::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything a factory needs to create an instance.
#[derive(Debug, Clone)]
pub struct InstanceParams {
    /// Name of the owning database.
    pub database_name: String,
    /// Name of the collection.
    pub collection_name: String,
    /// Token distinguishing this instance from others over the same collection.
    pub instance_token: InstanceToken,
    /// Collection schema, indexes included.
    pub schema: Schema,
    /// Instance tuning.
    pub config: InstanceConfig,
}

impl InstanceParams {
    /// Parameters with a fresh token and default configuration.
    pub fn new(
        database_name: impl Into<String>,
        collection_name: impl Into<String>,
        schema: Schema,
    ) -> Self {
        Self {
            database_name: database_name.into(),
            collection_name: collection_name.into(),
            instance_token: InstanceToken::new(),
            schema,
            config: InstanceConfig::default(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: InstanceConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the instance token.
    #[must_use]
    pub fn with_token(mut self, token: InstanceToken) -> Self {
        self.instance_token = token;
        self
    }
}

/// A storage backend able to create instances.
///
/// Every backend must give its instances the observable semantics of
/// [`StorageInstance`].
pub trait Storage: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Creates an instance bound to `params.schema`.
    ///
    /// # Errors
    ///
    /// Fails if the schema does not normalize.
    fn create_storage_instance(&self, params: InstanceParams) -> CoreResult<StorageInstance>;
}

/// Backend keeping all state in process memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStorage;

impl MemoryStorage {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn create_storage_instance(&self, params: InstanceParams) -> CoreResult<StorageInstance> {
        StorageInstance::open(params)
    }
}

/// Position in the `(last-write time, primary key)` order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint {
    /// Last-write time of the last document seen.
    pub lwt: Timestamp,
    /// Primary key of the last document seen.
    pub id: String,
}

/// Output of [`StorageInstance::changed_documents_since`].
#[derive(Debug, Clone)]
pub struct ChangedDocuments {
    /// Documents after the input checkpoint, oldest write first.
    pub documents: Vec<Arc<Document>>,
    /// Checkpoint after the last returned document.
    pub checkpoint: Option<Checkpoint>,
}

/// Row counts of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstanceInfo {
    /// Stored keys, tombstones included.
    pub total: usize,
    /// Keys whose current state is not deleted.
    pub live: usize,
    /// Keys whose current state is a tombstone.
    pub deleted: usize,
}

struct Inner {
    database_name: String,
    collection_name: String,
    token: InstanceToken,
    schema: Schema,
    config: InstanceConfig,
    store: DocumentStore,
    indexes: IndexSet,
    feed: ChangeFeed,
    closed: AtomicBool,
}

/// The per-collection storage service.
#[derive(Clone)]
pub struct StorageInstance {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StorageInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageInstance")
            .field("database", &self.inner.database_name)
            .field("collection", &self.inner.collection_name)
            .field("token", &self.inner.token)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl StorageInstance {
    fn open(params: InstanceParams) -> CoreResult<Self> {
        let schema = params.schema.normalize()?;
        let indexes = IndexSet::new(&schema.primary_key, &schema.indexes);
        let feed = ChangeFeed::new(
            params.config.change_buffer_capacity,
            params.config.change_history,
        );

        tracing::info!(
            database = %params.database_name,
            collection = %params.collection_name,
            token = %params.instance_token,
            indexes = indexes.len(),
            "storage instance created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                database_name: params.database_name,
                collection_name: params.collection_name,
                token: params.instance_token,
                schema,
                config: params.config,
                store: DocumentStore::new(),
                indexes,
                feed,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Name of the owning database.
    pub fn database_name(&self) -> &str {
        &self.inner.database_name
    }

    /// Name of the collection.
    pub fn collection_name(&self) -> &str {
        &self.inner.collection_name
    }

    /// This instance's token.
    pub fn token(&self) -> InstanceToken {
        self.inner.token
    }

    /// The normalized schema.
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Returns true after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_closed() {
            return Err(CoreError::instance_closed(&self.inner.collection_name));
        }
        Ok(())
    }

    /// Applies a batch of write rows. See [`WriteRow`] for the protocol.
    ///
    /// # Errors
    ///
    /// Conflicts are reported per row in the result. The call itself fails
    /// for a batch naming a key twice, an instance already closed on entry,
    /// or corrupted state. Rows a concurrent [`close`](Self::close) cut off
    /// are rejected with [`WriteErrorStatus::InstanceClosed`](crate::WriteErrorStatus).
    pub fn bulk_write(&self, rows: Vec<WriteRow>) -> CoreResult<BulkWriteResult> {
        let inner = &self.inner;
        WriteCoordinator {
            collection: &inner.collection_name,
            primary_key: &inner.schema.primary_key,
            store: &inner.store,
            indexes: &inner.indexes,
            feed: &inner.feed,
            closed: &inner.closed,
            verify_stored_revisions: inner.config.verify_stored_revisions,
        }
        .bulk_write(rows)
    }

    /// Current states of the given keys. Absent keys are left out, and so are
    /// tombstones unless `include_deleted` is set.
    pub fn find_by_ids<S: AsRef<str>>(
        &self,
        ids: &[S],
        include_deleted: bool,
    ) -> CoreResult<BTreeMap<String, Arc<Document>>> {
        self.ensure_open()?;
        Ok(ids
            .iter()
            .filter_map(|id| self.inner.store.get(id.as_ref()))
            .filter(|doc| include_deleted || !doc.is_deleted())
            .map(|doc| (doc.id().to_string(), doc))
            .collect())
    }

    /// Prepares a query against this instance's schema.
    pub fn prepare(&self, query: Query) -> CoreResult<PreparedQuery> {
        Ok(prepare(&self.inner.schema, query)?)
    }

    /// Runs a prepared query.
    ///
    /// Tombstones are included unless the selector excludes them.
    pub fn query(&self, query: &PreparedQuery) -> CoreResult<Vec<Arc<Document>>> {
        self.ensure_open()?;
        executor::execute(&self.inner.store, &self.inner.indexes, query)
    }

    /// Number of documents matching a prepared query, ignoring skip and limit.
    pub fn count(&self, query: &PreparedQuery) -> CoreResult<usize> {
        self.ensure_open()?;
        executor::count(&self.inner.store, &self.inner.indexes, query)
    }

    /// Up to `limit` documents written after `checkpoint`, ordered by
    /// last-write time then primary key. Tombstones are included.
    pub fn changed_documents_since(
        &self,
        limit: usize,
        checkpoint: Option<&Checkpoint>,
    ) -> CoreResult<ChangedDocuments> {
        self.ensure_open()?;
        let pk = self.inner.schema.primary_key.clone();

        let selector = match checkpoint {
            None => Selector::All,
            Some(cp) => {
                let lwt = lwt_value(cp.lwt);
                Selector::and([
                    Selector::gte(LWT_FIELD, lwt.clone()),
                    Selector::or([
                        Selector::gt(LWT_FIELD, lwt.clone()),
                        Selector::and([
                            Selector::eq(LWT_FIELD, lwt),
                            Selector::gt(pk.clone(), cp.id.clone()),
                        ]),
                    ]),
                ])
            }
        };
        let query = Query::new(selector)
            .sort_by(SortField::asc(LWT_FIELD))
            .sort_by(SortField::asc(pk.clone()))
            .limit(limit)
            .index([LWT_FIELD.to_string(), pk]);
        let prepared = prepare(&self.inner.schema, query)?;
        let documents = executor::execute(&self.inner.store, &self.inner.indexes, &prepared)?;

        let checkpoint = documents
            .last()
            .map(|doc| Checkpoint {
                lwt: doc.lwt(),
                id: doc.id().to_string(),
            })
            .or_else(|| checkpoint.cloned());
        Ok(ChangedDocuments {
            documents,
            checkpoint,
        })
    }

    /// Subscribes to change events of accepted writes.
    pub fn subscribe(&self) -> CoreResult<ChangeStream> {
        self.ensure_open()?;
        Ok(self.inner.feed.subscribe())
    }

    /// Retained change events after `cursor`, up to `limit`.
    pub fn changes_since(
        &self,
        cursor: SequenceNumber,
        limit: usize,
    ) -> CoreResult<Vec<ChangeEvent>> {
        self.ensure_open()?;
        Ok(self.inner.feed.poll(cursor, limit))
    }

    /// Row counts.
    pub fn info(&self) -> CoreResult<InstanceInfo> {
        self.ensure_open()?;
        let documents = self.inner.store.documents();
        let deleted = documents.iter().filter(|d| d.is_deleted()).count();
        Ok(InstanceInfo {
            total: documents.len(),
            live: documents.len() - deleted,
            deleted,
        })
    }

    /// Closes the instance. Every later operation fails with
    /// [`CoreError::InstanceClosed`] and subscriptions end. Closing twice is
    /// a no-op.
    pub fn close(&self) -> CoreResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.feed.close();
        tracing::info!(
            database = %self.inner.database_name,
            collection = %self.inner.collection_name,
            "storage instance closed"
        );
        Ok(())
    }
}

fn lwt_value(lwt: Timestamp) -> Value {
    Value::Integer(i64::try_from(lwt.as_micros()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictKind;
    use crate::revision::Revision;
    use crate::schema::FieldType;
    use crate::write::WriteErrorStatus;

    fn instance() -> StorageInstance {
        let schema = Schema::new("_id")
            .field("name", FieldType::String)
            .field("age", FieldType::Number)
            .index(["age"]);
        MemoryStorage::new()
            .create_storage_instance(InstanceParams::new("db", "humans", schema))
            .unwrap()
    }

    fn human(id: &str, age: i64) -> Document {
        Document::create(id, [("name", Value::from(id)), ("age", Value::Integer(age))]).unwrap()
    }

    #[test]
    fn insert_then_find() {
        let db = instance();
        let result = db.bulk_write(vec![WriteRow::insert(human("a", 30))]).unwrap();
        assert!(result.is_success());
        assert_eq!(result.accepted[0].sequence, SequenceNumber::new(1));

        let found = db.find_by_ids(&["a", "missing"], false).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["a"].revision().height(), 1);
    }

    #[test]
    fn stale_write_reports_current_state() {
        let db = instance();
        let v1 = human("a", 30);
        db.bulk_write(vec![WriteRow::insert(v1.clone())]).unwrap();
        let v2 = v1.with_field("age", 31).unwrap();
        db.bulk_write(vec![WriteRow::update(v1.clone(), v2.clone())]).unwrap();

        let late = v1.with_field("age", 32).unwrap();
        let result = db.bulk_write(vec![WriteRow::update(v1, late)]).unwrap();
        let error = &result.rejected[0];
        assert_eq!(error.status, WriteErrorStatus::Conflict(ConflictKind::RevisionMismatch));
        assert_eq!(error.status.code(), 409);
        assert_eq!(error.document_in_db.as_deref(), Some(&v2));
    }

    #[test]
    fn wrong_revision_is_invalid() {
        let db = instance();
        let v1 = human("a", 30);
        db.bulk_write(vec![WriteRow::insert(v1.clone())]).unwrap();

        let forged = Document::from_parts(
            "a",
            v1.data().clone(),
            false,
            *v1.meta(),
            *v1.revision(),
        );
        let result = db.bulk_write(vec![WriteRow::update(v1.clone(), forged)]).unwrap();
        assert_eq!(result.rejected[0].status, WriteErrorStatus::InvalidRevision);
        assert_eq!(db.find_by_ids(&["a"], true).unwrap()["a"].as_ref(), &v1);
    }

    #[test]
    fn refused_rows_on_absent_keys_leave_no_slot() {
        let db = instance();
        let ghost = human("ghost", 1);
        let stale = WriteRow::update(ghost.clone(), ghost.with_field("age", 2).unwrap());
        let skipped = Document::from_parts(
            "skipped",
            ghost.data().clone(),
            false,
            *ghost.meta(),
            Revision::from_parts(5, *ghost.revision().digest()),
        );

        let result = db.bulk_write(vec![stale, WriteRow::insert(skipped)]).unwrap();
        let statuses: Vec<_> = result.rejected.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            [
                WriteErrorStatus::Conflict(ConflictKind::StaleInsert),
                WriteErrorStatus::InvalidRevision,
            ]
        );
        assert!(result.rejected.iter().all(|e| e.document_in_db.is_none()));
        assert_eq!(db.inner.store.slot_count(), 0);

        db.bulk_write(vec![WriteRow::insert(human("real", 3))]).unwrap();
        assert_eq!(db.inner.store.slot_count(), 1);
    }

    #[test]
    fn reserved_fields_are_invalid() {
        let db = instance();
        let doc = Document::create("a", [("_meta", Value::Null)]).unwrap();
        let result = db.bulk_write(vec![WriteRow::insert(doc)]).unwrap();
        assert_eq!(result.rejected[0].status, WriteErrorStatus::InvalidDocument);
        assert!(db.find_by_ids(&["a"], true).unwrap().is_empty());
    }

    #[test]
    fn changed_documents_follow_checkpoints() {
        let db = instance();
        let rows = (0..5).map(|i| WriteRow::insert(human(&format!("k{i}"), i))).collect();
        db.bulk_write(rows).unwrap();

        let first = db.changed_documents_since(3, None).unwrap();
        let ids: Vec<&str> = first.documents.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["k0", "k1", "k2"]);

        let rest = db.changed_documents_since(10, first.checkpoint.as_ref()).unwrap();
        let ids: Vec<&str> = rest.documents.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["k3", "k4"]);

        let empty = db.changed_documents_since(10, rest.checkpoint.as_ref()).unwrap();
        assert!(empty.documents.is_empty());
        assert_eq!(empty.checkpoint, rest.checkpoint);
    }

    #[test]
    fn info_counts_tombstones() {
        let db = instance();
        let a = human("a", 1);
        db.bulk_write(vec![WriteRow::insert(a.clone()), WriteRow::insert(human("b", 2))])
            .unwrap();
        db.bulk_write(vec![WriteRow::update(a.clone(), a.next_deleted().unwrap())])
            .unwrap();
        assert_eq!(
            db.info().unwrap(),
            InstanceInfo {
                total: 2,
                live: 1,
                deleted: 1
            }
        );
    }

    #[test]
    fn events_are_published_in_order() {
        let db = instance();
        let stream = db.subscribe().unwrap();
        let a = human("a", 1);
        db.bulk_write(vec![WriteRow::insert(a.clone())]).unwrap();
        db.bulk_write(vec![WriteRow::update(a.clone(), a.next_deleted().unwrap())])
            .unwrap();

        let events = stream.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].previous.as_deref(), Some(&a));
        assert_eq!(db.changes_since(SequenceNumber::new(1), 10).unwrap().len(), 1);
    }

    #[test]
    fn closed_instance_rejects_everything() {
        let db = instance();
        let stream = db.subscribe().unwrap();
        db.close().unwrap();
        db.close().unwrap();

        assert!(matches!(
            db.bulk_write(vec![WriteRow::insert(human("a", 1))]),
            Err(CoreError::InstanceClosed { .. })
        ));
        assert!(db.find_by_ids(&["a"], true).is_err());
        assert!(db.subscribe().is_err());
        assert!(db.info().is_err());
        let prepared = db.prepare(Query::default()).unwrap();
        assert!(db.query(&prepared).is_err());
        assert!(stream.recv().is_none());
    }
}
