//! Bulk writes with optimistic concurrency.
//!
//! Each row names the state its writer believes is current and carries the
//! full new state with its revision already derived. Rows are independent:
//! one row's rejection never affects another, and every accepted row is
//! applied atomically for its key. The only batch-level failure is a batch
//! naming the same key twice, which is refused before anything is applied.

use crate::change_feed::{ChangeEvent, ChangeFeed};
use crate::conflict::{self, ConflictDecision, ConflictKind};
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::index::IndexSet;
use crate::revision::Revision;
use crate::store::{DocumentStore, Slot};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One write request.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRow {
    /// The state the writer believes is current; `None` for "does not exist".
    pub previous: Option<Document>,
    /// The full new state.
    pub document: Document,
}

impl WriteRow {
    /// A row creating a new key.
    pub fn insert(document: Document) -> Self {
        Self {
            previous: None,
            document,
        }
    }

    /// A row replacing `previous`.
    pub fn update(previous: Document, document: Document) -> Self {
        Self {
            previous: Some(previous),
            document,
        }
    }

    /// Primary key the row writes.
    pub fn id(&self) -> &str {
        self.document.id()
    }
}

/// Why a row was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteErrorStatus {
    /// The claimed previous state is not the current state.
    Conflict(ConflictKind),
    /// The new state's revision does not follow from the current state, or
    /// the row's previous and new states name different keys.
    InvalidRevision,
    /// The new state has an empty key, uses a reserved field name or the
    /// primary key's name as a data field, or cannot be encoded.
    InvalidDocument,
    /// The instance closed before the row was applied.
    InstanceClosed,
}

impl WriteErrorStatus {
    /// HTTP-style status code: 409 for conflicts, 503 for a closed instance,
    /// 422 otherwise.
    pub fn code(self) -> u16 {
        match self {
            Self::Conflict(_) => 409,
            Self::InvalidRevision | Self::InvalidDocument => 422,
            Self::InstanceClosed => 503,
        }
    }

    /// Returns true for conflicts.
    pub fn is_conflict(self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl fmt::Display for WriteErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict(kind) => write!(f, "conflict: {kind}"),
            Self::InvalidRevision => f.write_str("invalid revision"),
            Self::InvalidDocument => f.write_str("invalid document"),
            Self::InstanceClosed => f.write_str("instance closed"),
        }
    }
}

/// A rejected row together with the authoritative state it was checked against.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteError {
    /// Why the row was rejected.
    pub status: WriteErrorStatus,
    /// Primary key of the row.
    pub id: String,
    /// The rejected row, including the writer's claimed previous state.
    pub row: WriteRow,
    /// The current state at the time of the check.
    pub document_in_db: Option<Arc<Document>>,
}

/// Per-row outcome of a bulk write.
#[derive(Debug, Clone, Default)]
pub struct BulkWriteResult {
    /// One event per accepted row, in acceptance order.
    pub accepted: Vec<ChangeEvent>,
    /// Rejected rows, in input order.
    pub rejected: Vec<WriteError>,
}

impl BulkWriteResult {
    /// Returns true if every row was accepted.
    pub fn is_success(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Rejections with [`WriteErrorStatus::Conflict`].
    pub fn conflicts(&self) -> impl Iterator<Item = &WriteError> {
        self.rejected.iter().filter(|e| e.status.is_conflict())
    }
}

/// Applies write rows to one instance's store, indexes and change feed.
pub(crate) struct WriteCoordinator<'a> {
    pub(crate) collection: &'a str,
    pub(crate) primary_key: &'a str,
    pub(crate) store: &'a DocumentStore,
    pub(crate) indexes: &'a IndexSet,
    pub(crate) feed: &'a ChangeFeed,
    pub(crate) closed: &'a AtomicBool,
    pub(crate) verify_stored_revisions: bool,
}

impl WriteCoordinator<'_> {
    /// Applies `rows`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MalformedBatch`] if two rows share a key; nothing is applied
    /// - [`CoreError::InstanceClosed`] if the instance is closed on entry
    /// - [`CoreError::Corruption`] if a stored state fails verification
    ///
    /// A close arriving mid-batch is not an error: rows applied before it stay
    /// in `accepted` and the rest are rejected with
    /// [`WriteErrorStatus::InstanceClosed`].
    pub(crate) fn bulk_write(&self, rows: Vec<WriteRow>) -> CoreResult<BulkWriteResult> {
        self.ensure_open()?;

        let mut seen = HashSet::with_capacity(rows.len());
        if let Some(dup) = rows.iter().find(|row| !seen.insert(row.id())) {
            tracing::warn!(
                collection = self.collection,
                id = dup.id(),
                "rejected batch with duplicate key"
            );
            return Err(CoreError::MalformedBatch {
                id: dup.id().to_string(),
            });
        }

        let mut result = BulkWriteResult::default();
        for row in rows {
            let outcome = if self.closed.load(Ordering::Acquire) {
                Err(self.reject(WriteErrorStatus::InstanceClosed, row, None))
            } else {
                self.write_row(row)?
            };
            match outcome {
                Ok(event) => result.accepted.push(event),
                Err(error) => result.rejected.push(error),
            }
        }

        tracing::debug!(
            collection = self.collection,
            accepted = result.accepted.len(),
            rejected = result.rejected.len(),
            "bulk write"
        );
        Ok(result)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::instance_closed(self.collection));
        }
        Ok(())
    }

    fn write_row(&self, row: WriteRow) -> CoreResult<Result<ChangeEvent, WriteError>> {
        let id = row.id().to_string();

        let invalid = id.is_empty()
            || row.document.reserved_field().is_some()
            || row.document.get(self.primary_key).is_some();
        if invalid {
            let current = self.store.get(&id);
            return Ok(Err(self.reject(WriteErrorStatus::InvalidDocument, row, current)));
        }

        let slot = match self.slot_for(&id, &row) {
            Ok(slot) => slot,
            Err(status) => return Ok(Err(self.reject(status, row, None))),
        };
        let mut state = slot.lock();
        let current = state.clone();
        let Some(_open) = self.feed.hold_open() else {
            return Ok(Err(self.reject(WriteErrorStatus::InstanceClosed, row, current)));
        };

        if let Some(current) = &current {
            if self.verify_stored_revisions && !current.verify_revision().unwrap_or(false) {
                return Err(CoreError::corruption(
                    id,
                    format!("stored revision {} does not match content", current.revision()),
                ));
            }
        }

        if let ConflictDecision::Conflict(kind) =
            conflict::check(&id, row.previous.as_ref(), current.as_deref())
        {
            return Ok(Err(self.reject(WriteErrorStatus::Conflict(kind), row, current)));
        }

        let previous_height = current.as_ref().map_or(0, |c| c.revision().height());
        if let Err(status) = self.check_revision(previous_height, &row) {
            return Ok(Err(self.reject(status, row, current)));
        }

        let next = Arc::new(row.document);
        self.indexes.replace(current.as_deref(), &next);
        *state = Some(Arc::clone(&next));
        let event = self.feed.publish(current, next);
        drop(state);
        Ok(Ok(event))
    }

    /// The key's slot. A row that cannot be accepted while the key is absent
    /// is rejected without creating one, so refused keys leave nothing behind.
    fn slot_for(&self, id: &str, row: &WriteRow) -> Result<Arc<Slot>, WriteErrorStatus> {
        if let Some(slot) = self.store.existing_slot(id) {
            return Ok(slot);
        }
        if let ConflictDecision::Conflict(kind) = conflict::check(id, row.previous.as_ref(), None) {
            return Err(WriteErrorStatus::Conflict(kind));
        }
        self.check_revision(0, row)?;
        Ok(self.store.slot(id))
    }

    fn check_revision(&self, previous_height: u64, row: &WriteRow) -> Result<(), WriteErrorStatus> {
        if row.previous.as_ref().is_some_and(|p| p.id() != row.id()) {
            return Err(WriteErrorStatus::InvalidRevision);
        }
        match Revision::derive(previous_height, &row.document.content()) {
            Ok(expected) if &expected == row.document.revision() => Ok(()),
            Ok(_) | Err(CoreError::HeightOverflow { .. }) => {
                Err(WriteErrorStatus::InvalidRevision)
            }
            Err(_) => Err(WriteErrorStatus::InvalidDocument),
        }
    }

    fn reject(
        &self,
        status: WriteErrorStatus,
        row: WriteRow,
        document_in_db: Option<Arc<Document>>,
    ) -> WriteError {
        tracing::debug!(collection = self.collection, id = row.id(), %status, "row rejected");
        WriteError {
            status,
            id: row.id().to_string(),
            row,
            document_in_db,
        }
    }
}
