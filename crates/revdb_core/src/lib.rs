//! # revdb Core
//!
//! Revision-tracked document storage with an index-invariant query layer.
//!
//! This crate provides:
//! - Content-addressed, height-stamped document revisions
//! - Optimistic-concurrency bulk writes with per-key atomicity
//! - A query planner that validates queries against a schema and binds them
//!   to an index
//! - A query executor whose results do not depend on the chosen index
//! - Change feeds with bounded, drop-oldest subscriber queues
//! - Storage instances tying the above together per collection
//!
//! ## Usage
//!
//! ```rust,ignore
//! use revdb_core::*;
//!
//! let schema = Schema::new("_id")
//!     .field("name", FieldType::String)
//!     .field("age", FieldType::Number)
//!     .index(["age"]);
//! let humans = MemoryStorage::new()
//!     .create_storage_instance(InstanceParams::new("db", "humans", schema))?;
//!
//! let query = humans.prepare(
//!     Query::new(Selector::gte("age", 18)).sort_by(SortField::asc("name")),
//! )?;
//! let adults = humans.query(&query)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod config;
mod conflict;
mod document;
mod error;
mod index;
mod instance;
pub mod query;
mod revision;
mod schema;
mod store;
mod types;
mod write;

pub use change_feed::{ChangeEvent, ChangeOperation, ChangeStream};
pub use config::InstanceConfig;
pub use conflict::{check as check_conflict, ConflictDecision, ConflictKind};
pub use document::{Document, DocumentMeta, DELETED_FIELD, LWT_FIELD, RESERVED_FIELDS};
pub use error::{CoreError, CoreResult, ValidationError};
pub use index::{BTreeIndex, IndexKey};
pub use instance::{
    ChangedDocuments, Checkpoint, InstanceInfo, InstanceParams, MemoryStorage, Storage,
    StorageInstance,
};
pub use query::{prepare, PreparedQuery, Query, Selector, SortDirection, SortField};
pub use revision::{Revision, RevisionParseError, DIGEST_LEN};
pub use schema::{FieldSchema, FieldType, Schema};
pub use types::{InstanceToken, SequenceNumber, Timestamp};
pub use write::{BulkWriteResult, WriteError, WriteErrorStatus, WriteRow};

pub use revdb_codec::Value;
