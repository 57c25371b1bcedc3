//! Error types for revdb core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in revdb core operations.
///
/// Write conflicts are not errors: they are reported per row in
/// [`BulkWriteResult`](crate::BulkWriteResult).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Canonical encoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] revdb_codec::CodecError),

    /// A query, schema or index definition failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A bulk write contained more than one row for the same key.
    #[error("malformed batch: primary key {id:?} appears more than once")]
    MalformedBatch {
        /// The duplicated primary key.
        id: String,
    },

    /// The storage instance has been closed.
    #[error("storage instance {collection} is closed")]
    InstanceClosed {
        /// Collection name of the closed instance.
        collection: String,
    },

    /// A document's height cannot grow any further.
    #[error("revision height {previous_height} has no successor")]
    HeightOverflow {
        /// Height of the state being replaced.
        previous_height: u64,
    },

    /// Stored state failed an integrity check.
    #[error("corrupted state for {id:?}: {message}")]
    Corruption {
        /// Primary key of the affected document.
        id: String,
        /// Description of the corruption.
        message: String,
    },
}

impl CoreError {
    /// Creates a corruption error.
    pub fn corruption(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corruption {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Creates a closed-instance error.
    pub fn instance_closed(collection: impl Into<String>) -> Self {
        Self::InstanceClosed {
            collection: collection.into(),
        }
    }

    /// Returns true if the caller can recover by fixing its input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Reasons a schema, query or index hint is rejected at prepare time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A field path is not declared in the schema.
    #[error("unknown field {field:?}")]
    UnknownField {
        /// The undeclared field path.
        field: String,
    },

    /// An index hint does not name a registered index.
    #[error("no index registered for fields {fields:?}")]
    UnknownIndex {
        /// Fields of the requested index.
        fields: Vec<String>,
    },

    /// A sort direction other than `asc`/`desc`.
    #[error("invalid sort direction {direction:?} for field {field:?}")]
    InvalidSortDirection {
        /// Field being sorted.
        field: String,
        /// The rejected direction.
        direction: String,
    },

    /// A selector value does not fit the declared field type.
    #[error("field {field:?} is declared {expected} but the selector compares it with {found}")]
    TypeMismatch {
        /// Field path.
        field: String,
        /// Declared type.
        expected: String,
        /// Type of the selector operand.
        found: String,
    },

    /// A selector operand is or contains NaN, which compares with nothing.
    #[error("field {field:?} is compared with NaN")]
    NanOperand {
        /// Field path.
        field: String,
    },

    /// A selector is structurally invalid.
    #[error("invalid selector: {message}")]
    InvalidSelector {
        /// Description of the problem.
        message: String,
    },

    /// A query document is structurally invalid.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// A schema is structurally invalid.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the problem.
        message: String,
    },
}

impl ValidationError {
    /// Creates an unknown field error.
    pub fn unknown_field(field: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
        }
    }

    /// Creates an invalid selector error.
    pub fn invalid_selector(message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            message: message.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }
}
