//! Optimistic-concurrency conflict detection.
//!
//! A write names the state it believes is current. The detector compares that
//! belief with the authoritative state and decides whether the write may
//! proceed. It never mutates anything; the write coordinator applies the
//! decision while holding the key's slot.

use crate::document::Document;
use std::fmt;

/// Why a write was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The writer named a previous state but the key does not exist.
    StaleInsert,
    /// The writer believes the key is new but it already exists.
    DuplicateInsert,
    /// Both exist but the revisions differ.
    RevisionMismatch,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::StaleInsert => "previous state given for a key that does not exist",
            Self::DuplicateInsert => "insert of a key that already exists",
            Self::RevisionMismatch => "previous revision is not the current revision",
        };
        f.write_str(text)
    }
}

/// Outcome of [`check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    /// The write may be applied.
    Accept,
    /// The write must be rejected.
    Conflict(ConflictKind),
}

impl ConflictDecision {
    /// Returns true for [`ConflictDecision::Accept`].
    pub fn is_accept(self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Decides whether a write claiming `claimed` as the previous state of `key`
/// may replace `current`.
///
/// Only revisions are compared. Two states with equal revisions are the same
/// state of the lineage, whatever their metadata says.
pub fn check(
    key: &str,
    claimed: Option<&Document>,
    current: Option<&Document>,
) -> ConflictDecision {
    let decision = match (claimed, current) {
        (None, None) => ConflictDecision::Accept,
        (Some(_), None) => ConflictDecision::Conflict(ConflictKind::StaleInsert),
        (None, Some(_)) => ConflictDecision::Conflict(ConflictKind::DuplicateInsert),
        (Some(claimed), Some(current)) if claimed.revision() == current.revision() => {
            ConflictDecision::Accept
        }
        (Some(_), Some(_)) => ConflictDecision::Conflict(ConflictKind::RevisionMismatch),
    };
    if let ConflictDecision::Conflict(kind) = decision {
        tracing::debug!(key, %kind, "write conflict");
    }
    decision
}
