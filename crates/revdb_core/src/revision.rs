//! Revision identifiers.
//!
//! A revision is a height plus a SHA-256 digest of the document's canonical
//! content. Height starts at 1 when a key is created and grows by one with
//! every accepted write, deletions included. The digest covers the document
//! content only: never the revision itself and never write metadata.

use crate::error::{CoreError, CoreResult};
use revdb_codec::{to_canonical_cbor, CodecResult, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a revision digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Height and content digest of one document state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Revision {
    height: u64,
    digest: [u8; DIGEST_LEN],
}

impl Revision {
    /// Derives the revision that follows `previous_height` for `content`.
    ///
    /// Pass `0` when the key does not exist yet.
    ///
    /// # Errors
    ///
    /// - [`CoreError::HeightOverflow`] if `previous_height` is `u64::MAX`
    /// - [`CoreError::Codec`] if the content has no canonical encoding (NaN,
    ///   excessive nesting)
    pub fn derive(previous_height: u64, content: &Value) -> CoreResult<Self> {
        let height = previous_height
            .checked_add(1)
            .ok_or(CoreError::HeightOverflow { previous_height })?;
        Ok(Self {
            height,
            digest: Self::digest_of(content)?,
        })
    }

    /// Builds a revision from raw parts without checking them.
    #[must_use]
    pub const fn from_parts(height: u64, digest: [u8; DIGEST_LEN]) -> Self {
        Self { height, digest }
    }

    /// Computes the content digest.
    pub fn digest_of(content: &Value) -> CodecResult<[u8; DIGEST_LEN]> {
        let bytes = to_canonical_cbor(content)?;
        Ok(Sha256::digest(&bytes).into())
    }

    /// Returns the height.
    #[must_use]
    pub const fn height(&self) -> u64 {
        self.height
    }

    /// Returns the content digest.
    #[must_use]
    pub const fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Returns true if this revision is exactly `derive(height - 1, content)`.
    pub fn matches_content(&self, content: &Value) -> CodecResult<bool> {
        Ok(self.height > 0 && Self::digest_of(content)? == self.digest)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.height)?;
        for byte in &self.digest {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short digest prefix keeps test output readable.
        write!(f, "Revision({}-", self.height)?;
        for byte in &self.digest[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}

/// Error returned when parsing the `"<height>-<hex>"` form fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid revision string {input:?}")]
pub struct RevisionParseError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for Revision {
    type Err = RevisionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || RevisionParseError {
            input: s.to_string(),
        };

        let (height, hex) = s.split_once('-').ok_or_else(err)?;
        let height: u64 = height.parse().map_err(|_| err())?;
        if height == 0 || hex.len() != DIGEST_LEN * 2 || !hex.is_ascii() {
            return Err(err());
        }

        let mut digest = [0u8; DIGEST_LEN];
        for (i, byte) in digest.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }

        Ok(Self { height, digest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn alice() -> Value {
        Value::object([
            ("_id", Value::from("a")),
            ("name", Value::from("Alice")),
            ("age", Value::Integer(30)),
        ])
    }

    #[test]
    fn first_revision_has_height_one() {
        let rev = Revision::derive(0, &alice()).unwrap();
        assert_eq!(rev.height(), 1);
        assert!(rev.matches_content(&alice()).unwrap());
    }

    #[test]
    fn height_follows_previous() {
        let rev = Revision::derive(41, &alice()).unwrap();
        assert_eq!(rev.height(), 42);
    }

    #[test]
    fn highest_height_has_no_successor() {
        let err = Revision::derive(u64::MAX, &alice()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::HeightOverflow {
                previous_height: u64::MAX
            }
        ));
        assert_eq!(Revision::derive(u64::MAX - 1, &alice()).unwrap().height(), u64::MAX);
    }

    #[test]
    fn digest_ignores_field_order() {
        let reordered = Value::Map(vec![
            (Value::from("age"), Value::Integer(30)),
            (Value::from("name"), Value::from("Alice")),
            (Value::from("_id"), Value::from("a")),
        ]);
        assert_eq!(
            Revision::derive(0, &alice()).unwrap(),
            Revision::derive(0, &reordered).unwrap()
        );
    }

    #[test]
    fn digest_changes_with_content() {
        let older = Value::object([("_id", Value::from("a")), ("age", Value::Integer(30))]);
        let newer = Value::object([("_id", Value::from("a")), ("age", Value::Integer(31))]);
        assert_ne!(
            Revision::derive(1, &older).unwrap(),
            Revision::derive(1, &newer).unwrap()
        );
    }

    #[test]
    fn string_form_roundtrip() {
        let rev = Revision::derive(2, &alice()).unwrap();
        let text = rev.to_string();
        assert!(text.starts_with("3-"));
        assert_eq!(text.len(), 2 + DIGEST_LEN * 2);
        assert_eq!(text.parse::<Revision>().unwrap(), rev);
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!("".parse::<Revision>().is_err());
        assert!("3".parse::<Revision>().is_err());
        assert!("0-00".parse::<Revision>().is_err());
        assert!(format!("x-{}", "0".repeat(64)).parse::<Revision>().is_err());
        assert!(format!("1-{}", "g".repeat(64)).parse::<Revision>().is_err());
    }

    #[test]
    fn zero_height_never_matches() {
        let digest = Revision::digest_of(&alice()).unwrap();
        assert!(!Revision::from_parts(0, digest)
            .matches_content(&alice())
            .unwrap());
    }

    proptest! {
        #[test]
        fn derive_is_deterministic(
            height in 0u64..1_000_000,
            name in "[a-zA-Z]{0,12}",
            age in any::<i64>(),
        ) {
            let content = Value::object([
                ("name", Value::Text(name)),
                ("age", Value::Integer(age)),
            ]);
            let first = Revision::derive(height, &content).unwrap();
            let second = Revision::derive(height, &content.clone()).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(first.height(), height + 1);
        }
    }
}
