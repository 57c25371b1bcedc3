//! # revdb Codec
//!
//! The [`Value`] type documents are made of, its JSON bridge, and the
//! canonical CBOR form revision digests are computed over.
//!
//! Canonical here means a value has exactly one byte representation: map
//! entry order is normalized, heads are minimal, and `30.0` is written as
//! `30`. [`to_canonical_cbor`] lists the rules.
//!
//! ```
//! use revdb_codec::{to_canonical_cbor, Value};
//!
//! let a = Value::object([("b", Value::Integer(1)), ("a", Value::Float(2.0))]);
//! let b = Value::object([("a", Value::Integer(2)), ("b", Value::Integer(1))]);
//! assert_eq!(to_canonical_cbor(&a).unwrap(), to_canonical_cbor(&b).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod encoder;
mod error;
mod json;
mod value;

pub use encoder::{to_canonical_cbor, CanonicalEncoder, MAX_NESTING_DEPTH};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Anything with a canonical CBOR form.
pub trait Encode {
    /// Canonical bytes for `self`.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}
