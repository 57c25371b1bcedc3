//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while canonicalizing values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode value to CBOR.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// NaN has no canonical form and is rejected.
    #[error("NaN values are forbidden")]
    NaNForbidden,

    /// Value nesting exceeds the encoder's depth limit.
    #[error("value nesting exceeds {limit} levels")]
    NestingTooDeep {
        /// Maximum supported depth.
        limit: usize,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }
}
