//! Error types for record construction and validation.

use thiserror::Error;

/// Errors returned while parsing fixed-width identifiers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentifierError {
    /// The identifier has the wrong number of characters.
    #[error("identifier '{value}' must be {expected} hex characters")]
    WrongLength {
        /// Rejected input.
        value: String,
        /// Required width.
        expected: usize,
    },

    /// The identifier contains characters outside `[0-9a-f]`.
    #[error("identifier '{0}' contains non-hex characters")]
    NotHex(String),
}

/// Errors returned by record-level invariants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    /// An artifact chunk did not start at the current transfer offset.
    #[error("artifact chunk at offset {got} does not continue transfer at {expected}")]
    OffsetMismatch {
        /// Offset the artifact expects next.
        expected: u64,
        /// Offset the chunk claimed.
        got: u64,
    },

    /// An artifact chunk would run past the declared artifact length.
    #[error("artifact chunk ending at {end} overruns declared length {len}")]
    Overrun {
        /// Declared artifact length.
        len: u64,
        /// End offset of the offending chunk.
        end: u64,
    },

    /// A nonce string is not 32 lowercase hex characters.
    #[error("malformed nonce '{0}'")]
    MalformedNonce(String),
}
