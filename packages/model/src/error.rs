//! Error types for the document model.

use thiserror::Error;

/// Errors raised by the document model.
///
/// Every variant is a distinct, matchable code so callers can tell a
/// desynchronized collaboration session (`VersionMismatch`) apart from a
/// plain programming error (invalid positions, history misuse). None of
/// these are retried internally; a failed application aborts the change
/// batch it belongs to.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("operation base version {expected} does not match document version {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    #[error("no root named {0:?}")]
    NoSuchRoot(String),

    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("offset {offset} out of bounds (max {max})")]
    OffsetOutOfBounds { offset: usize, max: usize },

    #[error("expected an element at the addressed offset")]
    NotAnElement,

    #[error("element name mismatch: expected {expected:?}, found {found:?}")]
    NameMismatch { expected: String, found: String },

    #[error("attribute {key:?} does not have the expected prior value")]
    AttributeMismatch { key: String },

    #[error("marker {0:?} does not have the expected prior range")]
    MarkerMismatch(String),

    #[error("version {0} does not lie on a delta boundary")]
    HistoryPointNotFound(u64),

    #[error("no history entry for delta")]
    UnknownDelta,
}
