//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the object store and its on-disk formats.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object envelope or body does not parse.
    #[error("malformed object: {0}")]
    MalformedObject(String),

    /// Object-type code outside the known range.
    #[error("unknown object type: {0}")]
    UnknownObjectType(String),

    /// Object or reference lookup failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one object matches an abbreviated hash.
    #[error("ambiguous object prefix: {0}")]
    AmbiguousPrefix(String),

    /// Reference file does not parse.
    #[error("invalid reference: {0}")]
    InvalidRef(String),

    /// Staging index does not parse or fails its checksum.
    #[error("malformed index: {0}")]
    MalformedIndex(String),

    /// Compression or decompression failure.
    #[error("compression error: {0}")]
    Compression(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
