//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur during pack ingest and fetch.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Pack header or record does not parse.
    #[error("malformed pack: {0}")]
    MalformedPack(String),

    /// Deltas remained after a resolver pass that made no progress.
    #[error("unresolvable delta: {0}")]
    UnresolvableDelta(String),

    /// Pkt-line frame does not parse.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// The server response violated the smart HTTP protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Credentials were not supplied.
    #[error("missing credentials: {0}")]
    AuthMissing(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] grit_storage::StorageError),

    /// HTTP transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
