//! Error types shared across the driver and memory seams.

use thiserror::Error;

/// Driver execution errors. Everything recoverable stays inside the REPL
/// loop; these variants are what escapes to the caller.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DriverError {
    /// The root model failed persistently (after bounded retries).
    #[error("provider error: {0}")]
    Provider(String),

    /// The interpreter itself failed outside user code.
    #[error("driver crashed: {0}")]
    Crashed(String),

    /// The terminal payload could not be produced even by the
    /// extract fallback.
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// Catch-all. Include context.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Memory store errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database could not be opened.
    #[error("open failed: {0}")]
    OpenFailed(String),

    /// A write operation failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A query against the store failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Serialization or deserialization of a stored document failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A pack file was malformed.
    #[error("bad pack: {0}")]
    BadPack(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
