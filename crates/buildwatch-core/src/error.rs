//! Error types for build tracking operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    /// The record store is unavailable or rejected an operation. Fatal for
    /// the current write; never retried here.
    #[error("Store error: {0}")]
    Store(#[from] lineage_store::StoreError),

    /// Git metadata capture failed.
    #[error("Git error: {0}")]
    Git(String),

    /// A required ambient attribute was missing from the build context.
    #[error("Missing build context: {0}")]
    MissingContext(String),
}

/// Result type for build tracking operations
pub type Result<T> = std::result::Result<T, TrackerError>;
