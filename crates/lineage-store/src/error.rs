//! Error types for lineage-store

use thiserror::Error;

/// Errors that can occur in the build record persistence layer.
///
/// A missing record is never an error: `get` returns `Ok(None)` and
/// `query_index` returns an empty vec. Errors here mean the store itself
/// is unavailable or was addressed incorrectly.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection error
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// Database query/write error
    #[error("Store operation failed: {0}")]
    Backend(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A nested field path addressed a map field that does not exist on
    /// the target record. Callers must probe record existence and write
    /// the whole map on first write.
    #[error("Invalid field path '{path}': parent map field does not exist")]
    InvalidPath { path: String },
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
