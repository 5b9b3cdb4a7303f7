//! Lineage-Store: build record persistence for Buildwatch
//!
//! This crate provides the persistence layer for build lineage tracking.
//! It defines the `HistoryStore` abstraction (point get, secondary-index
//! query with filters and descending sort, field-merge update) and the
//! three persisted record shapes:
//!
//! - `HistoryEntry`: one per build, keyed by lineage (`source_id`) and a
//!   composite `version_key`
//! - `ProjectSummaryRecord`: one per repository, latest status per project
//! - `BranchStatusRecord`: one per commit within a lineage
//!
//! Backends: `SurrealHistoryStore` for production, `fakes::MemoryHistoryStore`
//! for tests.

mod error;
pub mod fakes;
mod migrations;
pub mod schema;
pub mod storage;
mod surreal_store;

pub use error::StoreError;
pub use migrations::init_schema;
pub use schema::{
    BranchStatusRecord, BuildStatus, HistoryEntry, ProjectStatus, ProjectSummaryRecord,
    PROJECT_SUMMARY_PARTITION,
};
pub use storage::{
    digest_key, FieldCondition, FieldPath, FieldPatch, Fields, HistoryStore, IndexQuery,
    RecordKey, StoreResult, COMMIT_HASH_INDEX,
};
pub use surreal_store::{SurrealHistoryStore, DEFAULT_TABLE};
