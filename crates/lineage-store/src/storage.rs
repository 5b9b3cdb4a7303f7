//! Storage trait definition for build records
//!
//! `HistoryStore` is the key-value abstraction the lineage and aggregation
//! logic writes through:
//! - point `get` by composite (partition, sort) key
//! - secondary-index `query_index` with server-side filter and descending sort
//! - field-merge `update` that sets only the supplied fields, creating the
//!   record if absent and never clearing omitted fields
//!
//! The trait is async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module; the production backend is SurrealDB.

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Result type for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Raw stored record: field name to JSON value.
pub type Fields = serde_json::Map<String, Value>;

/// Name of the secondary index over `commit_hash`.
pub const COMMIT_HASH_INDEX: &str = "commit_hash_index";

/// SHA-256 hex digest of a string value.
///
/// Used to derive sort keys from values that are unsuitable as key
/// material directly (repository URLs, source refs). The digest is an
/// opaque URL-safe identifier, not a compatibility surface.
pub fn digest_key(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Composite primary key of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Partition component (`source_id` for lineage entries).
    pub partition: String,
    /// Sort/range component (`version_key`).
    pub sort: String,
}

impl RecordKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        RecordKey {
            partition: partition.into(),
            sort: sort.into(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.partition, self.sort)
    }
}

/// Path to a field being set by an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPath {
    /// Top-level scalar or map field.
    Top(String),
    /// One key inside an existing top-level map field.
    ///
    /// Setting a nested path fails with `StoreError::InvalidPath` when the
    /// parent map does not exist on the record.
    Nested(String, String),
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldPath::Top(name) => write!(f, "{name}"),
            FieldPath::Nested(map, key) => write!(f, "{map}.{key}"),
        }
    }
}

/// A set of field assignments applied as one merge update.
///
/// Only the listed fields are written; everything else on the record is
/// left untouched. Field-name escaping against the backend's reserved
/// vocabulary is an adapter concern and not visible here.
#[derive(Debug, Clone, Default)]
pub struct FieldPatch {
    sets: Vec<(FieldPath, Value)>,
}

impl FieldPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a top-level field.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.push((FieldPath::Top(name.into()), value.into()));
        self
    }

    /// Set one key inside an existing top-level map field.
    pub fn set_nested(
        mut self,
        map: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.sets
            .push((FieldPath::Nested(map.into(), key.into()), value.into()));
        self
    }

    /// The field assignments, in insertion order.
    pub fn entries(&self) -> &[(FieldPath, Value)] {
        &self.sets
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Whether any assignment addresses a nested path.
    pub fn has_nested(&self) -> bool {
        self.sets
            .iter()
            .any(|(p, _)| matches!(p, FieldPath::Nested(_, _)))
    }

    /// Materialize the patch as a JSON document suitable for a deep merge,
    /// nested paths becoming single-key objects.
    pub fn to_document(&self) -> Fields {
        let mut doc = Fields::new();
        for (path, value) in &self.sets {
            match path {
                FieldPath::Top(name) => {
                    doc.insert(name.clone(), value.clone());
                }
                FieldPath::Nested(map, key) => {
                    let entry = doc
                        .entry(map.clone())
                        .or_insert_with(|| Value::Object(Fields::new()));
                    if let Value::Object(obj) = entry {
                        obj.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        doc
    }
}

/// Condition applied to one field during an index query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldCondition {
    /// Field value equals the given string exactly.
    Equals(String),
    /// Field value begins with the given prefix.
    BeginsWith(String),
}

impl FieldCondition {
    /// Evaluate the condition against a JSON field value. Non-string and
    /// absent values never match.
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(s) = value.and_then(Value::as_str) else {
            return false;
        };
        match self {
            FieldCondition::Equals(expected) => s == expected,
            FieldCondition::BeginsWith(prefix) => s.starts_with(prefix),
        }
    }
}

/// A secondary-index query: key equality plus optional post-filters.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    /// Index to query (currently only `COMMIT_HASH_INDEX`).
    pub index: String,
    /// Indexed field the key condition applies to.
    pub key_field: String,
    /// Required value of the indexed field.
    pub key_value: String,
    /// Post-filter conditions, all of which must hold.
    pub filter: Vec<(String, FieldCondition)>,
    /// Return results newest-first by the index sort key (`version_key`).
    pub descending: bool,
}

impl IndexQuery {
    /// Query the commit-hash index for records of one commit.
    pub fn by_commit_hash(commit_hash: impl Into<String>) -> Self {
        IndexQuery {
            index: COMMIT_HASH_INDEX.to_string(),
            key_field: "commit_hash".to_string(),
            key_value: commit_hash.into(),
            filter: Vec::new(),
            descending: true,
        }
    }

    /// Add a post-filter condition.
    pub fn filter(mut self, field: impl Into<String>, condition: FieldCondition) -> Self {
        self.filter.push((field.into(), condition));
        self
    }
}

/// Build record store.
///
/// Guarantees:
/// - `get` returns `Ok(None)` for an absent record, never an error.
/// - `query_index` returns records ordered by `version_key`, newest first
///   when `descending`; an empty vec when nothing matches.
/// - `update` merges only the supplied fields, creating the record if
///   absent; fields omitted from the patch are never cleared.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Point lookup by composite key.
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<Fields>>;

    /// Query all records in a partition, ordered by sort key.
    ///
    /// Newest first when `descending`. Used to find the latest lineage
    /// entry for a known `source_id`.
    async fn query_partition(
        &self,
        partition: &str,
        descending: bool,
    ) -> StoreResult<Vec<Fields>>;

    /// Secondary-index query with post-filtering.
    async fn query_index(&self, query: IndexQuery) -> StoreResult<Vec<Fields>>;

    /// Merge the patch into the record at `key`, creating it if absent.
    async fn update(&self, key: &RecordKey, patch: FieldPatch) -> StoreResult<()>;
}
