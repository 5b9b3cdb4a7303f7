//! In-memory fake for the `HistoryStore` trait (testing only)
//!
//! `MemoryHistoryStore` satisfies the full trait contract without any
//! external dependencies, including secondary-index emulation, filter
//! conditions, descending sort, and the nested-path failure mode.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::storage::{FieldPath, FieldPatch, Fields, HistoryStore, IndexQuery, RecordKey, StoreResult};

/// In-memory build record store backed by a `BTreeMap<(partition, sort), Fields>`.
///
/// The BTreeMap key ordering gives sort-key ordering within a partition
/// for free.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    rows: Mutex<BTreeMap<(String, String), Fields>>,
    /// When set, updates against this partition fail with a backend error.
    /// Used to exercise partial-aggregation-failure paths in tests.
    fail_partition: Mutex<Option<String>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make all subsequent updates against `partition` fail.
    pub fn fail_partition(&self, partition: impl Into<String>) {
        *self.fail_partition.lock().unwrap() = Some(partition.into());
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn merge_into(record: &mut Fields, key: &RecordKey, patch: &FieldPatch) -> StoreResult<()> {
        for (path, value) in patch.entries() {
            match path {
                FieldPath::Top(name) => {
                    record.insert(name.clone(), value.clone());
                }
                FieldPath::Nested(map, nested_key) => {
                    match record.get_mut(map.as_str()) {
                        Some(Value::Object(obj)) => {
                            obj.insert(nested_key.clone(), value.clone());
                        }
                        _ => {
                            return Err(StoreError::InvalidPath {
                                path: format!("{path}"),
                            });
                        }
                    }
                }
            }
        }
        // Key attributes are part of the stored record, as they would be
        // in the backing table.
        record.insert("source_id".to_string(), Value::String(key.partition.clone()));
        record.insert("version_key".to_string(), Value::String(key.sort.clone()));
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<Fields>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(&(key.partition.clone(), key.sort.clone()))
            .cloned())
    }

    async fn query_partition(
        &self,
        partition: &str,
        descending: bool,
    ) -> StoreResult<Vec<Fields>> {
        let rows = self.rows.lock().unwrap();
        let mut found: Vec<Fields> = rows
            .range((partition.to_string(), String::new())..)
            .take_while(|((p, _), _)| p == partition)
            .map(|(_, fields)| fields.clone())
            .collect();
        if descending {
            found.reverse();
        }
        Ok(found)
    }

    async fn query_index(&self, query: IndexQuery) -> StoreResult<Vec<Fields>> {
        let rows = self.rows.lock().unwrap();
        let mut found: Vec<(String, Fields)> = rows
            .iter()
            .filter(|(_, fields)| {
                fields
                    .get(&query.key_field)
                    .and_then(Value::as_str)
                    .map(|v| v == query.key_value)
                    .unwrap_or(false)
            })
            .filter(|(_, fields)| {
                query
                    .filter
                    .iter()
                    .all(|(field, cond)| cond.matches(fields.get(field)))
            })
            .map(|((_, sort), fields)| (sort.clone(), fields.clone()))
            .collect();

        // Index ordering is by the sort key of the indexed records.
        found.sort_by(|(a, _), (b, _)| a.cmp(b));
        if query.descending {
            found.reverse();
        }
        Ok(found.into_iter().map(|(_, fields)| fields).collect())
    }

    async fn update(&self, key: &RecordKey, patch: FieldPatch) -> StoreResult<()> {
        if let Some(partition) = self.fail_partition.lock().unwrap().as_deref() {
            if key.partition == partition {
                return Err(StoreError::Backend(format!(
                    "injected failure for partition {partition}"
                )));
            }
        }

        let mut rows = self.rows.lock().unwrap();
        let map_key = (key.partition.clone(), key.sort.clone());
        match rows.get_mut(&map_key) {
            Some(record) => Self::merge_into(record, key, &patch),
            None => {
                let mut record = Fields::new();
                Self::merge_into(&mut record, key, &patch)?;
                rows.insert(map_key, record);
                Ok(())
            }
        }
    }
}
