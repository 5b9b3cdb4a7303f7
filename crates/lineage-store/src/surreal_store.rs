//! SurrealDB-backed HistoryStore implementation
//!
//! One `build_records` table holds all three record shapes, addressed by
//! the application-level (source_id, version_key) composite key. The
//! merge-update contract maps onto `UPDATE ... MERGE`, which deep-merges
//! object fields, so a nested single-key set touches only that key.

use async_trait::async_trait;
use serde_json::Value;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::migrations;
use crate::storage::{
    FieldCondition, FieldPath, FieldPatch, Fields, HistoryStore, IndexQuery, RecordKey,
    StoreResult,
};

/// Default build status table name.
pub const DEFAULT_TABLE: &str = "build_records";

/// SurrealDB-backed implementation of [`HistoryStore`].
pub struct SurrealHistoryStore {
    db: Surreal<Any>,
    table: String,
}

impl SurrealHistoryStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `buildwatch/main`, and runs
    /// `init_schema`.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect("mem://", "buildwatch", "main", DEFAULT_TABLE).await
    }

    /// Connect to the given endpoint, namespace, database, and table.
    pub async fn connect(
        endpoint: &str,
        namespace: &str,
        database: &str,
        table: &str,
    ) -> StoreResult<Self> {
        let db = surrealdb::engine::any::connect(endpoint)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        db.use_ns(namespace)
            .use_db(database)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        migrations::init_schema(&db, table).await?;

        info!(endpoint, table, "SurrealHistoryStore connected");
        Ok(Self {
            db,
            table: table.to_string(),
        })
    }

    /// Create from environment variables, storing records in `table`.
    ///
    /// Uses `SURREALDB_URL` when set, otherwise local persistence under
    /// `.buildwatch/db`.
    pub async fn from_env(table: &str) -> StoreResult<Self> {
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            return Self::connect(&url, "buildwatch", "main", table).await;
        }

        let path = ".buildwatch/db";
        std::fs::create_dir_all(path).map_err(|e| {
            StoreError::Connection(format!("failed to create database directory {path}: {e}"))
        })?;
        let url = format!("surrealkv://{path}");
        info!("no SURREALDB_URL found, using local persistence: {url}");
        Self::connect(&url, "buildwatch", "main", table).await
    }

    // -- private helpers -----------------------------------------------------

    /// Fetch the raw row at a composite key, if any.
    async fn fetch(&self, key: &RecordKey) -> StoreResult<Option<Fields>> {
        let table = &self.table;
        let mut res = self
            .db
            .query(format!(
                "SELECT * OMIT id FROM {table} \
                 WHERE source_id = $pk AND version_key = $sk LIMIT 1"
            ))
            .bind(("pk", key.partition.clone()))
            .bind(("sk", key.sort.clone()))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let rows: Vec<Fields> = res
            .take(0)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(rows.into_iter().next())
    }

    /// Reject field names that cannot be interpolated into a query.
    ///
    /// Filter field names come from application code, never user input,
    /// but values always travel through binds regardless.
    fn checked_field_name(name: &str) -> StoreResult<&str> {
        if !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            Ok(name)
        } else {
            Err(StoreError::Backend(format!(
                "unsupported filter field name: {name}"
            )))
        }
    }

    /// Verify every nested path in the patch addresses an existing map.
    fn check_nested_paths(record: Option<&Fields>, patch: &FieldPatch) -> StoreResult<()> {
        for (path, _) in patch.entries() {
            if let FieldPath::Nested(map, _) = path {
                let present = record
                    .and_then(|r| r.get(map.as_str()))
                    .map(|v| matches!(v, Value::Object(_)))
                    .unwrap_or(false);
                if !present {
                    return Err(StoreError::InvalidPath {
                        path: format!("{path}"),
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SurrealHistoryStore {
    async fn get(&self, key: &RecordKey) -> StoreResult<Option<Fields>> {
        self.fetch(key).await
    }

    async fn query_partition(
        &self,
        partition: &str,
        descending: bool,
    ) -> StoreResult<Vec<Fields>> {
        let table = &self.table;
        let order = if descending { "DESC" } else { "ASC" };
        let mut res = self
            .db
            .query(format!(
                "SELECT * OMIT id FROM {table} \
                 WHERE source_id = $pk ORDER BY version_key {order}"
            ))
            .bind(("pk", partition.to_string()))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        res.take(0).map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn query_index(&self, query: IndexQuery) -> StoreResult<Vec<Fields>> {
        let key_field = Self::checked_field_name(&query.key_field)?;
        let mut clauses = vec![format!("{key_field} = $key_value")];
        let mut binds: Vec<(String, String)> =
            vec![("key_value".to_string(), query.key_value.clone())];

        for (i, (field, condition)) in query.filter.iter().enumerate() {
            let field = Self::checked_field_name(field)?;
            let bind_name = format!("filter_{i}");
            match condition {
                FieldCondition::Equals(value) => {
                    clauses.push(format!("{field} = ${bind_name}"));
                    binds.push((bind_name, value.clone()));
                }
                FieldCondition::BeginsWith(prefix) => {
                    clauses.push(format!("string::starts_with({field}, ${bind_name})"));
                    binds.push((bind_name, prefix.clone()));
                }
            }
        }

        let table = &self.table;
        let order = if query.descending { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT * OMIT id FROM {table} WHERE {} ORDER BY version_key {order}",
            clauses.join(" AND ")
        );

        debug!(index = %query.index, sql = %sql, "index query");

        let mut request = self.db.query(sql);
        for (name, value) in binds {
            request = request.bind((name, value));
        }
        let mut res = request
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        res.take(0).map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn update(&self, key: &RecordKey, patch: FieldPatch) -> StoreResult<()> {
        let existing = self.fetch(key).await?;
        Self::check_nested_paths(existing.as_ref(), &patch)?;

        let mut doc = patch.to_document();
        doc.insert(
            "source_id".to_string(),
            Value::String(key.partition.clone()),
        );
        doc.insert("version_key".to_string(), Value::String(key.sort.clone()));

        // Statement failures (unique index violations, field constraints)
        // ride inside the response, not the transport result.
        let table = &self.table;
        if existing.is_some() {
            debug!(key = %key, "merging record");
            self.db
                .query(format!(
                    "UPDATE {table} MERGE $doc \
                     WHERE source_id = $pk AND version_key = $sk"
                ))
                .bind(("doc", Value::Object(doc)))
                .bind(("pk", key.partition.clone()))
                .bind(("sk", key.sort.clone()))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .check()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        } else {
            debug!(key = %key, "creating record");
            self.db
                .query(format!("CREATE {table} CONTENT $doc RETURN NONE"))
                .bind(("doc", Value::Object(doc)))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .check()
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        Ok(())
    }
}
