//! SurrealDB schema initialization for the build status table

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::storage::StoreResult;

/// Initialize the `build_records` table.
///
/// Called once on connection. Safe to call multiple times (idempotent).
///
/// Schema:
/// ```text
/// TABLE build_records {
///   source_id:    STRING (partition component)
///   version_key:  STRING (sort component)
///   commit_hash:  STRING (indexed, with project_code/source_ref filterable)
///   ...remaining fields are record-shape dependent (SCHEMALESS)
/// }
/// ```
pub async fn init_schema(db: &Surreal<Any>, table: &str) -> StoreResult<()> {
    debug!(table, "initializing build status table");

    let sql = format!(
        r#"
        DEFINE TABLE IF NOT EXISTS {table}
            SCHEMALESS
            PERMISSIONS
                FOR select FULL
                FOR create FULL
                FOR update FULL
                FOR delete NONE;

        -- Composite primary key: one record per (source_id, version_key)
        DEFINE INDEX IF NOT EXISTS idx_source_version ON TABLE {table} COLUMNS source_id, version_key UNIQUE;

        -- Partition scans ordered by version_key
        DEFINE INDEX IF NOT EXISTS idx_source_id ON TABLE {table} COLUMNS source_id;

        -- Secondary index: retry reconciliation queries by commit hash
        DEFINE INDEX IF NOT EXISTS idx_commit_hash ON TABLE {table} COLUMNS commit_hash;

        -- Composite (commit_hash, version_key) for latest-first retrieval
        DEFINE INDEX IF NOT EXISTS idx_commit_hash_version ON TABLE {table} COLUMNS commit_hash, version_key;
    "#
    );

    // Statement failures ride inside the response, not the transport
    // result.
    db.query(sql)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
        .check()
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    info!(table, "build status table initialized");
    Ok(())
}
