//! Commit-level branch status records.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use lineage_store::{BranchStatusRecord, FieldPatch, HistoryStore};

use crate::error::Result;
use crate::identity::BuildIdentity;

/// Maintains one status record per commit within a lineage, keyed by
/// commit hash and source-ref digest.
///
/// Runs for every build, with no whitelist gate — this asymmetry with
/// the project summary is deliberate: pull-request builds are never
/// whitelisted, and this record is how they still get commit-level
/// status.
pub struct BranchStatusAggregator {
    store: Arc<dyn HistoryStore>,
}

impl BranchStatusAggregator {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        BranchStatusAggregator { store }
    }

    /// Overwrite the status record for this build's commit.
    ///
    /// The record is flat scalars only, so every write is a plain
    /// full-field overwrite with no map branching. An unresolved retry
    /// has no source ref; the source version stands in for it, keeping
    /// the record addressable.
    pub async fn update(&self, build: &BuildIdentity) -> Result<()> {
        let source_ref = build
            .source_ref()
            .unwrap_or_else(|| build.source_version.clone());
        let key = BranchStatusRecord::key_for(&build.commit_hash, &source_ref);

        let patch = FieldPatch::new()
            .set(
                "branch_name",
                build.branch_name().map(Value::String).unwrap_or(Value::Null),
            )
            .set("build_id", build.build_id.clone())
            .set("commit_hash", build.commit_hash.clone())
            .set("repo_url", build.repo_url.clone())
            .set("source_ref", source_ref)
            .set("status", json!(build.status))
            .set("timestamp", build.start_time);

        info!(commit_hash = %build.commit_hash, status = %build.status, "updating branch status");
        self.store.update(&key, patch).await?;
        Ok(())
    }
}
