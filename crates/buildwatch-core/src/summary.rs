//! Repository-level project summary aggregation.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use lineage_store::{FieldPatch, HistoryStore, ProjectSummaryRecord};

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::identity::BuildIdentity;

/// Maintains one summary record per repository: latest build status per
/// project code, under a fixed partition keyed by repository URL digest.
pub struct ProjectSummaryAggregator {
    store: Arc<dyn HistoryStore>,
    config: TrackerConfig,
}

impl ProjectSummaryAggregator {
    pub fn new(store: Arc<dyn HistoryStore>, config: TrackerConfig) -> Self {
        ProjectSummaryAggregator { store, config }
    }

    /// Refresh the summary for this build's repository.
    ///
    /// No-op unless the build's branch is whitelisted; pull-request
    /// builds carry no branch name and are never summarized here (the
    /// branch status view covers them).
    ///
    /// The store addresses "create a map field" and "set one key inside
    /// an existing map" differently, so record existence is probed first:
    /// the first write for a repository stores the whole `projects` map,
    /// subsequent writes address `projects.<project_code>` only, leaving
    /// other project entries untouched.
    pub async fn update(&self, build: &BuildIdentity) -> Result<()> {
        let Some(branch_name) = build.branch_name() else {
            debug!("summary skipped: no branch name");
            return Ok(());
        };
        if !self.config.is_whitelisted(&branch_name) {
            debug!(branch = %branch_name, "summary skipped: branch not whitelisted");
            return Ok(());
        }

        let key = ProjectSummaryRecord::key_for(&build.repo_url);
        let is_new = self.store.get(&key).await?.is_none();

        let project_status = json!({
            "build_id": build.build_id,
            "status": build.status,
            "timestamp": build.start_time,
        });

        let mut patch = FieldPatch::new()
            .set("commit_hash", build.commit_hash.clone())
            .set("repo_url", build.repo_url.clone())
            .set("timestamp", build.start_time);
        patch = if is_new {
            patch.set("projects", json!({ build.project_code.clone(): project_status }))
        } else {
            patch.set_nested("projects", build.project_code.clone(), project_status)
        };

        info!(
            repo_url = %build.repo_url,
            project_code = %build.project_code,
            new_record = is_new,
            "updating project summary"
        );
        self.store.update(&key, patch).await?;
        Ok(())
    }
}
