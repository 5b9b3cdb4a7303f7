//! Lineage reconciliation and versioned history writes.
//!
//! `BuildHistory` answers "which branch or pull request does this build
//! belong to, and how did its last build go" and appends the current
//! build to that lineage.
//!
//! For webhook builds the lineage key is known directly. For retries the
//! webhook metadata is blank, so the previous build is recovered by
//! querying the commit-hash index, filtered by project code and a
//! source-ref condition: exact match on the PR's source version for pull
//! requests, `branch/` prefix otherwise. The same commit hash can
//! legitimately appear under more than one pull request, or under a PR
//! and a long-lived branch; without the filter a retry could attach to
//! the wrong lineage.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use lineage_store::{
    FieldCondition, FieldPatch, HistoryEntry, HistoryStore, IndexQuery, RecordKey,
};

use crate::branch_status::BranchStatusAggregator;
use crate::config::TrackerConfig;
use crate::error::Result;
use crate::identity::{BuildIdentity, PriorBuild};
use crate::summary::ProjectSummaryAggregator;

/// Reconciles the current build against persisted lineage history and
/// writes the new versioned entry plus both aggregate views.
pub struct BuildHistory {
    store: Arc<dyn HistoryStore>,
    config: TrackerConfig,
    build: BuildIdentity,
    /// Memoized lookup result; outer None means not yet resolved.
    last_entry: Option<Option<HistoryEntry>>,
}

impl BuildHistory {
    pub fn new(store: Arc<dyn HistoryStore>, config: TrackerConfig, build: BuildIdentity) -> Self {
        BuildHistory {
            store,
            config,
            build,
            last_entry: None,
        }
    }

    pub fn build(&self) -> &BuildIdentity {
        &self.build
    }

    /// The most recent persisted entry for this build's lineage, if any.
    ///
    /// Resolved once per instance. A hit links the entry into the build
    /// identity so retries recover their source id, source ref, and
    /// branch name. Absence is a valid state (first-ever build, or a
    /// retry whose lineage cannot be reconciled).
    pub async fn last_entry(&mut self) -> Result<Option<HistoryEntry>> {
        if let Some(cached) = &self.last_entry {
            return Ok(cached.clone());
        }

        let found = if self.build.launched_by_retry() {
            self.find_by_commit().await?
        } else {
            self.find_by_source_id().await?
        };

        if let Some(entry) = &found {
            debug!(
                source_id = %entry.source_id,
                version_key = %entry.version_key,
                "linked previous build"
            );
            self.build.link_previous(PriorBuild::from(entry));
        }

        self.last_entry = Some(found.clone());
        Ok(found)
    }

    /// Persist the current build as a lineage entry under
    /// `target_source_id`, then refresh both aggregate views.
    ///
    /// The aggregator writes are independent of the lineage write and of
    /// each other; a failure after a successful write surfaces to the
    /// caller with no compensation.
    pub async fn write_entry(&mut self, target_source_id: &str) -> Result<RecordKey> {
        let last = self.last_entry().await?;
        let version_key = self.version_key(last.as_ref());
        let key = RecordKey::new(target_source_id, &version_key);

        info!(key = %key, status = %self.build.status, "writing lineage entry");
        self.store.update(&key, self.entry_patch()).await?;

        ProjectSummaryAggregator::new(Arc::clone(&self.store), self.config.clone())
            .update(&self.build)
            .await?;
        BranchStatusAggregator::new(Arc::clone(&self.store))
            .update(&self.build)
            .await?;

        Ok(key)
    }

    // -- lookup --------------------------------------------------------------

    /// Commit-hash index lookup for retries: same commit, same project,
    /// and a source-ref condition that pins the lineage kind.
    async fn find_by_commit(&self) -> Result<Option<HistoryEntry>> {
        let ref_condition = if self.build.for_pull_request() {
            FieldCondition::Equals(self.build.source_version.clone())
        } else {
            FieldCondition::BeginsWith("branch/".to_string())
        };

        let rows = self
            .store
            .query_index(
                IndexQuery::by_commit_hash(self.build.commit_hash.clone())
                    .filter(
                        "project_code",
                        FieldCondition::Equals(self.build.project_code.clone()),
                    )
                    .filter("source_ref", ref_condition),
            )
            .await?;

        Self::first_entry(rows)
    }

    /// Direct lookup for webhook builds: latest entry in the lineage
    /// partition.
    async fn find_by_source_id(&self) -> Result<Option<HistoryEntry>> {
        // Non-retry builds always have a source id.
        let Some(source_id) = self.build.source_id() else {
            return Ok(None);
        };
        let rows = self.store.query_partition(&source_id, true).await?;
        Self::first_entry(rows)
    }

    fn first_entry(rows: Vec<lineage_store::Fields>) -> Result<Option<HistoryEntry>> {
        rows.into_iter()
            .next()
            .map(|fields| HistoryEntry::from_fields(fields).map_err(Into::into))
            .transpose()
    }

    // -- write ---------------------------------------------------------------

    /// Composite version key `<first>_<current>`.
    ///
    /// The first component is the start time of the first build of this
    /// commit/lineage pair, the second the start time of this build. One
    /// key thus answers both "first build of this commit" (match on the
    /// first component) and "latest rebuild" (greatest full key), with no
    /// second index. An unresolved retry degrades to `<current>_<current>`
    /// and becomes the first observed build of its lineage.
    fn version_key(&self, last: Option<&HistoryEntry>) -> String {
        match last {
            Some(entry) if self.build.launched_by_retry() => {
                format!("{}_{}", entry.start_time, self.build.start_time)
            }
            _ => format!("{}_{}", self.build.start_time, self.build.start_time),
        }
    }

    /// Field set persisted for this build.
    ///
    /// `source_ref` and `branch_name` are written only for webhook
    /// builds. A retry must never overwrite the branch/PR identity the
    /// original triggering build already recorded, so those fields are
    /// omitted entirely (not nulled) from retry writes.
    fn entry_patch(&self) -> FieldPatch {
        let build = &self.build;
        let mut patch = FieldPatch::new()
            .set("author_email", build.commit.author_email.clone())
            .set("author_name", build.commit.author_name.clone())
            .set("build_id", build.build_id.clone())
            .set("commit_hash", build.commit_hash.clone())
            .set("commit_subject", build.commit.subject.clone())
            .set("committer_email", build.commit.committer_email.clone())
            .set("committer_name", build.commit.committer_name.clone())
            .set("repo_url", build.repo_url.clone())
            .set("project_code", build.project_code.clone())
            .set("start_time", build.start_time)
            .set("status", json!(build.status));

        if !build.launched_by_retry() {
            if let Some(source_ref) = build.trigger.ref_str() {
                patch = patch.set("source_ref", source_ref);
            }
            if let Some(branch_name) = build.branch_name() {
                patch = patch.set("branch_name", branch_name);
            }
        }
        patch
    }
}
