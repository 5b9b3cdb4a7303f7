//! Record schemas for the build status table
//!
//! Three record shapes share one table, distinguished by how their keys
//! are derived:
//! - `HistoryEntry`: one per build, partition `source_id`, sort `version_key`
//! - `ProjectSummaryRecord`: one per repository, fixed partition, sort
//!   `digest_key(repo_url)`
//! - `BranchStatusRecord`: one per commit, partition `commit_hash`, sort
//!   `digest_key(source_ref)`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::storage::{digest_key, Fields, RecordKey};

/// Partition constant under which all project summary records live.
pub const PROJECT_SUMMARY_PARTITION: &str = "project_summary";

/// Terminal status of a build.
///
/// Anything other than the literal success marker maps to `Failed`, so a
/// missing or garbled status code is reported as a failure rather than a
/// phantom success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
}

impl BuildStatus {
    /// Classify the raw success indicator ("1" means the build succeeded).
    pub fn from_code(code: Option<&str>) -> Self {
        if code == Some("1") {
            BuildStatus::Succeeded
        } else {
            BuildStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Succeeded => "SUCCEEDED",
            BuildStatus::Failed => "FAILED",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Succeeded)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One persisted lineage entry: the outcome of a single build, keyed by
/// the branch/PR lineage it belongs to and a composite version key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub source_id: String,
    pub version_key: String,
    pub author_email: String,
    pub author_name: String,
    pub build_id: String,
    pub commit_hash: String,
    pub commit_subject: String,
    pub committer_email: String,
    pub committer_name: String,
    pub repo_url: String,
    pub project_code: String,
    /// Build start time, epoch milliseconds.
    pub start_time: i64,
    pub status: BuildStatus,
    /// Triggering ref ("branch/..." or "pr/..."). Absent on records whose
    /// only writes so far were retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    /// Plain branch name. Absent for pull requests and retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
}

impl HistoryEntry {
    /// Deserialize from a raw stored record.
    pub fn from_fields(fields: Fields) -> Result<Self, StoreError> {
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.source_id, &self.version_key)
    }
}

/// Latest status of one project code within a repository summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub build_id: String,
    pub status: BuildStatus,
    /// Epoch milliseconds of the build that produced this status.
    pub timestamp: i64,
}

/// Repository-level summary: latest build status per project code.
///
/// Exactly one record per distinct repository URL. The `projects` map
/// accumulates one entry per project code ever seen and is never pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummaryRecord {
    pub commit_hash: String,
    pub repo_url: String,
    pub timestamp: i64,
    pub projects: BTreeMap<String, ProjectStatus>,
}

impl ProjectSummaryRecord {
    pub fn from_fields(fields: Fields) -> Result<Self, StoreError> {
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    /// Key of the summary record for a repository.
    pub fn key_for(repo_url: &str) -> RecordKey {
        RecordKey::new(PROJECT_SUMMARY_PARTITION, digest_key(repo_url))
    }
}

/// Commit-level status record: latest build status of one commit within
/// one lineage. Written flat, not as a nested map, so every update is a
/// plain full-field overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchStatusRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    pub build_id: String,
    pub commit_hash: String,
    pub repo_url: String,
    pub source_ref: String,
    pub status: BuildStatus,
    pub timestamp: i64,
}

impl BranchStatusRecord {
    pub fn from_fields(fields: Fields) -> Result<Self, StoreError> {
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    /// Key of the status record for a commit within a lineage.
    pub fn key_for(commit_hash: &str, source_ref: &str) -> RecordKey {
        RecordKey::new(commit_hash, digest_key(source_ref))
    }
}
