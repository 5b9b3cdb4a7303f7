//! Raw ambient build attributes.
//!
//! `BuildContext` is the boundary with the execution environment: it
//! carries the untyped attributes the build platform exposes, before any
//! classification. In a CodeBuild job container these come from
//! `CODEBUILD_*` env vars.

use chrono::Utc;

use crate::error::{Result, TrackerError};
use crate::git::CommitMetadata;

/// Untyped build attributes as supplied by the environment.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    /// Opaque execution identifier; `<project_code>:<uuid>`.
    pub build_id: String,
    /// Resolved source commit hash.
    pub commit_hash: String,
    /// Repository URL as given (possibly with a `.git` suffix).
    pub repo_url: String,
    /// Webhook head ref, e.g. `refs/heads/my_branch`. Blank for retries.
    pub head_ref: String,
    /// Source version string, e.g. `pr/42` or a commit hash. Unlike the
    /// webhook trigger, this survives console/api retries.
    pub source_version: String,
    /// Webhook trigger, e.g. `branch/my_branch` or `pr/42`. Blank when the
    /// build was launched by the Retry command.
    pub trigger: String,
    /// Raw success indicator; `"1"` means the build succeeded.
    pub status_code: Option<String>,
    /// Build start time, epoch milliseconds.
    pub start_time: i64,
    /// Commit author/committer identity and subject.
    pub commit: CommitMetadata,
}

impl BuildContext {
    /// Read the context from `CODEBUILD_*` environment variables.
    ///
    /// The build id and resolved commit hash must be present; a tracking
    /// run without them has nothing to key its records by. Other absent
    /// vars become empty strings (matching the platform's behavior for
    /// unset webhook vars); the start time falls back to now.
    pub fn from_env() -> Result<Self> {
        Ok(BuildContext {
            build_id: env_required("CODEBUILD_BUILD_ID")?,
            commit_hash: env_required("CODEBUILD_RESOLVED_SOURCE_VERSION")?,
            repo_url: env_or_empty("CODEBUILD_SOURCE_REPO_URL"),
            head_ref: env_or_empty("CODEBUILD_WEBHOOK_HEAD_REF"),
            source_version: env_or_empty("CODEBUILD_SOURCE_VERSION"),
            trigger: env_or_empty("CODEBUILD_WEBHOOK_TRIGGER"),
            status_code: std::env::var("CODEBUILD_BUILD_SUCCEEDING").ok(),
            start_time: std::env::var("CODEBUILD_START_TIME")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| Utc::now().timestamp_millis()),
            commit: CommitMetadata::default(),
        })
    }

    /// Attach commit metadata captured from the working tree.
    pub fn with_commit_metadata(mut self, commit: CommitMetadata) -> Self {
        self.commit = commit;
        self
    }
}

fn env_or_empty(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

fn env_required(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(TrackerError::MissingContext(name.to_string())),
    }
}
