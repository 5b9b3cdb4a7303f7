//! Build identity resolution and classification.
//!
//! `BuildIdentity` wraps the raw [`BuildContext`] and answers the
//! questions the lineage and aggregation logic asks: what triggered this
//! build, which lineage does it belong to, did it succeed. The trigger is
//! classified once into a [`BuildTrigger`] variant; downstream code
//! branches on the tag instead of re-parsing the string.
//!
//! For retries (no webhook metadata) the lineage identifiers are
//! recovered from `previous_build`, a weak back-reference linked after a
//! successful history lookup. With no previous build they are absent —
//! a valid "unknown lineage" state, not an error.

use lineage_store::{BuildStatus, HistoryEntry};

use crate::context::BuildContext;
use crate::git::CommitMetadata;

/// What started the build, classified once from the webhook trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildTrigger {
    /// Webhook push to a branch; carries the full ref, e.g. `branch/master`.
    Branch(String),
    /// Webhook pull request event; carries the full ref, e.g. `pr/42`.
    PullRequest(String),
    /// Console/api retry: the webhook trigger was blank and no branch/PR
    /// metadata is available.
    Retry,
}

impl BuildTrigger {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            BuildTrigger::Retry
        } else if raw.starts_with("pr/") {
            BuildTrigger::PullRequest(raw.to_string())
        } else {
            BuildTrigger::Branch(raw.to_string())
        }
    }

    /// The triggering ref string, absent for retries.
    pub fn ref_str(&self) -> Option<&str> {
        match self {
            BuildTrigger::Branch(r) | BuildTrigger::PullRequest(r) => Some(r),
            BuildTrigger::Retry => None,
        }
    }
}

/// Lineage identifiers recovered from a previously persisted build.
///
/// Plain owned data copied out of the looked-up entry; never an owning
/// pointer back into history.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorBuild {
    pub source_id: String,
    pub source_ref: Option<String>,
    pub branch_name: Option<String>,
    pub status: BuildStatus,
}

impl From<&HistoryEntry> for PriorBuild {
    fn from(entry: &HistoryEntry) -> Self {
        PriorBuild {
            source_id: entry.source_id.clone(),
            source_ref: entry.source_ref.clone(),
            branch_name: entry.branch_name.clone(),
            status: entry.status,
        }
    }
}

/// Resolved attributes of the build currently running.
#[derive(Debug, Clone)]
pub struct BuildIdentity {
    pub build_id: String,
    pub commit_hash: String,
    /// Normalized repository URL (trailing `.git` stripped).
    pub repo_url: String,
    /// Substring of `build_id` before the first `:`.
    pub project_code: String,
    pub trigger: BuildTrigger,
    /// Source version string; survives retries, unlike the trigger.
    pub source_version: String,
    head_ref: String,
    pub start_time: i64,
    pub status: BuildStatus,
    pub commit: CommitMetadata,
    previous_build: Option<PriorBuild>,
}

impl BuildIdentity {
    pub fn from_context(ctx: BuildContext) -> Self {
        let repo_url = ctx
            .repo_url
            .strip_suffix(".git")
            .unwrap_or(&ctx.repo_url)
            .to_string();
        let project_code = ctx
            .build_id
            .split(':')
            .next()
            .unwrap_or_default()
            .to_string();

        BuildIdentity {
            project_code,
            build_id: ctx.build_id,
            commit_hash: ctx.commit_hash,
            repo_url,
            trigger: BuildTrigger::parse(&ctx.trigger),
            source_version: ctx.source_version,
            head_ref: ctx.head_ref,
            start_time: ctx.start_time,
            status: BuildStatus::from_code(ctx.status_code.as_deref()),
            commit: ctx.commit,
            previous_build: None,
        }
    }

    /// Link the previous build found for this lineage. Only meaningful for
    /// retries; called once after a successful history lookup.
    pub fn link_previous(&mut self, prior: PriorBuild) {
        self.previous_build = Some(prior);
    }

    pub fn previous_build(&self) -> Option<&PriorBuild> {
        self.previous_build.as_ref()
    }

    /// Whether the build was launched via the Retry command (blank
    /// webhook trigger).
    pub fn launched_by_retry(&self) -> bool {
        self.trigger == BuildTrigger::Retry
    }

    /// Whether this build belongs to a pull request lineage.
    ///
    /// Checks the authoritative ref: the trigger for webhook builds, the
    /// resolved previous `source_ref` for retries, falling back to the
    /// source version (which survives retries) before a previous build is
    /// linked.
    pub fn for_pull_request(&self) -> bool {
        self.authoritative_ref()
            .map(|r| r.starts_with("pr/"))
            .unwrap_or(false)
    }

    fn authoritative_ref(&self) -> Option<&str> {
        match &self.trigger {
            BuildTrigger::Branch(r) | BuildTrigger::PullRequest(r) => Some(r),
            BuildTrigger::Retry => self
                .previous_build
                .as_ref()
                .and_then(|p| p.source_ref.as_deref())
                .or_else(|| non_empty(&self.source_version)),
        }
    }

    /// Lineage primary key, `<project_code>:<trigger>`, e.g.
    /// `my-app_ruby2-4:branch/master` or `my-app_ruby2-3:pr/4056`.
    ///
    /// The project code is part of the key so one repository can carry
    /// multiple projects (different buildspecs or ruby versions).
    /// Absent for a retry with no resolvable previous build.
    pub fn source_id(&self) -> Option<String> {
        match self.trigger.ref_str() {
            Some(r) => Some(format!("{}:{}", self.project_code, r)),
            None => self.previous_build.as_ref().map(|p| p.source_id.clone()),
        }
    }

    /// Synthetic lineage key used when a retry cannot be reconciled
    /// against any previous build: the entry is still written, under a
    /// commit-scoped lineage of its own.
    pub fn fallback_source_id(&self) -> String {
        format!("{}:commit/{}", self.project_code, self.commit_hash)
    }

    /// Triggering ref; for retries, recovered from the previous build.
    pub fn source_ref(&self) -> Option<String> {
        match self.trigger.ref_str() {
            Some(r) => Some(r.to_string()),
            None => self
                .previous_build
                .as_ref()
                .and_then(|p| p.source_ref.clone()),
        }
    }

    /// Plain branch name. For webhook builds, the head ref with the
    /// `refs/heads/` namespace stripped; empty becomes absent. For
    /// retries, recovered from the previous build.
    pub fn branch_name(&self) -> Option<String> {
        if self.launched_by_retry() {
            self.previous_build
                .as_ref()
                .and_then(|p| p.branch_name.clone())
        } else {
            let name = self
                .head_ref
                .strip_prefix("refs/heads/")
                .unwrap_or(&self.head_ref);
            non_empty(name).map(String::from)
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
