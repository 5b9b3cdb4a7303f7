//! Notification decision boundary.
//!
//! The tracker decides *whether* a build outcome warrants a notification
//! and *whom* it concerns; formatting and delivery belong to the channel
//! implementation behind [`NotificationChannel`].

use async_trait::async_trait;

use lineage_store::BuildStatus;

use crate::error::Result;
use crate::identity::BuildIdentity;

/// When to notify about a build outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyStrategy {
    /// Notify on failure, or whenever the status differs from the
    /// lineage's previous build.
    FailOrStatusChange,
    /// Notify on every build.
    Always,
    /// Notify on failures only.
    FailOnly,
}

impl NotifyStrategy {
    /// Parse a strategy name; unknown names fall back to the default
    /// strategy rather than failing the build report.
    pub fn parse(name: &str) -> Self {
        match name {
            "always" => NotifyStrategy::Always,
            "fail_only" => NotifyStrategy::FailOnly,
            _ => NotifyStrategy::FailOrStatusChange,
        }
    }

    /// Whether a notification should go out for this outcome.
    pub fn should_notify(&self, current: BuildStatus, previous: Option<BuildStatus>) -> bool {
        match self {
            NotifyStrategy::Always => true,
            NotifyStrategy::FailOnly => !current.is_success(),
            NotifyStrategy::FailOrStatusChange => {
                !current.is_success() || previous.map(|p| p != current).unwrap_or(false)
            }
        }
    }
}

/// Fully formed notification content, ready for a channel to format.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub project_code: String,
    pub build_id: String,
    pub status: BuildStatus,
    pub previous_status: Option<BuildStatus>,
    pub commit_hash: String,
    pub short_hash: String,
    pub commit_subject: String,
    pub author_name: String,
    pub repo_url: String,
    pub source_ref: Option<String>,
    recipients: Vec<String>,
}

impl NotificationPayload {
    /// Assemble the payload for a recorded build.
    pub fn for_build(build: &BuildIdentity, previous_status: Option<BuildStatus>) -> Self {
        let mut recipients = vec![
            build.commit.author_email.clone(),
            build.commit.committer_email.clone(),
        ];
        recipients.dedup();
        recipients.retain(|r| !r.is_empty());

        NotificationPayload {
            project_code: build.project_code.clone(),
            build_id: build.build_id.clone(),
            status: build.status,
            previous_status,
            commit_hash: build.commit_hash.clone(),
            short_hash: build.commit.short_hash.clone(),
            commit_subject: build.commit.subject.clone(),
            author_name: build.commit.author_name.clone(),
            repo_url: build.repo_url.clone(),
            source_ref: build.source_ref(),
            recipients,
        }
    }

    /// Who this outcome concerns: commit author and committer, deduped.
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }
}

/// Delivery boundary. Implementations own formatting and transport.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<()>;
}
