//! Buildwatch Core: build lineage reconciliation & status aggregation
//!
//! Tracks CI build status across branches and pull requests for multiple
//! repositories. The hard part is retries: a console/api re-run carries
//! no branch or pull-request metadata, so the build must be reconciled
//! against persisted history to recover which lineage it belongs to.
//!
//! ## Key components
//!
//! - `BuildIdentity`: classifies the attributes of the running build
//! - `BuildHistory`: retry reconciliation + composite version keys
//! - `ProjectSummaryAggregator`: per-repository latest status per project
//! - `BranchStatusAggregator`: per-commit latest status per lineage
//! - `BuildTracker`: the sequential recording flow and notification
//!   decision point
//!
//! Persistence lives in the `lineage-store` crate behind the
//! `HistoryStore` trait.

pub mod branch_status;
pub mod config;
pub mod context;
pub mod error;
pub mod git;
pub mod history;
pub mod identity;
pub mod notify;
pub mod summary;
pub mod tracker;

pub use branch_status::BranchStatusAggregator;
pub use config::TrackerConfig;
pub use context::BuildContext;
pub use error::{Result, TrackerError};
pub use git::{capture_commit_metadata, CommitMetadata};
pub use history::BuildHistory;
pub use identity::{BuildIdentity, BuildTrigger, PriorBuild};
pub use notify::{NotificationChannel, NotificationPayload, NotifyStrategy};
pub use summary::ProjectSummaryAggregator;
pub use tracker::{BuildTracker, RecordedBuild};

/// Buildwatch core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
