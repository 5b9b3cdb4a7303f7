//! Orchestration: one build, one sequential recording flow.

use std::sync::Arc;

use tracing::{info, warn};

use lineage_store::{HistoryEntry, HistoryStore, RecordKey, SurrealHistoryStore};

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::history::BuildHistory;
use crate::identity::BuildIdentity;
use crate::notify::{NotificationPayload, NotifyStrategy};

/// Outcome of recording a build: the key it was written under and the
/// previously persisted lineage entry. This is the trigger point for the
/// notification layer.
#[derive(Debug, Clone)]
pub struct RecordedBuild {
    pub key: RecordKey,
    pub last_entry: Option<HistoryEntry>,
    pub payload: NotificationPayload,
    pub should_notify: bool,
}

/// Records builds: identity resolution, lineage lookup, lineage write,
/// then both aggregate views — one sequential flow, no compensation
/// between the independent writes.
pub struct BuildTracker {
    store: Arc<dyn HistoryStore>,
    config: TrackerConfig,
}

impl BuildTracker {
    pub fn new(store: Arc<dyn HistoryStore>, config: TrackerConfig) -> Self {
        BuildTracker { store, config }
    }

    /// Build a tracker from the environment: `BWT_*` configuration and
    /// the store the `SURREALDB_URL` chain selects, writing to the
    /// configured table.
    pub async fn from_env() -> Result<Self> {
        let config = TrackerConfig::from_env();
        let store = SurrealHistoryStore::from_env(&config.table).await?;
        Ok(BuildTracker::new(Arc::new(store), config))
    }

    /// Record the given build and decide whether its outcome warrants a
    /// notification.
    pub async fn record(&self, build: BuildIdentity) -> Result<RecordedBuild> {
        let mut history =
            BuildHistory::new(Arc::clone(&self.store), self.config.clone(), build);
        let last_entry = history.last_entry().await?;

        // A retry with no resolvable previous build still gets written,
        // under a synthetic commit-scoped lineage key.
        let source_id = match history.build().source_id() {
            Some(id) => id,
            None => {
                let fallback = history.build().fallback_source_id();
                warn!(fallback = %fallback, "retry lineage unresolved, using fallback key");
                fallback
            }
        };

        let key = history.write_entry(&source_id).await?;

        let build = history.build();
        let previous_status = last_entry.as_ref().map(|e| e.status);
        let strategy = NotifyStrategy::parse(
            self.config
                .strategy_for_branch(build.branch_name().as_deref().unwrap_or_default()),
        );
        let should_notify = strategy.should_notify(build.status, previous_status);
        let payload = NotificationPayload::for_build(build, previous_status);

        info!(
            key = %key,
            status = %build.status,
            should_notify,
            "build recorded"
        );

        Ok(RecordedBuild {
            key,
            last_entry,
            payload,
            should_notify,
        })
    }
}
