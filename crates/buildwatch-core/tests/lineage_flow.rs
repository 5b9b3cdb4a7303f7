//! End-to-end recording flow over the in-memory store.
//!
//! Covers lineage version keys, retry reconciliation and field omission,
//! aggregation gating, summary map behavior, unresolved-retry fallback,
//! partial aggregation failure, and the accepted concurrent-retry race.

use std::sync::Arc;

use serde_json::json;

use buildwatch_core::{
    BuildContext, BuildIdentity, BuildTracker, CommitMetadata, TrackerConfig, TrackerError,
};
use lineage_store::fakes::MemoryHistoryStore;
use lineage_store::{
    digest_key, BranchStatusRecord, HistoryStore, ProjectSummaryRecord, RecordKey,
    PROJECT_SUMMARY_PARTITION,
};

const COMMIT: &str = "b2ec4811171dc0755fff2a13f1d547e77c5bb0d6";
const REPO: &str = "https://github.com/my-org/my-app";

fn commit_meta() -> CommitMetadata {
    CommitMetadata {
        short_hash: "b2ec481".to_string(),
        author_name: "Velma Dinkley".to_string(),
        author_email: "velma@dinkley.org".to_string(),
        committer_name: "Daphne Blake".to_string(),
        committer_email: "daphne@blake.org".to_string(),
        subject: "Patch holes in van".to_string(),
    }
}

fn branch_build(project: &str, branch: &str, start_time: i64, succeeded: bool) -> BuildIdentity {
    BuildIdentity::from_context(BuildContext {
        build_id: format!("{project}:0c4bff21-8bb9-4a1e"),
        commit_hash: COMMIT.to_string(),
        repo_url: format!("{REPO}.git"),
        head_ref: format!("refs/heads/{branch}"),
        source_version: format!("branch/{branch}"),
        trigger: format!("branch/{branch}"),
        status_code: Some(if succeeded { "1" } else { "0" }.to_string()),
        start_time,
        commit: commit_meta(),
    })
}

fn pr_build(project: &str, pr_ref: &str, start_time: i64, succeeded: bool) -> BuildIdentity {
    BuildIdentity::from_context(BuildContext {
        build_id: format!("{project}:9d2a1c55-77e0-4d3b"),
        commit_hash: COMMIT.to_string(),
        repo_url: format!("{REPO}.git"),
        head_ref: String::new(),
        source_version: pr_ref.to_string(),
        trigger: pr_ref.to_string(),
        status_code: Some(if succeeded { "1" } else { "0" }.to_string()),
        start_time,
        commit: commit_meta(),
    })
}

fn retry_build(project: &str, source_version: &str, start_time: i64, succeeded: bool) -> BuildIdentity {
    BuildIdentity::from_context(BuildContext {
        build_id: format!("{project}:4fe11a02-6c8d-44aa"),
        commit_hash: COMMIT.to_string(),
        repo_url: format!("{REPO}.git"),
        head_ref: String::new(),
        source_version: source_version.to_string(),
        trigger: String::new(),
        status_code: Some(if succeeded { "1" } else { "0" }.to_string()),
        start_time,
        commit: commit_meta(),
    })
}

fn tracker(store: &Arc<MemoryHistoryStore>) -> BuildTracker {
    BuildTracker::new(
        Arc::clone(store) as Arc<dyn HistoryStore>,
        TrackerConfig::default(),
    )
}

// ---------------------------------------------------------------------------
// Version keys & lineage entries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn branch_build_writes_full_entry() {
    let store = Arc::new(MemoryHistoryStore::new());
    let recorded = tracker(&store)
        .record(branch_build("codebuild-ruby2.5", "my_branch", 1000, false))
        .await
        .unwrap();

    assert_eq!(
        recorded.key,
        RecordKey::new("codebuild-ruby2.5:branch/my_branch", "1000_1000")
    );
    assert!(recorded.last_entry.is_none());

    let fields = store.get(&recorded.key).await.unwrap().unwrap();
    assert_eq!(fields["source_ref"], json!("branch/my_branch"));
    assert_eq!(fields["branch_name"], json!("my_branch"));
    assert_eq!(fields["status"], json!("FAILED"));
    assert_eq!(fields["author_email"], json!("velma@dinkley.org"));
    assert_eq!(fields["commit_subject"], json!("Patch holes in van"));
    assert_eq!(fields["repo_url"], json!(REPO));
}

#[tokio::test]
async fn retry_extends_lineage_and_omits_ref_fields() {
    let store = Arc::new(MemoryHistoryStore::new());
    let t = tracker(&store);

    t.record(branch_build("codebuild-ruby2.5", "my_branch", 1000, false))
        .await
        .unwrap();
    let recorded = t
        .record(retry_build("codebuild-ruby2.5", COMMIT, 2000, true))
        .await
        .unwrap();

    // Reconciled against the webhook build: same lineage partition,
    // version key pairing the first build's start with this one's.
    assert_eq!(
        recorded.key,
        RecordKey::new("codebuild-ruby2.5:branch/my_branch", "1000_2000")
    );
    let last = recorded.last_entry.unwrap();
    assert_eq!(last.version_key, "1000_1000");

    // The retry entry never carries source_ref or branch_name; the
    // original triggering build's lineage identity stays untouched.
    let fields = store.get(&recorded.key).await.unwrap().unwrap();
    assert!(fields.get("source_ref").is_none());
    assert!(fields.get("branch_name").is_none());
    assert_eq!(fields["status"], json!("SUCCEEDED"));

    // And the original entry still has them.
    let original = store
        .get(&RecordKey::new(
            "codebuild-ruby2.5:branch/my_branch",
            "1000_1000",
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(original["source_ref"], json!("branch/my_branch"));
}

#[tokio::test]
async fn pr_retry_reconciles_by_exact_source_ref() {
    let store = Arc::new(MemoryHistoryStore::new());
    let t = tracker(&store);

    // Same commit under two PRs and a branch.
    t.record(pr_build("app", "pr/42", 1000, false)).await.unwrap();
    t.record(pr_build("app", "pr/43", 1500, true)).await.unwrap();
    t.record(branch_build("app", "master", 1800, true))
        .await
        .unwrap();

    // A retry whose source version names pr/42 must attach to exactly
    // that lineage, not pr/43 or the branch.
    let recorded = t
        .record(retry_build("app", "pr/42", 2000, true))
        .await
        .unwrap();
    assert_eq!(recorded.key, RecordKey::new("app:pr/42", "1000_2000"));
    assert_eq!(recorded.last_entry.unwrap().source_ref.unwrap(), "pr/42");
}

#[tokio::test]
async fn branch_retry_ignores_pr_lineages() {
    let store = Arc::new(MemoryHistoryStore::new());
    let t = tracker(&store);

    t.record(pr_build("app", "pr/42", 1000, false)).await.unwrap();
    t.record(branch_build("app", "master", 1500, true))
        .await
        .unwrap();

    // Non-PR retry: only source refs beginning with branch/ qualify.
    let recorded = t
        .record(retry_build("app", COMMIT, 2000, false))
        .await
        .unwrap();
    assert_eq!(recorded.key, RecordKey::new("app:branch/master", "1500_2000"));
}

#[tokio::test]
async fn round_trip_by_source_id() {
    let store = Arc::new(MemoryHistoryStore::new());
    let t = tracker(&store);

    t.record(branch_build("app", "master", 1000, true))
        .await
        .unwrap();

    // A later build of the same lineage finds the entry just written.
    let recorded = t
        .record(branch_build("app", "master", 2000, true))
        .await
        .unwrap();
    let last = recorded.last_entry.unwrap();
    assert_eq!(last.source_id, "app:branch/master");
    assert_eq!(last.version_key, "1000_1000");
    assert_eq!(last.start_time, 1000);
    assert_eq!(last.branch_name.as_deref(), Some("master"));

    // Each webhook build starts its own version pair.
    assert_eq!(recorded.key.sort, "2000_2000");
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pr_build_skips_summary_but_writes_branch_status() {
    let store = Arc::new(MemoryHistoryStore::new());
    tracker(&store)
        .record(pr_build("app", "pr/42", 1000, false))
        .await
        .unwrap();

    // No repository summary: PR builds carry no branch name.
    let summary_key = ProjectSummaryRecord::key_for(REPO);
    assert!(store.get(&summary_key).await.unwrap().is_none());

    // But the commit-level record exists regardless.
    let status_key = BranchStatusRecord::key_for(COMMIT, "pr/42");
    let fields = store.get(&status_key).await.unwrap().unwrap();
    assert_eq!(fields["source_ref"], json!("pr/42"));
    assert_eq!(fields["status"], json!("FAILED"));
    assert_eq!(fields["branch_name"], json!(null));
}

#[tokio::test]
async fn non_whitelisted_branch_skips_summary() {
    let store = Arc::new(MemoryHistoryStore::new());
    tracker(&store)
        .record(branch_build("app", "my_feature", 1000, true))
        .await
        .unwrap();

    let summary_key = ProjectSummaryRecord::key_for(REPO);
    assert!(store.get(&summary_key).await.unwrap().is_none());

    let status_key = BranchStatusRecord::key_for(COMMIT, "branch/my_feature");
    assert!(store.get(&status_key).await.unwrap().is_some());
}

#[tokio::test]
async fn summary_accumulates_projects_without_disturbing_siblings() {
    let store = Arc::new(MemoryHistoryStore::new());
    let t = tracker(&store);
    let summary_key = ProjectSummaryRecord::key_for(REPO);

    // First whitelisted build creates the record with a full map.
    t.record(branch_build("app-ruby2.5", "master", 1000, false))
        .await
        .unwrap();
    let record =
        ProjectSummaryRecord::from_fields(store.get(&summary_key).await.unwrap().unwrap())
            .unwrap();
    assert_eq!(record.projects.len(), 1);
    assert_eq!(record.commit_hash, COMMIT);

    // Second build of the same project updates its entry in place.
    t.record(branch_build("app-ruby2.5", "master", 2000, true))
        .await
        .unwrap();
    let record =
        ProjectSummaryRecord::from_fields(store.get(&summary_key).await.unwrap().unwrap())
            .unwrap();
    assert_eq!(record.projects.len(), 1);
    let ruby = &record.projects["app-ruby2.5"];
    assert!(ruby.status.is_success());
    assert_eq!(ruby.timestamp, 2000);

    // A different project code in the same repository adds a key and
    // leaves the first untouched.
    t.record(branch_build("app-cuke", "master", 3000, false))
        .await
        .unwrap();
    let record =
        ProjectSummaryRecord::from_fields(store.get(&summary_key).await.unwrap().unwrap())
            .unwrap();
    assert_eq!(record.projects.len(), 2);
    assert!(record.projects["app-ruby2.5"].status.is_success());
    assert!(!record.projects["app-cuke"].status.is_success());
    assert_eq!(record.timestamp, 3000);
}

#[tokio::test]
async fn summary_is_singleton_per_repository() {
    let store = Arc::new(MemoryHistoryStore::new());
    let t = tracker(&store);

    t.record(branch_build("app", "master", 1000, true))
        .await
        .unwrap();
    t.record(branch_build("app", "release", 2000, true))
        .await
        .unwrap();

    let summaries = store
        .query_partition(PROJECT_SUMMARY_PARTITION, true)
        .await
        .unwrap();
    assert_eq!(summaries.len(), 1);
}

// ---------------------------------------------------------------------------
// Unresolved retry (fallback lineage)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unresolved_retry_writes_under_fallback_key() {
    let store = Arc::new(MemoryHistoryStore::new());

    // Nothing in history: the retry cannot be reconciled.
    let recorded = tracker(&store)
        .record(retry_build("app", COMMIT, 3000, false))
        .await
        .unwrap();

    assert!(recorded.last_entry.is_none());
    assert_eq!(
        recorded.key,
        RecordKey::new(format!("app:commit/{COMMIT}"), "3000_3000")
    );

    let fields = store.get(&recorded.key).await.unwrap().unwrap();
    assert!(fields.get("source_ref").is_none());
    assert!(fields.get("branch_name").is_none());

    // Branch status keys off the source version in place of the
    // unresolved source ref.
    let status_key = RecordKey::new(COMMIT, digest_key(COMMIT));
    let status = store.get(&status_key).await.unwrap().unwrap();
    assert_eq!(status["source_ref"], json!(COMMIT));
    assert_eq!(status["branch_name"], json!(null));
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn aggregator_failure_surfaces_after_lineage_write() {
    let store = Arc::new(MemoryHistoryStore::new());
    store.fail_partition(PROJECT_SUMMARY_PARTITION);

    let err = tracker(&store)
        .record(branch_build("app", "master", 1000, true))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::Store(_)));

    // The lineage entry was already written; there is no compensation.
    let lineage_key = RecordKey::new("app:branch/master", "1000_1000");
    assert!(store.get(&lineage_key).await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Concurrency (accepted limitation)
// ---------------------------------------------------------------------------

/// Two retries of the same commit racing are not serialized: both read
/// the same last entry, and the aggregate views end up with whichever
/// write landed last, not whichever build started last. Last-write-wins
/// is the accepted behavior, demonstrated here rather than patched.
#[tokio::test]
async fn concurrent_retries_last_write_wins() {
    let store = Arc::new(MemoryHistoryStore::new());
    let t = tracker(&store);

    t.record(branch_build("app", "master", 1000, true))
        .await
        .unwrap();

    // Both retries resolve the same previous entry before either writes.
    use buildwatch_core::BuildHistory;
    let mut late = BuildHistory::new(
        Arc::clone(&store) as Arc<dyn HistoryStore>,
        TrackerConfig::default(),
        retry_build("app", COMMIT, 3000, true),
    );
    let mut early = BuildHistory::new(
        Arc::clone(&store) as Arc<dyn HistoryStore>,
        TrackerConfig::default(),
        retry_build("app", COMMIT, 2000, false),
    );
    late.last_entry().await.unwrap();
    early.last_entry().await.unwrap();

    // The later-started retry finishes first; the earlier one lands last.
    late.write_entry("app:branch/master").await.unwrap();
    early.write_entry("app:branch/master").await.unwrap();

    // Both lineage entries exist; the descending query still finds the
    // greater version key first.
    let entries = store.query_partition("app:branch/master", true).await.unwrap();
    assert_eq!(entries[0]["version_key"], json!("1000_3000"));

    // But the commit-level view shows the write that landed last, even
    // though a newer build already reported.
    let status_key = BranchStatusRecord::key_for(COMMIT, "branch/master");
    let status = store.get(&status_key).await.unwrap().unwrap();
    assert_eq!(status["timestamp"], json!(2000));
    assert_eq!(status["status"], json!("FAILED"));
}
