//! Tracker configuration
//!
//! All ambient settings are passed explicitly into component constructors;
//! there is no global state. `BWT_`-prefixed env vars configure the
//! tracker (the `CODEBUILD_` prefix is reserved for the build platform).

use lineage_store::DEFAULT_TABLE;

/// Branch names summarized at repository level when no override is given.
const DEFAULT_WHITELIST: [&str; 2] = ["master", "release"];

/// Configuration for the build tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Name of the build status table.
    pub table: String,
    /// Branch names eligible for repository-level summary aggregation.
    pub whitelist_branches: Vec<String>,
    /// Notification strategy applied when no per-branch override matches.
    pub default_strategy: String,
    /// Per-branch strategy overrides, `branch:strategy` pairs.
    pub strategy_overrides: Vec<String>,
    /// Extra channel notified for non-PR builds, if any.
    pub additional_channel: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            table: DEFAULT_TABLE.to_string(),
            whitelist_branches: DEFAULT_WHITELIST.iter().map(|s| s.to_string()).collect(),
            default_strategy: "fail_or_status_change".to_string(),
            strategy_overrides: Vec::new(),
            additional_channel: None,
        }
    }
}

impl TrackerConfig {
    /// Build configuration from `BWT_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        TrackerConfig {
            table: std::env::var("BWT_TABLE").unwrap_or(defaults.table),
            whitelist_branches: std::env::var("BWT_WHITELIST_BRANCHES")
                .map(|v| split_csv(&v))
                .unwrap_or(defaults.whitelist_branches),
            default_strategy: std::env::var("BWT_DEFAULT_NOTIFY_STRATEGY")
                .unwrap_or(defaults.default_strategy),
            strategy_overrides: std::env::var("BWT_OVERRIDE_NOTIFY_STRATEGY")
                .map(|v| split_csv(&v))
                .unwrap_or_default(),
            additional_channel: std::env::var("BWT_ADDITIONAL_CHANNEL").ok(),
        }
    }

    /// Whether a branch is summarized at repository level.
    pub fn is_whitelisted(&self, branch_name: &str) -> bool {
        self.whitelist_branches.iter().any(|b| b == branch_name)
    }

    /// Whitelisted branches in trigger format (`branch/<name>`).
    pub fn non_pr_branch_ids(&self) -> Vec<String> {
        self.whitelist_branches
            .iter()
            .map(|name| format!("branch/{name}"))
            .collect()
    }

    /// Strategy name for a branch, honoring overrides.
    pub fn strategy_for_branch(&self, branch_name: &str) -> &str {
        self.strategy_overrides
            .iter()
            .filter_map(|o| o.split_once(':'))
            .find(|(branch, _)| *branch == branch_name)
            .map(|(_, strategy)| strategy)
            .unwrap_or(&self.default_strategy)
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
