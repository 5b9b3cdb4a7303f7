//! Git integration for capturing commit metadata.

use std::path::Path;
use std::process::Command;

use crate::error::{Result, TrackerError};

/// Author/committer identity and subject line of a commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitMetadata {
    pub short_hash: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    pub subject: String,
}

/// Capture metadata of the HEAD commit in the given directory.
///
/// Runs `git show -s` with a pipe-delimited format. Returns an error if
/// the directory is not inside a git repository or git is not available.
pub fn capture_commit_metadata(repo_dir: &Path) -> Result<CommitMetadata> {
    let output = Command::new("git")
        .args(["show", "-s", "--format=%h|%aN|%aE|%cN|%cE|%s"])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| TrackerError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TrackerError::Git(format!("git show failed: {stderr}")));
    }

    let line = String::from_utf8_lossy(&output.stdout).trim().to_string();
    parse_show_line(&line)
}

fn parse_show_line(line: &str) -> Result<CommitMetadata> {
    // The subject may itself contain '|', so split off the first five
    // fields and keep the remainder intact.
    let parts: Vec<&str> = line.splitn(6, '|').collect();
    if parts.len() != 6 {
        return Err(TrackerError::Git(format!(
            "unexpected git show output: {line}"
        )));
    }
    Ok(CommitMetadata {
        short_hash: parts[0].to_string(),
        author_name: parts[1].to_string(),
        author_email: parts[2].to_string(),
        committer_name: parts[3].to_string(),
        committer_email: parts[4].to_string(),
        subject: parts[5].to_string(),
    })
}
