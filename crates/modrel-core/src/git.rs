//! Git integration: change detection and tag publication.

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::{ReleaseError, Result};
use crate::host::TagPublisher;

/// Capture the HEAD commit SHA from a git repository.
///
/// Runs `git rev-parse HEAD` in the given directory. Returns an error if the
/// directory is not inside a git repository or if git is not available.
pub async fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    let output = run_git(repo_dir, &["rev-parse", "HEAD"]).await?;
    let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if sha.is_empty() {
        return Err(ReleaseError::Git(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }
    Ok(sha)
}

/// Check whether a directory is inside a git work tree.
pub async fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn run_git(repo_dir: &Path, args: &[&str]) -> Result<Output> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .await
        .map_err(|e| ReleaseError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ReleaseError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(output)
}

/// The `git` executable bound to one working copy and remote.
#[derive(Debug, Clone)]
pub struct SystemGit {
    repo_dir: PathBuf,
    remote: String,
}

impl SystemGit {
    pub fn new(repo_dir: impl Into<PathBuf>, remote: &str) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: remote.to_string(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Paths added or modified on `head` since it branched from `base`.
    ///
    /// Uses the merge-base diff so commits that landed on `base` after the
    /// branch point are not attributed to `head`. Deleted paths are dropped.
    pub async fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>> {
        let range = format!("{base}...{head}");
        let output = run_git(
            &self.repo_dir,
            &["diff", "--name-only", "--diff-filter=d", "-z", range.as_str()],
        )
        .await?;
        let files: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        debug!(base, head, count = files.len(), "collected changed files");
        Ok(files)
    }

    /// Whether a local tag with this exact name exists.
    pub async fn has_local_tag(&self, tag: &str) -> Result<bool> {
        let output = run_git(&self.repo_dir, &["tag", "--list", tag]).await?;
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }
}

#[async_trait]
impl TagPublisher for SystemGit {
    async fn create_tag(&self, tag: &str, commit: &str) -> Result<()> {
        run_git(&self.repo_dir, &["tag", tag, commit]).await?;
        info!(tag, commit, "created tag");
        Ok(())
    }

    async fn push_tag(&self, tag: &str) -> Result<()> {
        let refspec = format!("refs/tags/{tag}");
        run_git(&self.repo_dir, &["push", self.remote.as_str(), refspec.as_str()])
            .await
            .map_err(|e| match e {
                ReleaseError::Git(msg) if is_push_rejection(&msg) => {
                    ReleaseError::rejected("tag push", msg)
                }
                other => ReleaseError::transient("tag push", other),
            })?;
        info!(tag, remote = %self.remote, "pushed tag");
        Ok(())
    }
}

/// The remote refused the ref update; pushing again cannot succeed.
fn is_push_rejection(stderr: &str) -> bool {
    stderr.contains("[rejected]")
        || stderr.contains("[remote rejected]")
        || stderr.contains("already exists")
        || stderr.contains("non-fast-forward")
}
