//! Explicit run context.
//!
//! Everything the pipeline needs to know about the triggering event is
//! captured here once and passed down, instead of being read from the
//! environment deep inside the call graph.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Result;

/// Default web URL of the hosting service.
pub const DEFAULT_SERVER_URL: &str = "https://github.com";

/// Context of one triggering pull-request event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunContext {
    /// Web URL of the host, e.g. `https://github.com`.
    pub server_url: String,
    /// `owner/repo`.
    pub repository: String,
    /// Identifier of the triggering workflow run.
    pub run_id: Option<String>,
    /// Pull request number.
    pub pr_number: Option<u64>,
    /// Whether the pull request has been merged.
    pub merged: bool,
    /// Commit the run was triggered for.
    pub commit_sha: Option<String>,
    /// Merge commit created when the pull request was merged.
    pub merge_commit_sha: Option<String>,
    pub base_sha: Option<String>,
    pub head_sha: Option<String>,
}

/// The subset of a `pull_request` event payload we read.
#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    pull_request: Option<PullRequestPayload>,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    number: u64,
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    merge_commit_sha: Option<String>,
    base: CommitRefPayload,
    head: CommitRefPayload,
}

#[derive(Debug, Deserialize)]
struct CommitRefPayload {
    sha: String,
}

impl RunContext {
    /// Build a context from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a context from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ctx = RunContext {
            server_url: lookup("GITHUB_SERVER_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            repository: lookup("GITHUB_REPOSITORY").unwrap_or_default(),
            run_id: lookup("GITHUB_RUN_ID"),
            commit_sha: lookup("GITHUB_SHA"),
            ..Default::default()
        };

        if let Some(event_path) = lookup("GITHUB_EVENT_PATH") {
            let path = Path::new(&event_path);
            if path.exists() {
                let raw = std::fs::read_to_string(path)?;
                ctx.apply_event(&raw)?;
            }
        }
        Ok(ctx)
    }

    /// Fill pull-request fields from a raw event payload.
    ///
    /// A pull request only counts as merged when the event is a close.
    pub fn apply_event(&mut self, raw: &str) -> Result<()> {
        let event: EventPayload = serde_json::from_str(raw)?;
        let Some(pr) = event.pull_request else {
            debug!("event payload carries no pull_request");
            return Ok(());
        };
        let closed = event.action.as_deref() == Some("closed");
        self.pr_number = Some(pr.number);
        self.merged = closed && pr.merged;
        self.merge_commit_sha = pr.merge_commit_sha.filter(|_| self.merged);
        self.base_sha = Some(pr.base.sha);
        self.head_sha = Some(pr.head.sha);
        Ok(())
    }

    /// Commit a new tag should point at.
    pub fn tag_commit(&self) -> Option<&str> {
        self.merge_commit_sha
            .as_deref()
            .or(self.commit_sha.as_deref())
    }

    /// Web link to the triggering run.
    pub fn run_url(&self) -> Option<String> {
        self.run_id.as_ref().map(|id| {
            format!(
                "{}/{}/actions/runs/{}",
                self.server_url.trim_end_matches('/'),
                self.repository,
                id
            )
        })
    }

    /// Web link to the pull request.
    pub fn pr_url(&self) -> Option<String> {
        self.pr_number.map(|n| {
            format!(
                "{}/{}/pull/{}",
                self.server_url.trim_end_matches('/'),
                self.repository,
                n
            )
        })
    }
}
