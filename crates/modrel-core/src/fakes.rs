//! In-memory fakes for the host traits (testing only)
//!
//! [`MemoryForge`] plays both the hosting service and the git remote, and
//! records every mutating call in order so tests can assert on sequencing.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{ReleaseError, Result};
use crate::host::{NewRelease, PublishedRelease, ReleaseHost, TagLookup, TagPublisher};

/// A call observed by [`MemoryForge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForgeCall {
    LookupTag { tag: String },
    CreateTag { tag: String, commit: String },
    PushTag { tag: String },
    CreateRelease { tag: String, name: String, body: String },
}

impl ForgeCall {
    /// Whether the call changes external state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ForgeCall::LookupTag { .. })
    }
}

#[derive(Debug, Default)]
struct ForgeState {
    local_tags: BTreeSet<String>,
    remote_tags: BTreeSet<String>,
    releases: Vec<NewRelease>,
    calls: Vec<ForgeCall>,
    lookup_failures: VecDeque<String>,
    release_failures: VecDeque<String>,
}

/// In-memory tag namespace and release store.
#[derive(Debug, Default)]
pub struct MemoryForge {
    state: Mutex<ForgeState>,
}

impl MemoryForge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed tags that already exist on the remote.
    pub fn with_existing_tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.state.lock().unwrap();
            state.remote_tags.extend(tags.into_iter().map(Into::into));
        }
        self
    }

    /// Make the next `count` lookups fail with a transient error.
    pub fn fail_next_lookups(&self, count: usize, detail: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .lookup_failures
            .extend(std::iter::repeat(detail.to_string()).take(count));
    }

    /// Make the next `count` release creations fail with a transient error.
    pub fn fail_next_releases(&self, count: usize, detail: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .release_failures
            .extend(std::iter::repeat(detail.to_string()).take(count));
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<ForgeCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded mutating calls, in order.
    pub fn mutations(&self) -> Vec<ForgeCall> {
        self.calls().into_iter().filter(ForgeCall::is_mutation).collect()
    }

    /// Releases created so far.
    pub fn releases(&self) -> Vec<NewRelease> {
        self.state.lock().unwrap().releases.clone()
    }

    /// Tags visible on the remote.
    pub fn remote_tags(&self) -> Vec<String> {
        self.state.lock().unwrap().remote_tags.iter().cloned().collect()
    }
}

#[async_trait]
impl ReleaseHost for MemoryForge {
    async fn lookup_tag(&self, tag: &str) -> Result<TagLookup> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ForgeCall::LookupTag {
            tag: tag.to_string(),
        });
        if let Some(detail) = state.lookup_failures.pop_front() {
            return Err(ReleaseError::transient("tag lookup", detail));
        }
        if state.remote_tags.contains(tag) {
            Ok(TagLookup::Found)
        } else {
            Ok(TagLookup::Missing)
        }
    }

    async fn create_release(&self, release: &NewRelease) -> Result<PublishedRelease> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ForgeCall::CreateRelease {
            tag: release.tag_name.clone(),
            name: release.name.clone(),
            body: release.body.clone(),
        });
        if let Some(detail) = state.release_failures.pop_front() {
            return Err(ReleaseError::transient("release creation", detail));
        }
        if !state.remote_tags.contains(&release.tag_name) {
            return Err(ReleaseError::transient(
                "release creation",
                format!("tag '{}' does not exist on remote", release.tag_name),
            ));
        }
        state.releases.push(release.clone());
        let id = state.releases.len() as u64;
        Ok(PublishedRelease {
            id,
            html_url: format!("memory://releases/{}", release.tag_name),
        })
    }
}

#[async_trait]
impl TagPublisher for MemoryForge {
    async fn create_tag(&self, tag: &str, commit: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ForgeCall::CreateTag {
            tag: tag.to_string(),
            commit: commit.to_string(),
        });
        if !state.local_tags.insert(tag.to_string()) {
            return Err(ReleaseError::Git(format!("tag '{tag}' already exists")));
        }
        Ok(())
    }

    async fn push_tag(&self, tag: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ForgeCall::PushTag {
            tag: tag.to_string(),
        });
        if !state.local_tags.contains(tag) {
            return Err(ReleaseError::Git(format!("no local tag '{tag}'")));
        }
        state.remote_tags.insert(tag.to_string());
        Ok(())
    }
}
