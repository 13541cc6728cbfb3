//! Seams to the external services a release touches.
//!
//! - `ReleaseHost`: tag lookup and release records (the hosting service API)
//! - `TagPublisher`: creating and pushing tag references (git)
//!
//! In-memory implementations live in [`crate::fakes`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Result;

/// Outcome of an exact-name tag lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagLookup {
    /// A reference with this exact name exists.
    Found,
    /// The host answered with a well-defined "missing reference".
    Missing,
}

/// Release record to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRelease {
    pub tag_name: String,
    pub name: String,
    pub body: String,
}

/// Release record as returned by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedRelease {
    pub id: u64,
    pub html_url: String,
}

/// Tag namespace and release records on the hosting service.
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Look up `refs/tags/{tag}` by exact name.
    ///
    /// Failures other than a missing reference are returned as
    /// [`crate::ReleaseError::Transient`].
    async fn lookup_tag(&self, tag: &str) -> Result<TagLookup>;

    /// Create a release bound to an existing tag.
    async fn create_release(&self, release: &NewRelease) -> Result<PublishedRelease>;
}

/// Local tag creation and publication to the shared remote.
#[async_trait]
pub trait TagPublisher: Send + Sync {
    /// Create a lightweight tag `tag` at `commit`.
    async fn create_tag(&self, tag: &str, commit: &str) -> Result<()>;

    /// Push the tag to the shared remote.
    async fn push_tag(&self, tag: &str) -> Result<()>;
}
