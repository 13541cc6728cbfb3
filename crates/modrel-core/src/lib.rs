//! modrel core library
//!
//! Building blocks for releasing independently versioned modules out of an
//! infrastructure monorepo:
//! - parse and validate per-module `VERSION` files ([`version`])
//! - detect which modules changed between two commits ([`discover`])
//! - look up, create and push tags and create release records ([`host`],
//!   [`github`], [`git`])
//! - render release notes and CI annotations ([`notes`], [`annotate`])

pub mod annotate;
pub mod config;
pub mod context;
pub mod discover;
pub mod domain;
pub mod fakes;
pub mod git;
pub mod github;
pub mod host;
pub mod notes;
pub mod retry;
pub mod telemetry;
pub mod version;

pub use annotate::Annotation;
pub use config::ReleaseConfig;
pub use context::RunContext;
pub use discover::{detect_changed_modules, modules_from_paths};
pub use domain::{ModuleRelease, ReleaseError, Result, VERSION_FILE};
pub use git::{capture_head_sha, is_git_repo, SystemGit};
pub use github::{GitHubClient, GitHubConfig};
pub use host::{NewRelease, PublishedRelease, ReleaseHost, TagLookup, TagPublisher};
pub use notes::render_release_body;
pub use retry::{with_retry, RetryPolicy};
pub use version::{is_valid_semver, parse_module_release, read_module_release};
