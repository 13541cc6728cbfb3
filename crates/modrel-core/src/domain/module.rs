//! Per-module release record.

use serde::Serialize;
use std::path::PathBuf;

/// Name of the file holding a module's version.
pub const VERSION_FILE: &str = "VERSION";

/// A validated release candidate for one changed module.
///
/// Built by [`crate::version::parse_module_release`] and never mutated
/// afterwards; the checker and publisher only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleRelease {
    directory: String,
    module_type: String,
    name: String,
    version: String,
    tag: String,
}

impl ModuleRelease {
    pub(crate) fn new(directory: String, module_type: String, name: String, version: String) -> Self {
        let tag = format!("{name}/{version}").to_lowercase();
        Self {
            directory,
            module_type,
            name,
            version,
            tag,
        }
    }

    /// Module directory relative to the repository root, e.g. `services/foo/bar`.
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Top-level category (first path segment).
    pub fn module_type(&self) -> &str {
        &self.module_type
    }

    /// Lower-cased logical name (remaining path segments).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Trimmed semantic version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Release tag, `{name}/{version}` lower-cased.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Path of the version file this release was read from.
    pub fn version_file(&self) -> PathBuf {
        PathBuf::from(&self.directory).join(VERSION_FILE)
    }

    /// Locator downstream consumers use to pin this exact release, of the form
    /// `{server_url}/{owner}/{repo}//{directory}?ref={tag}`.
    pub fn source_locator(&self, server_url: &str, repository: &str) -> String {
        format!(
            "{}/{}//{}?ref={}",
            server_url.trim_end_matches('/'),
            repository,
            self.directory,
            self.tag
        )
    }
}

impl std::fmt::Display for ModuleRelease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.tag, self.directory)
    }
}
