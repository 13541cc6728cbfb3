//! Change detection: which module directories had their version file touched.

use std::collections::BTreeSet;

use tracing::info;

use crate::config::ReleaseConfig;
use crate::domain::{Result, VERSION_FILE};
use crate::git::SystemGit;

/// Map changed repository paths to module directories.
///
/// A path counts when its file name is `VERSION` and its first segment is one
/// of `type_prefixes`. The result is de-duplicated and sorted.
pub fn modules_from_paths<S: AsRef<str>>(paths: &[S], type_prefixes: &[String]) -> Vec<String> {
    let mut modules = BTreeSet::new();
    for path in paths {
        let path = path.as_ref().trim().trim_start_matches("./");
        let Some((directory, file)) = path.rsplit_once('/') else {
            continue;
        };
        if file != VERSION_FILE {
            continue;
        }
        let module_type = directory.split('/').next().unwrap_or_default();
        if type_prefixes.iter().any(|p| p == module_type) {
            modules.insert(directory.to_string());
        }
    }
    modules.into_iter().collect()
}

/// Module directories whose version file differs between `base` and `head`.
pub async fn detect_changed_modules(
    git: &SystemGit,
    config: &ReleaseConfig,
    base: &str,
    head: &str,
) -> Result<Vec<String>> {
    let files = git.changed_files(base, head).await?;
    let modules = modules_from_paths(&files, &config.type_prefixes);
    info!(base, head, modules = modules.len(), "detected changed modules");
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> Vec<String> {
        ReleaseConfig::default().type_prefixes
    }

    #[test]
    fn test_only_version_files_under_known_types() {
        let paths = [
            "services/api/gateway/VERSION",
            "services/api/gateway/main.tf",
            "helpers/net/VERSION",
            "docs/VERSION",
            "VERSION",
            "resources/db/VERSION.bak",
        ];
        assert_eq!(
            modules_from_paths(&paths, &prefixes()),
            vec!["helpers/net", "services/api/gateway"]
        );
    }

    #[test]
    fn test_deduplicates_and_sorts() {
        let paths = vec![
            "resources/b/VERSION".to_string(),
            "./resources/a/VERSION".to_string(),
            "resources/b/VERSION".to_string(),
        ];
        assert_eq!(
            modules_from_paths(&paths, &prefixes()),
            vec!["resources/a", "resources/b"]
        );
    }

    #[test]
    fn test_no_changes_yields_no_modules() {
        let paths: [&str; 0] = [];
        assert!(modules_from_paths(&paths, &prefixes()).is_empty());
    }

    #[test]
    fn test_type_only_directory_is_kept() {
        assert_eq!(
            modules_from_paths(&["helpers/VERSION"], &prefixes()),
            vec!["helpers"]
        );
    }
}
