//! Version file parsing and tag derivation.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::domain::{ModuleRelease, ReleaseError, Result, VERSION_FILE};

/// Semantic Versioning 2.0 grammar (semver.org), ASCII digits only.
pub const SEMVER_PATTERN: &str = r"^(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)(?:-((?:0|[1-9][0-9]*|[0-9]*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9][0-9]*|[0-9]*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$";

fn semver_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SEMVER_PATTERN).expect("SEMVER_PATTERN is a valid regex"))
}

/// Check a string against the semantic version grammar. No trimming is done.
pub fn is_valid_semver(value: &str) -> bool {
    semver_regex().is_match(value)
}

/// Build a [`ModuleRelease`] from a module directory and its version file contents.
///
/// The type is the first path segment; the name is every remaining segment,
/// lower-cased and joined by `/`. Paths with no segment after the type are
/// not rejected and produce an empty name.
pub fn parse_module_release(directory: &str, contents: &str) -> Result<ModuleRelease> {
    let directory = normalize_directory(directory);
    let version = contents.trim();

    if !is_valid_semver(version) {
        return Err(ReleaseError::InvalidVersion {
            path: Path::new(&directory).join(VERSION_FILE),
            value: version.to_string(),
        });
    }

    let mut segments = directory.split('/').filter(|s| !s.is_empty());
    let module_type = segments.next().unwrap_or_default().to_string();
    let name = segments
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("/");

    debug!(module = %directory, version = %version, "parsed module version");
    Ok(ModuleRelease::new(
        directory,
        module_type,
        name,
        version.to_string(),
    ))
}

/// Read `{repo_root}/{directory}/VERSION` and parse it.
pub async fn read_module_release(repo_root: &Path, directory: &str) -> Result<ModuleRelease> {
    let directory = normalize_directory(directory);
    let path = repo_root.join(&directory).join(VERSION_FILE);
    let contents = tokio::fs::read_to_string(&path).await?;
    parse_module_release(&directory, &contents)
}

fn normalize_directory(directory: &str) -> String {
    let trimmed = directory.trim();
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    trimmed.trim_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_versions() {
        for v in [
            "0.0.0",
            "1.2.3",
            "10.20.30",
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-0.3.7",
            "1.0.0-x.7.z.92",
            "1.0.0-alpha+001",
            "1.0.0+20130313144700",
            "1.0.0-beta+exp.sha.5114f85",
            "1.0.0-x-y-z.--",
        ] {
            assert!(is_valid_semver(v), "{v} should be valid");
        }
    }

    #[test]
    fn test_invalid_versions() {
        for v in [
            "",
            "1",
            "1.2",
            "v1.2.3",
            "1.2.3.4",
            "01.2.3",
            "1.02.3",
            "1.2.03",
            "1.2.3-",
            "1.2.3-01",
            "1.2.3+",
            "1.2.3-alpha..1",
            " 1.2.3",
            "1.2.3\n4.5.6",
        ] {
            assert!(!is_valid_semver(v), "{v:?} should be invalid");
        }
    }

    #[test]
    fn test_parse_gateway_scenario() {
        let r = parse_module_release("services/api/gateway", "2.3.0\n").unwrap();
        assert_eq!(r.module_type(), "services");
        assert_eq!(r.name(), "api/gateway");
        assert_eq!(r.version(), "2.3.0");
        assert_eq!(r.tag(), "api/gateway/2.3.0");
    }

    #[test]
    fn test_name_is_lowercased() {
        let r = parse_module_release("resources/Storage/S3Bucket", "1.0.0").unwrap();
        assert_eq!(r.name(), "storage/s3bucket");
        assert_eq!(r.tag(), "storage/s3bucket/1.0.0");
        assert_eq!(r.directory(), "resources/Storage/S3Bucket");
    }

    #[test]
    fn test_directory_is_normalized() {
        let r = parse_module_release("./helpers/net/", "0.1.0").unwrap();
        assert_eq!(r.directory(), "helpers/net");
        assert_eq!(r.tag(), "net/0.1.0");
    }

    #[test]
    fn test_type_only_directory_passes_through() {
        let r = parse_module_release("helpers", "1.0.0").unwrap();
        assert_eq!(r.name(), "");
        assert_eq!(r.tag(), "/1.0.0");
    }

    #[test]
    fn test_invalid_version_reports_file() {
        let err = parse_module_release("services/api", "v1.2.3").unwrap_err();
        match err {
            ReleaseError::InvalidVersion { path, value } => {
                assert_eq!(path, Path::new("services/api/VERSION"));
                assert_eq!(value, "v1.2.3");
            }
            other => panic!("expected InvalidVersion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_module_release_from_disk() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("services/queue");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("VERSION"), "  3.1.4 \n").unwrap();

        let r = read_module_release(root.path(), "services/queue").await.unwrap();
        assert_eq!(r.tag(), "queue/3.1.4");
    }

    #[tokio::test]
    async fn test_read_missing_version_file() {
        let root = tempfile::tempdir().unwrap();
        let err = read_module_release(root.path(), "services/none")
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Io(_)));
    }
}
