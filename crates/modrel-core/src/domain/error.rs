//! Error taxonomy for module release operations.

use std::path::PathBuf;

/// Errors produced while validating and publishing a module release.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    /// The version file does not hold a semantic version.
    #[error("invalid version '{value}' in {}", path.display())]
    InvalidVersion { path: PathBuf, value: String },

    /// A tag with the derived name already exists.
    #[error("tag '{tag}' already exists for version {version} ({})", path.display())]
    DuplicateTag {
        path: PathBuf,
        version: String,
        tag: String,
    },

    /// Network, auth or rate-limit failure talking to an external service.
    #[error("{operation} failed: {detail}")]
    Transient { operation: String, detail: String },

    /// The external service refused the request; retrying will not help.
    #[error("{operation} rejected: {detail}")]
    Rejected { operation: String, detail: String },

    /// The tag was pushed but the release record could not be created.
    #[error("tag '{tag}' was pushed but {stage} failed: {detail}")]
    PartialPublish {
        tag: String,
        stage: String,
        detail: String,
    },

    #[error("git error: {0}")]
    Git(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReleaseError {
    /// Build a transient error for the named operation.
    pub fn transient(operation: impl Into<String>, detail: impl ToString) -> Self {
        ReleaseError::Transient {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }

    /// Build a permanent rejection for the named operation.
    pub fn rejected(operation: impl Into<String>, detail: impl ToString) -> Self {
        ReleaseError::Rejected {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReleaseError::Transient { .. })
    }

    /// The file a developer-facing annotation should point at, if any.
    pub fn file(&self) -> Option<&std::path::Path> {
        match self {
            ReleaseError::InvalidVersion { path, .. } | ReleaseError::DuplicateTag { path, .. } => {
                Some(path.as_path())
            }
            _ => None,
        }
    }

    /// Short title used for annotations.
    pub fn title(&self) -> &'static str {
        match self {
            ReleaseError::InvalidVersion { .. } => "Invalid version",
            ReleaseError::DuplicateTag { .. } => "Duplicate tag",
            ReleaseError::Transient { .. } => "External call failed",
            ReleaseError::Rejected { .. } => "Request rejected",
            ReleaseError::PartialPublish { .. } => "Partial publish",
            ReleaseError::Git(_) => "Git error",
            ReleaseError::Config(_) => "Configuration error",
            ReleaseError::Io(_) => "IO error",
            ReleaseError::Json(_) => "Serialization error",
        }
    }
}

/// Result type for release operations.
pub type Result<T> = std::result::Result<T, ReleaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_version_names_file() {
        let err = ReleaseError::InvalidVersion {
            path: PathBuf::from("services/api/VERSION"),
            value: "v1.2".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("services/api/VERSION"));
        assert!(msg.contains("v1.2"));
        assert_eq!(err.file(), Some(std::path::Path::new("services/api/VERSION")));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_duplicate_tag_display() {
        let err = ReleaseError::DuplicateTag {
            path: PathBuf::from("helpers/x/VERSION"),
            version: "1.0.0".to_string(),
            tag: "x/1.0.0".to_string(),
        };
        assert!(err.to_string().contains("x/1.0.0"));
        assert!(err.file().is_some());
    }

    #[test]
    fn test_transient_is_retryable() {
        let err = ReleaseError::transient("lookup tag", "503 Service Unavailable");
        assert!(err.is_transient());
        assert!(err.file().is_none());
        assert!(err.to_string().contains("lookup tag failed"));
    }

    #[test]
    fn test_rejected_is_not_retryable() {
        let err = ReleaseError::rejected("release creation", "HTTP 422: already_exists");
        assert!(!err.is_transient());
        assert_eq!(err.title(), "Request rejected");
        assert!(err.to_string().contains("release creation rejected"));
    }

    #[test]
    fn test_partial_publish_not_retryable() {
        let err = ReleaseError::PartialPublish {
            tag: "a/1.0.0".to_string(),
            stage: "release creation".to_string(),
            detail: "422".to_string(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.title(), "Partial publish");
    }
}
