//! Developer-facing annotations in the workflow-command format.
//!
//! Lines such as `::error file=services/api/VERSION,title=Invalid version::...`
//! printed to stdout are rendered by the CI host next to the offending file.

use std::fmt;
use std::path::PathBuf;

use crate::domain::ReleaseError;

/// Annotation severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Notice,
    Warning,
    Error,
}

impl Level {
    fn command(&self) -> &'static str {
        match self {
            Level::Notice => "notice",
            Level::Warning => "warning",
            Level::Error => "error",
        }
    }
}

/// One annotation line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub level: Level,
    pub file: Option<PathBuf>,
    pub title: Option<String>,
    pub message: String,
}

impl Annotation {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            file: None,
            title: None,
            message: message.into(),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            level: Level::Notice,
            ..Self::error(message)
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Error annotation tied to the file the error names, if any.
    pub fn from_error(err: &ReleaseError) -> Self {
        let annotation = Self::error(err.to_string()).with_title(err.title());
        match err.file() {
            Some(file) => annotation.with_file(file),
            None => annotation,
        }
    }
}

fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut props = Vec::new();
        if let Some(file) = &self.file {
            props.push(format!("file={}", escape_property(&file.to_string_lossy())));
        }
        if let Some(title) = &self.title {
            props.push(format!("title={}", escape_property(title)));
        }
        write!(f, "::{}", self.level.command())?;
        if !props.is_empty() {
            write!(f, " {}", props.join(","))?;
        }
        write!(f, "::{}", escape_data(&self.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_error() {
        assert_eq!(Annotation::error("boom").to_string(), "::error::boom");
    }

    #[test]
    fn test_error_with_file_and_title() {
        let a = Annotation::error("bad")
            .with_file("services/api/VERSION")
            .with_title("Invalid version");
        assert_eq!(
            a.to_string(),
            "::error file=services/api/VERSION,title=Invalid version::bad"
        );
    }

    #[test]
    fn test_escaping() {
        let a = Annotation::notice("50% done\nnext line").with_title("a:b,c");
        assert_eq!(
            a.to_string(),
            "::notice title=a%3Ab%2Cc::50%25 done%0Anext line"
        );
    }

    #[test]
    fn test_from_invalid_version_points_at_file() {
        let err = ReleaseError::InvalidVersion {
            path: PathBuf::from("helpers/x/VERSION"),
            value: "1.2".to_string(),
        };
        let a = Annotation::from_error(&err);
        assert_eq!(a.level, Level::Error);
        assert_eq!(a.file, Some(PathBuf::from("helpers/x/VERSION")));
        assert!(a.to_string().starts_with("::error file=helpers/x/VERSION,title=Invalid version::"));
    }

    #[test]
    fn test_from_transient_has_no_file() {
        let err = ReleaseError::transient("tag lookup", "HTTP 502");
        assert!(Annotation::from_error(&err).file.is_none());
    }
}
