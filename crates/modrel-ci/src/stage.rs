//! Release stage definitions.

use serde::{Deserialize, Serialize};

/// The three stages every module goes through, in order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStage {
    /// Read and validate the version file, derive the tag.
    ParseVersion,

    /// Make sure the tag does not exist yet.
    CheckTag,

    /// Create, push and release the tag, or render a preview.
    Publish,
}

impl ReleaseStage {
    /// All stages in execution order.
    pub const ALL: [ReleaseStage; 3] = [
        ReleaseStage::ParseVersion,
        ReleaseStage::CheckTag,
        ReleaseStage::Publish,
    ];

    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            ReleaseStage::ParseVersion => "parse_version",
            ReleaseStage::CheckTag => "check_tag",
            ReleaseStage::Publish => "publish",
        }
    }
}

impl std::fmt::Display for ReleaseStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one stage for one module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageResult {
    pub stage: ReleaseStage,

    /// Whether the stage succeeded.
    pub passed: bool,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}
