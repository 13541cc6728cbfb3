//! Per-module release pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use modrel_core::{
    parse_module_release, read_module_release, render_release_body, with_retry, Annotation,
    ModuleRelease, NewRelease, ReleaseError, ReleaseHost, Result, RetryPolicy, RunContext,
    TagLookup, TagPublisher, VERSION_FILE,
};

use crate::gate::UnitStatus;
use crate::stage::{ReleaseStage, StageResult};

/// What the publish stage produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// Merge not confirmed: the body that would have been published.
    Preview { body: String },

    /// Tag pushed and release created.
    Published { tag: String, release_url: String },
}

/// Result of running the pipeline for one module directory.
#[derive(Debug)]
pub struct ModuleReport {
    /// Module directory the pipeline ran for.
    pub directory: String,

    /// Terminal status.
    pub status: UnitStatus,

    /// Parsed release, if the version file was valid.
    pub release: Option<ModuleRelease>,

    /// Preview or publication result on success.
    pub outcome: Option<ReleaseOutcome>,

    /// The error that stopped the pipeline.
    pub error: Option<ReleaseError>,

    /// Stages that ran, in order.
    pub stages: Vec<StageResult>,

    pub finished_at: DateTime<Utc>,
}

impl ModuleReport {
    fn new(directory: &str) -> Self {
        Self {
            directory: directory.to_string(),
            status: UnitStatus::Success,
            release: None,
            outcome: None,
            error: None,
            stages: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    /// Report for a unit that never produced a result of its own.
    pub fn aborted(directory: &str, status: UnitStatus, error: ReleaseError) -> Self {
        Self {
            status,
            error: Some(error),
            ..Self::new(directory)
        }
    }

    /// Whether the module reached a passing terminal state.
    pub fn passed(&self) -> bool {
        self.status.is_passing()
    }

    /// The stage that failed, if any.
    pub fn failed_stage(&self) -> Option<ReleaseStage> {
        self.stages.iter().find(|s| !s.passed).map(|s| s.stage)
    }

    /// Annotations describing this module's result.
    pub fn annotations(&self) -> Vec<Annotation> {
        let mut out = Vec::new();
        if let Some(err) = &self.error {
            let mut annotation = Annotation::from_error(err);
            if annotation.file.is_none() {
                annotation = annotation.with_file(PathBuf::from(&self.directory).join(VERSION_FILE));
            }
            out.push(annotation);
        }
        match &self.outcome {
            Some(ReleaseOutcome::Preview { body }) => {
                let title = match &self.release {
                    Some(r) => format!("Release preview for {}", r.tag()),
                    None => "Release preview".to_string(),
                };
                out.push(Annotation::notice(body.clone()).with_title(title));
            }
            Some(ReleaseOutcome::Published { tag, release_url }) => {
                out.push(
                    Annotation::notice(format!("Released {tag}: {release_url}"))
                        .with_title("Release published"),
                );
            }
            None => {}
        }
        out
    }

    /// Machine-readable summary.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "directory": &self.directory,
            "status": self.status,
            "tag": self.release.as_ref().map(|r| r.tag()),
            "version": self.release.as_ref().map(|r| r.version()),
            "outcome": &self.outcome,
            "error": self.error.as_ref().map(|e| e.to_string()),
            "failed_stage": self.failed_stage(),
            "stages": &self.stages,
            "finished_at": self.finished_at,
        })
    }

    fn record<T>(&mut self, stage: ReleaseStage, started: Instant, result: &Result<T>) {
        self.stages.push(StageResult {
            stage,
            passed: result.is_ok(),
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    fn fail(mut self, err: ReleaseError) -> Self {
        warn!(module = %self.directory, error = %err, "module release failed");
        self.status = UnitStatus::Failure;
        self.error = Some(err);
        self.finished_at = Utc::now();
        self
    }
}

/// Runs parse, check and publish for one module at a time.
pub struct ModulePipeline {
    host: Arc<dyn ReleaseHost>,
    tags: Arc<dyn TagPublisher>,
    retry: RetryPolicy,
    repo_root: PathBuf,
}

impl ModulePipeline {
    pub fn new(
        host: Arc<dyn ReleaseHost>,
        tags: Arc<dyn TagPublisher>,
        repo_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host,
            tags,
            retry: RetryPolicy::default(),
            repo_root: repo_root.into(),
        }
    }

    /// Override the retry policy for external calls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Read `{directory}/VERSION` from the repository and run every stage.
    pub async fn run(&self, ctx: &RunContext, directory: &str) -> ModuleReport {
        let started = Instant::now();
        let parsed = read_module_release(&self.repo_root, directory).await;
        self.run_stages(ctx, directory, started, parsed).await
    }

    /// Run every stage with version file contents supplied by the caller.
    pub async fn run_with_contents(
        &self,
        ctx: &RunContext,
        directory: &str,
        contents: &str,
    ) -> ModuleReport {
        let started = Instant::now();
        let parsed = parse_module_release(directory, contents);
        self.run_stages(ctx, directory, started, parsed).await
    }

    async fn run_stages(
        &self,
        ctx: &RunContext,
        directory: &str,
        started: Instant,
        parsed: Result<ModuleRelease>,
    ) -> ModuleReport {
        let mut report = ModuleReport::new(directory);

        report.record(ReleaseStage::ParseVersion, started, &parsed);
        let release = match parsed {
            Ok(release) => release,
            Err(err) => return report.fail(err),
        };
        info!(module = %directory, tag = %release.tag(), "parsed version");
        report.release = Some(release.clone());

        let started = Instant::now();
        let checked = self.check_tag(&release).await;
        report.record(ReleaseStage::CheckTag, started, &checked);
        if let Err(err) = checked {
            return report.fail(err);
        }

        let started = Instant::now();
        let published = self.publish(ctx, &release).await;
        report.record(ReleaseStage::Publish, started, &published);
        match published {
            Ok(outcome) => {
                report.outcome = Some(outcome);
                report.finished_at = Utc::now();
                report
            }
            Err(err) => report.fail(err),
        }
    }

    /// Fail with `DuplicateTag` when the tag already exists.
    pub async fn check_tag(&self, release: &ModuleRelease) -> Result<()> {
        let lookup = with_retry(&self.retry, "tag lookup", || self.host.lookup_tag(release.tag())).await?;
        match lookup {
            TagLookup::Missing => Ok(()),
            TagLookup::Found => Err(ReleaseError::DuplicateTag {
                path: release.version_file(),
                version: release.version().to_string(),
                tag: release.tag().to_string(),
            }),
        }
    }

    /// Publish the release when the merge is confirmed, otherwise render a preview.
    ///
    /// Tag creation, push and release creation are separate calls; a failure
    /// after the push leaves the tag in place and is reported as
    /// [`ReleaseError::PartialPublish`].
    pub async fn publish(&self, ctx: &RunContext, release: &ModuleRelease) -> Result<ReleaseOutcome> {
        let body = render_release_body(release, ctx);
        let tag = release.tag();

        if !ctx.merged {
            info!(module = %release.directory(), tag = %tag, "merge not confirmed, preview only");
            return Ok(ReleaseOutcome::Preview { body });
        }

        let commit = ctx.tag_commit().ok_or_else(|| {
            ReleaseError::Config("no commit available to tag; set the commit sha".to_string())
        })?;

        self.tags.create_tag(tag, commit).await?;
        with_retry(&self.retry, "tag push", || self.tags.push_tag(tag)).await?;

        let new_release = NewRelease {
            tag_name: tag.to_string(),
            name: tag.to_string(),
            body,
        };
        let published = with_retry(&self.retry, "release creation", || {
            self.host.create_release(&new_release)
        })
        .await
        .map_err(|e| ReleaseError::PartialPublish {
            tag: tag.to_string(),
            stage: "release creation".to_string(),
            detail: e.to_string(),
        })?;

        info!(module = %release.directory(), tag = %tag, url = %published.html_url, "release published");
        Ok(ReleaseOutcome::Published {
            tag: tag.to_string(),
            release_url: published.html_url,
        })
    }
}
