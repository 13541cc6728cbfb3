//! Bounded-parallelism fan-out over changed modules.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use modrel_core::{ReleaseConfig, ReleaseError, RunContext};

use crate::gate::UnitStatus;
use crate::pipeline::{ModulePipeline, ModuleReport};

/// Fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FanOutConfig {
    /// Maximum number of modules processed at once.
    pub max_parallel: usize,

    /// Per-module time limit in seconds (0 = none).
    pub timeout_secs: u64,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            timeout_secs: 0,
        }
    }
}

impl From<&ReleaseConfig> for FanOutConfig {
    fn from(config: &ReleaseConfig) -> Self {
        Self {
            max_parallel: config.max_parallel,
            ..Self::default()
        }
    }
}

/// Runs the pipeline once per module directory.
pub struct FanOutRunner;

impl FanOutRunner {
    /// Process every directory and return one report per directory, in input order.
    ///
    /// A failing module never cancels its siblings. A module whose task panics
    /// or is aborted is reported as failed or cancelled.
    #[instrument(skip_all, fields(modules = directories.len(), max_parallel = config.max_parallel))]
    pub async fn run_all(
        pipeline: Arc<ModulePipeline>,
        ctx: Arc<RunContext>,
        directories: Vec<String>,
        config: &FanOutConfig,
    ) -> Vec<ModuleReport> {
        if directories.is_empty() {
            info!("no changed modules");
            return Vec::new();
        }

        let sem = Arc::new(Semaphore::new(config.max_parallel.max(1)));
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));

        let mut tasks = Vec::with_capacity(directories.len());
        for directory in &directories {
            let pipeline = Arc::clone(&pipeline);
            let ctx = Arc::clone(&ctx);
            let sem = Arc::clone(&sem);
            let directory = directory.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                info!(module = %directory, "processing module");
                match timeout {
                    Some(limit) => match tokio::time::timeout(limit, pipeline.run(&ctx, &directory)).await {
                        Ok(report) => report,
                        Err(_) => ModuleReport::aborted(
                            &directory,
                            UnitStatus::TimedOut,
                            ReleaseError::transient(
                                "module pipeline",
                                format!("timed out after {} seconds", limit.as_secs()),
                            ),
                        ),
                    },
                    None => pipeline.run(&ctx, &directory).await,
                }
            }));
        }

        let joined = futures::future::join_all(tasks).await;

        let reports: Vec<ModuleReport> = directories
            .iter()
            .zip(joined)
            .map(|(directory, result)| match result {
                Ok(report) => report,
                Err(e) => {
                    warn!(module = %directory, error = %e, "module task did not complete");
                    let status = if e.is_cancelled() {
                        UnitStatus::Cancelled
                    } else {
                        UnitStatus::Failure
                    };
                    ModuleReport::aborted(
                        directory,
                        status,
                        ReleaseError::transient("module pipeline", e),
                    )
                }
            })
            .collect();

        let failed = reports.iter().filter(|r| !r.passed()).count();
        info!(total = reports.len(), failed, "fan-out finished");
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ReleaseGate;
    use async_trait::async_trait;
    use modrel_core::fakes::MemoryForge;
    use modrel_core::{NewRelease, PublishedRelease, ReleaseHost, TagLookup};

    /// Host whose lookup either stalls for `delay` or panics.
    struct StallingHost {
        delay: Duration,
        panic: bool,
    }

    #[async_trait]
    impl ReleaseHost for StallingHost {
        async fn lookup_tag(&self, tag: &str) -> modrel_core::Result<TagLookup> {
            if self.panic {
                panic!("lookup of {tag} blew up");
            }
            tokio::time::sleep(self.delay).await;
            Ok(TagLookup::Missing)
        }

        async fn create_release(&self, _release: &NewRelease) -> modrel_core::Result<PublishedRelease> {
            Ok(PublishedRelease {
                id: 1,
                html_url: String::new(),
            })
        }
    }

    fn repo_with_modules(directories: &[&str]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for dir in directories {
            let path = root.path().join(dir);
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(path.join("VERSION"), "1.0.0\n").unwrap();
        }
        root
    }

    async fn run_with_host(
        host: StallingHost,
        root: &std::path::Path,
        config: FanOutConfig,
    ) -> Vec<ModuleReport> {
        let forge = Arc::new(MemoryForge::new());
        let pipeline = Arc::new(ModulePipeline::new(Arc::new(host), forge, root));
        FanOutRunner::run_all(
            pipeline,
            Arc::new(RunContext::default()),
            vec!["services/slow".to_string()],
            &config,
        )
        .await
    }

    #[test]
    fn test_default_config() {
        let config = FanOutConfig::default();
        assert_eq!(config.max_parallel, 4);
        assert_eq!(config.timeout_secs, 0);
    }

    #[test]
    fn test_config_from_release_config() {
        let release = ReleaseConfig {
            max_parallel: 2,
            ..ReleaseConfig::default()
        };
        assert_eq!(FanOutConfig::from(&release).max_parallel, 2);
    }

    #[tokio::test]
    async fn test_no_modules_no_reports() {
        let forge = Arc::new(MemoryForge::new());
        let pipeline = Arc::new(ModulePipeline::new(forge.clone(), forge.clone(), "."));
        let reports = FanOutRunner::run_all(
            pipeline,
            Arc::new(RunContext::default()),
            Vec::new(),
            &FanOutConfig::default(),
        )
        .await;
        assert!(reports.is_empty());
        assert!(forge.calls().is_empty());
    }

    #[tokio::test]
    async fn test_module_over_time_limit_is_timed_out() {
        let root = repo_with_modules(&["services/slow"]);
        let host = StallingHost {
            delay: Duration::from_secs(5),
            panic: false,
        };
        let reports = run_with_host(
            host,
            root.path(),
            FanOutConfig {
                max_parallel: 1,
                timeout_secs: 1,
            },
        )
        .await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].directory, "services/slow");
        assert_eq!(reports[0].status, UnitStatus::TimedOut);
        assert!(!ReleaseGate::evaluate_reports(&reports).passed);
    }

    #[tokio::test]
    async fn test_module_within_time_limit_passes() {
        let root = repo_with_modules(&["services/slow"]);
        let host = StallingHost {
            delay: Duration::from_millis(10),
            panic: false,
        };
        let reports = run_with_host(
            host,
            root.path(),
            FanOutConfig {
                max_parallel: 1,
                timeout_secs: 5,
            },
        )
        .await;

        assert_eq!(reports[0].status, UnitStatus::Success);
        assert!(ReleaseGate::evaluate_reports(&reports).passed);
    }

    #[tokio::test]
    async fn test_panicking_module_is_failure() {
        let root = repo_with_modules(&["services/slow"]);
        let host = StallingHost {
            delay: Duration::ZERO,
            panic: true,
        };
        let reports = run_with_host(host, root.path(), FanOutConfig::default()).await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, UnitStatus::Failure);
        assert!(reports[0].error.is_some());
        assert!(!ReleaseGate::evaluate_reports(&reports).passed);
    }
}
