//! modrel - release independently versioned modules from a monorepo
//!
//! ## Commands
//!
//! - `detect`: list module directories whose `VERSION` changed between two commits
//! - `release`: validate, check and publish (or preview) the given modules
//! - `gate`: collapse the host's job results into one pass/fail status
//! - `run`: `detect` + `release` in one process

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use modrel_ci::{FanOutConfig, FanOutRunner, ModulePipeline, ModuleReport, ReleaseGate};
use modrel_core::config::DEFAULT_CONFIG_FILE;
use modrel_core::{
    capture_head_sha, detect_changed_modules, Annotation, GitHubClient, GitHubConfig,
    ReleaseConfig, RunContext, SystemGit,
};

#[derive(Parser)]
#[command(name = "modrel")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release versioned modules from an infrastructure monorepo", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Repository working copy
    #[arg(long, global = true, default_value = ".")]
    repo_dir: PathBuf,

    /// Configuration file (default: <repo-dir>/modrel.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the module directories whose VERSION file changed
    Detect {
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Validate and release the given module directories
    Release {
        /// Module directories, relative to the repository root
        #[arg(required = true)]
        directories: Vec<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Evaluate the host's job results as a single required check
    Gate {
        /// JSON file with the `needs` context, or `-` for stdin
        #[arg(long, default_value = "-")]
        needs: String,
    },

    /// Detect changed modules and release them
    Run {
        #[command(flatten)]
        range: RangeArgs,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args)]
struct RangeArgs {
    /// Base commit (default: pull request base from the event payload)
    #[arg(long)]
    base: Option<String>,

    /// Head commit (default: pull request head from the event payload)
    #[arg(long)]
    head: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    /// Treat the pull request as merged and publish
    #[arg(long)]
    merged: bool,

    /// Never publish, even if the event says the pull request was merged
    #[arg(long, conflicts_with = "merged")]
    preview_only: bool,

    /// Commit to tag (default: merge commit, then GITHUB_SHA, then HEAD)
    #[arg(long)]
    sha: Option<String>,

    /// Workflow run identifier for provenance
    #[arg(long, env = "GITHUB_RUN_ID")]
    run_id: Option<String>,

    /// Pull request number for provenance
    #[arg(long)]
    pr: Option<u64>,

    /// Repository as owner/repo
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repository: Option<String>,

    /// API token for the release host
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Maximum number of modules processed concurrently
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Per-module time limit in seconds (0 = none)
    #[arg(long, default_value = "0")]
    timeout: u64,

    /// Write a JSON report of every module to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    modrel_core::telemetry::init_tracing(cli.json, level);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.repo_dir.join(DEFAULT_CONFIG_FILE));
    let config = ReleaseConfig::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    match cli.command {
        Commands::Detect { range } => cmd_detect(&cli.repo_dir, &config, &range).await,
        Commands::Release { directories, run } => {
            cmd_release(&cli.repo_dir, &config, directories, &run).await
        }
        Commands::Gate { needs } => cmd_gate(&needs),
        Commands::Run { range, run } => {
            let modules = detect(&cli.repo_dir, &config, &range).await?;
            cmd_release(&cli.repo_dir, &config, modules, &run).await
        }
    }
}

async fn detect(repo_dir: &Path, config: &ReleaseConfig, range: &RangeArgs) -> Result<Vec<String>> {
    let ctx = RunContext::from_env().context("Failed to read run context")?;
    let base = range
        .base
        .clone()
        .or(ctx.base_sha)
        .context("No base commit: pass --base or run on a pull_request event")?;
    let head = range
        .head
        .clone()
        .or(ctx.head_sha)
        .unwrap_or_else(|| "HEAD".to_string());

    let git = SystemGit::new(repo_dir, &config.remote);
    let modules = detect_changed_modules(&git, config, &base, &head)
        .await
        .context("Failed to detect changed modules")?;
    Ok(modules)
}

async fn cmd_detect(repo_dir: &Path, config: &ReleaseConfig, range: &RangeArgs) -> Result<()> {
    let modules = detect(repo_dir, config, range).await?;
    let encoded = serde_json::to_string(&modules)?;

    // Expose the list as a step output when running under the host.
    if let Ok(output_path) = std::env::var("GITHUB_OUTPUT") {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&output_path)
            .with_context(|| format!("Failed to open {output_path}"))?;
        writeln!(file, "modules={encoded}")?;
        writeln!(file, "any={}", !modules.is_empty())?;
    }

    println!("{encoded}");
    Ok(())
}

async fn build_context(repo_dir: &Path, run: &RunArgs) -> Result<RunContext> {
    let mut ctx = RunContext::from_env().context("Failed to read run context")?;

    if let Some(repository) = &run.repository {
        ctx.repository = repository.clone();
    }
    if let Some(run_id) = &run.run_id {
        ctx.run_id = Some(run_id.clone());
    }
    if let Some(pr) = run.pr {
        ctx.pr_number = Some(pr);
    }
    if run.merged {
        ctx.merged = true;
    }
    if run.preview_only {
        ctx.merged = false;
    }
    if let Some(sha) = &run.sha {
        ctx.merge_commit_sha = Some(sha.clone());
    }
    if ctx.merged && ctx.tag_commit().is_none() {
        let head = capture_head_sha(repo_dir)
            .await
            .context("Failed to resolve the commit to tag")?;
        ctx.commit_sha = Some(head);
    }
    Ok(ctx)
}

async fn cmd_release(
    repo_dir: &Path,
    config: &ReleaseConfig,
    directories: Vec<String>,
    run: &RunArgs,
) -> Result<()> {
    let ctx = build_context(repo_dir, run).await?;
    info!(
        modules = directories.len(),
        merged = ctx.merged,
        repository = %ctx.repository,
        "Starting module release"
    );

    let mut github = GitHubConfig::from_env();
    github.repository = ctx.repository.clone();
    if let Some(token) = &run.token {
        github = github.with_token(token);
    }
    let host = Arc::new(GitHubClient::new(github).context("Failed to create GitHub client")?);
    let git = Arc::new(SystemGit::new(repo_dir, &config.remote));

    let pipeline = ModulePipeline::new(host, git, repo_dir).with_retry(config.retry);
    let fan_out = FanOutConfig {
        max_parallel: run.max_parallel.unwrap_or(config.max_parallel),
        timeout_secs: run.timeout,
    };

    let reports =
        FanOutRunner::run_all(Arc::new(pipeline), Arc::new(ctx), directories, &fan_out).await;

    print_reports(&reports);
    if let Some(path) = &run.report {
        let summaries: Vec<_> = reports.iter().map(ModuleReport::summary).collect();
        std::fs::write(path, serde_json::to_string_pretty(&summaries)?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    let verdict = ReleaseGate::evaluate_reports(&reports);
    println!("{}", verdict.message);
    if verdict.passed {
        Ok(())
    } else {
        for violation in &verdict.violations {
            eprintln!("  - {violation}");
        }
        anyhow::bail!("Module release failed")
    }
}

fn print_reports(reports: &[ModuleReport]) {
    for report in reports {
        let status = if report.passed() { "✓" } else { "✗" };
        let tag = report
            .release
            .as_ref()
            .map(|r| r.tag().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{} {} [{}] {}", status, report.directory, tag, report.status);
        for annotation in report.annotations() {
            println!("{annotation}");
        }
    }
}

fn cmd_gate(needs: &str) -> Result<()> {
    let raw = if needs == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read needs context from stdin")?;
        buf
    } else {
        std::fs::read_to_string(needs).with_context(|| format!("Failed to read {needs}"))?
    };

    let verdict = ReleaseGate::evaluate_needs(&raw).context("Failed to evaluate gate")?;
    println!("{}", verdict.message);
    if verdict.passed {
        Ok(())
    } else {
        for violation in &verdict.violations {
            println!("{}", Annotation::error(violation.clone()).with_title("Release gate"));
        }
        anyhow::bail!("Release gate failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_release_command() {
        let cli = Cli::try_parse_from([
            "modrel",
            "release",
            "services/api",
            "helpers/net",
            "--merged",
            "--pr",
            "12",
            "--max-parallel",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Release { directories, run } => {
                assert_eq!(directories, vec!["services/api", "helpers/net"]);
                assert!(run.merged);
                assert_eq!(run.pr, Some(12));
                assert_eq!(run.max_parallel, Some(2));
            }
            _ => panic!("expected release command"),
        }
    }

    #[test]
    fn merged_and_preview_only_conflict() {
        let parsed = Cli::try_parse_from([
            "modrel",
            "release",
            "services/api",
            "--merged",
            "--preview-only",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn gate_accepts_needs_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("needs.json");
        std::fs::write(&path, r#"{"release":{"result":"success"}}"#).unwrap();
        assert!(cmd_gate(&path.display().to_string()).is_ok());

        std::fs::write(&path, r#"{"release":{"result":"cancelled"}}"#).unwrap();
        assert!(cmd_gate(&path.display().to_string()).is_err());
    }

    #[tokio::test]
    async fn build_context_applies_overrides() {
        let cli = Cli::try_parse_from([
            "modrel",
            "release",
            "services/api",
            "--merged",
            "--sha",
            "deadbeef",
            "--repository",
            "acme/infra",
            "--run-id",
            "99",
        ])
        .unwrap();
        let Commands::Release { run, .. } = cli.command else {
            panic!("expected release command");
        };
        let ctx = build_context(Path::new("."), &run).await.unwrap();
        assert!(ctx.merged);
        assert_eq!(ctx.tag_commit(), Some("deadbeef"));
        assert_eq!(ctx.repository, "acme/infra");
        assert_eq!(ctx.run_id.as_deref(), Some("99"));
    }
}
