//! Command-line interface for fieldlens.
//!
//! Provides commands for analysing a recording, inspecting jobs and their
//! artifacts, changing job configuration and rerunning analytics.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::config::{self, ResolvedConfig};
use crate::core::Orchestrator;
use crate::domain::{
    ArtifactKind, EventLog, InputAsset, Job, JobConfig, JobConfigUpdate, JobStatus, SportProfile,
    Team,
};

/// fieldlens - match video analytics
#[derive(Parser, Debug)]
#[command(name = "fieldlens")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a match recording and wait for the result
    Analyze {
        /// Video or image file (synthetic detection is used when omitted)
        input: Option<PathBuf>,

        /// Sport profile (overrides the profile in --config)
        #[arg(short, long, value_enum)]
        profile: Option<ProfileArg>,

        /// JSON file with the job configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip metrics, events and exports
        #[arg(long)]
        no_analytics: bool,
    },

    /// List jobs
    Jobs {
        /// Maximum number of jobs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the status of a job
    Status {
        /// Job ID (UUID)
        job_id: String,
    },

    /// Update the configuration of a job that is not processing
    Config {
        /// Job ID (UUID)
        job_id: String,

        #[command(flatten)]
        patch: PatchArgs,
    },

    /// Recompute analytics and exports for a finished job
    Rerun {
        /// Job ID (UUID)
        job_id: String,

        #[command(flatten)]
        patch: PatchArgs,
    },

    /// List a job's artifacts, or print one of them
    Artifacts {
        /// Job ID (UUID)
        job_id: String,

        /// Artifact name to print (e.g. "metrics", "events_csv")
        name: Option<String>,
    },

    /// Show resolved application settings
    Settings,
}

/// A partial config change, inline or from a file
#[derive(clap::Args, Debug, Default)]
pub struct PatchArgs {
    /// Inline JSON patch
    #[arg(long, conflicts_with = "file")]
    json: Option<String>,

    /// JSON patch file
    #[arg(short, long)]
    file: Option<PathBuf>,
}

impl PatchArgs {
    fn load(&self) -> Result<Option<JobConfigUpdate>> {
        let payload = match (&self.json, &self.file) {
            (Some(json), _) => json.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read patch file: {}", path.display()))?,
            (None, None) => return Ok(None),
        };
        let update = JobConfigUpdate::from_json(&payload).context("Invalid config patch")?;
        Ok(Some(update))
    }
}

/// Sport profile for CLI (maps to SportProfile)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProfileArg {
    Soccer,
    Basketball,
}

impl From<ProfileArg> for SportProfile {
    fn from(p: ProfileArg) -> Self {
        match p {
            ProfileArg::Soccer => SportProfile::Soccer,
            ProfileArg::Basketball => SportProfile::Basketball,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Analyze {
                input,
                profile,
                config,
                no_analytics,
            } => analyze(input, profile, config, no_analytics).await,
            Commands::Jobs { limit } => list_jobs(limit).await,
            Commands::Status { job_id } => show_status(&job_id).await,
            Commands::Config { job_id, patch } => update_config(&job_id, &patch).await,
            Commands::Rerun { job_id, patch } => rerun(&job_id, &patch).await,
            Commands::Artifacts { job_id, name } => artifacts(&job_id, name.as_deref()).await,
            Commands::Settings => show_settings(),
        }
    }
}

fn parse_job_id(job_id: &str) -> Result<Uuid> {
    Uuid::parse_str(job_id).with_context(|| format!("Invalid job ID: {}", job_id))
}

/// Orchestrator over the configured home, with persisted jobs loaded
async fn open_orchestrator() -> Result<Orchestrator> {
    let cfg = config::config()?;
    let orchestrator = Orchestrator::from_config(cfg);
    orchestrator.restore().await?;
    Ok(orchestrator)
}

/// Build the job config from the command line flags
fn job_config(
    profile: Option<ProfileArg>,
    config_file: Option<&Path>,
    no_analytics: bool,
) -> Result<JobConfig> {
    let mut config = match config_file {
        Some(path) => {
            let payload = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            JobConfig::from_json(&payload)
                .with_context(|| format!("Invalid job config: {}", path.display()))?
        }
        None => JobConfig::default(),
    };
    if let Some(profile) = profile {
        config.profile = profile.into();
    }
    if no_analytics {
        config.analytics_enabled = false;
    }
    Ok(config)
}

/// Create a job, run it and report progress until it finishes
async fn analyze(
    input: Option<PathBuf>,
    profile: Option<ProfileArg>,
    config_file: Option<PathBuf>,
    no_analytics: bool,
) -> Result<()> {
    let config = job_config(profile, config_file.as_deref(), no_analytics)?;

    let input = match input {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Input file not found: {}", path.display());
            }
            let absolute = path
                .canonicalize()
                .with_context(|| format!("Failed to resolve {}", path.display()))?;
            Some(InputAsset::from_path(absolute.display().to_string()))
        }
        None => None,
    };

    let orchestrator = open_orchestrator().await?;
    let job = orchestrator.create_job(config, input).await?;
    let mut updates = orchestrator.subscribe(job.id);
    let handle = orchestrator.start(job.id).await?;
    eprintln!("[Job {} started]", job.id);

    let mut last_stage = job.stage;
    while let Some(update) = updates.next().await {
        if update.stage != last_stage {
            eprintln!("  {:>3.0}%  {}", update.progress * 100.0, update.stage.as_str());
            last_stage = update.stage;
        }
        if update.is_finished() {
            break;
        }
    }
    handle.await.context("Pipeline task panicked")?;

    let job = orchestrator.get(job.id).await?;
    print_job(&job);
    match job.status {
        JobStatus::Completed => {
            eprintln!("\n[Job {} completed successfully]", job.id);
            Ok(())
        }
        _ => {
            eprintln!(
                "\n[Job {} failed: {}]",
                job.id,
                job.error.as_deref().unwrap_or("unknown error")
            );
            std::process::exit(1);
        }
    }
}

/// List jobs, newest first
async fn list_jobs(limit: usize) -> Result<()> {
    let orchestrator = open_orchestrator().await?;
    let jobs = orchestrator.list().await;

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    println!(
        "{:<38} {:<12} {:<12} {:<11} {:>6}",
        "JOB ID", "STATUS", "STAGE", "PROFILE", "EVENTS"
    );
    println!("{}", "-".repeat(83));

    for job in jobs.iter().take(limit) {
        let events = job
            .summary
            .event_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<12} {:<12} {:<11} {:>6}",
            job.id,
            job.status.as_str(),
            job.stage.as_str(),
            job.config.profile.as_str(),
            events
        );
    }

    Ok(())
}

/// Show the status of a job
async fn show_status(job_id: &str) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let orchestrator = open_orchestrator().await?;
    let job = orchestrator.get(job_id).await?;
    print_job(&job);
    Ok(())
}

fn print_job(job: &Job) {
    println!("Job ID: {}", job.id);
    println!("Status: {}", job.status.as_str());
    println!("Stage: {} ({:.0}%)", job.stage.as_str(), job.progress * 100.0);
    println!("Profile: {}", job.config.profile.as_str());
    println!("Created: {}", job.created_at);
    println!("Updated: {}", job.updated_at);
    if let Some(input) = &job.input {
        println!("Input: {}", input.path);
    }
    if let Some(error) = &job.error {
        println!("Error: {}", error);
    }

    let summary = &job.summary;
    if let (Some(frames), Some(fps)) = (summary.frames, summary.fps) {
        println!("\nFrames: {} @ {} fps", frames, fps);
    }
    if let Some(detector) = &summary.detector {
        println!("Detector: {}", detector);
    }
    if let Some(warning) = &summary.detector_warning {
        println!("Detector warning: {}", warning);
    }
    if let Some(metrics) = &summary.metrics {
        let share = |team: Team| metrics.team_possession.get(&team).copied().unwrap_or(0.0);
        println!("Players: {}", metrics.player_count);
        println!(
            "Possession: A {:.1}% / B {:.1}%",
            share(Team::A) * 100.0,
            share(Team::B) * 100.0
        );
        println!("Average speed: {} m/s", metrics.avg_speed_mps);
    }
    if let Some(count) = summary.event_count {
        println!("Events: {}", count);
    }
}

/// Apply a config patch to a job
async fn update_config(job_id: &str, patch: &PatchArgs) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let update = patch
        .load()?
        .context("No patch provided. Use --json <patch> or --file <path>")?;

    let orchestrator = open_orchestrator().await?;
    let job = orchestrator.update_config(job_id, &update).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&job.config).context("Failed to serialize config")?
    );
    eprintln!("\n[Job {} config updated]", job.id);
    Ok(())
}

/// Rerun analytics, optionally with a config patch
async fn rerun(job_id: &str, patch: &PatchArgs) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let update = patch.load()?;

    let orchestrator = open_orchestrator().await?;
    let job = orchestrator.rerun(job_id, update.as_ref()).await?;
    print_job(&job);

    if job.status == JobStatus::Failed {
        eprintln!(
            "\n[Job {} rerun failed: {}]",
            job.id,
            job.error.as_deref().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }
    eprintln!("\n[Job {} rerun completed]", job.id);
    Ok(())
}

/// List the manifest, or print a single artifact
async fn artifacts(job_id: &str, name: Option<&str>) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let orchestrator = open_orchestrator().await?;

    let Some(name) = name else {
        let job = orchestrator.get(job_id).await?;
        if job.manifest.is_empty() {
            println!("No artifacts yet");
            return Ok(());
        }
        println!("{:<14} {:<9} {:<18} {:>10}  PATH", "NAME", "KIND", "TYPE", "BYTES");
        println!("{}", "-".repeat(80));
        for item in &job.manifest.items {
            let kind = match item.kind {
                ArtifactKind::Artifact => "artifact",
                ArtifactKind::Export => "export",
                ArtifactKind::Input => "input",
            };
            println!(
                "{:<14} {:<9} {:<18} {:>10}  {}",
                item.name, kind, item.content_type, item.size_bytes, item.path
            );
        }
        return Ok(());
    };

    if name == "events" {
        let log: EventLog = orchestrator.load_artifact(job_id, name).await?;
        for event in &log.events {
            println!(
                "{:>8.2}s  {:<18} {}",
                event.start,
                event.event_type.as_str(),
                event.explanation
            );
        }
        return Ok(());
    }

    let item = orchestrator.artifact(job_id, name).await?;
    if item.kind == ArtifactKind::Input {
        println!("{}", item.path);
        return Ok(());
    }
    let content = tokio::fs::read_to_string(&item.path)
        .await
        .with_context(|| format!("Failed to read artifact: {}", item.path))?;
    print!("{}", content);
    Ok(())
}

/// Show resolved configuration (debug)
fn show_settings() -> Result<()> {
    let cfg: &ResolvedConfig = config::config()?;

    println!("fieldlens settings");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home: {}", cfg.home.display());
    println!("  Jobs: {}", cfg.home.join("jobs").display());
    println!();
    println!("Detector:");
    println!("  Provider: {}", cfg.detector.provider.as_str());
    println!("  Command:  {}", cfg.detector.command);
    if !cfg.detector.args.is_empty() {
        println!("  Args:     {}", cfg.detector.args.join(" "));
    }
    println!("  Model:    {}", cfg.detector.model);
    println!("  Timeout:  {}s", cfg.detector.timeout.as_secs());
    println!();
    println!("Pipeline:");
    println!("  Stage delay scale: {}", cfg.stage_delay_scale);

    Ok(())
}
