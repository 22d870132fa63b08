//! The per-job stage state machine.
//!
//! A full run walks ingest -> detect -> track -> understand -> analytics ->
//! exports and then completes. Each stage is entered (stage + progress set,
//! progress reported) before its work runs. A rerun re-enters only analytics
//! and exports against the persisted series.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::analytics;
use crate::detection::{DetectionRequest, DetectionService};
use crate::domain::{ArtifactItem, ArtifactKind, EventLog, Job, Series, Stage};

use super::exports::write_exports;
use super::store::JobRepository;

/// Receives a snapshot every time the running job changes
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, job: &Job) -> Result<()>;
}

/// Transient data produced during one run; never persisted on the job
#[derive(Debug, Default)]
struct RunScratch {
    series: Option<Series>,
}

impl RunScratch {
    fn purge(&mut self) {
        self.series = None;
    }
}

/// Simulated budget for each stage at scale 1.0
fn stage_budget(stage: Stage) -> Duration {
    let secs = match stage {
        Stage::Ingest => 0.4,
        Stage::Detect => 0.6,
        Stage::Track => 0.7,
        Stage::Understand => 0.85,
        Stage::Analytics => 0.95,
        Stage::Exports => 0.4,
        Stage::Queued | Stage::Completed => 0.0,
    };
    Duration::from_secs_f64(secs)
}

/// Stage executor shared by all jobs
pub struct Pipeline {
    repo: Arc<JobRepository>,
    detection: DetectionService,
    stage_delay_scale: f64,
}

impl Pipeline {
    pub fn new(repo: Arc<JobRepository>, detection: DetectionService, stage_delay_scale: f64) -> Self {
        Self {
            repo,
            detection,
            stage_delay_scale: stage_delay_scale.max(0.0),
        }
    }

    /// Execute every stage on a processing job and complete it
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub async fn run(&self, job: &mut Job, sink: &dyn ProgressSink) -> Result<()> {
        let mut scratch = RunScratch::default();

        for stage in Stage::PROCESSING {
            job.advance_to(stage)?;
            sink.report(job).await?;
            self.wait_budget(stage).await;

            match stage {
                Stage::Ingest => self.ingest(job).await?,
                Stage::Detect => {
                    self.detect(job, &mut scratch).await?;
                    sink.report(job).await?;
                }
                Stage::Track | Stage::Understand => {
                    debug!(stage = stage.as_str(), "Stage budget elapsed");
                }
                Stage::Analytics => {
                    self.analytics(job, &mut scratch).await?;
                    sink.report(job).await?;
                }
                Stage::Exports => self.finalize_manifest(job).await?,
                Stage::Queued | Stage::Completed => {}
            }
        }

        scratch.purge();
        job.complete()?;
        sink.report(job).await?;
        info!(events = job.summary.event_count.unwrap_or(0), "Job completed");
        Ok(())
    }

    /// Recompute analytics and exports for a job reopened at the analytics stage
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub async fn rerun(&self, job: &mut Job, series: Series, sink: &dyn ProgressSink) -> Result<()> {
        let mut scratch = RunScratch {
            series: Some(series),
        };

        job.manifest.retain_primary();
        self.analytics(job, &mut scratch).await?;
        sink.report(job).await?;

        job.advance_to(Stage::Exports)?;
        self.finalize_manifest(job).await?;
        sink.report(job).await?;

        scratch.purge();
        job.complete()?;
        sink.report(job).await?;
        info!(events = job.summary.event_count.unwrap_or(0), "Rerun completed");
        Ok(())
    }

    async fn wait_budget(&self, stage: Stage) {
        let budget = stage_budget(stage).mul_f64(self.stage_delay_scale);
        if !budget.is_zero() {
            tokio::time::sleep(budget).await;
        }
    }

    async fn ingest(&self, job: &mut Job) -> Result<()> {
        let Some(input) = job.input.as_mut() else {
            debug!("No input asset, nothing to ingest");
            return Ok(());
        };

        let size = match tokio::fs::metadata(&input.path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %input.path, error = %e, "Input asset not readable");
                0
            }
        };
        input.size_bytes = Some(size);

        let item = ArtifactItem::new(
            "input",
            ArtifactKind::Input,
            input.path.clone(),
            input
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            size,
        );
        job.manifest.remove("input");
        job.manifest.push(item);
        Ok(())
    }

    async fn detect(&self, job: &mut Job, scratch: &mut RunScratch) -> Result<()> {
        let input = job.input.as_ref().map(|i| PathBuf::from(&i.path));
        let request = DetectionRequest {
            job_id: job.id,
            input: input.as_deref(),
            config: &job.config,
        };
        let outcome = self.detection.detect(&request).await;
        let output = outcome.output;

        let tracks = self
            .repo
            .save_artifact(job.id, "tracks", &output.tracks)
            .await
            .context("Failed to store tracks")?;
        let series = self
            .repo
            .save_artifact(job.id, "series", &output.series)
            .await
            .context("Failed to store series")?;
        job.manifest.extend([tracks, series]);

        job.summary.frames = Some(output.series.frame_count());
        job.summary.fps = Some(output.series.fps);
        job.summary.profile = Some(job.config.profile);
        job.summary.detector = Some(outcome.provider);
        job.summary.detector_warning = outcome.warning;

        scratch.series = Some(output.series);
        Ok(())
    }

    async fn analytics(&self, job: &mut Job, scratch: &mut RunScratch) -> Result<()> {
        if !job.config.analytics_enabled {
            info!("Analytics disabled for this job");
            job.summary.metrics = None;
            job.summary.event_count = None;
            return Ok(());
        }

        let series = scratch
            .series
            .as_ref()
            .context("No series available for analytics")?;
        let analysis =
            analytics::analyze(series, &job.config).context("Series failed validation")?;

        let metrics_item = self
            .repo
            .save_artifact(job.id, "metrics", &analysis.metrics)
            .await
            .context("Failed to store metrics")?;
        let log = EventLog {
            events: analysis.events,
        };
        let events_item = self
            .repo
            .save_artifact(job.id, "events", &log)
            .await
            .context("Failed to store events")?;
        let exports = write_exports(&self.repo, job.id, &analysis.metrics, &log.events)
            .await
            .context("Failed to write exports")?;

        job.manifest.extend([metrics_item, events_item]);
        job.manifest.extend(exports);
        job.summary.metrics = Some(analysis.metrics.summary);
        job.summary.event_count = Some(log.events.len());

        debug!(events = log.events.len(), "Analytics stored");
        Ok(())
    }

    async fn finalize_manifest(&self, job: &mut Job) -> Result<()> {
        job.manifest.remove("manifest");
        let item = self
            .repo
            .save_artifact(job.id, "manifest", &job.manifest)
            .await
            .context("Failed to store manifest")?;
        job.manifest.push(item);
        Ok(())
    }
}
