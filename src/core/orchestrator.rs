//! Job orchestrator.
//!
//! Owns the job map, persists every change, runs one pipeline task per job
//! and fans updates out to subscribers. All read-modify-persist-publish
//! sequences happen under a single async mutex; the mutex is never held
//! while a pipeline stage is working.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ResolvedConfig;
use crate::detection::DetectionService;
use crate::domain::{
    ArtifactItem, ConfigError, InputAsset, Job, JobConfig, JobConfigUpdate, JobStatus, Series,
    TransitionError,
};

use super::pipeline::{Pipeline, ProgressSink};
use super::store::JobRepository;
use super::updates::{JobUpdates, UpdateHub};

/// Errors surfaced to orchestrator callers
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("artifact '{name}' not found for job {job_id}")]
    ArtifactNotFound { job_id: Uuid, name: String },

    #[error("invalid job config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("job {0} has no stored series to rerun against")]
    SeriesUnavailable(Uuid),

    #[error("job {0} is processing")]
    Busy(Uuid),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

struct Inner {
    jobs: Mutex<HashMap<Uuid, Job>>,
    repo: Arc<JobRepository>,
    pipeline: Pipeline,
    updates: UpdateHub,
}

/// Cheaply cloneable handle to the shared job state
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Create an orchestrator over a repository and detection service
    pub fn new(repo: JobRepository, detection: DetectionService, stage_delay_scale: f64) -> Self {
        let repo = Arc::new(repo);
        let pipeline = Pipeline::new(Arc::clone(&repo), detection, stage_delay_scale);
        Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(HashMap::new()),
                repo,
                pipeline,
                updates: UpdateHub::new(),
            }),
        }
    }

    /// Build from resolved application settings
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(
            JobRepository::at(&config.home),
            DetectionService::from_settings(&config.detector),
            config.stage_delay_scale,
        )
    }

    /// Load persisted jobs into memory. Returns how many were restored.
    ///
    /// Jobs that were processing when the process stopped stay processing.
    pub async fn restore(&self) -> Result<usize, JobError> {
        let persisted = self.inner.repo.load_jobs().await?;
        let mut jobs = self.inner.jobs.lock().await;
        let mut restored = 0;
        for job in persisted {
            if job.status == JobStatus::Processing {
                warn!(job_id = %job.id, "Restored job was interrupted while processing");
            }
            if let std::collections::hash_map::Entry::Vacant(slot) = jobs.entry(job.id) {
                slot.insert(job);
                restored += 1;
            }
        }
        info!(restored, "Restored jobs from disk");
        Ok(restored)
    }

    /// Create and persist a queued job
    #[instrument(skip_all)]
    pub async fn create_job(
        &self,
        config: JobConfig,
        input: Option<InputAsset>,
    ) -> Result<Job, JobError> {
        config.validate()?;
        let mut job = Job::new(config);
        job.input = input;

        let mut jobs = self.inner.jobs.lock().await;
        self.commit(&mut jobs, job.clone()).await?;
        info!(job_id = %job.id, profile = job.config.profile.as_str(), "Job created");
        Ok(job)
    }

    /// Attach the uploaded media to a queued job
    pub async fn attach_input(&self, job_id: Uuid, input: InputAsset) -> Result<Job, JobError> {
        let mut jobs = self.inner.jobs.lock().await;
        let mut job = jobs.get(&job_id).cloned().ok_or(JobError::NotFound(job_id))?;
        if job.status != JobStatus::Queued {
            return Err(JobError::Busy(job_id));
        }
        job.input = Some(input);
        job.touch();
        self.commit(&mut jobs, job.clone()).await?;
        Ok(job)
    }

    /// Start the pipeline for a queued job on its own task
    pub async fn start(&self, job_id: Uuid) -> Result<JoinHandle<()>, JobError> {
        let job = {
            let mut jobs = self.inner.jobs.lock().await;
            let mut job = jobs.get(&job_id).cloned().ok_or(JobError::NotFound(job_id))?;
            if job.status == JobStatus::Processing {
                return Err(TransitionError::Status {
                    from: job.status,
                    to: JobStatus::Processing,
                }
                .into());
            }
            job.transition(JobStatus::Processing)?;
            self.commit(&mut jobs, job.clone()).await?;
            job
        };

        let this = self.clone();
        Ok(tokio::spawn(async move { this.run_job(job).await }))
    }

    /// Create a job and start it immediately
    pub async fn submit(
        &self,
        config: JobConfig,
        input: Option<InputAsset>,
    ) -> Result<(Job, JoinHandle<()>), JobError> {
        let job = self.create_job(config, input).await?;
        let handle = self.start(job.id).await?;
        Ok((job, handle))
    }

    /// Replace a job's state, persist it and publish it as one unit
    pub async fn update(&self, job: Job) -> Result<(), JobError> {
        let mut jobs = self.inner.jobs.lock().await;
        self.commit(&mut jobs, job).await
    }

    /// All jobs, newest first
    pub async fn list(&self) -> Vec<Job> {
        let jobs = self.inner.jobs.lock().await;
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Job, JobError> {
        let jobs = self.inner.jobs.lock().await;
        jobs.get(&job_id).cloned().ok_or(JobError::NotFound(job_id))
    }

    /// Apply a partial config change to a job that is not processing
    pub async fn update_config(
        &self,
        job_id: Uuid,
        update: &JobConfigUpdate,
    ) -> Result<Job, JobError> {
        let mut jobs = self.inner.jobs.lock().await;
        let mut job = jobs.get(&job_id).cloned().ok_or(JobError::NotFound(job_id))?;
        if job.status == JobStatus::Processing {
            return Err(JobError::Busy(job_id));
        }
        job.config = update.apply(&job.config)?;
        job.touch();
        self.commit(&mut jobs, job.clone()).await?;
        Ok(job)
    }

    /// Recompute analytics for a finished job against its stored series.
    ///
    /// Runs to completion on the caller's task and returns the final job.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn rerun(
        &self,
        job_id: Uuid,
        update: Option<&JobConfigUpdate>,
    ) -> Result<Job, JobError> {
        let snapshot = self.get(job_id).await?;
        Self::ensure_finished(&snapshot)?;
        let series: Series = self
            .inner
            .repo
            .load_artifact(job_id, "series")
            .await?
            .ok_or(JobError::SeriesUnavailable(job_id))?;

        let mut job = {
            let mut jobs = self.inner.jobs.lock().await;
            let mut job = jobs.get(&job_id).cloned().ok_or(JobError::NotFound(job_id))?;
            // State may have moved while the series was loading
            Self::ensure_finished(&job)?;
            if let Some(update) = update {
                job.config = update.apply(&job.config)?;
            }
            job.reopen_for_rerun()?;
            self.commit(&mut jobs, job.clone()).await?;
            job
        };

        info!("Rerunning analytics");
        if let Err(e) = self.inner.pipeline.rerun(&mut job, series, self).await {
            self.handle_run_failure(job, e).await;
        }
        self.get(job_id).await
    }

    /// Look up a manifest entry by name
    pub async fn artifact(&self, job_id: Uuid, name: &str) -> Result<ArtifactItem, JobError> {
        let job = self.get(job_id).await?;
        job.manifest
            .get(name)
            .cloned()
            .ok_or_else(|| JobError::ArtifactNotFound {
                job_id,
                name: name.to_string(),
            })
    }

    /// Load a stored JSON artifact for a job
    pub async fn load_artifact<T: serde::de::DeserializeOwned>(
        &self,
        job_id: Uuid,
        name: &str,
    ) -> Result<T, JobError> {
        self.artifact(job_id, name).await?;
        self.inner
            .repo
            .load_artifact(job_id, name)
            .await?
            .ok_or_else(|| JobError::ArtifactNotFound {
                job_id,
                name: name.to_string(),
            })
    }

    pub fn subscribe_all(&self) -> JobUpdates {
        self.inner.updates.subscribe_all()
    }

    pub fn subscribe(&self, job_id: Uuid) -> JobUpdates {
        self.inner.updates.subscribe(job_id)
    }

    /// Persist first; the map and subscribers only see saved state
    async fn commit(&self, jobs: &mut HashMap<Uuid, Job>, job: Job) -> Result<(), JobError> {
        self.inner.repo.save_job(&job).await?;
        self.inner.updates.publish(&job);
        jobs.insert(job.id, job);
        Ok(())
    }

    fn ensure_finished(job: &Job) -> Result<(), JobError> {
        if job.is_finished() {
            Ok(())
        } else {
            Err(TransitionError::Status {
                from: job.status,
                to: JobStatus::Processing,
            }
            .into())
        }
    }

    #[instrument(skip_all, fields(job_id = %job.id))]
    async fn run_job(self, mut job: Job) {
        info!("Starting pipeline");
        if let Err(e) = self.inner.pipeline.run(&mut job, &self).await {
            self.handle_run_failure(job, e).await;
        }
    }

    /// Mark a job failed, keeping whatever artifacts were already stored
    async fn handle_run_failure(&self, mut job: Job, error: anyhow::Error) {
        let error_msg = format!("{:#}", error);
        error!(job_id = %job.id, stage = job.stage.as_str(), %error_msg, "Job failed");

        job.fail(error_msg);
        if let Err(e) = self.update(job).await {
            error!(error = %e, "Failed to record job failure");
        }
    }
}

#[async_trait]
impl ProgressSink for Orchestrator {
    async fn report(&self, job: &Job) -> anyhow::Result<()> {
        self.update(job.clone()).await.map_err(anyhow::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn orchestrator(temp: &TempDir) -> Orchestrator {
        Orchestrator::new(
            JobRepository::at(temp.path()),
            DetectionService::synthetic_only(),
            0.0,
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp);

        let job = orch.create_job(JobConfig::default(), None).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(orch.get(job.id).await.unwrap(), job);
        assert!(temp
            .path()
            .join(format!("jobs/{}/job.json", job.id))
            .exists());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp);
        let id = Uuid::new_v4();
        assert!(matches!(orch.get(id).await, Err(JobError::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn test_start_requires_queued() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp);

        let (job, handle) = orch.submit(JobConfig::default(), None).await.unwrap();
        handle.await.unwrap();

        assert!(matches!(
            orch.start(job.id).await,
            Err(JobError::Transition(_))
        ));
    }

    #[tokio::test]
    async fn test_start_rejects_job_in_flight() {
        let temp = TempDir::new().unwrap();
        let orch = Orchestrator::new(
            JobRepository::at(temp.path()),
            DetectionService::synthetic_only(),
            0.1,
        );

        let (job, handle) = orch.submit(JobConfig::default(), None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(orch.get(job.id).await.unwrap().status, JobStatus::Processing);

        assert!(matches!(
            orch.start(job.id).await,
            Err(JobError::Transition(TransitionError::Status {
                from: JobStatus::Processing,
                ..
            }))
        ));

        handle.await.unwrap();
        let job = orch.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_rerun_requires_finished() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp);

        let job = orch.create_job(JobConfig::default(), None).await.unwrap();
        assert!(matches!(
            orch.rerun(job.id, None).await,
            Err(JobError::Transition(_))
        ));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp);

        let first = orch.create_job(JobConfig::default(), None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = orch.create_job(JobConfig::default(), None).await.unwrap();

        let ids: Vec<Uuid> = orch.list().await.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
