//! Job state and lifecycle transitions.
//!
//! A Job is one analysis of one input. Status only moves forward
//! (queued -> processing -> completed | failed); the single exception is
//! [`Job::reopen_for_rerun`], which re-enters the analytics stage of a
//! finished job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::artifact::ArtifactManifest;
use super::job_config::{JobConfig, SportProfile};
use super::metrics::MetricsSummary;

/// A rejected status or stage change
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("job cannot move from {from:?} to {to:?}")]
    Status { from: JobStatus, to: JobStatus },

    #[error("stage {to:?} does not follow {from:?}")]
    Stage { from: Stage, to: Stage },
}

/// An analysis job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,

    pub status: JobStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Fraction complete, 0.0 to 1.0
    pub progress: f64,

    pub stage: Stage,

    pub config: JobConfig,

    #[serde(default)]
    pub input: Option<InputAsset>,

    /// Set only when status is failed
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub manifest: ArtifactManifest,

    #[serde(default)]
    pub summary: JobSummary,
}

impl Job {
    /// Create a queued job
    pub fn new(config: JobConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            progress: 0.0,
            stage: Stage::Queued,
            config,
            input: None,
            error: None,
            manifest: ArtifactManifest::default(),
            summary: JobSummary::default(),
        }
    }

    /// Move to a new status, enforcing forward-only transitions
    pub fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Status {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Enter the next processing stage and set its scheduled progress
    pub fn advance_to(&mut self, stage: Stage) -> Result<(), TransitionError> {
        if self.status != JobStatus::Processing || stage <= self.stage || stage == Stage::Completed
        {
            return Err(TransitionError::Stage {
                from: self.stage,
                to: stage,
            });
        }
        self.stage = stage;
        self.progress = stage.progress();
        self.touch();
        Ok(())
    }

    /// Mark the job completed
    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.stage = Stage::Completed;
        self.progress = 1.0;
        Ok(())
    }

    /// Mark the job failed, keeping the stage it failed in
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.touch();
    }

    /// Re-enter the analytics stage of a finished job
    pub fn reopen_for_rerun(&mut self) -> Result<(), TransitionError> {
        if !self.status.is_terminal() {
            return Err(TransitionError::Status {
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        self.status = JobStatus::Processing;
        self.stage = Stage::Analytics;
        self.progress = Stage::Analytics.progress();
        self.error = None;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Forward-only transition table
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Ingest,
    Detect,
    Track,
    Understand,
    Analytics,
    Exports,
    Completed,
}

impl Stage {
    /// Stages executed by a full pipeline run
    pub const PROCESSING: [Stage; 6] = [
        Stage::Ingest,
        Stage::Detect,
        Stage::Track,
        Stage::Understand,
        Stage::Analytics,
        Stage::Exports,
    ];

    /// Progress reported when the stage is entered
    pub fn progress(&self) -> f64 {
        match self {
            Self::Queued => 0.0,
            Self::Ingest => 0.1,
            Self::Detect => 0.35,
            Self::Track => 0.55,
            Self::Understand => 0.7,
            Self::Analytics => 0.85,
            Self::Exports | Self::Completed => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Ingest => "ingest",
            Self::Detect => "detect",
            Self::Track => "track",
            Self::Understand => "understand",
            Self::Analytics => "analytics",
            Self::Exports => "exports",
            Self::Completed => "completed",
        }
    }
}

/// The uploaded media a job analyses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAsset {
    pub filename: String,
    pub content_type: Option<String>,
    pub path: String,
    /// Filled in during ingest
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl InputAsset {
    /// Describe a local file, guessing the content type from its extension
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let file = std::path::Path::new(&path);
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        let content_type = file
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| match ext.to_ascii_lowercase().as_str() {
                "mp4" => Some("video/mp4"),
                "mov" => Some("video/quicktime"),
                "webm" => Some("video/webm"),
                "mkv" => Some("video/x-matroska"),
                "jpg" | "jpeg" => Some("image/jpeg"),
                "png" => Some("image/png"),
                _ => None,
            })
            .map(str::to_string);
        Self {
            filename,
            content_type,
            path,
            size_bytes: None,
        }
    }
}

/// Scalars kept on the job record after a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<SportProfile>,

    /// Name of the provider that produced the tracks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,

    /// Why the configured detector was bypassed, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector_warning: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_count: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation() {
        let job = Job::new(JobConfig::default());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.stage, Stage::Queued);
        assert_eq!(job.progress, 0.0);
        assert!(!job.is_finished());
    }

    #[test]
    fn test_forward_transitions() {
        let mut job = Job::new(JobConfig::default());
        job.transition(JobStatus::Processing).unwrap();
        job.advance_to(Stage::Ingest).unwrap();
        job.advance_to(Stage::Detect).unwrap();
        assert_eq!(job.progress, 0.35);

        job.complete().unwrap();
        assert_eq!(job.stage, Stage::Completed);
        assert_eq!(job.progress, 1.0);

        let err = job.transition(JobStatus::Queued).unwrap_err();
        assert!(matches!(err, TransitionError::Status { .. }));
    }

    #[test]
    fn test_processing_cannot_restart() {
        let mut job = Job::new(JobConfig::default());
        job.transition(JobStatus::Processing).unwrap();

        let err = job.transition(JobStatus::Processing).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Status {
                from: JobStatus::Processing,
                to: JobStatus::Processing
            }
        ));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Processing));
    }

    #[test]
    fn test_stage_cannot_repeat_or_skip_backwards() {
        let mut job = Job::new(JobConfig::default());
        job.transition(JobStatus::Processing).unwrap();
        job.advance_to(Stage::Detect).unwrap();

        assert!(job.advance_to(Stage::Detect).is_err());
        assert!(job.advance_to(Stage::Ingest).is_err());
    }

    #[test]
    fn test_stage_requires_processing() {
        let mut job = Job::new(JobConfig::default());
        assert!(job.advance_to(Stage::Ingest).is_err());
    }

    #[test]
    fn test_reopen_only_when_finished() {
        let mut job = Job::new(JobConfig::default());
        assert!(job.reopen_for_rerun().is_err());

        job.transition(JobStatus::Processing).unwrap();
        assert!(job.reopen_for_rerun().is_err());

        job.fail("boom");
        job.reopen_for_rerun().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.stage, Stage::Analytics);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_input_from_path() {
        let input = InputAsset::from_path("/uploads/final.MP4");
        assert_eq!(input.filename, "final.MP4");
        assert_eq!(input.content_type.as_deref(), Some("video/mp4"));
        assert!(InputAsset::from_path("clip.bin").content_type.is_none());
    }

    #[test]
    fn test_summary_omits_empty_fields() {
        let json = serde_json::to_value(JobSummary::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
