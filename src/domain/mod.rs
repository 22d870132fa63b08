//! Domain types for the fieldlens orchestrator.
//!
//! This module contains the core data structures:
//! - Job: lifecycle state of one analysis
//! - JobConfig: per-job analysis settings
//! - Series / TrackFrames: detection output
//! - Metrics / Event: analytics output
//! - Artifact: stored outputs and their manifest

pub mod artifact;
pub mod events;
pub mod job;
pub mod job_config;
pub mod metrics;
pub mod series;

// Re-export commonly used types
pub use artifact::{ArtifactItem, ArtifactKind, ArtifactManifest};
pub use events::{Event, EventLog, EventType};
pub use job::{InputAsset, Job, JobStatus, JobSummary, Stage, TransitionError};
pub use job_config::{
    CalibrationPoint, ConfigError, JobConfig, JobConfigUpdate, Point, SportProfile, Team, Zone,
};
pub use metrics::{HeatmapGrid, Metrics, MetricsSummary, PlayerMetrics};
pub use series::{
    DetectedObject, FrameDetections, ObjectLabel, PlayerSeries, Series, SeriesError, TrackFrames,
    TrackInfo, TrackMeta,
};
