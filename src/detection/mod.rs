//! Detection providers.
//!
//! A provider turns an input media reference into per-frame tracks and a
//! position [`Series`]. Two implementations exist: a seeded synthetic
//! generator and an adapter around an external tracker process.
//! [`DetectionService`] decides which one runs and falls back to the
//! synthetic generator whenever the configured provider fails.

pub mod external;
pub mod ownership;
pub mod synthetic;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{DetectorKind, DetectorSettings};
use crate::domain::{JobConfig, Series, SeriesError, TrackFrames};

pub use external::ExternalDetector;
pub use ownership::resolve_owners;
pub use synthetic::{seed_for_job, SyntheticDetector};

/// Recoverable detection failures
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("no input media to analyse")]
    MissingInput,

    #[error("failed to start tracker '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tracker exited with code {code}: {stderr}")]
    Exited { code: i32, stderr: String },

    #[error("tracker timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed tracker output on line {line}: {message}")]
    Protocol { line: usize, message: String },

    #[error("tracker produced no frames")]
    EmptyStream,

    #[error("tracker found no players")]
    NoPlayers,

    #[error("tracker health check failed: {0}")]
    Unhealthy(String),

    #[error("assembled series is inconsistent: {0}")]
    Series(#[from] SeriesError),

    #[error("tracker i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a provider is asked to analyse
#[derive(Debug, Clone, Copy)]
pub struct DetectionRequest<'a> {
    pub job_id: Uuid,
    pub input: Option<&'a Path>,
    pub config: &'a JobConfig,
}

/// Tracks plus the position series derived from them
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutput {
    pub tracks: TrackFrames,
    pub series: Series,
}

/// Trait for detection backends
#[async_trait]
pub trait DetectionProvider: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Cheap readiness check run before detection
    async fn health_check(&self) -> Result<(), DetectionError> {
        Ok(())
    }

    async fn detect(&self, request: &DetectionRequest<'_>)
        -> Result<DetectionOutput, DetectionError>;
}

/// Result of a detection pass, including which provider produced it
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub output: DetectionOutput,
    pub provider: String,
    /// Why the primary provider was bypassed, if it was
    pub warning: Option<String>,
}

/// Runs the configured provider with a synthetic fallback
#[derive(Clone)]
pub struct DetectionService {
    primary: Option<Arc<dyn DetectionProvider>>,
    fallback: SyntheticDetector,
}

impl Default for DetectionService {
    fn default() -> Self {
        Self::synthetic_only()
    }
}

impl DetectionService {
    /// Service that always uses the synthetic generator
    pub fn synthetic_only() -> Self {
        Self {
            primary: None,
            fallback: SyntheticDetector,
        }
    }

    /// Service that tries `primary` first
    pub fn with_primary(primary: Arc<dyn DetectionProvider>) -> Self {
        Self {
            primary: Some(primary),
            fallback: SyntheticDetector,
        }
    }

    /// Build from application settings
    pub fn from_settings(settings: &DetectorSettings) -> Self {
        match settings.provider {
            DetectorKind::Synthetic => Self::synthetic_only(),
            DetectorKind::External => Self::with_primary(Arc::new(ExternalDetector::new(
                PathBuf::from(&settings.command),
                settings.args.clone(),
                settings.model.clone(),
                settings.timeout,
            ))),
        }
    }

    /// Name of the provider tried first
    pub fn primary_name(&self) -> &str {
        match &self.primary {
            Some(provider) => provider.name(),
            None => self.fallback.name(),
        }
    }

    /// Run detection. Never fails: primary errors become a warning.
    pub async fn detect(&self, request: &DetectionRequest<'_>) -> DetectionOutcome {
        let mut warning = None;

        if let Some(primary) = &self.primary {
            match Self::try_primary(primary.as_ref(), request).await {
                Ok(output) => {
                    info!(provider = primary.name(), frames = output.series.frame_count(), "Detection complete");
                    return DetectionOutcome {
                        output,
                        provider: primary.name().to_string(),
                        warning: None,
                    };
                }
                Err(e) => {
                    warn!(provider = primary.name(), error = %e, "Detection failed, using synthetic tracks");
                    warning = Some(format!("{} detector failed: {}", primary.name(), e));
                }
            }
        }

        let output = self.fallback.generate(request.job_id, request.config);
        DetectionOutcome {
            output,
            provider: self.fallback.name().to_string(),
            warning,
        }
    }

    async fn try_primary(
        primary: &dyn DetectionProvider,
        request: &DetectionRequest<'_>,
    ) -> Result<DetectionOutput, DetectionError> {
        if request.input.is_none() {
            return Err(DetectionError::MissingInput);
        }
        primary.health_check().await?;
        let output = primary.detect(request).await?;
        output.series.validate()?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl DetectionProvider for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn detect(
            &self,
            _request: &DetectionRequest<'_>,
        ) -> Result<DetectionOutput, DetectionError> {
            Err(DetectionError::EmptyStream)
        }
    }

    #[tokio::test]
    async fn test_synthetic_only_has_no_warning() {
        let service = DetectionService::synthetic_only();
        let config = JobConfig::default();
        let request = DetectionRequest {
            job_id: Uuid::new_v4(),
            input: None,
            config: &config,
        };

        let outcome = service.detect(&request).await;
        assert_eq!(outcome.provider, "synthetic");
        assert!(outcome.warning.is_none());
    }

    #[tokio::test]
    async fn test_failing_primary_falls_back() {
        let service = DetectionService::with_primary(Arc::new(Broken));
        let config = JobConfig::default();
        let input = PathBuf::from("/tmp/match.mp4");
        let request = DetectionRequest {
            job_id: Uuid::new_v4(),
            input: Some(&input),
            config: &config,
        };

        let outcome = service.detect(&request).await;
        assert_eq!(outcome.provider, "synthetic");
        let warning = outcome.warning.unwrap();
        assert!(warning.contains("broken"));
        assert!(warning.contains("no frames"));
    }

    #[tokio::test]
    async fn test_primary_skipped_without_input() {
        let service = DetectionService::with_primary(Arc::new(Broken));
        let config = JobConfig::default();
        let request = DetectionRequest {
            job_id: Uuid::new_v4(),
            input: None,
            config: &config,
        };

        let outcome = service.detect(&request).await;
        assert!(outcome.warning.unwrap().contains("no input"));
    }

    #[test]
    fn test_from_settings() {
        let mut settings = DetectorSettings::default();
        assert_eq!(DetectionService::from_settings(&settings).primary_name(), "synthetic");

        settings.provider = DetectorKind::External;
        assert_eq!(DetectionService::from_settings(&settings).primary_name(), "external");
    }
}
