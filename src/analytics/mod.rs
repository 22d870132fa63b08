//! Analytics engine.
//!
//! Pure functions that turn a validated [`Series`] and a [`JobConfig`] into
//! [`Metrics`] and an ordered event list. Nothing here touches storage or
//! the clock, so the same input always yields the same output.

pub mod events;
pub mod geometry;
pub mod metrics;

use crate::domain::job_config::keys;
use crate::domain::{Event, JobConfig, Metrics, Series, SeriesError};

pub use events::detect_events;
pub use geometry::{point_in_polygon, FieldMapper};
pub use metrics::compute_metrics;

/// Event-detection thresholds resolved from a job config
#[derive(Debug, Clone, PartialEq)]
pub struct EventThresholds {
    pub possession_min_frames: usize,
    pub zone_entry_min_frames: usize,
    pub sprint_speed_mps: f64,
    pub sprint_min_frames: usize,
    pub crowding_distance_px: f64,
    pub crowding_player_count: usize,
    pub crowding_min_frames: usize,
}

impl EventThresholds {
    /// Defaults for the config's profile, overridden by its thresholds map.
    ///
    /// Frame counts are truncated to whole frames and never fall below 1.
    pub fn from_config(config: &JobConfig) -> Self {
        let frames = |key: &str, default: usize| -> usize {
            config
                .threshold(key)
                .map(|v| v as usize)
                .unwrap_or(default)
                .max(1)
        };

        Self {
            possession_min_frames: frames(keys::POSSESSION_MIN_FRAMES, 8),
            zone_entry_min_frames: frames(keys::ZONE_ENTRY_MIN_FRAMES, 4),
            sprint_speed_mps: config
                .threshold(keys::SPRINT_SPEED_MPS)
                .unwrap_or_else(|| config.profile.default_sprint_speed()),
            sprint_min_frames: frames(keys::SPRINT_MIN_FRAMES, 6),
            crowding_distance_px: config
                .threshold(keys::CROWDING_DISTANCE_PX)
                .unwrap_or(80.0),
            crowding_player_count: config
                .threshold(keys::CROWDING_PLAYER_COUNT)
                .map(|v| v as usize)
                .unwrap_or(6),
            crowding_min_frames: frames(keys::CROWDING_MIN_FRAMES, 5),
        }
    }
}

/// Output of one analytics pass
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub metrics: Metrics,
    pub events: Vec<Event>,
}

/// Run metrics and event detection over a series
pub fn analyze(series: &Series, config: &JobConfig) -> Result<Analysis, SeriesError> {
    series.validate()?;
    let thresholds = EventThresholds::from_config(config);
    Ok(Analysis {
        metrics: compute_metrics(series, config),
        events: detect_events(series, config, &thresholds),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SportProfile;

    #[test]
    fn test_threshold_defaults_follow_profile() {
        let soccer = EventThresholds::from_config(&JobConfig::for_profile(SportProfile::Soccer));
        let basketball =
            EventThresholds::from_config(&JobConfig::for_profile(SportProfile::Basketball));

        assert_eq!(soccer.possession_min_frames, 8);
        assert_eq!(soccer.sprint_speed_mps, 6.0);
        assert_eq!(basketball.sprint_speed_mps, 5.0);
        assert_eq!(basketball.crowding_distance_px, 80.0);
    }

    #[test]
    fn test_threshold_overrides_and_floor() {
        let mut config = JobConfig::default();
        config
            .thresholds
            .insert(keys::POSSESSION_MIN_FRAMES.to_string(), 0.0);
        config
            .thresholds
            .insert(keys::SPRINT_SPEED_MPS.to_string(), 7.5);

        let thresholds = EventThresholds::from_config(&config);
        assert_eq!(thresholds.possession_min_frames, 1);
        assert_eq!(thresholds.sprint_speed_mps, 7.5);
    }

    #[test]
    fn test_analyze_rejects_inconsistent_series() {
        let series = Series {
            fps: 25.0,
            width: 1280.0,
            height: 720.0,
            players: Vec::new(),
            ball_positions: Vec::new(),
            owner_by_frame: Vec::new(),
        };
        assert_eq!(
            analyze(&series, &JobConfig::default()),
            Err(SeriesError::Empty)
        );
    }
}
