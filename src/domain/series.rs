//! Position time series and per-frame track data produced by detection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::job_config::{Point, SportProfile, Team};

/// Violations of the one-sample-per-frame invariant
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("series has no frames")]
    Empty,

    #[error("entity '{entity}' has {actual} positions, expected {expected}")]
    LengthMismatch {
        entity: String,
        actual: usize,
        expected: usize,
    },

    #[error("fps must be positive (got {0})")]
    InvalidFps(f64),

    #[error("frame size must be positive (got {width}x{height})")]
    InvalidDimensions { width: f64, height: f64 },
}

/// Positions of one tracked player, one entry per frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSeries {
    pub id: String,
    pub positions: Vec<Point>,
}

/// Per-entity position series derived from detection.
///
/// Players are kept in creation order; that order drives the default team
/// split during analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub fps: f64,
    pub width: f64,
    pub height: f64,
    pub players: Vec<PlayerSeries>,
    pub ball_positions: Vec<Point>,
    pub owner_by_frame: Vec<String>,
}

impl Series {
    pub fn frame_count(&self) -> usize {
        self.ball_positions.len()
    }

    /// Check that every sequence has exactly `frame_count` entries
    pub fn validate(&self) -> Result<(), SeriesError> {
        let expected = self.frame_count();
        if expected == 0 {
            return Err(SeriesError::Empty);
        }
        if !(self.fps > 0.0) {
            return Err(SeriesError::InvalidFps(self.fps));
        }
        let positive = |v: f64| v > 0.0 && v.is_finite();
        if !(positive(self.width) && positive(self.height)) {
            return Err(SeriesError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.owner_by_frame.len() != expected {
            return Err(SeriesError::LengthMismatch {
                entity: "owner_by_frame".to_string(),
                actual: self.owner_by_frame.len(),
                expected,
            });
        }
        for player in &self.players {
            if player.positions.len() != expected {
                return Err(SeriesError::LengthMismatch {
                    entity: player.id.clone(),
                    actual: player.positions.len(),
                    expected,
                });
            }
        }
        Ok(())
    }
}

/// Kind of detected object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectLabel {
    Player,
    Ball,
}

/// A single detected box in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub id: String,
    pub label: ObjectLabel,
    pub team: Option<Team>,
    /// `[x, y, width, height]` in pixels
    pub bbox: [f64; 4],
    pub confidence: f64,
}

/// All detections for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    pub frame: usize,
    pub objects: Vec<DetectedObject>,
}

/// Identity of a tracked entity across frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub label: ObjectLabel,
    pub team: Option<Team>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    pub profile: SportProfile,
    pub fps: f64,
    pub frame_count: usize,
    pub width: f64,
    pub height: f64,
}

/// Per-frame detections with stable entity ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFrames {
    pub meta: TrackMeta,
    pub tracks: Vec<TrackInfo>,
    pub frames: Vec<FrameDetections>,
}

/// Round to a fixed number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
