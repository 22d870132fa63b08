//! Per-job analysis configuration.
//!
//! A `JobConfig` is fixed once a job starts. The only ways to change it are an
//! explicit config update or a rerun, both of which go through
//! [`JobConfigUpdate::apply`] and re-validate the result.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Threshold keys recognised by the event detectors and the external tracker
pub mod keys {
    pub const POSSESSION_MIN_FRAMES: &str = "possession_min_frames";
    pub const ZONE_ENTRY_MIN_FRAMES: &str = "zone_entry_min_frames";
    pub const SPRINT_SPEED_MPS: &str = "sprint_speed_mps";
    pub const SPRINT_MIN_FRAMES: &str = "sprint_min_frames";
    pub const CROWDING_DISTANCE_PX: &str = "crowding_distance_px";
    pub const CROWDING_PLAYER_COUNT: &str = "crowding_player_count";
    pub const CROWDING_MIN_FRAMES: &str = "crowding_min_frames";
    pub const DET_CONFIDENCE: &str = "det_confidence";
}

/// Errors raised while parsing or validating a configuration payload
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("zone at index {index} has an empty id")]
    EmptyZoneId { index: usize },

    #[error("duplicate zone id: {0}")]
    DuplicateZoneId(String),

    #[error("zone '{zone}' has a non-finite polygon coordinate")]
    NonFinitePolygon { zone: String },

    #[error("threshold '{key}' must be a finite, non-negative number (got {value})")]
    InvalidThreshold { key: String, value: f64 },

    #[error("calibration point {index} has a non-finite coordinate")]
    InvalidCalibration { index: usize },
}

/// Supported sport profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SportProfile {
    Soccer,
    Basketball,
}

impl Default for SportProfile {
    fn default() -> Self {
        Self::Soccer
    }
}

impl SportProfile {
    /// Real-world playing surface as (length, width) in meters
    pub fn field_dimensions(&self) -> (f64, f64) {
        match self {
            Self::Soccer => (105.0, 68.0),
            Self::Basketball => (28.0, 15.0),
        }
    }

    /// Speed above which a player counts as sprinting, in m/s
    pub fn default_sprint_speed(&self) -> f64 {
        match self {
            Self::Soccer => 6.0,
            Self::Basketball => 5.0,
        }
    }

    /// Number of players on the field for both teams combined
    pub fn player_count(&self) -> usize {
        match self {
            Self::Soccer => 20,
            Self::Basketball => 10,
        }
    }

    /// Typical player bounding box (width, height) in pixels at 1280x720
    pub fn player_box(&self) -> (f64, f64) {
        match self {
            Self::Soccer => (32.0, 64.0),
            Self::Basketball => (36.0, 72.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Soccer => "soccer",
            Self::Basketball => "basketball",
        }
    }
}

/// Team side
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    A,
    B,
}

impl Team {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

/// A 2D point, serialized as a `[x, y]` pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point
    pub fn distance_sq(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(&self, other: &Point) -> f64 {
        self.distance_sq(other).sqrt()
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Image-to-field reference pair. Recorded with the job but not yet applied
/// to the coordinate mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub image_x: f64,
    pub image_y: f64,
    pub field_x: f64,
    pub field_y: f64,
}

/// A named polygon in image space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub polygon: Vec<Point>,
}

/// Analysis configuration for a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub profile: SportProfile,

    #[serde(default = "default_analytics_enabled")]
    pub analytics_enabled: bool,

    #[serde(default)]
    pub calibration_points: Vec<CalibrationPoint>,

    #[serde(default)]
    pub zones: Vec<Zone>,

    /// Overrides for event-detection defaults, see [`keys`]
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,

    /// Player id -> team, takes precedence over the ordinal default
    #[serde(default)]
    pub team_overrides: BTreeMap<String, Team>,
}

fn default_analytics_enabled() -> bool {
    true
}

impl Default for JobConfig {
    fn default() -> Self {
        Self::for_profile(SportProfile::default())
    }
}

impl JobConfig {
    /// Config with defaults for the given profile
    pub fn for_profile(profile: SportProfile) -> Self {
        Self {
            profile,
            analytics_enabled: default_analytics_enabled(),
            calibration_points: Vec::new(),
            zones: Vec::new(),
            thresholds: BTreeMap::new(),
            team_overrides: BTreeMap::new(),
        }
    }

    /// Parse and validate a JSON payload
    pub fn from_json(payload: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, zone) in self.zones.iter().enumerate() {
            if zone.id.trim().is_empty() {
                return Err(ConfigError::EmptyZoneId { index });
            }
            if !seen.insert(zone.id.as_str()) {
                return Err(ConfigError::DuplicateZoneId(zone.id.clone()));
            }
            if zone
                .polygon
                .iter()
                .any(|p| !p.x.is_finite() || !p.y.is_finite())
            {
                return Err(ConfigError::NonFinitePolygon {
                    zone: zone.id.clone(),
                });
            }
        }

        for (key, value) in &self.thresholds {
            if !value.is_finite() || *value < 0.0 {
                return Err(ConfigError::InvalidThreshold {
                    key: key.clone(),
                    value: *value,
                });
            }
        }

        for (index, point) in self.calibration_points.iter().enumerate() {
            let coords = [point.image_x, point.image_y, point.field_x, point.field_y];
            if coords.iter().any(|c| !c.is_finite()) {
                return Err(ConfigError::InvalidCalibration { index });
            }
        }

        Ok(())
    }

    /// Look up a threshold override
    pub fn threshold(&self, key: &str) -> Option<f64> {
        self.thresholds.get(key).copied()
    }
}

/// Partial update to a [`JobConfig`]; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<SportProfile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration_points: Option<Vec<CalibrationPoint>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<Zone>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<BTreeMap<String, f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_overrides: Option<BTreeMap<String, Team>>,
}

impl JobConfigUpdate {
    /// Parse a JSON patch. Validation happens when it is applied.
    pub fn from_json(payload: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Produce the patched config, validated
    pub fn apply(&self, base: &JobConfig) -> Result<JobConfig, ConfigError> {
        let mut next = base.clone();
        if let Some(profile) = self.profile {
            next.profile = profile;
        }
        if let Some(enabled) = self.analytics_enabled {
            next.analytics_enabled = enabled;
        }
        if let Some(ref points) = self.calibration_points {
            next.calibration_points = points.clone();
        }
        if let Some(ref zones) = self.zones {
            next.zones = zones.clone();
        }
        if let Some(ref thresholds) = self.thresholds {
            next.thresholds = thresholds.clone();
        }
        if let Some(ref overrides) = self.team_overrides {
            next.team_overrides = overrides.clone();
        }
        next.validate()?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config = JobConfig::from_json("{}").unwrap();
        assert_eq!(config.profile, SportProfile::Soccer);
        assert!(config.analytics_enabled);
        assert!(config.zones.is_empty());
    }

    #[test]
    fn test_polygon_parses_from_pairs() {
        let config = JobConfig::from_json(
            r#"{"profile":"basketball","zones":[{"id":"z1","name":"Paint","polygon":[[0,0],[4,0],[0,4]]}]}"#,
        )
        .unwrap();
        assert_eq!(config.profile, SportProfile::Basketball);
        assert_eq!(config.zones[0].polygon[1], Point::new(4.0, 0.0));
    }

    #[test]
    fn test_wrong_polygon_shape_rejected() {
        let result = JobConfig::from_json(
            r#"{"zones":[{"id":"z1","name":"Box","polygon":[[0,0,1],[4,0]]}]}"#,
        );
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_unparsable_json_rejected() {
        assert!(matches!(
            JobConfig::from_json("{not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_duplicate_zone_ids_rejected() {
        let result = JobConfig::from_json(
            r#"{"zones":[{"id":"z","name":"a","polygon":[]},{"id":"z","name":"b","polygon":[]}]}"#,
        );
        assert!(matches!(result, Err(ConfigError::DuplicateZoneId(id)) if id == "z"));
    }

    #[test]
    fn test_empty_polygon_is_accepted() {
        let config =
            JobConfig::from_json(r#"{"zones":[{"id":"z","name":"a","polygon":[]}]}"#).unwrap();
        assert!(config.zones[0].polygon.is_empty());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let result = JobConfig::from_json(r#"{"thresholds":{"sprint_min_frames":-1}}"#);
        assert!(matches!(result, Err(ConfigError::InvalidThreshold { .. })));
    }

    #[test]
    fn test_update_only_touches_supplied_fields() {
        let base = JobConfig::for_profile(SportProfile::Soccer);
        let update =
            JobConfigUpdate::from_json(r#"{"team_overrides":{"p1":"B"}}"#).unwrap();

        let next = update.apply(&base).unwrap();
        assert_eq!(next.profile, SportProfile::Soccer);
        assert_eq!(next.team_overrides.get("p1"), Some(&Team::B));
        assert!(!update.is_empty());
        assert!(JobConfigUpdate::default().is_empty());
    }

    #[test]
    fn test_invalid_team_override_rejected() {
        let result = JobConfigUpdate::from_json(r#"{"team_overrides":{"p1":"C"}}"#);
        assert!(result.is_err());
    }
}
