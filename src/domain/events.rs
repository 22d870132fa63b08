//! Discrete match events derived from a position series.
//!
//! Events are produced once per analytics pass and never mutated afterwards.

use serde::{Deserialize, Serialize};

/// A single detected event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier, unique within one analytics pass (e.g. `evt_pos_120`)
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Start time in seconds
    pub start: f64,

    /// End time in seconds
    pub end: f64,

    /// Frame index that triggered the event
    pub frame: usize,

    /// Entity ids involved
    pub involved: Vec<String>,

    /// Detector confidence in [0, 1]
    pub confidence: f64,

    /// Human-readable explanation
    pub explanation: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
}

impl Event {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        event_type: EventType,
        start: f64,
        end: f64,
        frame: usize,
        involved: Vec<String>,
        confidence: f64,
        explanation: String,
    ) -> Self {
        Self {
            id,
            event_type,
            start,
            end,
            frame,
            involved,
            confidence,
            explanation,
            zone_id: None,
            zone_name: None,
        }
    }

    /// Attach the zone this event refers to
    pub fn with_zone(mut self, zone_id: &str, zone_name: &str) -> Self {
        self.zone_id = Some(zone_id.to_string());
        self.zone_name = Some(zone_name.to_string());
        self
    }
}

/// Types of events the analytics engine emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Ball owner changed after a stable hold
    PossessionChange,

    /// Ball stayed inside a zone for the minimum streak
    EntryIntoZone,

    /// Ball entered a shooting zone
    ShotAttempt,

    /// Player exceeded the sprint speed for the minimum streak
    SprintBurst,

    /// Many players clustered near the ball
    Crowding,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PossessionChange => "possession_change",
            Self::EntryIntoZone => "entry_into_zone",
            Self::ShotAttempt => "shot_attempt",
            Self::SprintBurst => "sprint_burst",
            Self::Crowding => "crowding",
        }
    }
}

/// Wrapper persisted as `events.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub events: Vec<Event>,
}
