//! Event detection.
//!
//! Each event type is a small state machine fed one frame at a time. The
//! trackers only decide *when* to fire; [`detect_events`] turns a firing into
//! an [`Event`] with timing, ids and confidence.

use crate::domain::series::round_to;
use crate::domain::{Event, EventType, JobConfig, Point, Series, Zone};

use super::geometry::{point_in_polygon, FieldMapper};
use super::EventThresholds;

const POSSESSION_CONFIDENCE: f64 = 0.78;
const ZONE_ENTRY_CONFIDENCE: f64 = 0.66;
const ZONE_SHOT_CONFIDENCE: f64 = 0.72;
const FIELD_ENTRY_CONFIDENCE: f64 = 0.64;
const FIELD_SHOT_CONFIDENCE: f64 = 0.7;
const SPRINT_CONFIDENCE: f64 = 0.6;
const CROWDING_CONFIDENCE: f64 = 0.58;

/// Zone names containing any of these count as shooting zones
const SHOT_ZONE_MARKERS: &[&str] = &["shot", "box", "key", "paint"];

/// Tracks how long the current owner has held the ball
#[derive(Debug, Clone)]
pub struct PossessionTracker {
    min_frames: usize,
    owner: Option<String>,
    held: usize,
}

impl PossessionTracker {
    pub fn new(min_frames: usize) -> Self {
        Self {
            min_frames,
            owner: None,
            held: 0,
        }
    }

    /// Feed the owner of the next frame. Returns the previous owner and how
    /// many frames it held the ball when the ball changed hands after a hold
    /// of at least `min_frames`.
    pub fn observe(&mut self, owner: &str) -> Option<(String, usize)> {
        match self.owner.as_deref() {
            Some(current) if current == owner => {
                self.held += 1;
                None
            }
            Some(_) => {
                let held = self.held;
                let previous = self.owner.replace(owner.to_string());
                // The change frame already counts for the new owner
                self.held = 1;
                previous
                    .filter(|_| held >= self.min_frames)
                    .map(|previous| (previous, held))
            }
            None => {
                self.owner = Some(owner.to_string());
                self.held = 1;
                None
            }
        }
    }
}

/// Streak counter that fires once per inside episode
#[derive(Debug, Clone)]
pub struct ZoneTracker {
    min_frames: usize,
    streak: usize,
    active: bool,
}

impl ZoneTracker {
    pub fn new(min_frames: usize) -> Self {
        Self {
            min_frames,
            streak: 0,
            active: false,
        }
    }

    /// Returns true on the frame the streak reaches `min_frames`
    pub fn observe(&mut self, inside: bool) -> bool {
        if !inside {
            self.streak = 0;
            self.active = false;
            return false;
        }
        if self.active {
            return false;
        }
        self.streak += 1;
        if self.streak >= self.min_frames {
            self.active = true;
            return true;
        }
        false
    }

    pub fn streak(&self) -> usize {
        self.streak
    }
}

/// Counts consecutive frames above the sprint speed
#[derive(Debug, Clone)]
pub struct SprintTracker {
    speed_mps: f64,
    min_frames: usize,
    streak: usize,
}

impl SprintTracker {
    pub fn new(speed_mps: f64, min_frames: usize) -> Self {
        Self {
            speed_mps,
            min_frames,
            streak: 0,
        }
    }

    /// Feed one speed sample. Returns the streak length when a long enough
    /// sprint just ended.
    pub fn observe(&mut self, speed: f64) -> Option<usize> {
        if speed > self.speed_mps {
            self.streak += 1;
            return None;
        }
        let streak = std::mem::take(&mut self.streak);
        (streak >= self.min_frames).then_some(streak)
    }
}

/// Counter plus active flag for sustained crowding
#[derive(Debug, Clone)]
pub struct CrowdingTracker {
    min_frames: usize,
    count: usize,
    active: bool,
}

impl CrowdingTracker {
    pub fn new(min_frames: usize) -> Self {
        Self {
            min_frames,
            count: 0,
            active: false,
        }
    }

    /// Returns true exactly once per crowded episode
    pub fn observe(&mut self, crowded: bool) -> bool {
        if !crowded {
            self.count = 0;
            self.active = false;
            return false;
        }
        self.count += 1;
        if !self.active && self.count >= self.min_frames {
            self.active = true;
            return true;
        }
        false
    }
}

fn secs(frame: usize, fps: f64) -> f64 {
    round_to(frame as f64 / fps, 2)
}

fn is_shot_zone(zone: &Zone) -> bool {
    let name = zone.name.to_lowercase();
    SHOT_ZONE_MARKERS.iter().any(|marker| name.contains(marker))
}

/// Detect all events in a validated series, sorted by start time
pub fn detect_events(series: &Series, config: &JobConfig, thresholds: &EventThresholds) -> Vec<Event> {
    let mut events = Vec::new();
    possession_events(series, thresholds, &mut events);
    if config.zones.is_empty() {
        field_zone_events(series, config, &mut events);
    } else {
        zone_events(series, &config.zones, thresholds, &mut events);
    }
    sprint_events(series, config, thresholds, &mut events);
    crowding_events(series, thresholds, &mut events);

    events.sort_by(|a, b| a.start.total_cmp(&b.start));
    events
}

fn possession_events(series: &Series, thresholds: &EventThresholds, out: &mut Vec<Event>) {
    let mut tracker = PossessionTracker::new(thresholds.possession_min_frames);
    for (idx, owner) in series.owner_by_frame.iter().enumerate() {
        if let Some((previous, held)) = tracker.observe(owner) {
            out.push(Event::new(
                format!("evt_pos_{}", idx),
                EventType::PossessionChange,
                secs(idx, series.fps),
                secs(idx + 4, series.fps),
                idx,
                vec![previous.clone(), owner.clone()],
                POSSESSION_CONFIDENCE,
                format!(
                    "ball owner changed from {} to {} and held for {} frames",
                    previous, owner, held
                ),
            ));
        }
    }
}

fn zone_events(series: &Series, zones: &[Zone], thresholds: &EventThresholds, out: &mut Vec<Event>) {
    let mut trackers: Vec<ZoneTracker> = zones
        .iter()
        .map(|_| ZoneTracker::new(thresholds.zone_entry_min_frames))
        .collect();

    for (idx, ball) in series.ball_positions.iter().enumerate() {
        let owner = &series.owner_by_frame[idx];
        for (zone, tracker) in zones.iter().zip(trackers.iter_mut()) {
            if !tracker.observe(point_in_polygon(*ball, &zone.polygon)) {
                continue;
            }
            let streak = tracker.streak();
            let start = secs(idx + 1 - streak, series.fps);
            let end = secs(idx + 6, series.fps);
            out.push(
                Event::new(
                    format!("evt_zone_{}_{}", zone.id, idx),
                    EventType::EntryIntoZone,
                    start,
                    end,
                    idx,
                    vec![owner.clone()],
                    ZONE_ENTRY_CONFIDENCE,
                    format!("ball entered {} for {} frames", zone.name, streak),
                )
                .with_zone(&zone.id, &zone.name),
            );
            if is_shot_zone(zone) {
                out.push(
                    Event::new(
                        format!("evt_shot_{}_{}", zone.id, idx),
                        EventType::ShotAttempt,
                        start,
                        end,
                        idx,
                        vec![owner.clone()],
                        ZONE_SHOT_CONFIDENCE,
                        format!("ball entered shot zone {}", zone.name),
                    )
                    .with_zone(&zone.id, &zone.name),
                );
            }
        }
    }
}

/// Fallback when no zones are configured: attacking third and shot area
/// measured along the field length
fn field_zone_events(series: &Series, config: &JobConfig, out: &mut Vec<Event>) {
    let mapper = FieldMapper::new(config.profile, series.width, series.height);
    let length = mapper.field_length();

    for (idx, ball) in series.ball_positions.iter().enumerate() {
        let field_x = mapper.to_field(*ball).x;
        let owner = &series.owner_by_frame[idx];

        if idx % 40 == 0 && field_x > 0.66 * length {
            out.push(Event::new(
                format!("evt_zone_{}", idx),
                EventType::EntryIntoZone,
                secs(idx, series.fps),
                secs(idx + 10, series.fps),
                idx,
                vec![owner.clone()],
                FIELD_ENTRY_CONFIDENCE,
                "ball entered attacking third".to_string(),
            ));
        }
        if idx % 50 == 0 && field_x > 0.92 * length {
            out.push(Event::new(
                format!("evt_shot_{}", idx),
                EventType::ShotAttempt,
                secs(idx, series.fps),
                secs(idx + 6, series.fps),
                idx,
                vec![owner.clone()],
                FIELD_SHOT_CONFIDENCE,
                "ball reached shot zone".to_string(),
            ));
        }
    }
}

fn sprint_events(
    series: &Series,
    config: &JobConfig,
    thresholds: &EventThresholds,
    out: &mut Vec<Event>,
) {
    let mapper = FieldMapper::new(config.profile, series.width, series.height);

    for player in &series.players {
        let field: Vec<Point> = player.positions.iter().map(|p| mapper.to_field(*p)).collect();
        let mut tracker =
            SprintTracker::new(thresholds.sprint_speed_mps, thresholds.sprint_min_frames);

        for idx in 1..field.len() {
            let speed = field[idx - 1].distance(&field[idx]) * series.fps;
            if let Some(streak) = tracker.observe(speed) {
                out.push(Event::new(
                    format!("evt_sprint_{}_{}", player.id, idx),
                    EventType::SprintBurst,
                    secs(idx - streak, series.fps),
                    secs(idx, series.fps),
                    idx,
                    vec![player.id.clone()],
                    SPRINT_CONFIDENCE,
                    format!("player exceeded sprint threshold for {} frames", streak),
                ));
            }
        }
    }
}

fn crowding_events(series: &Series, thresholds: &EventThresholds, out: &mut Vec<Event>) {
    let mut tracker = CrowdingTracker::new(thresholds.crowding_min_frames);
    let radius_sq = thresholds.crowding_distance_px * thresholds.crowding_distance_px;

    for (idx, ball) in series.ball_positions.iter().enumerate() {
        let near = series
            .players
            .iter()
            .filter(|p| p.positions[idx].distance_sq(ball) < radius_sq)
            .count();

        let crowded = near >= thresholds.crowding_player_count;
        if tracker.observe(crowded) {
            let min = thresholds.crowding_min_frames;
            out.push(Event::new(
                format!("evt_crowd_{}", idx),
                EventType::Crowding,
                secs(idx + 1 - min, series.fps),
                secs(idx, series.fps),
                idx,
                vec![series.owner_by_frame[idx].clone()],
                CROWDING_CONFIDENCE,
                format!("{} players clustered near ball", near),
            ));
        }
    }
}
