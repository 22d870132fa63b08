//! External tracker adapter.
//!
//! Spawns a tracker process and reads its newline-delimited JSON output:
//!
//! ```text
//! {"type":"meta","fps":25.0,"width":1280,"height":720}
//! {"type":"frame","frame":0,"detections":[{"track_id":3,"label":"person","bbox":[x1,y1,x2,y2],"confidence":0.91}]}
//! ```
//!
//! `bbox` is corner format. Only `person` and `sports ball` labels are used.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use crate::domain::job_config::keys;
use crate::domain::series::round_to;
use crate::domain::{
    DetectedObject, FrameDetections, JobConfig, ObjectLabel, PlayerSeries, Point, Series, Team,
    TrackFrames, TrackInfo, TrackMeta,
};

use super::ownership::resolve_owners;
use super::{DetectionError, DetectionOutput, DetectionProvider, DetectionRequest};

const DEFAULT_CONFIDENCE: f64 = 0.3;
const CARRIED_BALL_CONFIDENCE: f64 = 0.2;
const BALL_SIZE: f64 = 16.0;

/// Stream header
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackerMeta {
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
}

fn default_fps() -> f64 {
    25.0
}

fn default_width() -> f64 {
    1280.0
}

fn default_height() -> f64 {
    720.0
}

impl Default for TrackerMeta {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            width: default_width(),
            height: default_height(),
        }
    }
}

/// One raw detection as emitted by the tracker
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawDetection {
    #[serde(default)]
    pub track_id: Option<i64>,
    pub label: String,
    /// `[x1, y1, x2, y2]`
    pub bbox: [f64; 4],
    pub confidence: f64,
}

impl RawDetection {
    fn center(&self) -> Point {
        let [x1, y1, x2, y2] = self.bbox;
        Point::new((x1 + x2) / 2.0, (y1 + y2) / 2.0)
    }

    /// `[x, y, w, h]`, rounded
    fn xywh(&self) -> [f64; 4] {
        let [x1, y1, x2, y2] = self.bbox;
        [
            round_to(x1, 2),
            round_to(y1, 2),
            round_to(x2 - x1, 2),
            round_to(y2 - y1, 2),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackerFrame {
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TrackerMessage {
    Meta(TrackerMeta),
    Frame(TrackerFrame),
}

/// Parse tracker stdout into a header and frames
pub fn parse_stream(stdout: &str) -> Result<(TrackerMeta, Vec<TrackerFrame>), DetectionError> {
    let mut meta = TrackerMeta::default();
    let mut frames = Vec::new();

    for (idx, line) in stdout.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: TrackerMessage =
            serde_json::from_str(line).map_err(|e| DetectionError::Protocol {
                line: idx + 1,
                message: e.to_string(),
            })?;
        match message {
            TrackerMessage::Meta(m) => meta = m,
            TrackerMessage::Frame(f) => frames.push(f),
        }
    }

    Ok((meta, frames))
}

fn team_for_track(track_id: i64) -> Team {
    if track_id.rem_euclid(2) == 0 {
        Team::A
    } else {
        Team::B
    }
}

struct PlayerTrack {
    info: TrackInfo,
    first_seen: usize,
    last: Point,
    positions: Vec<Point>,
}

/// Build tracks and a frame-aligned series from parsed tracker output
pub fn assemble(
    meta: TrackerMeta,
    frames: Vec<TrackerFrame>,
    config: &JobConfig,
) -> Result<DetectionOutput, DetectionError> {
    if frames.is_empty() {
        return Err(DetectionError::EmptyStream);
    }
    if !(meta.fps > 0.0) {
        return Err(DetectionError::Protocol {
            line: 1,
            message: format!("fps must be positive (got {})", meta.fps),
        });
    }

    let center = Point::new(meta.width / 2.0, meta.height / 2.0);
    let mut players: Vec<PlayerTrack> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut last_ball: Option<Point> = None;
    let mut ball_positions = Vec::with_capacity(frames.len());
    let mut frame_detections = Vec::with_capacity(frames.len());

    for (frame_idx, frame) in frames.iter().enumerate() {
        let mut objects = Vec::new();
        let mut best_ball: Option<&RawDetection> = None;

        for det in &frame.detections {
            match det.label.as_str() {
                "person" => {
                    let Some(track_id) = det.track_id else {
                        continue;
                    };
                    let id = format!("p{}", track_id);
                    let team = team_for_track(track_id);
                    let slot = *index.entry(id.clone()).or_insert_with(|| {
                        players.push(PlayerTrack {
                            info: TrackInfo {
                                id: id.clone(),
                                label: ObjectLabel::Player,
                                team: Some(team),
                            },
                            first_seen: frame_idx,
                            last: det.center(),
                            positions: Vec::new(),
                        });
                        players.len() - 1
                    });
                    players[slot].last = det.center();
                    objects.push(DetectedObject {
                        id,
                        label: ObjectLabel::Player,
                        team: Some(team),
                        bbox: det.xywh(),
                        confidence: round_to(det.confidence, 3),
                    });
                }
                "sports ball" => {
                    if best_ball.map_or(true, |b| det.confidence > b.confidence) {
                        best_ball = Some(det);
                    }
                }
                _ => {}
            }
        }

        if let Some(ball) = best_ball {
            last_ball = Some(ball.center());
            objects.push(DetectedObject {
                id: "ball".to_string(),
                label: ObjectLabel::Ball,
                team: None,
                bbox: ball.xywh(),
                confidence: round_to(ball.confidence, 3),
            });
        } else if let Some(carried) = last_ball {
            objects.push(DetectedObject {
                id: "ball".to_string(),
                label: ObjectLabel::Ball,
                team: None,
                bbox: [
                    round_to(carried.x - BALL_SIZE / 2.0, 2),
                    round_to(carried.y - BALL_SIZE / 2.0, 2),
                    BALL_SIZE,
                    BALL_SIZE,
                ],
                confidence: CARRIED_BALL_CONFIDENCE,
            });
        }
        ball_positions.push(last_ball.unwrap_or(center));

        // Players missing from this frame keep their last position
        for player in &mut players {
            player.positions.push(player.last);
        }

        frame_detections.push(FrameDetections {
            frame: frame_idx,
            objects,
        });
    }

    if players.is_empty() {
        return Err(DetectionError::NoPlayers);
    }

    let frame_count = frames.len();
    let active_from: Vec<usize> = players.iter().map(|p| p.first_seen).collect();
    let tracks: Vec<TrackInfo> = players.iter().map(|p| p.info.clone()).collect();
    let series_players: Vec<PlayerSeries> = players
        .into_iter()
        .map(|p| {
            // Back-fill frames before the first sighting
            let first = p.positions.first().copied().unwrap_or(center);
            let mut positions = vec![first; p.first_seen];
            positions.extend(p.positions);
            PlayerSeries {
                id: p.info.id,
                positions,
            }
        })
        .collect();

    let owner_by_frame = resolve_owners(&series_players, &active_from, &ball_positions);

    let series = Series {
        fps: meta.fps,
        width: meta.width,
        height: meta.height,
        players: series_players,
        ball_positions,
        owner_by_frame,
    };
    series.validate()?;

    Ok(DetectionOutput {
        tracks: TrackFrames {
            meta: TrackMeta {
                profile: config.profile,
                fps: meta.fps,
                frame_count,
                width: meta.width,
                height: meta.height,
            },
            tracks,
            frames: frame_detections,
        },
        series,
    })
}

/// Detection provider backed by an external tracker executable
pub struct ExternalDetector {
    command: PathBuf,
    args: Vec<String>,
    model: String,
    timeout: Duration,
}

impl ExternalDetector {
    pub fn new(command: PathBuf, args: Vec<String>, model: String, timeout: Duration) -> Self {
        Self {
            command,
            args,
            model,
            timeout,
        }
    }

    /// Locate the executable, searching PATH for bare names
    fn resolve_command(&self) -> Option<PathBuf> {
        if self.command.components().count() > 1 {
            return self.command.is_file().then(|| self.command.clone());
        }
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(&self.command))
            .find(|candidate| candidate.is_file())
    }

    #[instrument(skip(self, config), fields(command = %self.command.display()))]
    async fn run_tracker(&self, input: &Path, config: &JobConfig) -> Result<String, DetectionError> {
        let confidence = config
            .threshold(keys::DET_CONFIDENCE)
            .unwrap_or(DEFAULT_CONFIDENCE);

        let child = Command::new(&self.command)
            .args(&self.args)
            .arg("--source")
            .arg(input)
            .arg("--model")
            .arg(&self.model)
            .arg("--conf")
            .arg(confidence.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DetectionError::Spawn {
                command: self.command.display().to_string(),
                source,
            })?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| DetectionError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DetectionError::Exited {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        debug!(bytes = output.stdout.len(), "Tracker finished");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DetectionProvider for ExternalDetector {
    fn name(&self) -> &str {
        "external"
    }

    async fn health_check(&self) -> Result<(), DetectionError> {
        match self.resolve_command() {
            Some(_) => Ok(()),
            None => Err(DetectionError::Unhealthy(format!(
                "executable '{}' not found",
                self.command.display()
            ))),
        }
    }

    async fn detect(
        &self,
        request: &DetectionRequest<'_>,
    ) -> Result<DetectionOutput, DetectionError> {
        let input = request.input.ok_or(DetectionError::MissingInput)?;
        let stdout = self.run_tracker(input, request.config).await?;
        let (meta, frames) = parse_stream(&stdout)?;
        info!(frames = frames.len(), fps = meta.fps, "Parsed tracker output");
        assemble(meta, frames, request.config)
    }
}
