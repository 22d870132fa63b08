//! Summarized positional analytics for a job.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::job_config::Team;

pub const HEATMAP_ROWS: usize = 6;
pub const HEATMAP_COLS: usize = 10;

/// Occupancy counts, `grid[row][col]`; rows span field width, columns field length
pub type HeatmapGrid = [[u32; HEATMAP_COLS]; HEATMAP_ROWS];

pub fn empty_heatmap() -> HeatmapGrid {
    [[0; HEATMAP_COLS]; HEATMAP_ROWS]
}

/// Sum of all cells
pub fn heatmap_total(grid: &HeatmapGrid) -> u64 {
    grid.iter().flatten().map(|&c| c as u64).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub player_count: usize,
    /// Fraction of frames each team owned the ball
    pub team_possession: BTreeMap<Team, f64>,
    pub avg_speed_mps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMetrics {
    pub id: String,
    pub team: Team,
    pub distance_m: f64,
    pub avg_speed_mps: f64,
    pub max_speed_mps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmaps {
    pub teams: BTreeMap<Team, HeatmapGrid>,
    pub players: BTreeMap<String, HeatmapGrid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallSample {
    pub frame: usize,
    pub image_x: f64,
    pub image_y: f64,
    pub field_x: f64,
    pub field_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub summary: MetricsSummary,
    pub players: Vec<PlayerMetrics>,
    pub heatmaps: Heatmaps,
    pub ball_trajectory: Vec<BallSample>,
}
