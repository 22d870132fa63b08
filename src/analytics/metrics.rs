//! Positional metrics: distance, speed, heatmaps, possession.

use std::collections::BTreeMap;

use crate::domain::metrics::{empty_heatmap, BallSample, Heatmaps};
use crate::domain::series::round_to;
use crate::domain::{
    HeatmapGrid, JobConfig, Metrics, MetricsSummary, PlayerMetrics, Point, Series, Team,
};

use super::geometry::FieldMapper;

/// Team for the player at `index` of `count`, honoring config overrides
pub fn team_for(config: &JobConfig, id: &str, index: usize, count: usize) -> Team {
    if let Some(team) = config.team_overrides.get(id) {
        return *team;
    }
    if 2 * (index + 1) <= count {
        Team::A
    } else {
        Team::B
    }
}

/// Field-space distance and per-sample speeds for one trajectory
fn motion(field: &[Point], fps: f64) -> (f64, Vec<f64>) {
    let deltas: Vec<f64> = field.windows(2).map(|w| w[0].distance(&w[1])).collect();
    let distance = deltas.iter().sum();
    let speeds = deltas.into_iter().map(|d| d * fps).collect();
    (distance, speeds)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Compute metrics for a validated series
pub fn compute_metrics(series: &Series, config: &JobConfig) -> Metrics {
    let mapper = FieldMapper::new(config.profile, series.width, series.height);
    let count = series.players.len();

    let mut players = Vec::with_capacity(count);
    let mut player_heatmaps: BTreeMap<String, HeatmapGrid> = BTreeMap::new();
    let mut team_heatmaps: BTreeMap<Team, HeatmapGrid> =
        [(Team::A, empty_heatmap()), (Team::B, empty_heatmap())].into();
    let mut team_of: BTreeMap<&str, Team> = BTreeMap::new();

    for (index, player) in series.players.iter().enumerate() {
        let team = team_for(config, &player.id, index, count);
        team_of.insert(player.id.as_str(), team);

        let field: Vec<Point> = player.positions.iter().map(|p| mapper.to_field(*p)).collect();
        let (distance, speeds) = motion(&field, series.fps);
        let max_speed = speeds.iter().copied().fold(0.0, f64::max);

        let mut grid = empty_heatmap();
        for point in &field {
            let (row, col) = mapper.heatmap_cell(*point);
            grid[row][col] += 1;
        }
        if let Some(team_grid) = team_heatmaps.get_mut(&team) {
            for (row, cells) in grid.iter().enumerate() {
                for (col, value) in cells.iter().enumerate() {
                    team_grid[row][col] += value;
                }
            }
        }
        player_heatmaps.insert(player.id.clone(), grid);

        players.push(PlayerMetrics {
            id: player.id.clone(),
            team,
            distance_m: round_to(distance, 2),
            avg_speed_mps: round_to(mean(&speeds), 2),
            max_speed_mps: round_to(max_speed, 2),
        });
    }

    let avg_speeds: Vec<f64> = players.iter().map(|p| p.avg_speed_mps).collect();
    let summary = MetricsSummary {
        player_count: count,
        team_possession: possession(&series.owner_by_frame, &team_of),
        avg_speed_mps: round_to(mean(&avg_speeds), 2),
    };

    let ball_trajectory = series
        .ball_positions
        .iter()
        .enumerate()
        .map(|(frame, image)| {
            let field = mapper.to_field(*image);
            BallSample {
                frame,
                image_x: round_to(image.x, 2),
                image_y: round_to(image.y, 2),
                field_x: round_to(field.x, 2),
                field_y: round_to(field.y, 2),
            }
        })
        .collect();

    Metrics {
        summary,
        players,
        heatmaps: Heatmaps {
            teams: team_heatmaps,
            players: player_heatmaps,
        },
        ball_trajectory,
    }
}

/// Share of attributed frames each team owned the ball
fn possession(owners: &[String], team_of: &BTreeMap<&str, Team>) -> BTreeMap<Team, f64> {
    let mut counts: BTreeMap<Team, usize> = [(Team::A, 0), (Team::B, 0)].into();
    for owner in owners {
        if let Some(team) = team_of.get(owner.as_str()) {
            *counts.entry(*team).or_default() += 1;
        }
    }

    let total: usize = counts.values().sum();
    counts
        .into_iter()
        .map(|(team, n)| {
            let share = if total == 0 {
                0.0
            } else {
                n as f64 / total as f64
            };
            (team, share)
        })
        .collect()
}
