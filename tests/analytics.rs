//! Analytics Integration Tests
//!
//! Metrics and event detection over synthetic and hand-built series.

use fieldlens::analytics::{analyze, point_in_polygon};
use fieldlens::detection::SyntheticDetector;
use fieldlens::domain::metrics::heatmap_total;
use fieldlens::domain::{
    EventType, JobConfig, PlayerSeries, Point, Series, SeriesError, SportProfile, Team, Zone,
};
use uuid::Uuid;

fn static_series(frames: usize, ball: impl Fn(usize) -> Point) -> Series {
    Series {
        fps: 25.0,
        width: 1280.0,
        height: 720.0,
        players: vec![
            PlayerSeries {
                id: "p1".to_string(),
                positions: vec![Point::new(200.0, 300.0); frames],
            },
            PlayerSeries {
                id: "p2".to_string(),
                positions: vec![Point::new(900.0, 300.0); frames],
            },
        ],
        ball_positions: (0..frames).map(ball).collect(),
        owner_by_frame: vec!["p1".to_string(); frames],
    }
}

#[test]
fn test_point_in_polygon_triangle() {
    let triangle = [Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(0.0, 4.0)];
    assert!(point_in_polygon(Point::new(1.0, 1.0), &triangle));
    assert!(!point_in_polygon(Point::new(3.0, 3.0), &triangle));
    assert!(!point_in_polygon(Point::new(10.0, 10.0), &triangle));
    assert!(!point_in_polygon(Point::new(1.0, 1.0), &triangle[..2]));
}

#[test]
fn test_synthetic_series_properties() {
    let config = JobConfig::default();
    let output = SyntheticDetector.generate(Uuid::new_v4(), &config);
    let analysis = analyze(&output.series, &config).unwrap();
    let metrics = &analysis.metrics;

    assert_eq!(metrics.summary.player_count, 20);
    let share: f64 = metrics.summary.team_possession.values().sum();
    assert!((share - 1.0).abs() < 1e-9, "possession shares sum to {}", share);

    // Every sample of every player lands in exactly one cell
    let frames = output.series.frame_count() as u64;
    let team_total: u64 = metrics.heatmaps.teams.values().map(heatmap_total).sum();
    assert_eq!(team_total, frames * 20);
    for grid in metrics.heatmaps.players.values() {
        assert_eq!(heatmap_total(grid), frames);
    }

    assert!(analysis.events.windows(2).all(|w| w[0].start <= w[1].start));
    assert!(analysis
        .events
        .iter()
        .all(|e| (0.0..=1.0).contains(&e.confidence)));
}

#[test]
fn test_analyze_is_deterministic() {
    let config = JobConfig::for_profile(SportProfile::Basketball);
    let output = SyntheticDetector.generate(Uuid::new_v4(), &config);

    let first = analyze(&output.series, &config).unwrap();
    let second = analyze(&output.series, &config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_configured_shot_zone() {
    let mut config = JobConfig::default();
    config.zones.push(Zone {
        id: "box".to_string(),
        name: "Penalty Box".to_string(),
        polygon: vec![
            Point::new(400.0, 200.0),
            Point::new(600.0, 200.0),
            Point::new(600.0, 400.0),
            Point::new(400.0, 400.0),
        ],
    });

    let series = static_series(10, |i| {
        if i < 3 {
            Point::new(100.0, 100.0)
        } else {
            Point::new(500.0, 300.0)
        }
    });
    let analysis = analyze(&series, &config).unwrap();

    let ids: Vec<&str> = analysis.events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["evt_zone_box_6", "evt_shot_box_6"]);

    let entry = &analysis.events[0];
    assert_eq!(entry.event_type, EventType::EntryIntoZone);
    assert_eq!(entry.zone_id.as_deref(), Some("box"));
    assert!((entry.start - 0.12).abs() < 1e-9);
    assert_eq!(entry.involved, vec!["p1".to_string()]);

    let shot = &analysis.events[1];
    assert_eq!(shot.event_type, EventType::ShotAttempt);
    assert_eq!(shot.start, entry.start);
    assert_eq!(shot.end, entry.end);
}

#[test]
fn test_team_override_moves_player() {
    let mut config = JobConfig::default();
    config.team_overrides.insert("p1".to_string(), Team::B);

    let series = static_series(5, |_| Point::new(640.0, 360.0));
    let metrics = analyze(&series, &config).unwrap().metrics;

    assert!(metrics.players.iter().all(|p| p.team == Team::B));
    assert_eq!(metrics.summary.team_possession.get(&Team::B), Some(&1.0));
    assert_eq!(heatmap_total(&metrics.heatmaps.teams[&Team::A]), 0);
}

#[test]
fn test_invalid_series_is_rejected() {
    let mut series = static_series(5, |_| Point::new(640.0, 360.0));
    series.owner_by_frame.pop();

    let err = analyze(&series, &JobConfig::default()).unwrap_err();
    assert!(matches!(err, SeriesError::LengthMismatch { .. }));
}
