//! Detection Integration Tests
//!
//! Runs the external tracker adapter against small shell scripts and checks
//! the synthetic fallback.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fieldlens::detection::{DetectionRequest, DetectionService, ExternalDetector};
use fieldlens::domain::job_config::keys;
use fieldlens::domain::{JobConfig, ObjectLabel, Team};
use tempfile::TempDir;
use uuid::Uuid;

const TRACKER_OUTPUT: &str = r#"
echo '{"type":"meta","fps":10,"width":640,"height":360}'
for i in 0 1 2 3; do
  echo '{"type":"frame","detections":[{"track_id":1,"label":"person","bbox":[90,80,110,120],"confidence":0.9},{"track_id":2,"label":"person","bbox":[490,80,510,120],"confidence":0.85},{"label":"sports ball","bbox":[100,100,110,110],"confidence":0.7}]}'
done
"#;

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("tracker.sh");
    std::fs::write(&path, body).unwrap();
    path
}

/// Tracker run through `/bin/sh` so the script needs no exec bit
fn shell_tracker(script: &Path, timeout: Duration) -> DetectionService {
    DetectionService::with_primary(Arc::new(ExternalDetector::new(
        PathBuf::from("/bin/sh"),
        vec![script.display().to_string()],
        "test-model.pt".to_string(),
        timeout,
    )))
}

fn input_file(dir: &Path) -> PathBuf {
    let path = dir.join("match.mp4");
    std::fs::write(&path, b"not really a video").unwrap();
    path
}

#[tokio::test]
async fn test_external_tracker_output() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), TRACKER_OUTPUT);
    let input = input_file(temp.path());
    let config = JobConfig::default();

    let service = shell_tracker(&script, Duration::from_secs(10));
    let outcome = service
        .detect(&DetectionRequest {
            job_id: Uuid::new_v4(),
            input: Some(&input),
            config: &config,
        })
        .await;

    assert_eq!(outcome.provider, "external");
    assert!(outcome.warning.is_none());

    let series = &outcome.output.series;
    assert_eq!(series.fps, 10.0);
    assert_eq!(series.frame_count(), 4);
    assert_eq!(series.players.len(), 2);
    assert!(series.owner_by_frame.iter().all(|owner| owner == "p1"));

    let tracks = &outcome.output.tracks;
    assert_eq!(tracks.meta.frame_count, 4);
    assert_eq!(tracks.tracks[0].team, Some(Team::B));
    assert_eq!(tracks.tracks[1].team, Some(Team::A));
    let first = &tracks.frames[0].objects;
    assert_eq!(first.len(), 3);
    assert_eq!(first[2].label, ObjectLabel::Ball);
    assert_eq!(first[0].bbox, [90.0, 80.0, 20.0, 40.0]);
}

#[tokio::test]
async fn test_tracker_receives_model_and_confidence() {
    let temp = TempDir::new().unwrap();
    let args_file = temp.path().join("args.txt");
    let body = format!("echo \"$@\" > {}\n{}", args_file.display(), TRACKER_OUTPUT);
    let script = write_script(temp.path(), &body);
    let input = input_file(temp.path());

    let mut config = JobConfig::default();
    config.thresholds.insert(keys::DET_CONFIDENCE.to_string(), 0.5);

    let service = shell_tracker(&script, Duration::from_secs(10));
    let outcome = service
        .detect(&DetectionRequest {
            job_id: Uuid::new_v4(),
            input: Some(&input),
            config: &config,
        })
        .await;
    assert_eq!(outcome.provider, "external");

    let args = std::fs::read_to_string(&args_file).unwrap();
    assert!(args.contains(&format!("--source {}", input.display())));
    assert!(args.contains("--model test-model.pt"));
    assert!(args.contains("--conf 0.5"));
}

#[tokio::test]
async fn test_failing_tracker_falls_back() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "echo 'model not found' >&2\nexit 3\n");
    let input = input_file(temp.path());
    let config = JobConfig::default();

    let service = shell_tracker(&script, Duration::from_secs(10));
    let outcome = service
        .detect(&DetectionRequest {
            job_id: Uuid::new_v4(),
            input: Some(&input),
            config: &config,
        })
        .await;

    assert_eq!(outcome.provider, "synthetic");
    let warning = outcome.warning.unwrap();
    assert!(warning.contains("exited with code 3"), "{}", warning);
    assert!(warning.contains("model not found"), "{}", warning);
    assert_eq!(outcome.output.series.frame_count(), 250);
}

#[tokio::test]
async fn test_zero_frame_size_falls_back() {
    let temp = TempDir::new().unwrap();
    let body = TRACKER_OUTPUT.replace(r#""width":640,"height":360"#, r#""width":0,"height":0"#);
    let script = write_script(temp.path(), &body);
    let input = input_file(temp.path());
    let config = JobConfig::default();

    let service = shell_tracker(&script, Duration::from_secs(10));
    let outcome = service
        .detect(&DetectionRequest {
            job_id: Uuid::new_v4(),
            input: Some(&input),
            config: &config,
        })
        .await;

    assert_eq!(outcome.provider, "synthetic");
    let warning = outcome.warning.unwrap();
    assert!(warning.contains("frame size must be positive"), "{}", warning);
    assert!(outcome.output.series.width > 0.0);
}

#[tokio::test]
async fn test_slow_tracker_times_out() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "sleep 5\n");
    let input = input_file(temp.path());
    let config = JobConfig::default();

    let service = shell_tracker(&script, Duration::from_millis(200));
    let outcome = service
        .detect(&DetectionRequest {
            job_id: Uuid::new_v4(),
            input: Some(&input),
            config: &config,
        })
        .await;

    assert_eq!(outcome.provider, "synthetic");
    assert!(outcome.warning.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_missing_tracker_falls_back() {
    let temp = TempDir::new().unwrap();
    let input = input_file(temp.path());
    let config = JobConfig::default();

    let service = DetectionService::with_primary(Arc::new(ExternalDetector::new(
        temp.path().join("no-such-tracker"),
        Vec::new(),
        "test-model.pt".to_string(),
        Duration::from_secs(1),
    )));
    let outcome = service
        .detect(&DetectionRequest {
            job_id: Uuid::new_v4(),
            input: Some(&input),
            config: &config,
        })
        .await;

    assert_eq!(outcome.provider, "synthetic");
    assert!(outcome.warning.unwrap().contains("not found"));
}

#[tokio::test]
async fn test_external_without_input_uses_synthetic() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), TRACKER_OUTPUT);
    let config = JobConfig::default();

    let service = shell_tracker(&script, Duration::from_secs(10));
    let job_id = Uuid::new_v4();
    let outcome = service
        .detect(&DetectionRequest {
            job_id,
            input: None,
            config: &config,
        })
        .await;

    assert_eq!(outcome.provider, "synthetic");
    assert!(outcome.warning.unwrap().contains("no input media"));

    // Same job id, same synthetic tracks
    let again = DetectionService::synthetic_only()
        .detect(&DetectionRequest {
            job_id,
            input: None,
            config: &config,
        })
        .await;
    assert_eq!(again.output.series, outcome.output.series);
}
