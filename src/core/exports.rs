//! Human-facing exports: events CSV, summary CSV and an HTML report.

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{ArtifactItem, Event, Metrics, Team};

use super::store::JobRepository;

/// Quote a CSV field when it contains a delimiter, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn possession(metrics: &Metrics, team: Team) -> f64 {
    metrics
        .summary
        .team_possession
        .get(&team)
        .copied()
        .unwrap_or(0.0)
}

pub fn render_events_csv(events: &[Event]) -> String {
    let mut out = String::from("id,type,start,end,frame,confidence,explanation\n");
    for event in events {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            csv_field(&event.id),
            event.event_type.as_str(),
            event.start,
            event.end,
            event.frame,
            event.confidence,
            csv_field(&event.explanation),
        ));
    }
    out
}

pub fn render_summary_csv(metrics: &Metrics) -> String {
    let summary = &metrics.summary;
    format!(
        "metric,value\nplayer_count,{}\nteam_a_possession,{}\nteam_b_possession,{}\navg_speed_mps,{}\n",
        summary.player_count,
        possession(metrics, Team::A),
        possession(metrics, Team::B),
        summary.avg_speed_mps,
    )
}

pub fn render_report_html(metrics: &Metrics, events: &[Event], generated_at: DateTime<Utc>) -> String {
    let summary = &metrics.summary;

    let mut event_rows = String::new();
    for event in events {
        event_rows.push_str(&format!(
            "        <tr><td>{:.2}</td><td>{}</td><td>{}</td></tr>\n",
            event.start,
            event.event_type.as_str(),
            html_escape(&event.explanation),
        ));
    }

    let mut player_rows = String::new();
    for player in &metrics.players {
        player_rows.push_str(&format!(
            "        <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            html_escape(&player.id),
            player.team.as_str(),
            player.distance_m,
            player.max_speed_mps,
        ));
    }

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>Match Analytics Report</title>
  <style>
    body {{ font-family: Arial, sans-serif; margin: 32px; }}
    .grid {{ display: grid; grid-template-columns: repeat(2, minmax(0, 1fr)); gap: 16px; }}
    .card {{ border: 1px solid #d2d2d2; border-radius: 12px; padding: 16px; }}
    table {{ width: 100%; border-collapse: collapse; }}
    td, th {{ padding: 6px 8px; border-bottom: 1px solid #eee; text-align: left; }}
  </style>
</head>
<body>
  <h1>Match Analytics Report</h1>
  <p>Generated on {generated}</p>
  <div class="grid">
    <div class="card">
      <h2>Summary</h2>
      <table>
        <tr><th>Metric</th><th>Value</th></tr>
        <tr><td>Player count</td><td>{player_count}</td></tr>
        <tr><td>Team A possession</td><td>{team_a:.3}</td></tr>
        <tr><td>Team B possession</td><td>{team_b:.3}</td></tr>
        <tr><td>Average speed (m/s)</td><td>{avg_speed}</td></tr>
      </table>
    </div>
    <div class="card">
      <h2>Events</h2>
      <p>{event_count} detected events</p>
      <table>
        <tr><th>Start (s)</th><th>Type</th><th>Explanation</th></tr>
{event_rows}      </table>
    </div>
    <div class="card">
      <h2>Players</h2>
      <table>
        <tr><th>Id</th><th>Team</th><th>Distance (m)</th><th>Max speed (m/s)</th></tr>
{player_rows}      </table>
    </div>
  </div>
</body>
</html>
"#,
        generated = generated_at.format("%Y-%m-%d %H:%M UTC"),
        player_count = summary.player_count,
        team_a = possession(metrics, Team::A),
        team_b = possession(metrics, Team::B),
        avg_speed = summary.avg_speed_mps,
        event_count = events.len(),
        event_rows = event_rows,
        player_rows = player_rows,
    )
}

/// Render and persist all exports for a job, in manifest order
pub async fn write_exports(
    repo: &JobRepository,
    job_id: Uuid,
    metrics: &Metrics,
    events: &[Event],
) -> Result<Vec<ArtifactItem>> {
    let events_csv = render_events_csv(events);
    let summary_csv = render_summary_csv(metrics);
    let report = render_report_html(metrics, events, Utc::now());

    Ok(vec![
        repo.write_export(job_id, "events_csv", "events.csv", "text/csv", events_csv.as_bytes())
            .await?,
        repo.write_export(job_id, "summary_csv", "summary.csv", "text/csv", summary_csv.as_bytes())
            .await?,
        repo.write_export(job_id, "report_html", "report.html", "text/html", report.as_bytes())
            .await?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::{empty_heatmap, Heatmaps};
    use crate::domain::{EventType, MetricsSummary, PlayerMetrics};
    use std::collections::BTreeMap;

    fn metrics() -> Metrics {
        Metrics {
            summary: MetricsSummary {
                player_count: 1,
                team_possession: [(Team::A, 0.75), (Team::B, 0.25)].into(),
                avg_speed_mps: 3.2,
            },
            players: vec![PlayerMetrics {
                id: "p1".to_string(),
                team: Team::A,
                distance_m: 120.5,
                avg_speed_mps: 3.2,
                max_speed_mps: 7.1,
            }],
            heatmaps: Heatmaps {
                teams: [(Team::A, empty_heatmap())].into(),
                players: BTreeMap::new(),
            },
            ball_trajectory: Vec::new(),
        }
    }

    fn event(explanation: &str) -> Event {
        Event::new(
            "evt_pos_10".to_string(),
            EventType::PossessionChange,
            0.4,
            0.56,
            10,
            vec!["p1".to_string(), "p2".to_string()],
            0.78,
            explanation.to_string(),
        )
    }

    #[test]
    fn test_events_csv() {
        let csv = render_events_csv(&[event("ball owner changed, held")]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "id,type,start,end,frame,confidence,explanation");
        assert_eq!(
            lines[1],
            "evt_pos_10,possession_change,0.4,0.56,10,0.78,\"ball owner changed, held\""
        );
    }

    #[test]
    fn test_csv_quotes_embedded_quotes() {
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("plain"), "plain");
    }

    #[test]
    fn test_summary_csv() {
        let csv = render_summary_csv(&metrics());
        assert!(csv.contains("player_count,1\n"));
        assert!(csv.contains("team_a_possession,0.75\n"));
        assert!(csv.contains("team_b_possession,0.25\n"));
    }

    #[test]
    fn test_report_escapes_html() {
        let html = render_report_html(&metrics(), &[event("<script>")], Utc::now());
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("1 detected events"));
    }
}
