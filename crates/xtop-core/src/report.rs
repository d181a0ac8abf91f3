//! Exported artifacts: the RCA snapshot JSON and the incident markdown.
//!
//! Both renderings are pure functions of their inputs so exports are
//! reproducible; the write helpers stamp the filename from the supplied
//! timestamp and create files mode 0600.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use serde::Serialize;

use crate::analysis::AnalysisResult;
use crate::events::Event;
use crate::fmt::format_duration;
use crate::model::Snapshot;
use crate::rates::RateSnapshot;

/// Events listed in the Recent Events table.
const RECENT_EVENTS_LIMIT: usize = 10;

#[derive(Serialize)]
struct RcaExport<'a> {
    timestamp: String,
    snapshot: &'a Snapshot,
    rates: &'a RateSnapshot,
    analysis: &'a AnalysisResult,
}

fn stamp(ts_ms: i64) -> String {
    match Utc.timestamp_millis_opt(ts_ms).single() {
        Some(dt) => dt.format("%Y%m%d-%H%M%S").to_string(),
        None => "00000000-000000".to_string(),
    }
}

fn write_mode_600(path: &Path, content: &str) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content.as_bytes())
}

/// Serialize the full tick state as indented JSON.
pub fn render_rca_json(
    snapshot: &Snapshot,
    rates: &RateSnapshot,
    analysis: &AnalysisResult,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&RcaExport {
        timestamp: stamp(snapshot.timestamp_ms),
        snapshot,
        rates,
        analysis,
    })
}

/// Write `xtop-rca-<YYYYMMDD-HHMMSS>.json` into `dir`.
pub fn write_rca_json(
    dir: &Path,
    snapshot: &Snapshot,
    rates: &RateSnapshot,
    analysis: &AnalysisResult,
) -> std::io::Result<PathBuf> {
    let json = render_rca_json(snapshot, rates, analysis).map_err(std::io::Error::other)?;
    let path = dir.join(format!("xtop-rca-{}.json", stamp(snapshot.timestamp_ms)));
    write_mode_600(&path, &json)?;
    Ok(path)
}

/// Render the incident report markdown.
pub fn render_incident_markdown(
    analysis: &AnalysisResult,
    active: Option<&Event>,
    completed: &[&Event],
) -> String {
    let mut md = String::new();

    md.push_str("# xtop incident report\n\n");

    md.push_str("## System Health\n\n");
    md.push_str(&format!(
        "- Health: **{}**\n- Primary bottleneck: {} (score {}, confidence {}%)\n",
        analysis.health, analysis.primary_bottleneck, analysis.primary_score, analysis.confidence,
    ));
    if !analysis.primary_process.is_empty() {
        md.push_str(&format!(
            "- Primary process: {} (pid {})\n",
            analysis.primary_process, analysis.primary_pid
        ));
    }
    if !analysis.primary_culprit.is_empty() {
        md.push_str(&format!("- Primary cgroup: {}\n", analysis.primary_culprit));
    }
    if !analysis.causal_chain.is_empty() {
        md.push_str(&format!("- Causal chain: {}\n", analysis.causal_chain));
    }
    md.push('\n');

    md.push_str("## What Changed\n\n");
    if analysis.top_changes.is_empty() {
        md.push_str("Nothing moved more than 20% against the 30s baseline.\n");
    } else {
        for change in &analysis.top_changes {
            md.push_str(&format!(
                "- {} {} to {:.1} ({:+.0}% vs baseline)\n",
                change.name,
                if change.rising { "rose" } else { "fell" },
                change.current,
                change.delta_pct,
            ));
        }
    }
    md.push('\n');

    md.push_str("## Evidence\n\n");
    if analysis.primary_evidence.is_empty() {
        md.push_str("No firing checks.\n");
    } else {
        for line in &analysis.primary_evidence {
            md.push_str(&format!("- {line}\n"));
        }
    }
    md.push('\n');

    md.push_str("## Suggested Actions\n\n");
    if analysis.actions.is_empty() {
        md.push_str("None.\n");
    } else {
        for action in &analysis.actions {
            md.push_str(&format!("- {}: `{}`\n", action.summary, action.command));
        }
    }
    md.push('\n');

    md.push_str("## Exhaustion Predictions\n\n");
    if analysis.exhaustions.is_empty() {
        md.push_str("None.\n");
    } else {
        for ex in &analysis.exhaustions {
            md.push_str(&format!(
                "- {} at {:.1}%, trending {:.3}%/s, full in ~{:.0} min\n",
                ex.resource, ex.current_pct, ex.trend_pct_per_s, ex.est_minutes,
            ));
        }
    }
    md.push('\n');

    md.push_str("## Slow Degradation Trends\n\n");
    if analysis.degradations.is_empty() {
        md.push_str("None.\n");
    } else {
        for deg in &analysis.degradations {
            md.push_str(&format!(
                "- {} drifting {} at {:.4} {} over {}\n",
                deg.metric,
                deg.direction,
                deg.rate,
                deg.unit,
                format_duration(deg.duration_s),
            ));
        }
    }
    md.push('\n');

    md.push_str("## Active Incident\n\n");
    match active {
        None => md.push_str("None.\n"),
        Some(event) => {
            md.push_str(&format!(
                "{} since {} (peak score {}, peak health {})\n\n",
                event.bottleneck,
                stamp(event.start_time_ms),
                event.peak_score,
                event.peak_health,
            ));
            md.push_str("| Time | Message |\n|---|---|\n");
            for entry in &event.timeline {
                md.push_str(&format!("| {} | {} |\n", stamp(entry.time_ms), entry.message));
            }
        }
    }
    md.push('\n');

    md.push_str("## Recent Events\n\n");
    if completed.is_empty() {
        md.push_str("None.\n");
    } else {
        md.push_str("| Start | Duration | Bottleneck | Peak | Culprit |\n|---|---|---|---|---|\n");
        for event in completed.iter().take(RECENT_EVENTS_LIMIT) {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                stamp(event.start_time_ms),
                format_duration(event.duration_s),
                event.bottleneck,
                event.peak_score,
                if event.culprit_process.is_empty() {
                    "-".to_string()
                } else {
                    format!("{} ({})", event.culprit_process, event.culprit_pid)
                },
            ));
        }
    }

    md
}

/// Write `xtop-incident-<YYYYMMDD-HHMMSS>.md` into `dir`.
pub fn write_incident_markdown(
    dir: &Path,
    ts_ms: i64,
    analysis: &AnalysisResult,
    active: Option<&Event>,
    completed: &[&Event],
) -> std::io::Result<PathBuf> {
    let md = render_incident_markdown(analysis, active, completed);
    let path = dir.join(format!("xtop-incident-{}.md", stamp(ts_ms)));
    write_mode_600(&path, &md)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ActionItem, Bottleneck, Health};
    use crate::events::TimelineEntry;

    fn sample_analysis() -> AnalysisResult {
        AnalysisResult {
            health: Health::Critical,
            primary_bottleneck: Bottleneck::DiskIo,
            primary_score: 92,
            confidence: 88,
            primary_process: "archiver".into(),
            primary_pid: 4242,
            primary_evidence: vec!["IO pressure (some): 40.0% avg10".into()],
            causal_chain: "Disk IO saturation: IO pressure (some) 40.0% avg10".into(),
            actions: vec![ActionItem {
                summary: "Identify the busiest devices and writers".into(),
                command: "iostat -x 1 5".into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn markdown_has_all_sections() {
        let md = render_incident_markdown(&sample_analysis(), None, &[]);
        for section in [
            "## System Health",
            "## What Changed",
            "## Evidence",
            "## Suggested Actions",
            "## Exhaustion Predictions",
            "## Slow Degradation Trends",
            "## Active Incident",
            "## Recent Events",
        ] {
            assert!(md.contains(section), "missing {section}");
        }
        assert!(md.contains("CRITICAL"));
        assert!(md.contains("iostat"));
    }

    #[test]
    fn markdown_is_deterministic() {
        let event = Event {
            start_time_ms: 1_700_000_000_000,
            end_time_ms: 1_700_000_060_000,
            duration_s: 60,
            bottleneck: "Disk IO".into(),
            peak_score: 92,
            peak_health: "CRITICAL".into(),
            culprit_process: "archiver".into(),
            culprit_pid: 4242,
            timeline: vec![TimelineEntry {
                time_ms: 1_700_000_000_000,
                message: "anomaly opened".into(),
            }],
            ..Default::default()
        };
        let analysis = sample_analysis();
        let a = render_incident_markdown(&analysis, Some(&event), &[&event]);
        let b = render_incident_markdown(&analysis, Some(&event), &[&event]);
        assert_eq!(a, b);
        assert!(a.contains("| 20231114-221320 | anomaly opened |"));
    }

    #[test]
    fn exports_are_written_mode_600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot {
            timestamp_ms: 1_700_000_000_000,
            ..Default::default()
        };
        let rates = RateSnapshot::default();
        let analysis = sample_analysis();

        let json_path = write_rca_json(dir.path(), &snapshot, &rates, &analysis).unwrap();
        assert!(json_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("xtop-rca-20231114-"));
        let mode = std::fs::metadata(&json_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let content = std::fs::read_to_string(&json_path).unwrap();
        assert!(content.contains("\"analysis\""));

        let md_path = write_incident_markdown(
            dir.path(),
            snapshot.timestamp_ms,
            &analysis,
            None,
            &[],
        )
        .unwrap();
        let mode = std::fs::metadata(&md_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
