//! Incident lifecycle tracking.
//!
//! Consecutive non-OK verdicts open an event; consecutive OK verdicts
//! close it. While active, the event records peaks, the culprit at the
//! peak tick, and a timeline of notable transitions. Closed events move
//! to the front of a bounded completed list. Persistence is external: the
//! daemon appends closed events to `events.jsonl` and [`load_events`]
//! restores them on startup.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::{AnalysisResult, Health};
use crate::model::Snapshot;
use crate::rates::RateSnapshot;

/// Consecutive non-OK ticks required to open an event.
const START_THRESHOLD: u32 = 3;

/// Consecutive OK ticks required to close an event.
const END_THRESHOLD: u32 = 3;

/// Completed events kept in memory, newest first.
const COMPLETED_CAP: usize = 200;

/// One timeline line within an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Milliseconds since the Unix epoch.
    pub time_ms: i64,
    pub message: String,
}

/// A recorded incident.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Event {
    pub start_time_ms: i64,
    /// 0 while the event is still active.
    pub end_time_ms: i64,
    pub duration_s: u64,
    pub peak_health: String,
    pub bottleneck: String,
    pub peak_score: u32,
    pub peak_cpu_busy_pct: f64,
    pub peak_mem_used_pct: f64,
    pub peak_io_psi_pct: f64,
    pub culprit_process: String,
    pub culprit_pid: u32,
    pub evidence: Vec<String>,
    pub causal_chain: String,
    pub timeline: Vec<TimelineEntry>,
}

/// Internal extras tracked while an event is active.
#[derive(Debug)]
struct ActiveEvent {
    event: Event,
    last_health: Health,
    last_primary: String,
    last_culprit: String,
}

/// State machine over successive analysis results.
#[derive(Debug, Default)]
pub struct EventDetector {
    active: Option<ActiveEvent>,
    completed: VecDeque<Event>,
    consecutive_bad: u32,
    consecutive_ok: u32,
    /// The last few non-OK results while counting up to the open
    /// threshold; the strongest of them seeds the event.
    pending: Vec<(i64, AnalysisResult)>,
}

impl EventDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one tick's verdict. Returns the event that closed this tick,
    /// if any, so the caller can persist it.
    pub fn process(
        &mut self,
        snapshot: &Snapshot,
        rates: &RateSnapshot,
        result: &AnalysisResult,
    ) -> Option<Event> {
        let now_ms = snapshot.timestamp_ms;

        if result.health != Health::Ok {
            self.consecutive_ok = 0;
            self.consecutive_bad += 1;
            if self.active.is_none() {
                self.pending.push((now_ms, result.clone()));
                if self.consecutive_bad >= START_THRESHOLD {
                    self.open(snapshot, rates);
                }
            }
        } else {
            self.consecutive_bad = 0;
            self.pending.clear();
            if self.active.is_some() {
                self.consecutive_ok += 1;
                if self.consecutive_ok >= END_THRESHOLD {
                    return self.close(now_ms);
                }
            }
        }

        if let Some(active) = &mut self.active {
            update_active(active, snapshot, rates, result);
        }
        None
    }

    fn open(&mut self, snapshot: &Snapshot, rates: &RateSnapshot) {
        // Seed from the strongest of the opening ticks.
        let first_ts = self
            .pending
            .first()
            .map(|p| p.0)
            .unwrap_or(snapshot.timestamp_ms);
        let strongest = self
            .pending
            .iter()
            .fold(None::<&(i64, AnalysisResult)>, |best, it| match best {
                Some(b) if it.1.primary_score <= b.1.primary_score => Some(b),
                _ => Some(it),
            });
        let Some((_, seed)) = strongest else { return };

        let mut event = Event {
            start_time_ms: first_ts,
            peak_health: seed.health.to_string(),
            bottleneck: seed.primary_bottleneck.to_string(),
            peak_score: seed.primary_score,
            peak_cpu_busy_pct: rates.cpu_busy_pct,
            peak_mem_used_pct: snapshot.mem.used_pct(),
            peak_io_psi_pct: snapshot.psi.io.some_avg10 as f64,
            culprit_process: seed.primary_process.clone(),
            culprit_pid: seed.primary_pid,
            evidence: seed.primary_evidence.clone(),
            causal_chain: seed.causal_chain.clone(),
            ..Default::default()
        };
        event.timeline.push(TimelineEntry {
            time_ms: first_ts,
            message: format!(
                "anomaly opened: {} {} (score {})",
                seed.health, seed.primary_bottleneck, seed.primary_score
            ),
        });
        self.active = Some(ActiveEvent {
            last_health: seed.health,
            last_primary: seed.primary_bottleneck.to_string(),
            last_culprit: seed.primary_process.clone(),
            event,
        });
        self.pending.clear();
    }

    fn close(&mut self, now_ms: i64) -> Option<Event> {
        let mut active = self.active.take()?;
        self.consecutive_ok = 0;
        active.event.end_time_ms = now_ms;
        active.event.duration_s =
            ((now_ms - active.event.start_time_ms).max(0) / 1000) as u64;
        active.event.timeline.push(TimelineEntry {
            time_ms: now_ms,
            message: "resolved: back to OK".to_string(),
        });
        self.completed.push_front(active.event.clone());
        self.completed.truncate(COMPLETED_CAP);
        Some(active.event)
    }

    /// The active event (if any) and the completed list, newest first.
    pub fn all_events(&self) -> (Option<&Event>, impl Iterator<Item = &Event>) {
        (
            self.active.as_ref().map(|a| &a.event),
            self.completed.iter(),
        )
    }

    pub fn completed(&self) -> impl Iterator<Item = &Event> {
        self.completed.iter()
    }

    /// Replace the completed list with externally persisted events
    /// (newest first), e.g. from `events.jsonl` on startup.
    pub fn load(&mut self, events: Vec<Event>) {
        self.completed = events.into_iter().take(COMPLETED_CAP).collect();
    }
}

fn update_active(
    active: &mut ActiveEvent,
    snapshot: &Snapshot,
    rates: &RateSnapshot,
    result: &AnalysisResult,
) {
    let now_ms = snapshot.timestamp_ms;
    let event = &mut active.event;

    if result.primary_score > event.peak_score {
        event.peak_score = result.primary_score;
        event.culprit_process = result.primary_process.clone();
        event.culprit_pid = result.primary_pid;
        event.evidence = result.primary_evidence.clone();
        event.causal_chain = result.causal_chain.clone();
    }
    if result.health > health_from_str(&event.peak_health) {
        event.peak_health = result.health.to_string();
    }
    event.peak_cpu_busy_pct = event.peak_cpu_busy_pct.max(rates.cpu_busy_pct);
    event.peak_mem_used_pct = event.peak_mem_used_pct.max(snapshot.mem.used_pct());
    event.peak_io_psi_pct = event
        .peak_io_psi_pct
        .max(snapshot.psi.io.some_avg10 as f64);

    // Timeline entries only on notable transitions.
    if result.health != active.last_health {
        event.timeline.push(TimelineEntry {
            time_ms: now_ms,
            message: format!("health {} → {}", active.last_health, result.health),
        });
        active.last_health = result.health;
    }
    let primary = result.primary_bottleneck.to_string();
    if primary != active.last_primary {
        event.timeline.push(TimelineEntry {
            time_ms: now_ms,
            message: format!("primary bottleneck now {primary}"),
        });
        event.bottleneck = primary.clone();
        active.last_primary = primary;
    }
    if !result.primary_process.is_empty() && result.primary_process != active.last_culprit {
        event.timeline.push(TimelineEntry {
            time_ms: now_ms,
            message: format!(
                "culprit now {} (pid {})",
                result.primary_process, result.primary_pid
            ),
        });
        active.last_culprit = result.primary_process.clone();
    }
}

fn health_from_str(s: &str) -> Health {
    match s {
        "CRITICAL" => Health::Critical,
        "DEGRADED" => Health::Degraded,
        "INCONCLUSIVE" => Health::Inconclusive,
        _ => Health::Ok,
    }
}

// ============================================================
// events.jsonl
// ============================================================

/// Append one event as a JSON line.
pub fn append_event(path: &Path, event: &Event) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let line = serde_json::to_string(event).map_err(std::io::Error::other)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Read a line-delimited event log, newest last on disk, returned newest
/// first. A missing file yields an empty list; unreadable lines are
/// skipped with a warning.
pub fn load_events(path: &Path) -> Vec<Event> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return Vec::new(),
    };
    let mut events: Vec<Event> = Vec::new();
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(&line) {
            Ok(e) => events.push(e),
            Err(e) => warn!("skipping malformed event line: {e}"),
        }
    }
    events.reverse();
    events
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Bottleneck;

    fn result(health: Health, score: u32) -> AnalysisResult {
        AnalysisResult {
            health,
            primary_bottleneck: Bottleneck::DiskIo,
            primary_score: score,
            primary_process: "archiver".into(),
            primary_pid: 4242,
            ..Default::default()
        }
    }

    fn tick(
        detector: &mut EventDetector,
        ts_ms: i64,
        health: Health,
        score: u32,
    ) -> Option<Event> {
        let snapshot = Snapshot {
            timestamp_ms: ts_ms,
            ..Default::default()
        };
        let rates = RateSnapshot {
            timestamp_ms: ts_ms,
            ..Default::default()
        };
        detector.process(&snapshot, &rates, &result(health, score))
    }

    #[test]
    fn opening_needs_three_consecutive_bad_ticks() {
        let mut d = EventDetector::new();
        assert!(tick(&mut d, 1000, Health::Degraded, 40).is_none());
        assert!(tick(&mut d, 2000, Health::Degraded, 40).is_none());
        assert!(d.all_events().0.is_none());
        tick(&mut d, 3000, Health::Degraded, 40);
        let (active, _) = d.all_events();
        let active = active.expect("event opens on the third bad tick");
        assert_eq!(active.start_time_ms, 1000);
        assert_eq!(active.bottleneck, "Disk IO");
    }

    #[test]
    fn an_ok_tick_resets_the_opening_count() {
        let mut d = EventDetector::new();
        tick(&mut d, 1000, Health::Degraded, 40);
        tick(&mut d, 2000, Health::Degraded, 40);
        tick(&mut d, 3000, Health::Ok, 0);
        tick(&mut d, 4000, Health::Degraded, 40);
        tick(&mut d, 5000, Health::Degraded, 40);
        assert!(d.all_events().0.is_none());
    }

    #[test]
    fn closing_needs_three_consecutive_ok_ticks() {
        let mut d = EventDetector::new();
        for i in 0..3 {
            tick(&mut d, 1000 * (i + 1), Health::Critical, 70);
        }
        assert!(tick(&mut d, 4000, Health::Ok, 0).is_none());
        assert!(tick(&mut d, 5000, Health::Ok, 0).is_none());
        let closed = tick(&mut d, 6000, Health::Ok, 0).expect("closes on third OK");
        assert_eq!(closed.end_time_ms, 6000);
        assert_eq!(closed.duration_s, 5);
        assert!(d.all_events().0.is_none());
        assert_eq!(d.completed().count(), 1);
    }

    #[test]
    fn peaks_and_culprit_track_the_worst_tick() {
        let mut d = EventDetector::new();
        tick(&mut d, 1000, Health::Degraded, 30);
        tick(&mut d, 2000, Health::Degraded, 30);
        tick(&mut d, 3000, Health::Degraded, 30);
        // Peak tick.
        let snapshot = Snapshot {
            timestamp_ms: 4000,
            ..Default::default()
        };
        let rates = RateSnapshot {
            timestamp_ms: 4000,
            cpu_busy_pct: 88.0,
            ..Default::default()
        };
        let mut peak = result(Health::Critical, 95);
        peak.primary_process = "rogue".into();
        peak.primary_pid = 7;
        d.process(&snapshot, &rates, &peak);

        let (active, _) = d.all_events();
        let e = active.unwrap();
        assert_eq!(e.peak_score, 95);
        assert_eq!(e.peak_health, "CRITICAL");
        assert_eq!(e.culprit_process, "rogue");
        assert_eq!(e.culprit_pid, 7);
        assert!((e.peak_cpu_busy_pct - 88.0).abs() < 1e-9);
        // Health transition landed on the timeline.
        assert!(e.timeline.iter().any(|t| t.message.contains("CRITICAL")));
    }

    #[test]
    fn completed_list_is_bounded_and_newest_first() {
        let mut d = EventDetector::new();
        let mut ts = 0;
        for _ in 0..(COMPLETED_CAP + 10) {
            for _ in 0..3 {
                ts += 1000;
                tick(&mut d, ts, Health::Degraded, 40);
            }
            for _ in 0..3 {
                ts += 1000;
                tick(&mut d, ts, Health::Ok, 0);
            }
        }
        assert_eq!(d.completed().count(), COMPLETED_CAP);
        let newest = d.completed().next().unwrap();
        assert_eq!(newest.end_time_ms, ts);
    }

    #[test]
    fn jsonl_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut d = EventDetector::new();
        for i in 0..3 {
            tick(&mut d, 1000 * (i + 1), Health::Critical, 70);
        }
        let mut closed = None;
        for i in 3..6 {
            closed = tick(&mut d, 1000 * (i + 1), Health::Ok, 0).or(closed);
        }
        let closed = closed.unwrap();
        append_event(&path, &closed).unwrap();

        let loaded = load_events(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], closed);

        // Missing files are not an error.
        assert!(load_events(&dir.path().join("absent.jsonl")).is_empty());
    }
}
