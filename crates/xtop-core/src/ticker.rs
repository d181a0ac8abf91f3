//! The tick pipeline: collect → derive → analyze → record.
//!
//! One `tick()` runs to completion before the next is scheduled; the
//! interval is advisory and the caller drives timing. The ticker also
//! advances the probe manager's clock and runs the RCA watchdog, which
//! auto-starts a deep-probe pass when the verdict stays CRITICAL.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::analysis::{AnalysisResult, Health, RcaEngine, WatchdogStatus};
use crate::collector::{CollectError, SnapshotSource};
use crate::events::{Event, EventDetector};
use crate::history::{HistoryEntry, HistoryRing};
use crate::probe::{NullProbeRunner, ProbeManager, ProbeRunner, ProbeState};
use crate::rates::{RateDeriver, RateSnapshot};

/// Consecutive CRITICAL verdicts before the watchdog starts a probe.
const WATCHDOG_CRITICAL_TICKS: u32 = 3;

/// Everything one tick produced. The history entry is shared with the
/// ring; consumers may hold it as long as they like.
pub struct TickOutput {
    pub entry: Arc<HistoryEntry>,
    pub analysis: AnalysisResult,
    /// An event that closed this tick, for persistence.
    pub closed_event: Option<Event>,
}

/// Orchestrates the sampling pipeline on a fixed advisory interval.
pub struct Ticker<S: SnapshotSource> {
    source: S,
    interval: Duration,
    deriver: RateDeriver,
    engine: RcaEngine,
    history: HistoryRing,
    events: EventDetector,
    probe: ProbeManager,
    consecutive_critical: u32,
    watchdog_domain: Option<String>,
}

impl<S: SnapshotSource> Ticker<S> {
    pub fn new(source: S, interval: Duration, history_size: usize) -> Self {
        Self {
            source,
            interval,
            deriver: RateDeriver::new(),
            engine: RcaEngine::new(),
            history: HistoryRing::new(history_size),
            events: EventDetector::new(),
            probe: ProbeManager::new(Box::new(NullProbeRunner)),
            consecutive_critical: 0,
            watchdog_domain: None,
        }
    }

    /// Swap in a real probe runner.
    pub fn with_probe_runner(mut self, runner: Box<dyn ProbeRunner>) -> Self {
        self.probe = ProbeManager::new(runner);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn history(&self) -> &HistoryRing {
        &self.history
    }

    pub fn events(&self) -> &EventDetector {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventDetector {
        &mut self.events
    }

    pub fn probe(&self) -> &ProbeManager {
        &self.probe
    }

    pub fn probe_mut(&mut self) -> &mut ProbeManager {
        &mut self.probe
    }

    /// Run one tick: collect a snapshot, derive rates against the
    /// previous one, analyze, feed the event detector, and append to
    /// history. Collector errors ride on the snapshot; only an unusable
    /// /proc aborts.
    pub fn tick(&mut self) -> Result<TickOutput, CollectError> {
        let snapshot = self.source.collect()?;
        let now_ms = snapshot.timestamp_ms;

        let rates = match self.history.latest() {
            Some(prev) if now_ms > prev.snapshot.timestamp_ms => {
                self.deriver.derive(&prev.snapshot, &snapshot)
            }
            _ => RateSnapshot::zero(&snapshot),
        };

        self.probe.tick(now_ms);
        let probe_boost = self
            .probe
            .findings()
            .and_then(|f| Some((f.bottleneck?, f.conf_boost)))
            .filter(|(_, boost)| *boost > 0);

        let mut analysis = self
            .engine
            .analyze(&snapshot, &rates, &self.history, probe_boost);

        self.run_watchdog(&mut analysis, now_ms);

        let closed_event = self.events.process(&snapshot, &rates, &analysis);
        let entry = self.history.push(HistoryEntry { snapshot, rates });

        Ok(TickOutput {
            entry,
            analysis,
            closed_event,
        })
    }

    /// Sustained CRITICAL auto-starts the probe pack for the primary
    /// domain; the verdict carries the watchdog state either way.
    fn run_watchdog(&mut self, analysis: &mut AnalysisResult, now_ms: i64) {
        if analysis.health == Health::Critical {
            self.consecutive_critical += 1;
        } else {
            self.consecutive_critical = 0;
        }

        if self.consecutive_critical >= WATCHDOG_CRITICAL_TICKS
            && self.probe.state() == ProbeState::Idle
            && self
                .probe
                .start_domain(analysis.primary_bottleneck, now_ms)
                .is_ok()
        {
            info!(domain = %analysis.primary_bottleneck, "watchdog started probe pass");
            self.watchdog_domain = Some(analysis.primary_bottleneck.to_string());
        }

        let active = self.probe.state() == ProbeState::Running;
        if !active && self.probe.state() == ProbeState::Idle {
            self.watchdog_domain = None;
        }
        analysis.watchdog = WatchdogStatus {
            active: active && self.watchdog_domain.is_some(),
            domain: self.watchdog_domain.clone().unwrap_or_default(),
        };
    }
}

// ---------------------------------------------------------------------------
// Replay player
// ---------------------------------------------------------------------------

/// Steps through a persisted history one entry at a time, substituting
/// for the live ticker during replay.
pub struct Player {
    entries: Vec<Arc<HistoryEntry>>,
    pos: usize,
}

impl Player {
    pub fn new(entries: Vec<Arc<HistoryEntry>>) -> Self {
        Self { entries, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The index of the entry the player currently stands on.
    pub fn index(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, i: usize) {
        self.pos = i.min(self.entries.len().saturating_sub(1));
    }

    pub fn current(&self) -> Option<&Arc<HistoryEntry>> {
        self.entries.get(self.pos)
    }

    /// Advance by one entry; returns the entry stepped onto.
    pub fn tick(&mut self) -> Option<&Arc<HistoryEntry>> {
        if self.pos + 1 >= self.entries.len() {
            return None;
        }
        self.pos += 1;
        self.entries.get(self.pos)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Snapshot;

    /// Source that serves pre-built snapshots in order.
    struct ScriptedSource {
        snapshots: Vec<Snapshot>,
        pos: usize,
    }

    impl ScriptedSource {
        fn new(snapshots: Vec<Snapshot>) -> Self {
            Self { snapshots, pos: 0 }
        }
    }

    impl SnapshotSource for ScriptedSource {
        fn collect(&mut self) -> Result<Snapshot, CollectError> {
            let snap = self.snapshots[self.pos.min(self.snapshots.len() - 1)].clone();
            self.pos += 1;
            Ok(snap)
        }
    }

    fn idle_snapshot(ts_ms: i64) -> Snapshot {
        let mut snap = Snapshot {
            timestamp_ms: ts_ms,
            ..Default::default()
        };
        snap.mem.total = 16_000_000;
        snap.mem.available = 12_000_000;
        snap.cpus = vec![
            crate::model::SystemCpuInfo {
                cpu_id: 0,
                user: (ts_ms / 10) as u64,
                idle: ts_ms as u64,
                ..Default::default()
            },
        ];
        snap
    }

    fn critical_snapshot(ts_ms: i64) -> Snapshot {
        let mut snap = idle_snapshot(ts_ms);
        snap.psi.io.some_avg10 = 40.0;
        snap.psi.io.full_avg10 = 20.0;
        for pid in 0..5 {
            snap.processes.push(crate::model::ProcessInfo {
                pid,
                state: 'D',
                ..Default::default()
            });
        }
        snap
    }

    #[test]
    fn first_tick_has_zero_rates() {
        let source = ScriptedSource::new(vec![idle_snapshot(1000)]);
        let mut ticker = Ticker::new(source, Duration::from_secs(1), 300);
        let out = ticker.tick().unwrap();
        assert_eq!(out.entry.rates.cpu_busy_pct, 0.0);
        assert_eq!(ticker.history().len(), 1);
    }

    #[test]
    fn rates_flow_from_the_second_tick() {
        let source = ScriptedSource::new(vec![idle_snapshot(0), idle_snapshot(1000)]);
        let mut ticker = Ticker::new(source, Duration::from_secs(1), 300);
        ticker.tick().unwrap();
        let out = ticker.tick().unwrap();
        // user and idle both advanced; busy is their ratio.
        assert!(out.entry.rates.cpu_busy_pct > 0.0);
        assert_eq!(ticker.history().len(), 2);
    }

    #[test]
    fn non_advancing_timestamp_degrades_to_zero_rates() {
        let source = ScriptedSource::new(vec![idle_snapshot(1000), idle_snapshot(1000)]);
        let mut ticker = Ticker::new(source, Duration::from_secs(1), 300);
        ticker.tick().unwrap();
        let out = ticker.tick().unwrap();
        assert_eq!(out.entry.rates.cpu_busy_pct, 0.0);
    }

    #[test]
    fn watchdog_fires_after_sustained_critical() {
        let snapshots: Vec<Snapshot> =
            (0..5).map(|i| critical_snapshot(i * 1000)).collect();
        let source = ScriptedSource::new(snapshots);
        let mut ticker = Ticker::new(source, Duration::from_secs(1), 300);

        let mut watchdog_seen = false;
        for _ in 0..5 {
            let out = ticker.tick().unwrap();
            assert_eq!(out.analysis.health, Health::Critical);
            if out.analysis.watchdog.active {
                watchdog_seen = true;
                assert_eq!(out.analysis.watchdog.domain, "Disk IO");
            }
        }
        assert!(watchdog_seen, "watchdog should start a probe pass");
        assert_eq!(ticker.probe().state(), ProbeState::Running);
    }

    #[test]
    fn event_opens_and_closes_through_the_ticker() {
        let mut snapshots: Vec<Snapshot> =
            (0..4).map(|i| critical_snapshot(i * 1000)).collect();
        for i in 4..8 {
            snapshots.push(idle_snapshot(i * 1000));
        }
        let source = ScriptedSource::new(snapshots);
        let mut ticker = Ticker::new(source, Duration::from_secs(1), 300);

        let mut closed = None;
        for _ in 0..8 {
            let out = ticker.tick().unwrap();
            closed = out.closed_event.or(closed);
        }
        let closed = closed.expect("the incident should close");
        assert_eq!(closed.bottleneck, "Disk IO");
        assert!(closed.duration_s > 0);
    }

    #[test]
    fn live_collector_feeds_the_pipeline() {
        use crate::collector::{Collector, MockFs};

        let fs = MockFs::typical_system();
        let collector = Collector::new(fs, "/proc").with_cgroup("/sys/fs/cgroup");
        let mut ticker = Ticker::new(collector, Duration::from_secs(1), 300);

        let first = ticker.tick().unwrap();
        assert!(first.entry.snapshot.errors.is_empty());
        let second = ticker.tick().unwrap();
        assert_eq!(ticker.history().len(), 2);
        // A quiet fixture stays healthy.
        assert_eq!(second.analysis.health, Health::Ok);
        assert!(!second.analysis.capacities.is_empty());
    }

    #[test]
    fn player_steps_and_seeks() {
        let entries: Vec<Arc<HistoryEntry>> = (0..3)
            .map(|i| {
                Arc::new(HistoryEntry {
                    snapshot: idle_snapshot(i * 1000),
                    rates: RateSnapshot::default(),
                })
            })
            .collect();
        let mut player = Player::new(entries);
        assert_eq!(player.len(), 3);
        assert_eq!(player.index(), 0);
        assert_eq!(player.tick().unwrap().snapshot.timestamp_ms, 1000);
        player.seek(2);
        assert_eq!(player.current().unwrap().snapshot.timestamp_ms, 2000);
        assert!(player.tick().is_none());
        player.seek(99);
        assert_eq!(player.index(), 2);
    }
}
