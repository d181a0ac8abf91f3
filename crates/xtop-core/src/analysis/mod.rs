//! Root-cause analysis: turns one tick's snapshot and rates into a
//! health verdict with evidence.
//!
//! Scoring model: each bottleneck domain carries a fixed set of weighted
//! evidence checks. Firing checks sum into a 0..100 score; the number of
//! firing checks is the domain's evidence-group count. The verdict only
//! escalates past INCONCLUSIVE when at least two independent groups agree,
//! so a single outlier signal cannot page anyone on its own.

pub mod actions;
pub mod owners;
pub mod rules;
pub mod trend;

use serde::{Deserialize, Serialize};

use crate::history::HistoryRing;
use crate::model::Snapshot;
use crate::rates::{MountRate, MountState, RateSnapshot};

use rules::{DomainRule, RuleContext};
use trend::{DegradationDetector, ExhaustionDetector};

/// Score at or above which a domain can drive a CRITICAL verdict.
const CRITICAL_SCORE: u32 = 60;

/// Score at or above which a domain is considered signaling at all.
const SIGNAL_SCORE: u32 = 25;

/// Confidence cap before evidence bonuses.
const CONFIDENCE_BASE_CAP: u32 = 90;

/// Per-extra-evidence-group confidence bonus and its cap.
const GROUP_BONUS: u32 = 5;
const GROUP_BONUS_CAP: u32 = 15;

/// Confidence malus when the primary domain leans on a soft check.
const SOFT_MALUS: u32 = 15;

/// Baseline window for the what-changed comparison.
const CHANGE_BASELINE_MS: i64 = 30_000;
const CHANGE_EMA_ALPHA: f64 = 0.3;
const CHANGE_REL_THRESHOLD: f64 = 0.2;
const MAX_TOP_CHANGES: usize = 5;

// ============================================================
// Verdict types
// ============================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    #[default]
    Ok,
    Inconclusive,
    Degraded,
    Critical,
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Health::Ok => write!(f, "OK"),
            Health::Inconclusive => write!(f, "INCONCLUSIVE"),
            Health::Degraded => write!(f, "DEGRADED"),
            Health::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Bottleneck domains, declared in tie-break order: on equal scores the
/// earlier variant wins the primary slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Bottleneck {
    #[default]
    Cpu,
    Memory,
    DiskIo,
    Network,
    DiskSpace,
}

impl std::fmt::Display for Bottleneck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bottleneck::Cpu => write!(f, "CPU"),
            Bottleneck::Memory => write!(f, "Memory"),
            Bottleneck::DiskIo => write!(f, "Disk IO"),
            Bottleneck::Network => write!(f, "Network"),
            Bottleneck::DiskSpace => write!(f, "Disk Space"),
        }
    }
}

/// One evidence check within a domain.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RcaCheck {
    /// Stable family id, also the action-template key.
    pub id: &'static str,
    pub label: String,
    /// Human-formatted current value.
    pub value: String,
    pub passed: bool,
    /// Score contribution when firing.
    pub weight: u32,
    /// Soft checks are weak signals that reduce confidence.
    pub soft: bool,
}

/// A domain's scored evidence.
#[derive(Clone, Debug, PartialEq, Serialize, Default)]
pub struct DomainScore {
    pub bottleneck: Bottleneck,
    pub score: u32,
    pub evidence_groups: u32,
    pub checks: Vec<RcaCheck>,
    pub top_process: String,
    pub top_pid: u32,
    pub top_cgroup: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Capacity {
    pub label: String,
    /// Remaining headroom percentage.
    pub pct: f64,
    pub current: String,
    pub limit: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Exhaustion {
    pub resource: String,
    pub current_pct: f64,
    pub trend_pct_per_s: f64,
    pub est_minutes: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Degradation {
    pub metric: String,
    pub direction: String,
    pub rate: f64,
    pub unit: String,
    pub duration_s: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopChange {
    pub name: String,
    /// Signed relative change vs the 30s baseline, in percent.
    pub delta_pct: f64,
    pub current: f64,
    pub rising: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionItem {
    pub summary: String,
    pub command: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OwnerEntry {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Default)]
pub struct WatchdogStatus {
    pub active: bool,
    pub domain: String,
}

/// The per-tick verdict with all supporting evidence.
#[derive(Clone, Debug, PartialEq, Serialize, Default)]
pub struct AnalysisResult {
    pub health: Health,
    pub primary_bottleneck: Bottleneck,
    pub primary_score: u32,
    pub confidence: u32,
    pub primary_process: String,
    pub primary_pid: u32,
    /// Cgroup path blamed for the primary bottleneck.
    pub primary_culprit: String,
    pub primary_evidence: Vec<String>,
    pub causal_chain: String,
    pub rca: Vec<DomainScore>,
    pub capacities: Vec<Capacity>,
    pub exhaustions: Vec<Exhaustion>,
    pub degradations: Vec<Degradation>,
    pub top_changes: Vec<TopChange>,
    pub actions: Vec<ActionItem>,
    pub cpu_owners: Vec<OwnerEntry>,
    pub mem_owners: Vec<OwnerEntry>,
    pub io_owners: Vec<OwnerEntry>,
    pub net_owners: Vec<OwnerEntry>,
    pub watchdog: WatchdogStatus,
    pub disk_guard_mounts: Vec<MountRate>,
    pub disk_guard_worst: MountState,
    /// Seconds since the current anomaly began, when not OK.
    pub anomaly_started_ago_s: Option<u64>,
    /// Seconds the system has been continuously OK.
    pub stable_since_s: Option<u64>,
    /// Collector errors copied from the snapshot.
    pub errors: Vec<String>,
}

// ============================================================
// Engine
// ============================================================

/// The RCA engine. Deterministic given (snapshot, rates, history) and its
/// own anomaly-tracking state.
pub struct RcaEngine {
    rules: Vec<Box<dyn DomainRule>>,
    pub exhaustion: ExhaustionDetector,
    pub degradation: DegradationDetector,
    anomaly_since_ms: Option<i64>,
    ok_since_ms: Option<i64>,
}

impl Default for RcaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RcaEngine {
    pub fn new() -> Self {
        Self {
            rules: rules::all_rules(),
            exhaustion: ExhaustionDetector::default(),
            degradation: DegradationDetector::default(),
            anomaly_since_ms: None,
            ok_since_ms: None,
        }
    }

    /// Run the scoring pipeline for one tick.
    ///
    /// `probe_boost` carries fresh deep-probe findings: (domain, boost).
    /// The engine never fails; missing inputs degrade individual checks
    /// to non-firing.
    pub fn analyze(
        &mut self,
        snapshot: &Snapshot,
        rates: &RateSnapshot,
        history: &HistoryRing,
        probe_boost: Option<(Bottleneck, u32)>,
    ) -> AnalysisResult {
        let ctx = RuleContext { snapshot, rates };
        let rca: Vec<DomainScore> = self.rules.iter().map(|r| r.evaluate(&ctx)).collect();

        // Health classification.
        let critical = rca
            .iter()
            .any(|d| d.score >= CRITICAL_SCORE && d.evidence_groups >= 2);
        let corroborated = rca
            .iter()
            .any(|d| d.score >= SIGNAL_SCORE && d.evidence_groups >= 2);
        let signaling = rca.iter().any(|d| d.score >= SIGNAL_SCORE);
        let health = if critical {
            Health::Critical
        } else if corroborated {
            Health::Degraded
        } else if signaling {
            Health::Inconclusive
        } else {
            Health::Ok
        };

        // Primary: highest score; on ties the earlier domain in rule
        // order wins, so only a strictly greater score displaces it.
        let primary = rca
            .iter()
            .fold(None::<&DomainScore>, |best, d| match best {
                Some(b) if d.score <= b.score => Some(b),
                _ => Some(d),
            })
            .cloned()
            .unwrap_or_default();

        let confidence = compute_confidence(&primary, probe_boost);

        let firing: Vec<&RcaCheck> = rca
            .iter()
            .flat_map(|d| d.checks.iter())
            .filter(|c| c.passed)
            .collect();

        let owners = owners::attribute(snapshot, rates);

        let now_ms = snapshot.timestamp_ms;
        if health != Health::Ok {
            self.anomaly_since_ms.get_or_insert(now_ms);
            self.ok_since_ms = None;
        } else {
            self.ok_since_ms.get_or_insert(now_ms);
            self.anomaly_since_ms = None;
        }

        AnalysisResult {
            health,
            primary_bottleneck: primary.bottleneck,
            primary_score: primary.score,
            confidence,
            primary_process: primary.top_process.clone(),
            primary_pid: primary.top_pid,
            primary_culprit: primary.top_cgroup.clone(),
            primary_evidence: evidence_lines(&primary),
            causal_chain: causal_chain(&primary),
            capacities: capacities(snapshot, rates),
            exhaustions: self.exhaustion.detect(history),
            degradations: self.degradation.detect(history),
            top_changes: top_changes(rates, history),
            actions: actions::actions_for(&firing),
            cpu_owners: owners.cpu,
            mem_owners: owners.mem,
            io_owners: owners.io,
            net_owners: owners.net,
            watchdog: WatchdogStatus::default(),
            disk_guard_mounts: rates.mounts.clone(),
            disk_guard_worst: rates.worst_mount_state(),
            anomaly_started_ago_s: self
                .anomaly_since_ms
                .map(|t| ((now_ms - t).max(0) / 1000) as u64),
            stable_since_s: self
                .ok_since_ms
                .map(|t| ((now_ms - t).max(0) / 1000) as u64),
            errors: snapshot.errors.clone(),
            rca,
        }
    }
}

fn compute_confidence(primary: &DomainScore, probe_boost: Option<(Bottleneck, u32)>) -> u32 {
    if primary.score == 0 {
        return 0;
    }
    let mut conf = primary.score.min(CONFIDENCE_BASE_CAP) as i64;
    let extra_groups = primary.evidence_groups.saturating_sub(2);
    conf += (extra_groups * GROUP_BONUS).min(GROUP_BONUS_CAP) as i64;
    if primary.checks.iter().any(|c| c.passed && c.soft) {
        conf -= SOFT_MALUS as i64;
    }
    if let Some((domain, boost)) = probe_boost
        && domain == primary.bottleneck
    {
        conf += boost as i64;
    }
    conf.clamp(0, 100) as u32
}

fn evidence_lines(primary: &DomainScore) -> Vec<String> {
    let mut firing: Vec<&RcaCheck> = primary.checks.iter().filter(|c| c.passed).collect();
    firing.sort_by(|a, b| b.weight.cmp(&a.weight));
    firing
        .iter()
        .map(|c| format!("{}: {}", c.label, c.value))
        .collect()
}

/// Concatenates the strongest firing checks of the primary domain into a
/// short narrative chain.
fn causal_chain(primary: &DomainScore) -> String {
    let mut firing: Vec<&RcaCheck> = primary.checks.iter().filter(|c| c.passed).collect();
    if firing.is_empty() {
        return String::new();
    }
    firing.sort_by(|a, b| b.weight.cmp(&a.weight));
    let chain = firing
        .iter()
        .map(|c| format!("{} {}", c.label, c.value))
        .collect::<Vec<_>>()
        .join(" → ");
    format!("{} saturation: {}", primary.bottleneck, chain)
}

fn capacities(snapshot: &Snapshot, rates: &RateSnapshot) -> Vec<Capacity> {
    let mut out = Vec::with_capacity(6);

    out.push(Capacity {
        label: "CPU".to_string(),
        pct: (100.0 - rates.cpu_busy_pct).max(0.0),
        current: format!("{:.1}% busy", rates.cpu_busy_pct),
        limit: format!("{} cores", snapshot.num_cpus()),
    });

    let mem = &snapshot.mem;
    out.push(Capacity {
        label: "Memory".to_string(),
        pct: (100.0 - mem.used_pct()).max(0.0),
        current: crate::fmt::format_bytes(mem.total.saturating_sub(mem.available) * 1024),
        limit: crate::fmt::format_bytes(mem.total * 1024),
    });

    let worst_util = rates.worst_disk_util_pct();
    out.push(Capacity {
        label: "Disk IO".to_string(),
        pct: (100.0 - worst_util).max(0.0),
        current: format!("{worst_util:.0}% busy (worst device)"),
        limit: format!("{} devices", rates.disks.len()),
    });

    if snapshot.conntrack.max > 0 {
        out.push(Capacity {
            label: "Conntrack".to_string(),
            pct: (100.0 - snapshot.conntrack.used_pct()).max(0.0),
            current: format!("{} entries", snapshot.conntrack.count),
            limit: format!("{} max", snapshot.conntrack.max),
        });
    }

    let ports = &snapshot.ephemeral_ports;
    if ports.range_hi > ports.range_lo {
        out.push(Capacity {
            label: "Ephemeral ports".to_string(),
            pct: (100.0 - ports.used_pct()).max(0.0),
            current: format!("{} in use", ports.in_use),
            limit: format!("{}-{}", ports.range_lo, ports.range_hi),
        });
    }

    if snapshot.file_handles.max > 0 {
        out.push(Capacity {
            label: "File descriptors".to_string(),
            pct: (100.0 - snapshot.file_handles.used_pct()).max(0.0),
            current: format!("{} allocated", snapshot.file_handles.allocated),
            limit: format!("{} max", snapshot.file_handles.max),
        });
    }

    out
}

// ============================================================
// What changed — EMA baseline comparison
// ============================================================

/// Tracked scalar fields with their absolute-change epsilons.
fn change_fields(rates: &RateSnapshot) -> Vec<(&'static str, f64, f64)> {
    vec![
        ("CPU busy %", rates.cpu_busy_pct, 2.0),
        ("context switches/s", rates.ctx_switch_rate, 500.0),
        ("major faults/s", rates.majfault_rate, 5.0),
        ("swap I/O MB/s", rates.swap_in_mbs + rates.swap_out_mbs, 0.05),
        (
            "disk read MB/s",
            rates.disks.iter().map(|d| d.read_mbs).sum(),
            1.0,
        ),
        (
            "disk write MB/s",
            rates.disks.iter().map(|d| d.write_mbs).sum(),
            1.0,
        ),
        ("net rx MB/s", rates.nets.iter().map(|n| n.rx_mbs).sum(), 0.5),
        ("net tx MB/s", rates.nets.iter().map(|n| n.tx_mbs).sum(), 0.5),
        ("TCP retrans/s", rates.retrans_rate, 1.0),
    ]
}

/// Compares the newest rates against an EMA baseline of rates at least
/// 30s old; emits up to 5 fields whose relative change exceeds 20% and
/// absolute change exceeds a per-field epsilon.
fn top_changes(rates: &RateSnapshot, history: &HistoryRing) -> Vec<TopChange> {
    let cutoff = rates.timestamp_ms - CHANGE_BASELINE_MS;
    let current = change_fields(rates);

    // EMA per field over the baseline window, oldest first.
    let mut baseline: Vec<Option<f64>> = vec![None; current.len()];
    for entry in history.iter() {
        if entry.rates.timestamp_ms > cutoff {
            break;
        }
        for (i, (_, value, _)) in change_fields(&entry.rates).into_iter().enumerate() {
            baseline[i] = Some(match baseline[i] {
                None => value,
                Some(avg) => CHANGE_EMA_ALPHA * value + (1.0 - CHANGE_EMA_ALPHA) * avg,
            });
        }
    }

    let mut changes: Vec<TopChange> = Vec::new();
    for (i, (name, value, epsilon)) in current.into_iter().enumerate() {
        let Some(avg) = baseline[i] else { continue };
        let abs = value - avg;
        if abs.abs() <= epsilon {
            continue;
        }
        let rel = if avg > 0.0 {
            abs / avg
        } else {
            // A signal appearing from a zero baseline is always notable.
            1.0_f64.copysign(abs)
        };
        if rel.abs() <= CHANGE_REL_THRESHOLD {
            continue;
        }
        changes.push(TopChange {
            name: name.to_string(),
            delta_pct: rel * 100.0,
            current: value,
            rising: abs > 0.0,
        });
    }
    changes.sort_by(|a, b| b.delta_pct.abs().total_cmp(&a.delta_pct.abs()));
    changes.truncate(MAX_TOP_CHANGES);
    changes
}

// ============================================================
// Tests
// ============================================================
