//! Linear-trend predictors over the history ring.
//!
//! Exhaustion: resources with a bounded percentage that are trending up
//! get a time-to-full estimate. Degradation: tracked scalars that drift
//! consistently in one direction for long enough are reported with their
//! rate of change.

use crate::history::HistoryRing;

use super::{Degradation, Exhaustion};

/// Least-squares slope of `points` (x in seconds, y arbitrary unit).
/// Returns `None` for fewer than 2 points or a degenerate x spread.
pub fn linear_slope(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let sx: f64 = points.iter().map(|p| p.0).sum();
    let sy: f64 = points.iter().map(|p| p.1).sum();
    let sxx: f64 = points.iter().map(|p| p.0 * p.0).sum();
    let sxy: f64 = points.iter().map(|p| p.0 * p.1).sum();
    let denom = n * sxx - sx * sx;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let slope = (n * sxy - sx * sy) / denom;
    slope.is_finite().then_some(slope)
}

// ---------------------------------------------------------------------------
// Exhaustion
// ---------------------------------------------------------------------------

/// Window and floor parameters for the exhaustion predictor.
#[derive(Debug, Clone)]
pub struct ExhaustionDetector {
    /// Samples examined from the end of the ring.
    pub window: usize,
    /// Minimum samples before any prediction.
    pub min_samples: usize,
    /// Slopes below this (%/s) are noise.
    pub noise_floor: f64,
    /// Only resources at or above this usage are predicted.
    pub min_pct: f64,
}

impl Default for ExhaustionDetector {
    fn default() -> Self {
        Self {
            window: 60,
            min_samples: 20,
            noise_floor: 0.01,
            min_pct: 50.0,
        }
    }
}

impl ExhaustionDetector {
    pub fn detect(&self, history: &HistoryRing) -> Vec<Exhaustion> {
        let entries: Vec<_> = history.tail(self.window).collect();
        if entries.len() < self.min_samples {
            return Vec::new();
        }

        // Resource name -> (ts_s, pct) series, in tick order.
        let mut out = Vec::new();
        let latest = match entries.last() {
            Some(e) => e,
            None => return Vec::new(),
        };

        let mut resources: Vec<String> = Vec::new();
        for m in &latest.rates.mounts {
            resources.push(format!("disk:{}", m.mount_point));
        }
        resources.push("conntrack".to_string());
        resources.push("ephemeral-ports".to_string());
        resources.push("file-handles".to_string());

        for resource in resources {
            let series: Vec<(f64, f64)> = entries
                .iter()
                .filter_map(|e| {
                    let pct = resource_pct(&resource, e.as_ref())?;
                    Some((e.snapshot.timestamp_ms as f64 / 1000.0, pct))
                })
                .collect();
            if series.len() < self.min_samples {
                continue;
            }
            let current_pct = series.last().map(|p| p.1).unwrap_or(0.0);
            let Some(slope) = linear_slope(&series) else {
                continue;
            };
            if slope <= self.noise_floor || current_pct < self.min_pct {
                continue;
            }
            out.push(Exhaustion {
                resource,
                current_pct,
                trend_pct_per_s: slope,
                est_minutes: ((100.0 - current_pct) / slope / 60.0).max(0.0),
            });
        }
        out.sort_by(|a, b| a.est_minutes.total_cmp(&b.est_minutes));
        out
    }
}

fn resource_pct(resource: &str, entry: &crate::history::HistoryEntry) -> Option<f64> {
    if let Some(mp) = resource.strip_prefix("disk:") {
        return entry
            .rates
            .mounts
            .iter()
            .find(|m| m.mount_point == mp)
            .map(|m| m.used_pct);
    }
    match resource {
        "conntrack" => Some(entry.snapshot.conntrack.used_pct()),
        "ephemeral-ports" => Some(entry.snapshot.ephemeral_ports.used_pct()),
        "file-handles" => Some(entry.snapshot.file_handles.used_pct()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Slow degradation
// ---------------------------------------------------------------------------

struct DegradationMetric {
    name: &'static str,
    unit: &'static str,
    /// Minimum |slope| (unit/s) worth reporting.
    threshold: f64,
    extract: fn(&crate::history::HistoryEntry) -> f64,
}

const DEGRADATION_METRICS: &[DegradationMetric] = &[
    DegradationMetric {
        name: "memory used",
        unit: "%",
        threshold: 0.005,
        extract: |e| e.snapshot.mem.used_pct(),
    },
    DegradationMetric {
        name: "IO pressure",
        unit: "%",
        threshold: 0.01,
        extract: |e| e.snapshot.psi.io.some_avg10 as f64,
    },
    DegradationMetric {
        name: "CPU pressure",
        unit: "%",
        threshold: 0.01,
        extract: |e| e.snapshot.psi.cpu.some_avg10 as f64,
    },
    DegradationMetric {
        name: "major faults",
        unit: "/s",
        threshold: 0.5,
        extract: |e| e.rates.majfault_rate,
    },
    DegradationMetric {
        name: "TCP retransmissions",
        unit: "/s",
        threshold: 0.1,
        extract: |e| e.rates.retrans_rate,
    },
];

/// Detects sustained one-directional drift in tracked scalars.
#[derive(Debug, Clone)]
pub struct DegradationDetector {
    /// Minimum samples before any report.
    pub min_samples: usize,
    /// The direction must hold over at least this trailing span.
    pub consistency_secs: f64,
}

impl Default for DegradationDetector {
    fn default() -> Self {
        Self {
            min_samples: 120,
            consistency_secs: 60.0,
        }
    }
}

impl DegradationDetector {
    pub fn detect(&self, history: &HistoryRing) -> Vec<Degradation> {
        if history.len() < self.min_samples {
            return Vec::new();
        }
        let entries: Vec<_> = history.iter().collect();
        let last_ts = match entries.last() {
            Some(e) => e.snapshot.timestamp_ms as f64 / 1000.0,
            None => return Vec::new(),
        };
        let first_ts = entries[0].snapshot.timestamp_ms as f64 / 1000.0;

        let mut out = Vec::new();
        for metric in DEGRADATION_METRICS {
            let series: Vec<(f64, f64)> = entries
                .iter()
                .map(|e| {
                    (
                        e.snapshot.timestamp_ms as f64 / 1000.0,
                        (metric.extract)(e.as_ref()),
                    )
                })
                .collect();
            let Some(slope) = linear_slope(&series) else {
                continue;
            };
            if slope.abs() < metric.threshold {
                continue;
            }
            // The trailing window must agree on direction, otherwise the
            // drift is oscillation rather than degradation.
            let tail: Vec<(f64, f64)> = series
                .iter()
                .copied()
                .filter(|(ts, _)| last_ts - ts <= self.consistency_secs)
                .collect();
            let Some(tail_slope) = linear_slope(&tail) else {
                continue;
            };
            if tail_slope.signum() != slope.signum() {
                continue;
            }
            out.push(Degradation {
                metric: metric.name.to_string(),
                direction: if slope > 0.0 { "up" } else { "down" }.to_string(),
                rate: slope.abs(),
                unit: format!("{}/s", metric.unit),
                duration_s: (last_ts - first_ts).max(0.0) as u64,
            });
        }
        out
    }
}
