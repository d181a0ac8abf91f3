//! Rate derivation: two successive snapshots in, per-second rates out.
//!
//! This module is the single source of truth for delta computation. Every
//! cumulative counter goes through [`delta`], which collapses counter
//! resets (current < previous, e.g. after reboot or device hotplug) to 0
//! instead of producing a negative rate. All derived values are finite,
//! non-negative, and percentages are clamped to [0, 100].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::Snapshot;

/// Smoothing factor for the mount growth moving average.
const GROWTH_EMA_ALPHA: f64 = 0.3;

/// Growth below this (bytes/s) is treated as noise for ETA purposes.
const GROWTH_FLOOR_BPS: f64 = 1024.0;

/// Free-space / inode thresholds for mount state classification.
const MOUNT_WARN_FREE_PCT: f64 = 15.0;
const MOUNT_CRIT_FREE_PCT: f64 = 5.0;
const MOUNT_WARN_INODE_PCT: f64 = 85.0;
const MOUNT_CRIT_INODE_PCT: f64 = 95.0;

// ---------------------------------------------------------------------------
// Delta helpers
// ---------------------------------------------------------------------------

/// Compute a counter delta, collapsing regressions (resets) to 0.
pub fn delta(curr: u64, prev: u64) -> u64 {
    curr.saturating_sub(prev)
}

/// Convert a delta to a per-second rate; guards dt <= 0.
fn per_sec(d: u64, dt_s: f64) -> f64 {
    if dt_s <= 0.0 {
        return 0.0;
    }
    sane(d as f64 / dt_s)
}

/// Replace NaN/Inf/negative values with 0.
fn sane(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

fn clamp_pct(v: f64) -> f64 {
    sane(v).min(100.0)
}

// ---------------------------------------------------------------------------
// Rate records
// ---------------------------------------------------------------------------

/// Per-device disk rates derived from /proc/diskstats deltas.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DiskRate {
    pub name: String,
    pub read_mbs: f64,
    pub write_mbs: f64,
    pub read_iops: f64,
    pub write_iops: f64,
    /// Average time per completed I/O over the interval (ms).
    pub avg_await_ms: f64,
    /// I/Os in flight on the newer snapshot.
    pub queue_depth: f64,
    pub util_pct: f64,
}

/// Per-interface network rates.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct NetRate {
    pub name: String,
    pub rx_mbs: f64,
    pub tx_mbs: f64,
    pub rx_pps: f64,
    pub tx_pps: f64,
    pub rx_drops_ps: f64,
    pub tx_drops_ps: f64,
    pub rx_errors_ps: f64,
    pub tx_errors_ps: f64,
    pub speed_mbps: u64,
    pub oper_state: String,
    pub master: String,
    /// Busy fraction of link speed; 0 when the speed is unknown.
    pub util_pct: f64,
}

/// Per-cgroup rates.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CgroupRate {
    pub name: String,
    pub path: String,
    pub cpu_pct: f64,
    /// Throttled periods as % of enforcement periods in the interval.
    pub throttle_pct: f64,
    pub io_read_mbs: f64,
    pub io_write_mbs: f64,
}

/// Per-process rates.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ProcessRate {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub rss_kb: u64,
    pub vm_swap_kb: u64,
    pub num_threads: u32,
    pub cgroup_path: String,
    pub read_mbs: f64,
    pub write_mbs: f64,
    pub write_path: String,
    pub ctx_switch_rate: f64,
    pub majfault_rate: f64,
    /// Start-time identity token carried through from the snapshot so
    /// actuators can verify the PID has not been reused.
    pub starttime: u64,
}

/// Disk-space verdict for one mount.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MountState {
    #[default]
    Ok,
    Warn,
    Crit,
}

impl std::fmt::Display for MountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MountState::Ok => write!(f, "OK"),
            MountState::Warn => write!(f, "WARN"),
            MountState::Crit => write!(f, "CRIT"),
        }
    }
}

/// Per-mount capacity and growth rates.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct MountRate {
    pub mount_point: String,
    pub device: String,
    pub fs_type: String,
    pub used_pct: f64,
    pub free_pct: f64,
    pub free_bytes: u64,
    pub inode_used_pct: f64,
    /// Smoothed space consumption in bytes/s (EMA).
    pub growth_bps: f64,
    /// Previous tick's smoothed growth.
    pub prev_growth_bps: f64,
    /// Set while smoothed growth exceeds 1 KiB/s.
    pub growth_started: bool,
    /// Seconds until full at the current growth; absent when growth is
    /// below the noise floor.
    pub eta_secs: Option<f64>,
    pub state: MountState,
}

/// Per-second and per-interval scalars derived from two snapshots.
///
/// Invariants: every field is finite and >= 0; percentages <= 100.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct RateSnapshot {
    /// Timestamp of the newer snapshot (ms since epoch).
    pub timestamp_ms: i64,

    /// Interval length (ms), never less than 1.
    pub dt_ms: i64,

    pub num_cpus: usize,

    // Aggregate CPU, % of total capacity.
    pub cpu_busy_pct: f64,
    pub cpu_user_pct: f64,
    pub cpu_nice_pct: f64,
    pub cpu_system_pct: f64,
    pub cpu_iowait_pct: f64,
    pub cpu_irq_pct: f64,
    pub cpu_softirq_pct: f64,
    pub cpu_steal_pct: f64,

    pub ctx_switch_rate: f64,
    pub pgfault_rate: f64,
    pub majfault_rate: f64,

    /// Swap traffic in MB/s.
    pub swap_in_mbs: f64,
    pub swap_out_mbs: f64,

    /// Reclaim activity in pages/s.
    pub direct_reclaim_pages_s: f64,
    pub kswapd_pages_s: f64,

    pub retrans_rate: f64,
    pub tcp_reset_rate: f64,
    pub in_seg_rate: f64,
    pub out_seg_rate: f64,
    pub softirq_net_rx_rate: f64,
    pub softirq_net_tx_rate: f64,

    /// OOM kills observed in this interval (not a rate).
    pub oom_kill_delta: u64,

    pub disks: Vec<DiskRate>,
    pub nets: Vec<NetRate>,
    pub cgroups: Vec<CgroupRate>,
    pub processes: Vec<ProcessRate>,
    pub mounts: Vec<MountRate>,
}

impl RateSnapshot {
    /// A zero-valued rate snapshot for the first tick.
    pub fn zero(snapshot: &Snapshot) -> Self {
        Self {
            timestamp_ms: snapshot.timestamp_ms,
            dt_ms: 1,
            num_cpus: snapshot.num_cpus(),
            ..Default::default()
        }
    }

    /// Worst disk service time across devices.
    pub fn worst_await_ms(&self) -> f64 {
        self.disks.iter().map(|d| d.avg_await_ms).fold(0.0, f64::max)
    }

    /// Worst disk utilization across devices.
    pub fn worst_disk_util_pct(&self) -> f64 {
        self.disks.iter().map(|d| d.util_pct).fold(0.0, f64::max)
    }

    /// Total packet drops per second across interfaces.
    pub fn total_drops_ps(&self) -> f64 {
        self.nets.iter().map(|n| n.rx_drops_ps + n.tx_drops_ps).sum()
    }

    /// The worst mount state across mounts.
    pub fn worst_mount_state(&self) -> MountState {
        self.mounts
            .iter()
            .map(|m| m.state)
            .max()
            .unwrap_or(MountState::Ok)
    }
}

// ---------------------------------------------------------------------------
// Deriver
// ---------------------------------------------------------------------------

/// Per-mount growth smoothing state kept across ticks.
#[derive(Debug, Clone, Default)]
struct MountGrowth {
    ema_bps: f64,
    started: bool,
    samples: usize,
}

/// Derives a [`RateSnapshot`] from two successive snapshots.
///
/// Stateless except for the mount-growth moving averages.
#[derive(Debug)]
pub struct RateDeriver {
    page_size: u64,
    growth: HashMap<String, MountGrowth>,
}

impl Default for RateDeriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RateDeriver {
    pub fn new() -> Self {
        Self {
            page_size: 4096,
            growth: HashMap::new(),
        }
    }

    /// Derive rates for `curr` against `prev`.
    ///
    /// `dt` is clamped below at 1 ms; callers should not pass snapshots
    /// out of order, but a non-positive dt degrades to the clamp rather
    /// than failing.
    pub fn derive(&mut self, prev: &Snapshot, curr: &Snapshot) -> RateSnapshot {
        let dt_ms = (curr.timestamp_ms - prev.timestamp_ms).max(1);
        let dt_s = dt_ms as f64 / 1000.0;

        let mut r = RateSnapshot {
            timestamp_ms: curr.timestamp_ms,
            dt_ms,
            num_cpus: curr.num_cpus(),
            ..Default::default()
        };

        let total_jiffies_delta = self.derive_cpu(prev, curr, &mut r);
        self.derive_vm(prev, curr, dt_s, &mut r);
        self.derive_protocols(prev, curr, dt_s, &mut r);
        r.disks = self.derive_disks(prev, curr, dt_ms);
        r.nets = self.derive_nets(prev, curr, dt_s);
        r.cgroups = self.derive_cgroups(prev, curr, dt_s);
        r.processes = self.derive_processes(prev, curr, dt_s, total_jiffies_delta);
        r.mounts = self.derive_mounts(prev, curr, dt_s);
        r
    }

    /// Aggregate CPU percentages from summed per-core jiffy deltas.
    /// Returns the total jiffy delta for per-process CPU attribution.
    fn derive_cpu(&self, prev: &Snapshot, curr: &Snapshot, r: &mut RateSnapshot) -> u64 {
        let sum_cores = |s: &Snapshot| {
            let mut acc = crate::model::SystemCpuInfo::default();
            let mut cores = 0;
            for c in s.cpus.iter().filter(|c| c.cpu_id >= 0) {
                acc.user += c.user;
                acc.nice += c.nice;
                acc.system += c.system;
                acc.idle += c.idle;
                acc.iowait += c.iowait;
                acc.irq += c.irq;
                acc.softirq += c.softirq;
                acc.steal += c.steal;
                cores += 1;
            }
            if cores == 0 {
                // No per-core lines; fall back to the aggregate line.
                if let Some(agg) = s.aggregate_cpu() {
                    acc = agg.clone();
                }
            }
            acc
        };

        let p = sum_cores(prev);
        let c = sum_cores(curr);

        let du = delta(c.user, p.user);
        let dn = delta(c.nice, p.nice);
        let ds = delta(c.system, p.system);
        let di = delta(c.idle, p.idle);
        let dw = delta(c.iowait, p.iowait);
        let dq = delta(c.irq, p.irq);
        let dsq = delta(c.softirq, p.softirq);
        let dst = delta(c.steal, p.steal);

        let total = du + dn + ds + di + dw + dq + dsq + dst;
        if total == 0 {
            return 0;
        }
        let t = total as f64;

        r.cpu_user_pct = clamp_pct(du as f64 / t * 100.0);
        r.cpu_nice_pct = clamp_pct(dn as f64 / t * 100.0);
        r.cpu_system_pct = clamp_pct(ds as f64 / t * 100.0);
        r.cpu_iowait_pct = clamp_pct(dw as f64 / t * 100.0);
        r.cpu_irq_pct = clamp_pct(dq as f64 / t * 100.0);
        r.cpu_softirq_pct = clamp_pct(dsq as f64 / t * 100.0);
        r.cpu_steal_pct = clamp_pct(dst as f64 / t * 100.0);
        let idle_pct = clamp_pct(di as f64 / t * 100.0);
        r.cpu_busy_pct = clamp_pct(100.0 - idle_pct);
        total
    }

    fn derive_vm(&self, prev: &Snapshot, curr: &Snapshot, dt_s: f64, r: &mut RateSnapshot) {
        let p = &prev.vmstat;
        let c = &curr.vmstat;
        let page_mb = self.page_size as f64 / (1024.0 * 1024.0);

        r.ctx_switch_rate = per_sec(delta(curr.stat.ctxt, prev.stat.ctxt), dt_s);
        r.pgfault_rate = per_sec(delta(c.pgfault, p.pgfault), dt_s);
        r.majfault_rate = per_sec(delta(c.pgmajfault, p.pgmajfault), dt_s);
        r.swap_in_mbs = sane(per_sec(delta(c.pswpin, p.pswpin), dt_s) * page_mb);
        r.swap_out_mbs = sane(per_sec(delta(c.pswpout, p.pswpout), dt_s) * page_mb);
        r.direct_reclaim_pages_s = per_sec(delta(c.pgsteal_direct, p.pgsteal_direct), dt_s);
        r.kswapd_pages_s = per_sec(delta(c.pgsteal_kswapd, p.pgsteal_kswapd), dt_s);
        r.oom_kill_delta = delta(curr.oom_kill_total(), prev.oom_kill_total());
    }

    fn derive_protocols(&self, prev: &Snapshot, curr: &Snapshot, dt_s: f64, r: &mut RateSnapshot) {
        let p = &prev.snmp;
        let c = &curr.snmp;
        r.retrans_rate = per_sec(delta(c.tcp_retrans_segs, p.tcp_retrans_segs), dt_s);
        r.tcp_reset_rate = per_sec(delta(c.tcp_out_rsts, p.tcp_out_rsts), dt_s);
        r.in_seg_rate = per_sec(delta(c.tcp_in_segs, p.tcp_in_segs), dt_s);
        r.out_seg_rate = per_sec(delta(c.tcp_out_segs, p.tcp_out_segs), dt_s);
        r.softirq_net_rx_rate = per_sec(delta(curr.softirq.net_rx, prev.softirq.net_rx), dt_s);
        r.softirq_net_tx_rate = per_sec(delta(curr.softirq.net_tx, prev.softirq.net_tx), dt_s);
    }

    fn derive_disks(&self, prev: &Snapshot, curr: &Snapshot, dt_ms: i64) -> Vec<DiskRate> {
        let dt_s = dt_ms as f64 / 1000.0;
        let mut out = Vec::with_capacity(curr.disks.len());
        for d in &curr.disks {
            let Some(p) = prev.disks.iter().find(|p| p.name == d.name) else {
                continue;
            };
            let d_rio = delta(d.rio, p.rio);
            let d_wio = delta(d.wio, p.wio);
            let d_rsz = delta(d.rsz, p.rsz);
            let d_wsz = delta(d.wsz, p.wsz);
            let d_rt = delta(d.read_time_ms, p.read_time_ms);
            let d_wt = delta(d.write_time_ms, p.write_time_ms);
            let d_ticks = delta(d.io_ticks_ms, p.io_ticks_ms);

            out.push(DiskRate {
                name: d.name.clone(),
                read_mbs: sane(d_rsz as f64 * 512.0 / dt_s / (1024.0 * 1024.0)),
                write_mbs: sane(d_wsz as f64 * 512.0 / dt_s / (1024.0 * 1024.0)),
                read_iops: per_sec(d_rio, dt_s),
                write_iops: per_sec(d_wio, dt_s),
                avg_await_ms: sane((d_rt + d_wt) as f64 / (d_rio + d_wio).max(1) as f64),
                // Instantaneous: I/Os in flight on the newer snapshot.
                queue_depth: d.io_in_progress as f64,
                util_pct: clamp_pct(d_ticks as f64 / dt_ms as f64 * 100.0),
            });
        }
        out
    }

    fn derive_nets(&self, prev: &Snapshot, curr: &Snapshot, dt_s: f64) -> Vec<NetRate> {
        let mut out = Vec::with_capacity(curr.nets.len());
        for n in &curr.nets {
            let Some(p) = prev.nets.iter().find(|p| p.name == n.name) else {
                continue;
            };
            let rx_mbs = sane(delta(n.rx_bytes, p.rx_bytes) as f64 / dt_s / (1024.0 * 1024.0));
            let tx_mbs = sane(delta(n.tx_bytes, p.tx_bytes) as f64 / dt_s / (1024.0 * 1024.0));
            let util_pct = if n.speed_mbps > 0 {
                clamp_pct(rx_mbs.max(tx_mbs) * 8.0 / n.speed_mbps as f64 * 100.0)
            } else {
                0.0
            };
            out.push(NetRate {
                name: n.name.clone(),
                rx_mbs,
                tx_mbs,
                rx_pps: per_sec(delta(n.rx_packets, p.rx_packets), dt_s),
                tx_pps: per_sec(delta(n.tx_packets, p.tx_packets), dt_s),
                rx_drops_ps: per_sec(delta(n.rx_drop, p.rx_drop), dt_s),
                tx_drops_ps: per_sec(delta(n.tx_drop, p.tx_drop), dt_s),
                rx_errors_ps: per_sec(delta(n.rx_errs, p.rx_errs), dt_s),
                tx_errors_ps: per_sec(delta(n.tx_errs, p.tx_errs), dt_s),
                speed_mbps: n.speed_mbps,
                oper_state: n.oper_state.clone(),
                master: n.master.clone(),
                util_pct,
            });
        }
        out
    }

    fn derive_cgroups(&self, prev: &Snapshot, curr: &Snapshot, dt_s: f64) -> Vec<CgroupRate> {
        let wall_usec = dt_s * 1_000_000.0;
        let mut out = Vec::with_capacity(curr.cgroups.len());
        for cg in &curr.cgroups {
            let Some(p) = prev.cgroups.iter().find(|p| p.path == cg.path) else {
                continue;
            };
            let usage_d = delta(cg.cpu.usage_usec, p.cpu.usage_usec) as f64;
            let periods_d = delta(cg.cpu.nr_periods, p.cpu.nr_periods);
            let throttled_d = delta(cg.cpu.nr_throttled, p.cpu.nr_throttled);
            let throttle_pct = if periods_d > 0 {
                clamp_pct(throttled_d as f64 / periods_d as f64 * 100.0)
            } else {
                0.0
            };
            out.push(CgroupRate {
                name: cg.name.clone(),
                path: cg.path.clone(),
                cpu_pct: sane(usage_d / wall_usec * 100.0),
                throttle_pct,
                io_read_mbs: sane(delta(cg.io.rbytes, p.io.rbytes) as f64 / dt_s / (1024.0 * 1024.0)),
                io_write_mbs: sane(delta(cg.io.wbytes, p.io.wbytes) as f64 / dt_s / (1024.0 * 1024.0)),
            });
        }
        out
    }

    fn derive_processes(
        &self,
        prev: &Snapshot,
        curr: &Snapshot,
        dt_s: f64,
        total_jiffies_delta: u64,
    ) -> Vec<ProcessRate> {
        let num_cpus = curr.num_cpus() as f64;
        let mem_total_kb = curr.mem.total.max(1) as f64;
        let prev_by_pid: HashMap<u32, &crate::model::ProcessInfo> =
            prev.processes.iter().map(|p| (p.pid, p)).collect();

        let mut out = Vec::with_capacity(curr.processes.len());
        for proc in &curr.processes {
            let mut r = ProcessRate {
                pid: proc.pid,
                comm: proc.comm.clone(),
                state: proc.state,
                mem_pct: clamp_pct(proc.rss_kb as f64 / mem_total_kb * 100.0),
                rss_kb: proc.rss_kb,
                vm_swap_kb: proc.vm_swap_kb,
                num_threads: proc.num_threads,
                cgroup_path: proc.cgroup_path.clone(),
                write_path: proc.write_path.clone(),
                starttime: proc.starttime,
                ..Default::default()
            };

            // Deltas only against the same incarnation of the PID.
            if let Some(p) = prev_by_pid.get(&proc.pid)
                && p.starttime == proc.starttime
            {
                if total_jiffies_delta > 0 {
                    let d_jiffies = delta(proc.cpu_jiffies(), p.cpu_jiffies());
                    r.cpu_pct = sane(
                        d_jiffies as f64 / total_jiffies_delta as f64 * num_cpus * 100.0,
                    )
                    .min(num_cpus * 100.0);
                }
                r.read_mbs = sane(
                    delta(proc.read_bytes, p.read_bytes) as f64 / dt_s / (1024.0 * 1024.0),
                );
                r.write_mbs = sane(
                    delta(proc.write_bytes, p.write_bytes) as f64 / dt_s / (1024.0 * 1024.0),
                );
                r.ctx_switch_rate = per_sec(delta(proc.ctx_switches(), p.ctx_switches()), dt_s);
                r.majfault_rate = per_sec(delta(proc.maj_fault, p.maj_fault), dt_s);
            }
            out.push(r);
        }
        out
    }

    fn derive_mounts(&mut self, prev: &Snapshot, curr: &Snapshot, dt_s: f64) -> Vec<MountRate> {
        let mut out = Vec::with_capacity(curr.mounts.len());
        for m in &curr.mounts {
            let used_pct = clamp_pct(m.used_pct());
            let free_pct = clamp_pct(m.free_pct());
            let inode_used_pct = clamp_pct(m.inode_used_pct());

            let track = self.growth.entry(m.mount_point.clone()).or_default();
            let prev_growth_bps = track.ema_bps;

            if let Some(p) = prev.mounts.iter().find(|p| p.mount_point == m.mount_point) {
                let prev_used = p.total_bytes.saturating_sub(p.free_bytes);
                let curr_used = m.total_bytes.saturating_sub(m.free_bytes);
                // Growth may be negative when space is freed; the EMA is
                // allowed to decay through it and is floored at 0.
                let raw_bps = if dt_s > 0.0 {
                    (curr_used as f64 - prev_used as f64) / dt_s
                } else {
                    0.0
                };
                if track.samples == 0 {
                    track.ema_bps = raw_bps.max(0.0);
                } else {
                    track.ema_bps =
                        (GROWTH_EMA_ALPHA * raw_bps + (1.0 - GROWTH_EMA_ALPHA) * track.ema_bps)
                            .max(0.0);
                }
                track.samples += 1;
            }

            if track.ema_bps > GROWTH_FLOOR_BPS {
                track.started = true;
            } else if track.ema_bps <= 0.0 {
                track.started = false;
            }

            let eta_secs = if track.ema_bps > GROWTH_FLOOR_BPS {
                Some(sane(m.free_bytes as f64 / track.ema_bps))
            } else {
                None
            };

            let state = classify_mount(free_pct, inode_used_pct);

            out.push(MountRate {
                mount_point: m.mount_point.clone(),
                device: m.device.clone(),
                fs_type: m.fs_type.clone(),
                used_pct,
                free_pct,
                free_bytes: m.free_bytes,
                inode_used_pct,
                growth_bps: track.ema_bps,
                prev_growth_bps,
                growth_started: track.started,
                eta_secs,
                state,
            });
        }
        // Forget mounts that disappeared.
        self.growth
            .retain(|mp, _| curr.mounts.iter().any(|m| &m.mount_point == mp));
        out
    }
}

/// Mount state thresholds: OK above 15% free and <= 85% inodes used;
/// WARN below that; CRIT at <= 5% free or > 95% inodes used.
fn classify_mount(free_pct: f64, inode_used_pct: f64) -> MountState {
    if free_pct <= MOUNT_CRIT_FREE_PCT || inode_used_pct > MOUNT_CRIT_INODE_PCT {
        MountState::Crit
    } else if free_pct <= MOUNT_WARN_FREE_PCT || inode_used_pct > MOUNT_WARN_INODE_PCT {
        MountState::Warn
    } else {
        MountState::Ok
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        MountInfo, ProcessInfo, Snapshot, SystemCpuInfo, SystemDiskInfo, SystemNetInfo,
    };

    fn cpu(cpu_id: i16, user: u64, system: u64, idle: u64, iowait: u64) -> SystemCpuInfo {
        SystemCpuInfo {
            cpu_id,
            user,
            system,
            idle,
            iowait,
            ..Default::default()
        }
    }

    fn snap(ts_ms: i64) -> Snapshot {
        Snapshot {
            timestamp_ms: ts_ms,
            ..Default::default()
        }
    }

    #[test]
    fn cpu_percentages_from_core_deltas() {
        let mut prev = snap(0);
        prev.cpus = vec![cpu(-1, 0, 0, 0, 0), cpu(0, 100, 100, 800, 0), cpu(1, 100, 100, 800, 0)];
        let mut curr = snap(1000);
        curr.cpus = vec![
            cpu(-1, 0, 0, 0, 0),
            cpu(0, 150, 150, 850, 50),
            cpu(1, 150, 150, 850, 50),
        ];

        let r = RateDeriver::new().derive(&prev, &curr);
        assert_eq!(r.num_cpus, 2);
        // Deltas per core: user 50, system 50, idle 50, iowait 50 -> total 400.
        assert!((r.cpu_user_pct - 25.0).abs() < 1e-9);
        assert!((r.cpu_system_pct - 25.0).abs() < 1e-9);
        assert!((r.cpu_iowait_pct - 25.0).abs() < 1e-9);
        assert!((r.cpu_busy_pct - 75.0).abs() < 1e-9);
    }

    #[test]
    fn counter_reset_collapses_to_zero() {
        let mut prev = snap(0);
        prev.disks = vec![SystemDiskInfo {
            name: "sda".into(),
            rio: 1_000_000_000,
            rsz: 1_000_000_000,
            ..Default::default()
        }];
        let mut curr = snap(1000);
        curr.disks = vec![SystemDiskInfo {
            name: "sda".into(),
            rio: 0,
            rsz: 0,
            ..Default::default()
        }];

        let r = RateDeriver::new().derive(&prev, &curr);
        let d = &r.disks[0];
        assert_eq!(d.read_mbs, 0.0);
        assert_eq!(d.read_iops, 0.0);
        assert_eq!(d.util_pct, 0.0);
    }

    #[test]
    fn disk_rates_and_await() {
        let mut prev = snap(0);
        prev.disks = vec![SystemDiskInfo {
            name: "sda".into(),
            rio: 0,
            wio: 0,
            rsz: 0,
            wsz: 0,
            read_time_ms: 0,
            write_time_ms: 0,
            io_ticks_ms: 0,
            ..Default::default()
        }];
        let mut curr = snap(2000);
        curr.disks = vec![SystemDiskInfo {
            name: "sda".into(),
            rio: 100,
            wio: 100,
            rsz: 4096, // 2 MiB in sectors
            wsz: 4096,
            read_time_ms: 500,
            write_time_ms: 500,
            io_ticks_ms: 1000,
            ..Default::default()
        }];

        let r = RateDeriver::new().derive(&prev, &curr);
        let d = &r.disks[0];
        assert!((d.read_mbs - 1.0).abs() < 1e-9);
        assert!((d.write_mbs - 1.0).abs() < 1e-9);
        assert!((d.read_iops - 50.0).abs() < 1e-9);
        assert!((d.avg_await_ms - 5.0).abs() < 1e-9);
        assert!((d.util_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn net_util_needs_known_speed() {
        let mut prev = snap(0);
        prev.nets = vec![
            SystemNetInfo {
                name: "eth0".into(),
                speed_mbps: 1000,
                ..Default::default()
            },
            SystemNetInfo {
                name: "veth1".into(),
                speed_mbps: 0,
                ..Default::default()
            },
        ];
        let mut curr = prev.clone();
        curr.timestamp_ms = 1000;
        curr.nets[0].rx_bytes = 125 * 1024 * 1024; // 125 MiB/s -> 1000 Mbit/s
        curr.nets[1].rx_bytes = 125 * 1024 * 1024;

        let r = RateDeriver::new().derive(&prev, &curr);
        assert!((r.nets[0].util_pct - 100.0).abs() < 1e-9);
        assert_eq!(r.nets[1].util_pct, 0.0);
    }

    #[test]
    fn process_rates_skip_reused_pids() {
        let mut prev = snap(0);
        prev.mem.total = 1024 * 1024;
        prev.cpus = vec![cpu(0, 0, 0, 1000, 0)];
        prev.processes = vec![ProcessInfo {
            pid: 42,
            comm: "worker".into(),
            starttime: 100,
            write_bytes: 0,
            ..Default::default()
        }];
        let mut curr = snap(1000);
        curr.mem.total = 1024 * 1024;
        curr.cpus = vec![cpu(0, 500, 0, 1500, 0)];
        curr.processes = vec![ProcessInfo {
            pid: 42,
            comm: "other".into(),
            starttime: 999, // same PID, different incarnation
            write_bytes: 100 * 1024 * 1024,
            ..Default::default()
        }];

        let r = RateDeriver::new().derive(&prev, &curr);
        assert_eq!(r.processes[0].write_mbs, 0.0);
        assert_eq!(r.processes[0].cpu_pct, 0.0);
    }

    #[test]
    fn mount_growth_ema_and_eta() {
        let gib = 1024u64 * 1024 * 1024;
        let mk = |free: u64| MountInfo {
            mount_point: "/var".into(),
            device: "/dev/sda1".into(),
            fs_type: "ext4".into(),
            total_bytes: 100 * gib,
            free_bytes: free,
            inodes_total: 1000,
            inodes_free: 900,
        };

        let mut deriver = RateDeriver::new();
        let mut prev = snap(0);
        prev.mounts = vec![mk(50 * gib)];
        let mut curr = snap(1000);
        // 10 MiB/s consumption.
        curr.mounts = vec![mk(50 * gib - 10 * 1024 * 1024)];

        let r = deriver.derive(&prev, &curr);
        let m = &r.mounts[0];
        assert!(m.growth_bps > GROWTH_FLOOR_BPS);
        assert!(m.growth_started);
        let eta = m.eta_secs.expect("growth above floor yields an ETA");
        assert!(eta > 0.0 && eta.is_finite());
        assert_eq!(m.state, MountState::Ok);
    }

    #[test]
    fn mount_state_thresholds() {
        assert_eq!(classify_mount(50.0, 10.0), MountState::Ok);
        assert_eq!(classify_mount(15.0, 10.0), MountState::Warn);
        assert_eq!(classify_mount(50.0, 90.0), MountState::Warn);
        assert_eq!(classify_mount(5.0, 10.0), MountState::Crit);
        assert_eq!(classify_mount(50.0, 96.0), MountState::Crit);
    }

    #[test]
    fn dt_clamped_to_one_ms() {
        let prev = snap(1000);
        let curr = snap(1000);
        let r = RateDeriver::new().derive(&prev, &curr);
        assert_eq!(r.dt_ms, 1);
    }

    #[test]
    fn swap_rates_in_mb_per_sec() {
        let mut prev = snap(0);
        let mut curr = snap(1000);
        // 256 pages of 4 KiB = 1 MiB swapped in over 1 s.
        curr.vmstat.pswpin = 256;
        prev.vmstat.pswpin = 0;
        let r = RateDeriver::new().derive(&prev, &curr);
        assert!((r.swap_in_mbs - 1.0).abs() < 1e-9);
    }
}
