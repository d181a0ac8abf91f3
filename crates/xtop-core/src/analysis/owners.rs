//! Bottleneck ownership attribution: who is using each resource.
//!
//! Cgroups are preferred as owners where they carry the relevant
//! accounting; processes are the fallback. Each list holds up to three
//! entries with a short formatted value, ties broken by name.

use crate::fmt::{format_bytes, format_mbs, format_pct};
use crate::model::Snapshot;
use crate::rates::RateSnapshot;

use super::OwnerEntry;

const MAX_OWNERS: usize = 3;

/// The four owner lists of an analysis result.
#[derive(Debug, Default, Clone)]
pub struct Owners {
    pub cpu: Vec<OwnerEntry>,
    pub mem: Vec<OwnerEntry>,
    pub io: Vec<OwnerEntry>,
    pub net: Vec<OwnerEntry>,
}

/// Ranks owners per resource from the latest snapshot and rates.
pub fn attribute(snapshot: &Snapshot, rates: &RateSnapshot) -> Owners {
    Owners {
        cpu: cpu_owners(rates),
        mem: mem_owners(snapshot),
        io: io_owners(rates),
        net: net_owners(snapshot, rates),
    }
}

fn top_entries<T>(
    items: &[T],
    metric: impl Fn(&T) -> f64,
    name: impl Fn(&T) -> String,
    format: impl Fn(f64) -> String,
) -> Vec<OwnerEntry> {
    let mut scored: Vec<(String, f64)> = items
        .iter()
        .map(|it| (name(it), metric(it)))
        .filter(|(_, v)| *v > 0.0)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored
        .into_iter()
        .take(MAX_OWNERS)
        .map(|(name, v)| OwnerEntry {
            name,
            value: format(v),
        })
        .collect()
}

fn cpu_owners(rates: &RateSnapshot) -> Vec<OwnerEntry> {
    let by_cgroup = top_entries(
        &rates.cgroups,
        |c| c.cpu_pct,
        |c| c.name.clone(),
        format_pct,
    );
    if !by_cgroup.is_empty() {
        return by_cgroup;
    }
    top_entries(
        &rates.processes,
        |p| p.cpu_pct,
        |p| p.comm.clone(),
        format_pct,
    )
}

fn mem_owners(snapshot: &Snapshot) -> Vec<OwnerEntry> {
    let by_cgroup = top_entries(
        &snapshot.cgroups,
        |c| c.mem_current as f64,
        |c| c.name.clone(),
        |v| format_bytes(v as u64),
    );
    if !by_cgroup.is_empty() {
        return by_cgroup;
    }
    top_entries(
        &snapshot.processes,
        |p| p.rss_kb as f64,
        |p| p.comm.clone(),
        |v| format_bytes(v as u64 * 1024),
    )
}

fn io_owners(rates: &RateSnapshot) -> Vec<OwnerEntry> {
    let by_cgroup = top_entries(
        &rates.cgroups,
        |c| c.io_read_mbs + c.io_write_mbs,
        |c| c.name.clone(),
        format_mbs,
    );
    if !by_cgroup.is_empty() {
        return by_cgroup;
    }
    top_entries(
        &rates.processes,
        |p| p.read_mbs + p.write_mbs,
        |p| p.comm.clone(),
        format_mbs,
    )
}

fn net_owners(snapshot: &Snapshot, rates: &RateSnapshot) -> Vec<OwnerEntry> {
    // Real per-process socket bytes when the BPF sentinel ran.
    if let Some(sentinel) = &snapshot.sentinel
        && !sentinel.net_by_pid.is_empty()
    {
        return top_entries(
            &sentinel.net_by_pid,
            |s| (s.rx_bytes + s.tx_bytes) as f64,
            |s| s.comm.clone(),
            |v| format_bytes(v as u64),
        );
    }
    // Otherwise I/O volume is the best per-process proxy.
    top_entries(
        &rates.processes,
        |p| p.read_mbs + p.write_mbs,
        |p| p.comm.clone(),
        format_mbs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::{CgroupRate, ProcessRate};

    #[test]
    fn cgroups_preferred_over_processes() {
        let snap = Snapshot::default();
        let rates = RateSnapshot {
            cgroups: vec![CgroupRate {
                name: "web.service".into(),
                cpu_pct: 40.0,
                ..Default::default()
            }],
            processes: vec![ProcessRate {
                comm: "nginx".into(),
                cpu_pct: 38.0,
                ..Default::default()
            }],
            ..Default::default()
        };
        let owners = attribute(&snap, &rates);
        assert_eq!(owners.cpu[0].name, "web.service");
        assert_eq!(owners.cpu[0].value, "40.0%");
    }

    #[test]
    fn process_fallback_and_tie_break() {
        let snap = Snapshot::default();
        let mk = |comm: &str| ProcessRate {
            comm: comm.into(),
            cpu_pct: 10.0,
            ..Default::default()
        };
        let rates = RateSnapshot {
            processes: vec![mk("beta"), mk("alpha")],
            ..Default::default()
        };
        let owners = attribute(&snap, &rates);
        // Equal values sort by name ascending.
        assert_eq!(owners.cpu[0].name, "alpha");
        assert_eq!(owners.cpu[1].name, "beta");
    }

    #[test]
    fn net_owners_prefer_sentinel_bytes() {
        let mut snap = Snapshot::default();
        snap.sentinel = Some(crate::model::SentinelInfo {
            net_by_pid: vec![crate::model::SentinelNetInfo {
                pid: 12,
                comm: "proxy".into(),
                rx_bytes: 3 * 1024 * 1024,
                tx_bytes: 1024 * 1024,
            }],
        });
        let rates = RateSnapshot {
            processes: vec![ProcessRate {
                comm: "dd".into(),
                write_mbs: 500.0,
                ..Default::default()
            }],
            ..Default::default()
        };
        let owners = attribute(&snap, &rates);
        assert_eq!(owners.net[0].name, "proxy");
        assert_eq!(owners.net[0].value, "4 MiB");
        // The proxy fallback still ranks I/O when no sentinel ran.
        let owners = attribute(&Snapshot::default(), &rates);
        assert_eq!(owners.net[0].name, "dd");
    }

    #[test]
    fn lists_are_bounded() {
        let snap = Snapshot::default();
        let rates = RateSnapshot {
            processes: (0..10)
                .map(|i| ProcessRate {
                    comm: format!("p{i}"),
                    cpu_pct: (i + 1) as f64,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        let owners = attribute(&snap, &rates);
        assert_eq!(owners.cpu.len(), 3);
        assert_eq!(owners.cpu[0].name, "p9");
    }
}
