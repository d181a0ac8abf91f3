//! Disk I/O bottleneck evidence.

use super::{DomainRule, RuleContext, check, tally};
use crate::analysis::{Bottleneck, DomainScore};

const PSI_SOME_PCT: f32 = 5.0;
const PSI_FULL_PCT: f32 = 1.0;
const AWAIT_MS: f64 = 10.0;
const UTIL_PCT: f64 = 80.0;
const IOWAIT_FALLBACK_PCT: f64 = 15.0;

pub struct IoRule;

impl DomainRule for IoRule {
    fn bottleneck(&self) -> Bottleneck {
        Bottleneck::DiskIo
    }

    fn evaluate(&self, ctx: &RuleContext) -> DomainScore {
        let snap = ctx.snapshot;
        let rates = ctx.rates;

        let psi = &snap.psi.io;
        let dstate = snap.dstate_count();
        let worst_await = rates.worst_await_ms();
        let worst_util = rates.worst_disk_util_pct();

        let mut checks = vec![
            check(
                "io_psi_some",
                "IO pressure (some)",
                format!("{:.1}% avg10", psi.some_avg10),
                psi.some_avg10 > PSI_SOME_PCT,
                35,
            ),
            check(
                "io_psi_full",
                "IO pressure (full)",
                format!("{:.1}% avg10", psi.full_avg10),
                psi.full_avg10 > PSI_FULL_PCT,
                25,
            ),
            check(
                "io_dstate",
                "Tasks in uninterruptible sleep",
                format!("{dstate}"),
                dstate > 0,
                15,
            ),
            check(
                "io_await",
                "Worst device await",
                format!("{worst_await:.1} ms"),
                worst_await > AWAIT_MS,
                15,
            ),
            check(
                "io_util",
                "Worst device utilization",
                format!("{worst_util:.0}%"),
                worst_util > UTIL_PCT,
                10,
            ),
        ];

        // Fallback for kernels without PSI: iowait alone is a weak signal,
        // so it is flagged soft and costs confidence downstream.
        let mut iowait_check = check(
            "io_iowait_soft",
            "CPU iowait (no PSI)",
            format!("{:.1}%", rates.cpu_iowait_pct),
            psi.some_avg10 == 0.0 && rates.cpu_iowait_pct > IOWAIT_FALLBACK_PCT,
            10,
        );
        iowait_check.soft = true;
        checks.push(iowait_check);

        let (score, evidence_groups) = tally(&checks);

        let top = rates
            .processes
            .iter()
            .max_by(|a, b| (a.read_mbs + a.write_mbs).total_cmp(&(b.read_mbs + b.write_mbs)))
            .filter(|p| p.read_mbs + p.write_mbs > 0.0);
        let top_cgroup = rates
            .cgroups
            .iter()
            .max_by(|a, b| {
                (a.io_read_mbs + a.io_write_mbs).total_cmp(&(b.io_read_mbs + b.io_write_mbs))
            })
            .filter(|c| c.io_read_mbs + c.io_write_mbs > 0.0)
            .map(|c| c.path.clone())
            .unwrap_or_default();

        DomainScore {
            bottleneck: Bottleneck::DiskIo,
            score,
            evidence_groups,
            checks,
            top_process: top.map(|p| p.comm.clone()).unwrap_or_default(),
            top_pid: top.map(|p| p.pid).unwrap_or(0),
            top_cgroup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProcessInfo, Snapshot};
    use crate::rates::{DiskRate, RateSnapshot};

    #[test]
    fn saturated_disk_maxes_score() {
        let mut snap = Snapshot::default();
        snap.psi.io.some_avg10 = 40.0;
        snap.psi.io.full_avg10 = 20.0;
        for pid in 0..7 {
            snap.processes.push(ProcessInfo {
                pid,
                state: 'D',
                ..Default::default()
            });
        }
        let rates = RateSnapshot {
            disks: vec![DiskRate {
                name: "sda".into(),
                avg_await_ms: 55.0,
                util_pct: 95.0,
                ..Default::default()
            }],
            ..Default::default()
        };
        let ctx = RuleContext {
            snapshot: &snap,
            rates: &rates,
        };
        let d = IoRule.evaluate(&ctx);
        assert_eq!(d.score, 100);
        assert_eq!(d.evidence_groups, 5);
    }

    #[test]
    fn iowait_fallback_only_without_psi() {
        let mut snap = Snapshot::default();
        snap.psi.io.some_avg10 = 0.0;
        let rates = RateSnapshot {
            cpu_iowait_pct: 30.0,
            ..Default::default()
        };
        let ctx = RuleContext {
            snapshot: &snap,
            rates: &rates,
        };
        let d = IoRule.evaluate(&ctx);
        let soft = d.checks.iter().find(|c| c.id == "io_iowait_soft").unwrap();
        assert!(soft.passed && soft.soft);

        // With PSI reporting, the fallback stays quiet.
        snap.psi.io.some_avg10 = 12.0;
        let ctx = RuleContext {
            snapshot: &snap,
            rates: &rates,
        };
        let d = IoRule.evaluate(&ctx);
        let soft = d.checks.iter().find(|c| c.id == "io_iowait_soft").unwrap();
        assert!(!soft.passed);
    }
}
