//! CPU bottleneck evidence.

use super::{DomainRule, RuleContext, check, tally};
use crate::analysis::{Bottleneck, DomainScore};

const PSI_SOME_PCT: f32 = 5.0;
const PSI_FULL_PCT: f32 = 1.0;
const RUNQ_PER_CORE: f64 = 1.5;
const CTXSW_PER_CORE: f64 = 30_000.0;
const THROTTLE_PCT: f64 = 5.0;

pub struct CpuRule;

impl DomainRule for CpuRule {
    fn bottleneck(&self) -> Bottleneck {
        Bottleneck::Cpu
    }

    fn evaluate(&self, ctx: &RuleContext) -> DomainScore {
        let snap = ctx.snapshot;
        let rates = ctx.rates;
        let num_cpus = snap.num_cpus() as f64;

        let psi = &snap.psi.cpu;
        let runq_ratio = snap.load.nr_running as f64 / num_cpus;
        let ctxsw_per_core = rates.ctx_switch_rate / num_cpus;
        let (throttled_name, throttle_pct) = rates
            .cgroups
            .iter()
            .map(|c| (c.name.as_str(), c.throttle_pct))
            .fold(("", 0.0_f64), |acc, it| if it.1 > acc.1 { it } else { acc });

        let checks = vec![
            check(
                "cpu_psi_some",
                "CPU pressure (some)",
                format!("{:.1}% avg10", psi.some_avg10),
                psi.some_avg10 > PSI_SOME_PCT,
                35,
            ),
            check(
                "cpu_psi_full",
                "CPU pressure (full)",
                format!("{:.1}% avg10", psi.full_avg10),
                psi.full_avg10 > PSI_FULL_PCT,
                20,
            ),
            check(
                "cpu_runq",
                "Run queue per core",
                format!("{runq_ratio:.1}"),
                runq_ratio > RUNQ_PER_CORE,
                15,
            ),
            check(
                "cpu_ctxsw",
                "Context switches per core",
                format!("{ctxsw_per_core:.0}/s"),
                ctxsw_per_core > CTXSW_PER_CORE,
                15,
            ),
            check(
                "cpu_throttle",
                "Cgroup CPU throttling",
                if throttled_name.is_empty() {
                    format!("{throttle_pct:.1}%")
                } else {
                    format!("{throttle_pct:.1}% ({throttled_name})")
                },
                throttle_pct > THROTTLE_PCT,
                15,
            ),
        ];

        let (score, evidence_groups) = tally(&checks);

        let top = rates
            .processes
            .iter()
            .max_by(|a, b| a.cpu_pct.total_cmp(&b.cpu_pct))
            .filter(|p| p.cpu_pct > 0.0);
        let top_cgroup = rates
            .cgroups
            .iter()
            .max_by(|a, b| a.cpu_pct.total_cmp(&b.cpu_pct))
            .filter(|c| c.cpu_pct > 0.0)
            .map(|c| c.path.clone())
            .unwrap_or_default();

        DomainScore {
            bottleneck: Bottleneck::Cpu,
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
    use crate::model::{Snapshot, SystemCpuInfo};
    use crate::rates::RateSnapshot;

    fn quiet() -> (Snapshot, RateSnapshot) {
        let mut snap = Snapshot::default();
        snap.cpus = vec![SystemCpuInfo {
            cpu_id: 0,
            ..Default::default()
        }];
        let rates = RateSnapshot {
            num_cpus: 1,
            ..Default::default()
        };
        (snap, rates)
    }

    #[test]
    fn quiet_system_scores_zero() {
        let (snap, rates) = quiet();
        let ctx = RuleContext {
            snapshot: &snap,
            rates: &rates,
        };
        let d = CpuRule.evaluate(&ctx);
        assert_eq!(d.score, 0);
        assert_eq!(d.evidence_groups, 0);
    }

    #[test]
    fn pressure_and_runqueue_accumulate() {
        let (mut snap, mut rates) = quiet();
        snap.psi.cpu.some_avg10 = 20.0;
        snap.psi.cpu.full_avg10 = 3.0;
        snap.load.nr_running = 4; // 4 runnable on 1 core
        rates.ctx_switch_rate = 50_000.0;

        let ctx = RuleContext {
            snapshot: &snap,
            rates: &rates,
        };
        let d = CpuRule.evaluate(&ctx);
        // 35 + 20 + 15 + 15
        assert_eq!(d.score, 85);
        assert_eq!(d.evidence_groups, 4);
    }
}
