//! Memory bottleneck evidence.

use super::{DomainRule, RuleContext, check, tally};
use crate::analysis::{Bottleneck, DomainScore};

const PSI_SOME_PCT: f32 = 5.0;
const PSI_FULL_PCT: f32 = 1.0;
const SWAP_MBS: f64 = 0.1;
const MAJFAULT_PER_S: f64 = 10.0;

pub struct MemoryRule;

impl DomainRule for MemoryRule {
    fn bottleneck(&self) -> Bottleneck {
        Bottleneck::Memory
    }

    fn evaluate(&self, ctx: &RuleContext) -> DomainScore {
        let snap = ctx.snapshot;
        let rates = ctx.rates;

        let psi = &snap.psi.memory;
        let swap_mbs = rates.swap_in_mbs + rates.swap_out_mbs;
        let scanned = rates.direct_reclaim_pages_s + rates.kswapd_pages_s;
        let direct_ratio = if scanned > 0.0 {
            rates.direct_reclaim_pages_s / scanned
        } else {
            0.0
        };
        let oom_delta = rates.oom_kill_delta;

        let mut checks = vec![
            check(
                "mem_psi_some",
                "Memory pressure (some)",
                format!("{:.1}% avg10", psi.some_avg10),
                psi.some_avg10 > PSI_SOME_PCT,
                30,
            ),
            check(
                "mem_psi_full",
                "Memory pressure (full)",
                format!("{:.1}% avg10", psi.full_avg10),
                psi.full_avg10 > PSI_FULL_PCT,
                25,
            ),
            check(
                "mem_swap",
                "Swap traffic",
                format!("{swap_mbs:.2} MB/s"),
                swap_mbs > SWAP_MBS,
                20,
            ),
            check(
                "mem_direct_reclaim",
                "Direct reclaim share",
                format!("{:.0}%", direct_ratio * 100.0),
                direct_ratio > 0.0,
                15,
            ),
            check(
                "mem_majfault",
                "Major fault rate",
                format!("{:.1}/s", rates.majfault_rate),
                rates.majfault_rate > MAJFAULT_PER_S,
                10,
            ),
        ];

        let (mut score, mut evidence_groups) = tally(&checks);

        // An OOM kill in the interval is conclusive on its own: it forces
        // the maximum score rather than adding a weight.
        checks.push(check(
            "mem_oom",
            "OOM kills",
            format!("{oom_delta} in interval"),
            oom_delta > 0,
            0,
        ));
        if oom_delta > 0 {
            score = 100;
            evidence_groups = evidence_groups.max(2);
        }

        let top = snap
            .processes
            .iter()
            .max_by_key(|p| p.rss_kb)
            .filter(|p| p.rss_kb > 0);
        let top_cgroup = snap
            .cgroups
            .iter()
            .max_by_key(|c| c.mem_current)
            .filter(|c| c.mem_current > 0)
            .map(|c| c.path.clone())
            .unwrap_or_default();

        DomainScore {
            bottleneck: Bottleneck::Memory,
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
    use crate::model::Snapshot;
    use crate::rates::RateSnapshot;

    #[test]
    fn oom_kill_overrides_low_signals() {
        let snap = Snapshot::default();
        let rates = RateSnapshot {
            oom_kill_delta: 1,
            ..Default::default()
        };
        let ctx = RuleContext {
            snapshot: &snap,
            rates: &rates,
        };
        let d = MemoryRule.evaluate(&ctx);
        assert_eq!(d.score, 100);
        assert!(d.evidence_groups >= 2);
        assert!(d.checks.iter().any(|c| c.id == "mem_oom" && c.passed));
    }

    #[test]
    fn swap_and_reclaim_fire() {
        let snap = Snapshot::default();
        let rates = RateSnapshot {
            swap_in_mbs: 0.5,
            swap_out_mbs: 0.2,
            direct_reclaim_pages_s: 100.0,
            kswapd_pages_s: 300.0,
            ..Default::default()
        };
        let ctx = RuleContext {
            snapshot: &snap,
            rates: &rates,
        };
        let d = MemoryRule.evaluate(&ctx);
        // swap (20) + direct reclaim (15)
        assert_eq!(d.score, 35);
        assert_eq!(d.evidence_groups, 2);
    }
}
