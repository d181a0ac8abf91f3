//! Disk-space bottleneck evidence, one check per mount.

use super::{DomainRule, RuleContext, check};
use crate::analysis::{Bottleneck, DomainScore};
use crate::fmt::format_bytes;
use crate::rates::MountState;

pub struct DiskSpaceRule;

impl DomainRule for DiskSpaceRule {
    fn bottleneck(&self) -> Bottleneck {
        Bottleneck::DiskSpace
    }

    fn evaluate(&self, ctx: &RuleContext) -> DomainScore {
        let rates = ctx.rates;

        let mut checks = Vec::with_capacity(rates.mounts.len());
        let mut worst = MountState::Ok;
        let mut non_ok = 0u32;

        for m in &rates.mounts {
            let value = format!(
                "{:.1}% used, {} free, inodes {:.0}%",
                m.used_pct,
                format_bytes(m.free_bytes),
                m.inode_used_pct,
            );
            checks.push(check(
                "space_low",
                format!("Mount {} {}", m.mount_point, m.state),
                value,
                m.state != MountState::Ok,
                match m.state {
                    MountState::Crit => 80,
                    MountState::Warn => 50,
                    MountState::Ok => 0,
                },
            ));
            if m.state != MountState::Ok {
                non_ok += 1;
            }
            worst = worst.max(m.state);
        }

        let score = match worst {
            MountState::Crit => 80,
            MountState::Warn => 50,
            MountState::Ok => 0,
        };
        // A mount below 5% free is conclusive on its own; two evidence
        // groups let the verdict reach CRITICAL.
        let evidence_groups = if worst == MountState::Crit {
            non_ok.max(2)
        } else {
            non_ok
        };

        // Blame the top writer for space pressure.
        let top = rates
            .processes
            .iter()
            .max_by(|a, b| a.write_mbs.total_cmp(&b.write_mbs))
            .filter(|p| p.write_mbs > 0.0);

        DomainScore {
            bottleneck: Bottleneck::DiskSpace,
            score,
            evidence_groups,
            checks,
            top_process: top.map(|p| p.comm.clone()).unwrap_or_default(),
            top_pid: top.map(|p| p.pid).unwrap_or(0),
            top_cgroup: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Snapshot;
    use crate::rates::{MountRate, RateSnapshot};

    fn mount(mp: &str, state: MountState) -> MountRate {
        MountRate {
            mount_point: mp.into(),
            state,
            ..Default::default()
        }
    }

    #[test]
    fn crit_mount_scores_eighty_with_two_groups() {
        let snap = Snapshot::default();
        let rates = RateSnapshot {
            mounts: vec![mount("/", MountState::Ok), mount("/var", MountState::Crit)],
            ..Default::default()
        };
        let ctx = RuleContext {
            snapshot: &snap,
            rates: &rates,
        };
        let d = DiskSpaceRule.evaluate(&ctx);
        assert_eq!(d.score, 80);
        assert!(d.evidence_groups >= 2);
    }

    #[test]
    fn warn_mount_scores_fifty() {
        let snap = Snapshot::default();
        let rates = RateSnapshot {
            mounts: vec![mount("/", MountState::Warn)],
            ..Default::default()
        };
        let ctx = RuleContext {
            snapshot: &snap,
            rates: &rates,
        };
        let d = DiskSpaceRule.evaluate(&ctx);
        assert_eq!(d.score, 50);
        assert_eq!(d.evidence_groups, 1);
    }

    #[test]
    fn healthy_mounts_score_zero() {
        let snap = Snapshot::default();
        let rates = RateSnapshot {
            mounts: vec![mount("/", MountState::Ok)],
            ..Default::default()
        };
        let ctx = RuleContext {
            snapshot: &snap,
            rates: &rates,
        };
        let d = DiskSpaceRule.evaluate(&ctx);
        assert_eq!(d.score, 0);
        assert_eq!(d.evidence_groups, 0);
    }
}
