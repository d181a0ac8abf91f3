//! Network bottleneck evidence.

use super::{DomainRule, RuleContext, check, tally};
use crate::analysis::{Bottleneck, DomainScore};

const DROPS_PER_S: f64 = 1.0;
const RETRANS_PER_S: f64 = 5.0;
const CONNTRACK_PCT: f64 = 70.0;
const SOFTIRQ_CPU_PCT: f64 = 5.0;
const TIME_WAIT_HIGH: u32 = 5_000;
const CLOSE_WAIT_HIGH: u32 = 100;

pub struct NetworkRule;

impl DomainRule for NetworkRule {
    fn bottleneck(&self) -> Bottleneck {
        Bottleneck::Network
    }

    fn evaluate(&self, ctx: &RuleContext) -> DomainScore {
        let snap = ctx.snapshot;
        let rates = ctx.rates;

        let drops = rates.total_drops_ps();
        let conntrack_pct = snap.conntrack.used_pct();
        let tw = snap.tcp_states.time_wait;
        let cw = snap.tcp_states.close_wait;
        let state_anomaly = tw > TIME_WAIT_HIGH || cw > CLOSE_WAIT_HIGH;

        let checks = vec![
            check(
                "net_drops",
                "Packet drops",
                format!("{drops:.1}/s"),
                drops > DROPS_PER_S,
                35,
            ),
            check(
                "net_retrans",
                "TCP retransmissions",
                format!("{:.1}/s", rates.retrans_rate),
                rates.retrans_rate > RETRANS_PER_S,
                25,
            ),
            check(
                "net_conntrack",
                "Conntrack table usage",
                format!("{conntrack_pct:.0}%"),
                conntrack_pct > CONNTRACK_PCT,
                15,
            ),
            check(
                "net_softirq",
                "CPU in softirq",
                format!("{:.1}%", rates.cpu_softirq_pct),
                rates.cpu_softirq_pct > SOFTIRQ_CPU_PCT,
                15,
            ),
            check(
                "net_tcp_states",
                "TCP state anomaly",
                format!("TIME_WAIT {tw}, CLOSE_WAIT {cw}"),
                state_anomaly,
                10,
            ),
        ];

        let (score, evidence_groups) = tally(&checks);

        // Without per-socket accounting the best process proxy is I/O
        // volume; BPF probe findings refine this when present.
        let top = rates
            .processes
            .iter()
            .max_by(|a, b| (a.read_mbs + a.write_mbs).total_cmp(&(b.read_mbs + b.write_mbs)))
            .filter(|p| p.read_mbs + p.write_mbs > 0.0);

        DomainScore {
            bottleneck: Bottleneck::Network,
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
    use crate::rates::{NetRate, RateSnapshot};

    #[test]
    fn drops_and_retrans_score() {
        let snap = Snapshot::default();
        let rates = RateSnapshot {
            retrans_rate: 25.0,
            nets: vec![NetRate {
                name: "eth0".into(),
                rx_drops_ps: 5.0,
                tx_drops_ps: 1.0,
                ..Default::default()
            }],
            ..Default::default()
        };
        let ctx = RuleContext {
            snapshot: &snap,
            rates: &rates,
        };
        let d = NetworkRule.evaluate(&ctx);
        assert_eq!(d.score, 60);
        assert_eq!(d.evidence_groups, 2);
    }

    #[test]
    fn tcp_state_anomaly_thresholds() {
        let mut snap = Snapshot::default();
        snap.tcp_states.close_wait = 150;
        let rates = RateSnapshot::default();
        let ctx = RuleContext {
            snapshot: &snap,
            rates: &rates,
        };
        let d = NetworkRule.evaluate(&ctx);
        assert!(d.checks.iter().any(|c| c.id == "net_tcp_states" && c.passed));
        assert_eq!(d.score, 10);
    }
}
