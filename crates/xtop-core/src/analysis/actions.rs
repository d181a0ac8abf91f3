//! Canned next-step suggestions keyed on firing check families.

use super::{ActionItem, RcaCheck};

const MAX_ACTIONS: usize = 5;

/// Map a check family to its (summary, command) template.
fn template(id: &str) -> Option<(&'static str, &'static str)> {
    match id {
        "cpu_psi_some" | "cpu_psi_full" | "cpu_runq" => Some((
            "Identify top CPU consumers",
            "ps -eo pid,comm,%cpu --sort=-%cpu | head -15",
        )),
        "cpu_ctxsw" => Some((
            "Inspect context-switch-heavy tasks",
            "pidstat -w 1 5",
        )),
        "cpu_throttle" => Some((
            "Review the throttled cgroup's CPU quota",
            "cat /sys/fs/cgroup/<cgroup>/cpu.max",
        )),
        "mem_psi_some" | "mem_psi_full" => Some((
            "Identify top memory consumers",
            "ps -eo pid,comm,rss --sort=-rss | head -15",
        )),
        "mem_swap" | "mem_direct_reclaim" | "mem_majfault" => Some((
            "Watch reclaim and swap activity",
            "vmstat 1 10",
        )),
        "mem_oom" => Some((
            "Check which process the kernel killed",
            "dmesg -T | grep -i 'out of memory' | tail -5",
        )),
        "io_psi_some" | "io_psi_full" | "io_await" | "io_util" | "io_iowait_soft" => Some((
            "Identify the busiest devices and writers",
            "iostat -x 1 5",
        )),
        "io_dstate" => Some((
            "List tasks stuck in uninterruptible sleep",
            "ps -eo pid,comm,state,wchan | awk '$3==\"D\"'",
        )),
        "net_drops" | "net_softirq" => Some((
            "Check interface drops and softirq load",
            "ip -s link; cat /proc/net/softnet_stat",
        )),
        "net_retrans" => Some((
            "Inspect retransmitting connections",
            "ss -ti state established | head -40",
        )),
        "net_conntrack" => Some((
            "Review conntrack table sizing",
            "sysctl net.netfilter.nf_conntrack_count net.netfilter.nf_conntrack_max",
        )),
        "net_tcp_states" => Some((
            "Count connections per TCP state",
            "ss -tan | awk '{print $1}' | sort | uniq -c",
        )),
        "space_low" => Some((
            "Find what is filling the mount",
            "du -xh --max-depth=2 <mount> | sort -rh | head -20",
        )),
        _ => None,
    }
}

/// Emit deduplicated actions for firing checks, strongest evidence first,
/// truncated to five.
pub fn actions_for(checks: &[&RcaCheck]) -> Vec<ActionItem> {
    let mut sorted: Vec<&&RcaCheck> = checks.iter().filter(|c| c.passed).collect();
    sorted.sort_by(|a, b| b.weight.cmp(&a.weight));

    let mut out: Vec<ActionItem> = Vec::new();
    for check in sorted {
        let Some((summary, command)) = template(check.id) else {
            continue;
        };
        if out.iter().any(|a| a.summary == summary) {
            continue;
        }
        out.push(ActionItem {
            summary: summary.to_string(),
            command: command.to_string(),
        });
        if out.len() == MAX_ACTIONS {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn firing(id: &'static str, weight: u32) -> RcaCheck {
        RcaCheck {
            id,
            label: id.to_string(),
            value: String::new(),
            passed: true,
            weight,
            soft: false,
        }
    }

    #[test]
    fn dedup_and_order_by_weight() {
        let a = firing("io_psi_some", 35);
        let b = firing("io_await", 15); // same template as io_psi_some
        let c = firing("io_dstate", 15);
        let actions = actions_for(&[&a, &b, &c]);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].summary, "Identify the busiest devices and writers");
    }

    #[test]
    fn non_firing_checks_emit_nothing() {
        let mut c = firing("mem_oom", 0);
        c.passed = false;
        assert!(actions_for(&[&c]).is_empty());
    }

    #[test]
    fn truncated_to_five() {
        let checks = vec![
            firing("cpu_psi_some", 35),
            firing("cpu_ctxsw", 15),
            firing("cpu_throttle", 15),
            firing("mem_psi_some", 30),
            firing("mem_swap", 20),
            firing("mem_oom", 0),
            firing("net_retrans", 25),
        ];
        let refs: Vec<&RcaCheck> = checks.iter().collect();
        let actions = actions_for(&refs);
        assert_eq!(actions.len(), 5);
    }
}
