//! Per-domain evidence check sets.
//!
//! Each rule evaluates one bottleneck domain against the latest snapshot
//! and rates, producing a weighted, evidence-grouped [`DomainScore`]. The
//! order of [`all_rules`] is the primary tie-break order: earlier domains
//! win equal scores.

pub mod cpu;
pub mod disk_space;
pub mod io;
pub mod memory;
pub mod network;

use crate::model::Snapshot;
use crate::rates::RateSnapshot;

use super::{Bottleneck, DomainScore, RcaCheck};

/// Inputs shared by every rule evaluation.
pub struct RuleContext<'a> {
    pub snapshot: &'a Snapshot,
    pub rates: &'a RateSnapshot,
}

pub trait DomainRule: Send + Sync {
    fn bottleneck(&self) -> Bottleneck;
    fn evaluate(&self, ctx: &RuleContext) -> DomainScore;
}

/// All domain rules in tie-break order.
pub fn all_rules() -> Vec<Box<dyn DomainRule>> {
    vec![
        Box::new(cpu::CpuRule),
        Box::new(memory::MemoryRule),
        Box::new(io::IoRule),
        Box::new(network::NetworkRule),
        Box::new(disk_space::DiskSpaceRule),
    ]
}

/// Builds one evidence check. The weight doubles as the check's score
/// contribution when it fires.
pub(crate) fn check(
    id: &'static str,
    label: impl Into<String>,
    value: String,
    passed: bool,
    weight: u32,
) -> RcaCheck {
    RcaCheck {
        id,
        label: label.into(),
        value,
        passed,
        weight,
        soft: false,
    }
}

/// Sums firing checks into (score, evidence_groups).
pub(crate) fn tally(checks: &[RcaCheck]) -> (u32, u32) {
    let raw: u32 = checks.iter().filter(|c| c.passed).map(|c| c.weight).sum();
    let groups = checks.iter().filter(|c| c.passed).count() as u32;
    (raw.min(100), groups)
}
