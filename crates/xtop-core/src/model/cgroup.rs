//! Cgroup v2 accounting records.
//!
//! One record per discovered cgroup, collected by walking /sys/fs/cgroup.

use serde::{Deserialize, Serialize};

/// CPU accounting for one cgroup.
///
/// Source: `/sys/fs/cgroup/<path>/cpu.stat`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CgroupCpuStat {
    /// Total CPU usage in microseconds (`usage_usec`).
    pub usage_usec: u64,

    /// User CPU in microseconds (`user_usec`).
    pub user_usec: u64,

    /// System CPU in microseconds (`system_usec`).
    pub system_usec: u64,

    /// Enforcement periods elapsed (`nr_periods`).
    pub nr_periods: u64,

    /// Periods in which the group was throttled (`nr_throttled`).
    pub nr_throttled: u64,

    /// Total throttled time in microseconds (`throttled_usec`).
    pub throttled_usec: u64,
}

/// I/O accounting for one cgroup, summed across devices.
///
/// Source: `/sys/fs/cgroup/<path>/io.stat`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CgroupIoStat {
    pub rbytes: u64,
    pub wbytes: u64,
    pub rios: u64,
    pub wios: u64,
}

/// One cgroup's resource accounting.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CgroupInfo {
    /// Leaf name (e.g. `postgres.service`).
    pub name: String,

    /// Path relative to the cgroup root (e.g. `system.slice/postgres.service`).
    pub path: String,

    /// Current memory usage in bytes (`memory.current`).
    pub mem_current: u64,

    /// Memory limit in bytes; `u64::MAX` when unlimited (`memory.max`).
    pub mem_max: u64,

    /// Cumulative OOM kills (`oom_kill` in `memory.events`).
    pub oom_kills: u64,

    /// Live PIDs in the group (`pids.current`).
    pub pid_count: u64,

    pub cpu: CgroupCpuStat,

    pub io: CgroupIoStat,
}
