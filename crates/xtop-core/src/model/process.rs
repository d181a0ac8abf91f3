//! Per-process and per-file records collected from /proc/<pid>.

use serde::{Deserialize, Serialize};

/// Per-process information.
///
/// Sources: `/proc/<pid>/stat`, `/proc/<pid>/status`, `/proc/<pid>/io`,
/// `/proc/<pid>/cgroup`, `/proc/<pid>/fd`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ProcessInfo {
    pub pid: u32,

    /// Executable name from `/proc/<pid>/stat` field 2, parens stripped.
    pub comm: String,

    /// One-letter scheduler state (R, S, D, Z, T, ...).
    /// Source: `/proc/<pid>/stat` field 3
    pub state: char,

    /// Resident set size in kilobytes.
    /// Source: `VmRSS` in `/proc/<pid>/status`
    pub rss_kb: u64,

    /// Swapped-out size in kilobytes.
    /// Source: `VmSwap` in `/proc/<pid>/status`
    pub vm_swap_kb: u64,

    /// Source: `Threads` in `/proc/<pid>/status`
    pub num_threads: u32,

    /// Cgroup v2 path this process belongs to.
    /// Source: `/proc/<pid>/cgroup`
    pub cgroup_path: String,

    /// Cumulative user-mode jiffies.
    /// Source: `/proc/<pid>/stat` field 14
    pub utime: u64,

    /// Cumulative kernel-mode jiffies.
    /// Source: `/proc/<pid>/stat` field 15
    pub stime: u64,

    /// Process start time in jiffies after boot. This is the identity
    /// token used to detect PID reuse.
    /// Source: `/proc/<pid>/stat` field 22
    pub starttime: u64,

    /// Cumulative bytes read from the block layer.
    /// Source: `read_bytes` in `/proc/<pid>/io`
    pub read_bytes: u64,

    /// Cumulative bytes written to the block layer.
    /// Source: `write_bytes` in `/proc/<pid>/io`
    pub write_bytes: u64,

    /// Best-effort path of the file this process is writing to, resolved
    /// from `/proc/<pid>/fd` for active writers; empty when unknown.
    pub write_path: String,

    /// Cumulative major faults.
    /// Source: `/proc/<pid>/stat` field 12
    pub maj_fault: u64,

    /// Source: `voluntary_ctxt_switches` in `/proc/<pid>/status`
    pub vol_ctx_switches: u64,

    /// Source: `nonvoluntary_ctxt_switches` in `/proc/<pid>/status`
    pub nonvol_ctx_switches: u64,
}

impl ProcessInfo {
    pub fn cpu_jiffies(&self) -> u64 {
        self.utime + self.stime
    }

    pub fn ctx_switches(&self) -> u64 {
        self.vol_ctx_switches + self.nonvol_ctx_switches
    }
}

/// An open file whose backing inode has been unlinked; its space is only
/// released once the holder closes it.
///
/// Source: `(deleted)` targets in `/proc/<pid>/fd`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DeletedOpenInfo {
    pub pid: u32,
    pub comm: String,
    pub path: String,
    pub size_bytes: u64,
}

/// A notably large open file, used as disk-space evidence.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct BigFileInfo {
    pub path: String,
    pub size_bytes: u64,
    pub mount_point: String,
}

/// A logged-in session; populated by an external collector.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SessionInfo {
    pub user: String,
    pub tty: String,
    pub remote: String,
}

/// A per-service diagnostic finding; populated by an external collector.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DiagnosticFinding {
    pub service: String,
    pub finding: String,
}

/// Security observations; populated by an external collector.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SecurityInfo {
    /// Failed authentication attempts since boot.
    pub failed_logins: u64,
    /// Locally listening TCP ports.
    pub listening_ports: Vec<u16>,
}

/// Per-process socket traffic from the eBPF sentinel.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SentinelNetInfo {
    pub pid: u32,
    pub comm: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Extras only an eBPF collector can provide; absent on kernels without
/// BPF support.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SentinelInfo {
    pub net_by_pid: Vec<SentinelNetInfo>,
}
