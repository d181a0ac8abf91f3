//! The full-instant snapshot record.
//!
//! A `Snapshot` is a complete picture of the system at one moment. It is
//! produced by the collector, consumed (together with its predecessor) by
//! the rate deriver, and stored immutably in the history ring. Cumulative
//! kernel counters are kept raw so derivation can detect counter resets.

use serde::{Deserialize, Serialize};

use super::cgroup::CgroupInfo;
use super::process::{
    BigFileInfo, DeletedOpenInfo, DiagnosticFinding, ProcessInfo, SecurityInfo, SentinelInfo,
    SessionInfo,
};
use super::system::{
    ConntrackInfo, EphemeralPortsInfo, FileHandleInfo, MountInfo, SocketsInfo, SoftirqInfo,
    SysIdentity, SystemCpuInfo, SystemDiskInfo, SystemLoadInfo, SystemMemInfo, SystemNetInfo,
    SystemNetSnmpInfo, SystemPsiInfo, SystemStatInfo, SystemVmstatInfo, TcpStateCounts,
};

/// A point-in-time capture of all collected metrics.
///
/// Immutable once returned from the tick pipeline; the history ring hands
/// out shared references only.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Snapshot {
    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,

    /// Host identity.
    pub sys: SysIdentity,

    /// Aggregate (`cpu_id == -1`) plus per-core CPU counters.
    pub cpus: Vec<SystemCpuInfo>,

    pub load: SystemLoadInfo,

    pub stat: SystemStatInfo,

    pub mem: SystemMemInfo,

    pub vmstat: SystemVmstatInfo,

    pub psi: SystemPsiInfo,

    pub disks: Vec<SystemDiskInfo>,

    pub nets: Vec<SystemNetInfo>,

    pub snmp: SystemNetSnmpInfo,

    pub tcp_states: TcpStateCounts,

    pub sockets: SocketsInfo,

    pub softirq: SoftirqInfo,

    pub conntrack: ConntrackInfo,

    pub ephemeral_ports: EphemeralPortsInfo,

    pub file_handles: FileHandleInfo,

    pub mounts: Vec<MountInfo>,

    pub cgroups: Vec<CgroupInfo>,

    /// Bounded to the top N processes by relevance (CPU + I/O + RSS).
    pub processes: Vec<ProcessInfo>,

    pub big_files: Vec<BigFileInfo>,

    pub deleted_open: Vec<DeletedOpenInfo>,

    /// Populated by external collectors when available.
    pub sessions: Vec<SessionInfo>,

    /// Populated by external collectors when available.
    pub diagnostics: Vec<DiagnosticFinding>,

    /// Populated by external collectors when available.
    pub security: SecurityInfo,

    /// eBPF-derived extras; `None` without BPF support.
    pub sentinel: Option<SentinelInfo>,

    /// Human-readable errors from probes that failed this tick. A failed
    /// probe zeroes its section; it never aborts the snapshot.
    pub errors: Vec<String>,
}

impl Snapshot {
    /// Number of CPU cores, never less than 1.
    pub fn num_cpus(&self) -> usize {
        self.cpus.iter().filter(|c| c.cpu_id >= 0).count().max(1)
    }

    /// The aggregate CPU line, if the collector produced one.
    pub fn aggregate_cpu(&self) -> Option<&SystemCpuInfo> {
        self.cpus.iter().find(|c| c.cpu_id == -1)
    }

    /// Count of processes in uninterruptible sleep.
    pub fn dstate_count(&self) -> usize {
        self.processes.iter().filter(|p| p.state == 'D').count()
    }

    /// Total cumulative OOM kills visible to this snapshot: the global
    /// vmstat counter plus per-cgroup memory.events counters.
    pub fn oom_kill_total(&self) -> u64 {
        self.vmstat.oom_kill + self.cgroups.iter().map(|c| c.oom_kills).sum::<u64>()
    }
}
