//! Counter collection: builds a [`Snapshot`] for one instant.
//!
//! The collector is best-effort: a failed probe records a human-readable
//! error on the snapshot and leaves its section at the zero default. Only
//! an unreadable /proc root is fatal, because nothing useful can be
//! sampled without it.

pub mod cgroup;
pub mod mock;
pub mod procfs;
pub mod traits;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::model::Snapshot;

pub use cgroup::CgroupCollector;
pub use mock::MockFs;
pub use procfs::{ProcessCollector, SystemCollector};
pub use traits::{FileSystem, FsUsage, RealFs};

/// Collection failure.
#[derive(Debug)]
pub enum CollectError {
    /// The /proc root cannot be read at all; the pipeline cannot run.
    ProcUnavailable(PathBuf),
    /// I/O error on an essential read.
    Io(std::io::Error),
    /// A file existed but could not be understood.
    Parse(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::ProcUnavailable(path) => {
                write!(f, "proc filesystem not readable at {}", path.display())
            }
            CollectError::Io(e) => write!(f, "I/O error: {e}"),
            CollectError::Parse(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<std::io::Error> for CollectError {
    fn from(e: std::io::Error) -> Self {
        CollectError::Io(e)
    }
}

/// Anything that can produce snapshots for the ticker: the live
/// collector in production, fixtures in tests, a replay reader offline.
pub trait SnapshotSource {
    fn collect(&mut self) -> Result<Snapshot, CollectError>;
}

/// The live collector over a [`FileSystem`].
pub struct Collector<F: FileSystem + Clone> {
    fs: F,
    proc_path: PathBuf,
    sys_class_net: PathBuf,
    system: SystemCollector<F>,
    processes: ProcessCollector<F>,
    cgroups: Option<CgroupCollector<F>>,
}

impl<F: FileSystem + Clone> Collector<F> {
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        let proc_path = proc_path.into();
        Self {
            system: SystemCollector::new(fs.clone(), proc_path.clone()),
            processes: ProcessCollector::new(fs.clone(), proc_path.clone()),
            cgroups: None,
            sys_class_net: PathBuf::from("/sys/class/net"),
            fs,
            proc_path,
        }
    }

    /// Enable cgroup collection rooted at the given path.
    pub fn with_cgroup(mut self, root: impl Into<PathBuf>) -> Self {
        self.cgroups = Some(CgroupCollector::new(self.fs.clone(), root));
        self
    }

    /// Bound the snapshot's process table.
    pub fn with_process_limit(mut self, limit: usize) -> Self {
        self.processes = ProcessCollector::new(self.fs.clone(), self.proc_path.clone())
            .with_limit(limit);
        self
    }

    /// Override the /sys/class/net location (tests).
    pub fn with_sys_class_net(mut self, path: impl Into<PathBuf>) -> Self {
        self.sys_class_net = path.into();
        self
    }

    /// Build a full snapshot. Individual probe failures land on
    /// `snapshot.errors`; only a missing /proc root fails the call.
    pub fn collect_snapshot(&mut self) -> Result<Snapshot, CollectError> {
        if !self.fs.exists(&self.proc_path) {
            return Err(CollectError::ProcUnavailable(self.proc_path.clone()));
        }

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let mut snap = Snapshot {
            timestamp_ms,
            ..Default::default()
        };
        let record = |errors: &mut Vec<String>, probe: &str, e: &dyn std::fmt::Display| {
            debug!(probe, error = %e, "probe failed");
            errors.push(format!("{probe}: {e}"));
        };

        snap.sys = self.system.collect_identity();

        match self.system.collect_stat() {
            Ok((cpus, stat)) => {
                snap.cpus = cpus;
                snap.stat = stat;
            }
            Err(e) => record(&mut snap.errors, "stat", &e),
        }
        match self.system.collect_loadavg() {
            Ok(load) => snap.load = load,
            Err(e) => record(&mut snap.errors, "loadavg", &e),
        }
        match self.system.collect_meminfo() {
            Ok(mem) => snap.mem = mem,
            Err(e) => record(&mut snap.errors, "meminfo", &e),
        }
        match self.system.collect_vmstat() {
            Ok(vm) => snap.vmstat = vm,
            Err(e) => record(&mut snap.errors, "vmstat", &e),
        }
        snap.psi = self.system.collect_psi();
        match self.system.collect_diskstats() {
            Ok(disks) => snap.disks = disks,
            Err(e) => record(&mut snap.errors, "diskstats", &e),
        }
        match self.system.collect_net_dev(&self.sys_class_net) {
            Ok(nets) => snap.nets = nets,
            Err(e) => record(&mut snap.errors, "netdev", &e),
        }
        match self.system.collect_net_snmp() {
            Ok(snmp) => snap.snmp = snmp,
            Err(e) => record(&mut snap.errors, "netsnmp", &e),
        }
        let (tcp_states, ports) = self.system.collect_tcp();
        snap.tcp_states = tcp_states;
        snap.ephemeral_ports = ports;
        match self.system.collect_sockstat() {
            Ok(sockets) => snap.sockets = sockets,
            Err(e) => record(&mut snap.errors, "sockstat", &e),
        }
        match self.system.collect_softirqs() {
            Ok(softirq) => snap.softirq = softirq,
            Err(e) => record(&mut snap.errors, "softirqs", &e),
        }
        snap.conntrack = self.system.collect_conntrack();
        match self.system.collect_file_nr() {
            Ok(fd) => snap.file_handles = fd,
            Err(e) => record(&mut snap.errors, "file-nr", &e),
        }
        match self.system.collect_mounts() {
            Ok(mounts) => snap.mounts = mounts,
            Err(e) => record(&mut snap.errors, "mounts", &e),
        }
        match self.processes.collect() {
            Ok((processes, deleted)) => {
                snap.processes = processes;
                snap.deleted_open = deleted;
            }
            Err(e) => record(&mut snap.errors, "processes", &e),
        }
        if let Some(cgroups) = &self.cgroups {
            snap.cgroups = cgroups.collect();
        }

        Ok(snap)
    }
}

impl<F: FileSystem + Clone> SnapshotSource for Collector<F> {
    fn collect(&mut self) -> Result<Snapshot, CollectError> {
        self.collect_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_snapshot_from_fixture() {
        let fs = MockFs::typical_system();
        let mut collector = Collector::new(fs, "/proc").with_cgroup("/sys/fs/cgroup");
        let snap = collector.collect_snapshot().unwrap();

        assert!(snap.errors.is_empty(), "unexpected errors: {:?}", snap.errors);
        assert_eq!(snap.sys.hostname, "testhost");
        assert_eq!(snap.num_cpus(), 2);
        assert!(snap.aggregate_cpu().is_some());
        assert_eq!(snap.mem.total, 16_384_000);
        assert!((snap.psi.io.some_avg10 - 0.8).abs() < 1e-6);
        assert_eq!(snap.disks.len(), 2);
        assert_eq!(snap.nets.len(), 1);
        assert_eq!(snap.nets[0].speed_mbps, 1000);
        assert_eq!(snap.nets[0].oper_state, "up");
        assert_eq!(snap.tcp_states.established, 1);
        assert_eq!(snap.ephemeral_ports.in_use, 2);
        assert_eq!(snap.conntrack.max, 262_144);
        assert_eq!(snap.file_handles.allocated, 2944);
        assert_eq!(snap.mounts.len(), 2);
        assert_eq!(snap.processes.len(), 3);
        assert_eq!(snap.dstate_count(), 1);
        assert!(!snap.cgroups.is_empty());
        assert_eq!(snap.deleted_open.len(), 1);
    }

    #[test]
    fn probe_failure_is_recorded_not_fatal() {
        // Take away meminfo; the rest of the snapshot must still build.
        let mut fs = MockFs::typical_system();
        fs.remove_file("/proc/meminfo");
        let mut collector = Collector::new(fs, "/proc");
        let snap = collector.collect_snapshot().unwrap();
        assert_eq!(snap.mem.total, 0);
        assert!(snap.errors.iter().any(|e| e.starts_with("meminfo:")));
        assert!(!snap.cpus.is_empty());
    }

    #[test]
    fn missing_proc_root_is_fatal() {
        let fs = MockFs::new();
        let mut collector = Collector::new(fs, "/proc");
        assert!(matches!(
            collector.collect_snapshot(),
            Err(CollectError::ProcUnavailable(_))
        ));
    }
}
