//! System-wide collection from /proc, /sys/class/net, and statvfs.

use std::path::{Path, PathBuf};

use crate::collector::traits::FileSystem;
use crate::model::{
    ConntrackInfo, EphemeralPortsInfo, FileHandleInfo, MountInfo, SocketsInfo, SoftirqInfo,
    SysIdentity, SystemCpuInfo, SystemDiskInfo, SystemLoadInfo, SystemMemInfo, SystemNetInfo,
    SystemNetSnmpInfo, SystemPsiInfo, SystemStatInfo, SystemVmstatInfo, TcpStateCounts,
};

use super::parser;

/// Collects everything that is not per-process.
pub struct SystemCollector<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
}

impl<F: FileSystem> SystemCollector<F> {
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    fn read(&self, rel: &str) -> std::io::Result<String> {
        self.fs.read_to_string(&self.proc_path.join(rel))
    }

    pub fn collect_stat(&self) -> std::io::Result<(Vec<SystemCpuInfo>, SystemStatInfo)> {
        Ok(parser::parse_stat(&self.read("stat")?))
    }

    pub fn collect_loadavg(&self) -> std::io::Result<SystemLoadInfo> {
        Ok(parser::parse_loadavg(&self.read("loadavg")?))
    }

    pub fn collect_meminfo(&self) -> std::io::Result<SystemMemInfo> {
        Ok(parser::parse_meminfo(&self.read("meminfo")?))
    }

    pub fn collect_vmstat(&self) -> std::io::Result<SystemVmstatInfo> {
        Ok(parser::parse_vmstat(&self.read("vmstat")?))
    }

    /// PSI for all three resources; absent files yield zeroed records
    /// rather than an error (pre-4.20 kernels).
    pub fn collect_psi(&self) -> SystemPsiInfo {
        let read = |name: &str| {
            self.read(&format!("pressure/{name}"))
                .map(|c| parser::parse_psi_resource(&c))
                .unwrap_or_default()
        };
        SystemPsiInfo {
            cpu: read("cpu"),
            memory: read("memory"),
            io: read("io"),
        }
    }

    pub fn collect_diskstats(&self) -> std::io::Result<Vec<SystemDiskInfo>> {
        Ok(parser::parse_diskstats(&self.read("diskstats")?))
    }

    /// Interface counters plus link metadata from /sys/class/net.
    pub fn collect_net_dev(&self, sys_class_net: &Path) -> std::io::Result<Vec<SystemNetInfo>> {
        let mut nets = parser::parse_net_dev(&self.read("net/dev")?);
        for net in &mut nets {
            let ifdir = sys_class_net.join(&net.name);
            let read_sys = |name: &str| {
                self.fs
                    .read_to_string(&ifdir.join(name))
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default()
            };
            net.oper_state = read_sys("operstate");
            // speed reads -1 for links without a negotiated rate.
            net.speed_mbps = read_sys("speed").parse::<i64>().unwrap_or(0).max(0) as u64;
            net.if_type = read_sys("type").parse().unwrap_or(0);
            net.master = self
                .fs
                .read_link(&ifdir.join("master"))
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_default();
        }
        Ok(nets)
    }

    pub fn collect_net_snmp(&self) -> std::io::Result<SystemNetSnmpInfo> {
        Ok(parser::parse_net_snmp(&self.read("net/snmp")?))
    }

    /// TCP state counts and ephemeral port usage from both address
    /// families.
    pub fn collect_tcp(&self) -> (TcpStateCounts, EphemeralPortsInfo) {
        let (lo, hi) = self
            .read("sys/net/ipv4/ip_local_port_range")
            .ok()
            .and_then(|s| {
                let mut fields = s.split_whitespace();
                Some((fields.next()?.parse().ok()?, fields.next()?.parse().ok()?))
            })
            .unwrap_or((32768, 60999));

        let mut states = TcpStateCounts::default();
        let mut ports = std::collections::HashSet::new();
        for table in ["net/tcp", "net/tcp6"] {
            if let Ok(content) = self.read(table) {
                parser::parse_tcp_table(&content, &mut states, (lo, hi), &mut ports);
            }
        }
        (
            states,
            EphemeralPortsInfo {
                range_lo: lo,
                range_hi: hi,
                in_use: ports.len() as u32,
            },
        )
    }

    pub fn collect_sockstat(&self) -> std::io::Result<SocketsInfo> {
        Ok(parser::parse_sockstat(&self.read("net/sockstat")?))
    }

    pub fn collect_softirqs(&self) -> std::io::Result<SoftirqInfo> {
        Ok(parser::parse_softirqs(&self.read("softirqs")?))
    }

    /// Conntrack usage; all-zero when the module is not loaded.
    pub fn collect_conntrack(&self) -> ConntrackInfo {
        let read_num = |rel: &str| {
            self.read(rel)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0)
        };
        ConntrackInfo {
            count: read_num("sys/net/netfilter/nf_conntrack_count"),
            max: read_num("sys/net/netfilter/nf_conntrack_max"),
            drop: 0,
        }
    }

    pub fn collect_file_nr(&self) -> std::io::Result<FileHandleInfo> {
        Ok(parser::parse_file_nr(&self.read("sys/fs/file-nr")?))
    }

    /// Device-backed mounts with statvfs capacity. Mounts whose statvfs
    /// fails (stale NFS, permissions) are skipped.
    pub fn collect_mounts(&self) -> std::io::Result<Vec<MountInfo>> {
        let mut mounts = Vec::new();
        for (device, mount_point, fs_type) in parser::parse_mounts(&self.read("mounts")?) {
            let Ok(usage) = self.fs.statvfs(Path::new(&mount_point)) else {
                continue;
            };
            if usage.total_bytes == 0 {
                continue;
            }
            mounts.push(MountInfo {
                mount_point,
                device,
                fs_type,
                total_bytes: usage.total_bytes,
                free_bytes: usage.free_bytes,
                inodes_total: usage.inodes_total,
                inodes_free: usage.inodes_free,
            });
        }
        Ok(mounts)
    }

    pub fn collect_identity(&self) -> SysIdentity {
        let read_trim = |rel: &str| {
            self.read(rel)
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };
        SysIdentity {
            hostname: read_trim("sys/kernel/hostname"),
            kernel: read_trim("sys/kernel/osrelease"),
            ips: Vec::new(),
            virt: String::new(),
        }
    }
}
