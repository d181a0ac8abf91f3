//! System-wide metrics collected from the /proc and /sys filesystems.
//!
//! These structures store global system statistics: CPU, memory, pressure,
//! disk, network, and assorted kernel counters. Cumulative counters are kept
//! raw; per-second rates are derived later by the rate deriver.

use serde::{Deserialize, Serialize};

/// CPU statistics from /proc/stat.
///
/// Source: `/proc/stat`
///
/// Cumulative CPU time counters in jiffies (clock ticks). The aggregate
/// line is stored with `cpu_id == -1`, individual cores with `cpu_id >= 0`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemCpuInfo {
    /// CPU identifier: -1 for aggregate total, 0+ for individual cores.
    pub cpu_id: i16,

    /// Time spent in user mode (jiffies).
    pub user: u64,

    /// Time spent in user mode with low priority (jiffies).
    pub nice: u64,

    /// Time spent in system/kernel mode (jiffies).
    pub system: u64,

    /// Time spent idle (jiffies).
    pub idle: u64,

    /// Time waiting for I/O to complete (jiffies).
    pub iowait: u64,

    /// Time servicing hardware interrupts (jiffies).
    pub irq: u64,

    /// Time servicing software interrupts (jiffies).
    pub softirq: u64,

    /// Time stolen by the hypervisor for other guests (jiffies).
    pub steal: u64,
}

impl SystemCpuInfo {
    /// Sum of all tracked jiffy categories.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }
}

/// System load averages from /proc/loadavg.
///
/// Source: `/proc/loadavg`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemLoadInfo {
    /// 1-minute load average.
    pub lavg1: f32,

    /// 5-minute load average.
    pub lavg5: f32,

    /// 15-minute load average.
    pub lavg15: f32,

    /// Number of currently runnable kernel scheduling entities.
    /// Source: `/proc/loadavg` field 4 (before '/')
    pub nr_running: u32,

    /// Total number of kernel scheduling entities.
    /// Source: `/proc/loadavg` field 4 (after '/')
    pub nr_threads: u32,
}

/// Global scheduler counters from the non-CPU lines of /proc/stat.
///
/// Source: `/proc/stat`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemStatInfo {
    /// Total context switches since boot.
    /// Source: `ctxt` line
    pub ctxt: u64,

    /// Total forks since boot.
    /// Source: `processes` line
    pub processes: u64,

    /// Processes currently runnable.
    /// Source: `procs_running` line
    pub procs_running: u32,

    /// Processes currently blocked on I/O.
    /// Source: `procs_blocked` line
    pub procs_blocked: u32,

    /// Boot time in seconds since the Unix epoch.
    /// Source: `btime` line
    pub btime: u64,
}

/// Memory statistics from /proc/meminfo.
///
/// Source: `/proc/meminfo`
///
/// All values are in kilobytes unless noted.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemMemInfo {
    /// Total usable RAM (`MemTotal`).
    pub total: u64,

    /// Free memory (`MemFree`).
    pub free: u64,

    /// Memory available for starting new applications (`MemAvailable`).
    pub available: u64,

    /// Block device buffers (`Buffers`).
    pub buffers: u64,

    /// Page cache (`Cached`).
    pub cached: u64,

    /// Memory waiting to be written back (`Dirty`).
    pub dirty: u64,

    /// Memory actively under writeback (`Writeback`).
    pub writeback: u64,

    /// Anonymous (non-file-backed) pages (`AnonPages`).
    pub anon_pages: u64,

    /// Shared memory / tmpfs (`Shmem`).
    pub shmem: u64,

    /// Memory mapped into process address spaces (`Mapped`).
    pub mapped: u64,

    /// Total kernel slab (`Slab`).
    pub slab: u64,

    /// Reclaimable slab (`SReclaimable`).
    pub sreclaimable: u64,

    /// Unreclaimable slab (`SUnreclaim`).
    pub sunreclaim: u64,

    /// Kernel stack memory (`KernelStack`).
    pub kernel_stack: u64,

    /// Page table memory (`PageTables`).
    pub page_tables: u64,

    /// Bounce buffer memory (`Bounce`).
    pub bounce: u64,

    /// Mlocked memory (`Mlocked`).
    pub mlocked: u64,

    /// Active anonymous pages (`Active(anon)`).
    pub active_anon: u64,

    /// Inactive anonymous pages (`Inactive(anon)`).
    pub inactive_anon: u64,

    /// Active file-backed pages (`Active(file)`).
    pub active_file: u64,

    /// Inactive file-backed pages (`Inactive(file)`).
    pub inactive_file: u64,

    /// Total swap space (`SwapTotal`).
    pub swap_total: u64,

    /// Free swap space (`SwapFree`).
    pub swap_free: u64,

    /// Swap cache (`SwapCached`).
    pub swap_cached: u64,

    /// Total huge pages (`HugePages_Total`, count not Kb).
    pub hugepages_total: u64,

    /// Free huge pages (`HugePages_Free`, count not Kb).
    pub hugepages_free: u64,

    /// Huge page size (`Hugepagesize`).
    pub hugepage_size: u64,
}

impl SystemMemInfo {
    /// Swap currently in use (Kb).
    pub fn swap_used(&self) -> u64 {
        self.swap_total.saturating_sub(self.swap_free)
    }

    /// Used memory as a percentage of total, based on `MemAvailable`.
    pub fn used_pct(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (1.0 - self.available as f64 / self.total as f64) * 100.0
    }
}

/// Virtual memory event counters from /proc/vmstat.
///
/// Source: `/proc/vmstat`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemVmstatInfo {
    /// Total page faults (`pgfault`).
    pub pgfault: u64,

    /// Major page faults requiring disk I/O (`pgmajfault`).
    pub pgmajfault: u64,

    /// Pages read in from block devices (`pgpgin`).
    pub pgpgin: u64,

    /// Pages written out to block devices (`pgpgout`).
    pub pgpgout: u64,

    /// Pages swapped in (`pswpin`).
    pub pswpin: u64,

    /// Pages swapped out (`pswpout`).
    pub pswpout: u64,

    /// Pages reclaimed directly by allocating tasks (`pgsteal_direct`).
    pub pgsteal_direct: u64,

    /// Pages reclaimed by kswapd (`pgsteal_kswapd`).
    pub pgsteal_kswapd: u64,

    /// Pages scanned directly by allocating tasks (`pgscan_direct`).
    pub pgscan_direct: u64,

    /// Pages scanned by kswapd (`pgscan_kswapd`).
    pub pgscan_kswapd: u64,

    /// Direct reclaim allocation stalls (`allocstall` or summed per-zone).
    pub allocstall: u64,

    /// Memory compaction stalls (`compact_stall`).
    pub compact_stall: u64,

    /// OOM killer invocations (`oom_kill`).
    pub oom_kill: u64,

    /// Transparent huge page fault allocations (`thp_fault_alloc`).
    pub thp_fault_alloc: u64,

    /// Transparent huge page collapse allocations (`thp_collapse_alloc`).
    pub thp_collapse_alloc: u64,
}

/// One pressure resource from /proc/pressure (some + full lines).
///
/// Source: `/proc/pressure/{cpu,memory,io}`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct PsiResource {
    /// `some avg10` — % of time at least one task was stalled, 10s window.
    pub some_avg10: f32,

    /// `some avg60`.
    pub some_avg60: f32,

    /// `some avg300`.
    pub some_avg300: f32,

    /// `some total` — cumulative stall time in microseconds.
    pub some_total: u64,

    /// `full avg10` — % of time all tasks were stalled, 10s window.
    /// Always 0 for the CPU resource on older kernels.
    pub full_avg10: f32,

    /// `full avg60`.
    pub full_avg60: f32,

    /// `full avg300`.
    pub full_avg300: f32,

    /// `full total` in microseconds.
    pub full_total: u64,
}

/// Pressure Stall Information for all three resources.
///
/// Available on kernels 4.20+; zeroed when /proc/pressure is absent.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemPsiInfo {
    pub cpu: PsiResource,
    pub memory: PsiResource,
    pub io: PsiResource,
}

/// Block device statistics from /proc/diskstats.
///
/// Source: `/proc/diskstats`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemDiskInfo {
    /// Device name (sda, nvme0n1, ...).
    pub name: String,

    /// Block device major number.
    pub major: u32,

    /// Block device minor number.
    pub minor: u32,

    /// Reads completed.
    /// Source: field 4
    pub rio: u64,

    /// Sectors read (512 bytes each).
    /// Source: field 6
    pub rsz: u64,

    /// Time spent reading (ms).
    /// Source: field 7
    pub read_time_ms: u64,

    /// Writes completed.
    /// Source: field 8
    pub wio: u64,

    /// Sectors written (512 bytes each).
    /// Source: field 10
    pub wsz: u64,

    /// Time spent writing (ms).
    /// Source: field 11
    pub write_time_ms: u64,

    /// I/Os currently in flight.
    /// Source: field 12
    pub io_in_progress: u64,

    /// Total time the device had I/O in flight (ms).
    /// Source: field 13
    pub io_ticks_ms: u64,

    /// Weighted time doing I/O (ms); approximates queue depth when
    /// divided by the interval.
    /// Source: field 14
    pub time_in_queue_ms: u64,
}

/// Network interface statistics from /proc/net/dev plus /sys/class/net.
///
/// Source: `/proc/net/dev`, `/sys/class/net/<if>/{operstate,speed,type,master}`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemNetInfo {
    /// Interface name (eth0, enp0s3, ...).
    pub name: String,

    /// Operational state (up, down, unknown).
    pub oper_state: String,

    /// Link speed in Mbit/s; 0 when the kernel does not report one
    /// (virtual devices, down links).
    pub speed_mbps: u64,

    /// ARPHRD interface type from /sys/class/net/<if>/type.
    pub if_type: u32,

    /// Bonding/bridge master device name, empty when standalone.
    pub master: String,

    /// Bytes received.
    pub rx_bytes: u64,

    /// Packets received.
    pub rx_packets: u64,

    /// Receive errors.
    pub rx_errs: u64,

    /// Receive drops.
    pub rx_drop: u64,

    /// Bytes transmitted.
    pub tx_bytes: u64,

    /// Packets transmitted.
    pub tx_packets: u64,

    /// Transmit errors.
    pub tx_errs: u64,

    /// Transmit drops.
    pub tx_drop: u64,
}

/// TCP/UDP protocol counters from /proc/net/snmp.
///
/// Source: `/proc/net/snmp`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SystemNetSnmpInfo {
    /// `Tcp: ActiveOpens`
    pub tcp_active_opens: u64,

    /// `Tcp: PassiveOpens`
    pub tcp_passive_opens: u64,

    /// `Tcp: AttemptFails`
    pub tcp_attempt_fails: u64,

    /// `Tcp: EstabResets`
    pub tcp_estab_resets: u64,

    /// `Tcp: CurrEstab`
    pub tcp_curr_estab: u64,

    /// `Tcp: InSegs`
    pub tcp_in_segs: u64,

    /// `Tcp: OutSegs`
    pub tcp_out_segs: u64,

    /// `Tcp: RetransSegs`
    pub tcp_retrans_segs: u64,

    /// `Tcp: InErrs`
    pub tcp_in_errs: u64,

    /// `Tcp: OutRsts`
    pub tcp_out_rsts: u64,

    /// `Udp: InDatagrams`
    pub udp_in_datagrams: u64,

    /// `Udp: OutDatagrams`
    pub udp_out_datagrams: u64,

    /// `Udp: InErrors`
    pub udp_in_errors: u64,

    /// `Udp: NoPorts`
    pub udp_no_ports: u64,
}

/// Per-state TCP connection counts from /proc/net/tcp and /proc/net/tcp6.
///
/// Source: `/proc/net/tcp`, `/proc/net/tcp6` (`st` column)
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TcpStateCounts {
    pub established: u32,
    pub syn_sent: u32,
    pub syn_recv: u32,
    pub fin_wait1: u32,
    pub fin_wait2: u32,
    pub time_wait: u32,
    pub close: u32,
    pub close_wait: u32,
    pub last_ack: u32,
    pub listen: u32,
    pub closing: u32,
}

/// Socket allocation counters from /proc/net/sockstat.
///
/// Source: `/proc/net/sockstat`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SocketsInfo {
    /// `sockets: used`
    pub sockets_used: u64,

    /// `TCP: alloc`
    pub tcp_alloc: u64,

    /// `TCP: orphan`
    pub tcp_orphan: u64,

    /// `UDP: inuse`
    pub udp_in_use: u64,
}

/// Per-kind softirq totals summed across CPUs.
///
/// Source: `/proc/softirqs`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SoftirqInfo {
    pub hi: u64,
    pub timer: u64,
    pub net_tx: u64,
    pub net_rx: u64,
    pub block: u64,
    pub irq_poll: u64,
    pub tasklet: u64,
    pub sched: u64,
    pub hrtimer: u64,
    pub rcu: u64,
}

/// Connection tracking table usage.
///
/// Source: `/proc/sys/net/netfilter/nf_conntrack_{count,max}`,
/// drop column of `/proc/net/stat/nf_conntrack`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ConntrackInfo {
    pub count: u64,
    pub max: u64,
    pub drop: u64,
}

impl ConntrackInfo {
    pub fn used_pct(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        self.count as f64 / self.max as f64 * 100.0
    }
}

/// Ephemeral port range and usage.
///
/// Source: `/proc/sys/net/ipv4/ip_local_port_range` plus local ports
/// counted from `/proc/net/tcp[6]`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct EphemeralPortsInfo {
    pub range_lo: u32,
    pub range_hi: u32,
    pub in_use: u32,
}

impl EphemeralPortsInfo {
    pub fn used_pct(&self) -> f64 {
        let span = self.range_hi.saturating_sub(self.range_lo);
        if span == 0 {
            return 0.0;
        }
        self.in_use as f64 / span as f64 * 100.0
    }
}

/// System-wide file handle usage from /proc/sys/fs/file-nr.
///
/// Source: `/proc/sys/fs/file-nr`
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct FileHandleInfo {
    /// Allocated file handles (field 1).
    pub allocated: u64,

    /// Maximum file handles (field 3).
    pub max: u64,
}

impl FileHandleInfo {
    pub fn used_pct(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        self.allocated as f64 / self.max as f64 * 100.0
    }
}

/// Mounted filesystem capacity from /proc/mounts + statvfs.
///
/// Source: `/proc/mounts`, `statvfs(2)`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct MountInfo {
    pub mount_point: String,

    /// Backing device (e.g. /dev/nvme0n1p2).
    pub device: String,

    pub fs_type: String,

    /// Filesystem size in bytes.
    pub total_bytes: u64,

    /// Bytes free for unprivileged users (f_bavail × block size).
    pub free_bytes: u64,

    pub inodes_total: u64,

    pub inodes_free: u64,
}

impl MountInfo {
    pub fn used_pct(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.free_bytes as f64 / self.total_bytes as f64) * 100.0
    }

    pub fn free_pct(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        self.free_bytes as f64 / self.total_bytes as f64 * 100.0
    }

    pub fn inode_used_pct(&self) -> f64 {
        if self.inodes_total == 0 {
            return 0.0;
        }
        (1.0 - self.inodes_free as f64 / self.inodes_total as f64) * 100.0
    }
}

/// Host identity captured once per snapshot.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SysIdentity {
    /// Source: `/proc/sys/kernel/hostname`
    pub hostname: String,

    /// Source: `/proc/sys/kernel/osrelease`
    pub kernel: String,

    /// Non-loopback addresses, best effort.
    pub ips: Vec<String>,

    /// Virtualization tag (kvm, xen, lxc, ...), empty on bare metal.
    pub virt: String,
}
