//! In-memory mock filesystem for testing collectors without a real /proc.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use crate::collector::traits::{FileSystem, FsUsage};

/// In-memory filesystem. Stores file contents, directories, symlink
/// targets, and statvfs answers keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, String>,
    dirs: HashSet<PathBuf>,
    links: HashMap<PathBuf, PathBuf>,
    usage: HashMap<PathBuf, FsUsage>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, registering its ancestor directories.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.register_ancestors(&path);
        self.files.insert(path, content.into());
    }

    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.register_ancestors(&path);
        self.dirs.insert(path);
    }

    pub fn add_link(&mut self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.register_ancestors(&path);
        self.links.insert(path, target.as_ref().to_path_buf());
    }

    pub fn add_statvfs(&mut self, mount_point: impl AsRef<Path>, usage: FsUsage) {
        self.usage.insert(mount_point.as_ref().to_path_buf(), usage);
    }

    /// Remove a file, simulating a probe that vanished or is forbidden.
    pub fn remove_file(&mut self, path: impl AsRef<Path>) {
        self.files.remove(path.as_ref());
    }

    fn register_ancestors(&mut self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.to_path_buf());
            current = dir.parent();
        }
    }

    /// Register a minimal /proc/<pid> tree.
    pub fn add_process(
        &mut self,
        pid: u32,
        comm: &str,
        state: char,
        utime: u64,
        write_bytes: u64,
        rss_kb: u64,
    ) {
        let dir = format!("/proc/{pid}");
        self.add_file(
            format!("{dir}/stat"),
            format!(
                "{pid} ({comm}) {state} 1 {pid} {pid} 0 -1 4194304 100 0 3 0 {utime} 10 0 0 20 0 2 0 {starttime} 10000000 {rss_pages} 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0",
                starttime = 1000 + pid as u64,
                rss_pages = rss_kb / 4,
            ),
        );
        self.add_file(
            format!("{dir}/status"),
            format!(
                "Name:\t{comm}\nVmRSS:\t{rss_kb} kB\nVmSwap:\t0 kB\nThreads:\t2\nvoluntary_ctxt_switches:\t100\nnonvoluntary_ctxt_switches:\t20\n"
            ),
        );
        self.add_file(
            format!("{dir}/io"),
            format!("rchar: 0\nwchar: 0\nread_bytes: 1048576\nwrite_bytes: {write_bytes}\n"),
        );
        self.add_file(format!("{dir}/cgroup"), "0::/system.slice/archiver.service\n");
    }

    /// A small but complete Linux system fixture: two cores, one disk,
    /// one NIC, a handful of processes including a busy log writer, a
    /// cgroup tree, and two mounts.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        fs.add_file(
            "/proc/stat",
            "cpu  2000 50 1000 16000 400 30 70 100 0 0\n\
             cpu0 1000 25 500 8000 200 15 35 50 0 0\n\
             cpu1 1000 25 500 8000 200 15 35 50 0 0\n\
             ctxt 987654\n\
             btime 1700000000\n\
             processes 5432\n\
             procs_running 2\n\
             procs_blocked 0\n",
        );
        fs.add_file("/proc/loadavg", "0.42 0.36 0.30 2/311 9999\n");
        fs.add_file(
            "/proc/meminfo",
            "MemTotal:       16384000 kB\n\
             MemFree:         2048000 kB\n\
             MemAvailable:   12288000 kB\n\
             Buffers:          256000 kB\n\
             Cached:          6144000 kB\n\
             Dirty:             20480 kB\n\
             Writeback:             0 kB\n\
             AnonPages:       4096000 kB\n\
             Shmem:            512000 kB\n\
             Mapped:           768000 kB\n\
             Slab:             512000 kB\n\
             SReclaimable:     384000 kB\n\
             SUnreclaim:       128000 kB\n\
             KernelStack:       16384 kB\n\
             PageTables:        32768 kB\n\
             Bounce:                0 kB\n\
             Mlocked:               0 kB\n\
             Active(anon):    3072000 kB\n\
             Inactive(anon):  1024000 kB\n\
             Active(file):    4096000 kB\n\
             Inactive(file):  2048000 kB\n\
             SwapTotal:       8192000 kB\n\
             SwapFree:        8192000 kB\n\
             SwapCached:            0 kB\n\
             HugePages_Total:       0\n\
             HugePages_Free:        0\n\
             Hugepagesize:       2048 kB\n",
        );
        fs.add_file(
            "/proc/vmstat",
            "pgfault 1234567\n\
             pgmajfault 890\n\
             pgpgin 445566\n\
             pgpgout 334455\n\
             pswpin 0\n\
             pswpout 0\n\
             pgsteal_kswapd 1000\n\
             pgsteal_direct 0\n\
             pgscan_kswapd 1200\n\
             pgscan_direct 0\n\
             compact_stall 0\n\
             oom_kill 0\n\
             thp_fault_alloc 10\n\
             thp_collapse_alloc 2\n",
        );
        fs.add_file(
            "/proc/pressure/cpu",
            "some avg10=0.00 avg60=0.00 avg300=0.00 total=1000\n\
             full avg10=0.00 avg60=0.00 avg300=0.00 total=0\n",
        );
        fs.add_file(
            "/proc/pressure/memory",
            "some avg10=0.00 avg60=0.00 avg300=0.00 total=500\n\
             full avg10=0.00 avg60=0.00 avg300=0.00 total=100\n",
        );
        fs.add_file(
            "/proc/pressure/io",
            "some avg10=0.80 avg60=0.40 avg300=0.10 total=90000\n\
             full avg10=0.20 avg60=0.10 avg300=0.00 total=20000\n",
        );
        fs.add_file(
            "/proc/diskstats",
            "   8       0 sda 168486 11354 11527962 68627 208371 142920 9972626 103372 0 82139 172000\n\
             259       0 nvme0n1 500000 0 40000000 120000 700000 0 56000000 210000 2 250000 331000\n",
        );
        fs.add_file(
            "/proc/net/dev",
            "Inter-|   Receive                                                |  Transmit\n\
             face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n\
                lo: 10000 100 0 0 0 0 0 0 10000 100 0 0 0 0 0 0\n\
              eth0: 123456789 234567 0 12 0 0 0 0 98765432 198765 0 3 0 0 0 0\n",
        );
        fs.add_file(
            "/proc/net/snmp",
            "Tcp: RtoAlgorithm RtoMin RtoMax MaxConn ActiveOpens PassiveOpens AttemptFails EstabResets CurrEstab InSegs OutSegs RetransSegs InErrs OutRsts\n\
             Tcp: 1 200 120000 -1 5000 3000 12 7 42 1000000 950000 340 1 88\n\
             Udp: InDatagrams NoPorts InErrors OutDatagrams\n\
             Udp: 20000 5 0 18000\n",
        );
        fs.add_file(
            "/proc/net/tcp",
            "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n\
               0: 00000000:0016 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 100\n\
               1: 0100007F:A001 0A000001:01BB 01 00000000:00000000 00:00000000 00000000  1000        0 101\n\
               2: 0100007F:A002 0A000001:01BB 06 00000000:00000000 00:00000000 00000000  1000        0 102\n",
        );
        fs.add_file(
            "/proc/net/sockstat",
            "sockets: used 285\n\
             TCP: inuse 8 orphan 0 tw 1 alloc 12 mem 2\n\
             UDP: inuse 4 mem 1\n",
        );
        fs.add_file(
            "/proc/softirqs",
            "                    CPU0       CPU1\n\
                       HI:          5          3\n\
                    TIMER:     100000     120000\n\
                   NET_TX:       2000       1500\n\
                   NET_RX:      50000      45000\n\
                    BLOCK:      30000      28000\n\
                 IRQ_POLL:          0          0\n\
                  TASKLET:       1000        900\n\
                    SCHED:      80000      75000\n\
                  HRTIMER:        500        400\n\
                      RCU:      90000      85000\n",
        );
        fs.add_file("/proc/sys/net/ipv4/ip_local_port_range", "32768\t60999\n");
        fs.add_file("/proc/sys/net/netfilter/nf_conntrack_count", "1800\n");
        fs.add_file("/proc/sys/net/netfilter/nf_conntrack_max", "262144\n");
        fs.add_file("/proc/sys/fs/file-nr", "2944\t0\t1048576\n");
        fs.add_file("/proc/sys/kernel/hostname", "testhost\n");
        fs.add_file("/proc/sys/kernel/osrelease", "6.8.0-test\n");
        fs.add_file(
            "/proc/mounts",
            "proc /proc proc rw 0 0\n\
             /dev/nvme0n1p2 / ext4 rw,relatime 0 0\n\
             /dev/sda1 /var xfs rw,relatime 0 0\n\
             tmpfs /run tmpfs rw 0 0\n",
        );
        let gib = 1024 * 1024 * 1024;
        fs.add_statvfs(
            "/",
            FsUsage {
                total_bytes: 100 * gib,
                free_bytes: 55 * gib,
                inodes_total: 6_000_000,
                inodes_free: 5_500_000,
            },
        );
        fs.add_statvfs(
            "/var",
            FsUsage {
                total_bytes: 200 * gib,
                free_bytes: 80 * gib,
                inodes_total: 12_000_000,
                inodes_free: 11_000_000,
            },
        );

        // /sys/class/net metadata for eth0.
        fs.add_file("/sys/class/net/eth0/operstate", "up\n");
        fs.add_file("/sys/class/net/eth0/speed", "1000\n");
        fs.add_file("/sys/class/net/eth0/type", "1\n");

        // Processes: init, a busy log writer, and a blocked worker.
        fs.add_process(1, "systemd", 'S', 500, 0, 12288);
        fs.add_process(4242, "archiver", 'R', 3000, 400 * 1024 * 1024, 204800);
        fs.add_process(777, "flusher", 'D', 100, 8 * 1024 * 1024, 51200);
        fs.add_link("/proc/4242/fd/3", "/var/log/app.log");
        fs.add_link("/proc/4242/fd/4", "/var/log/old.log (deleted)");
        fs.add_link("/proc/4242/fd/0", "/dev/null");

        // Cgroup v2 tree.
        fs.add_file("/sys/fs/cgroup/cgroup.procs", "");
        fs.add_file("/sys/fs/cgroup/system.slice/cgroup.procs", "");
        fs.add_file("/sys/fs/cgroup/system.slice/memory.current", "2147483648\n");
        fs.add_file("/sys/fs/cgroup/system.slice/memory.max", "max\n");
        fs.add_file("/sys/fs/cgroup/system.slice/pids.current", "120\n");
        fs.add_file(
            "/sys/fs/cgroup/system.slice/cpu.stat",
            "usage_usec 90000000\nuser_usec 60000000\nsystem_usec 30000000\nnr_periods 0\nnr_throttled 0\nthrottled_usec 0\n",
        );
        let svc = "/sys/fs/cgroup/system.slice/archiver.service";
        fs.add_file(format!("{svc}/cgroup.procs"), "4242\n");
        fs.add_file(format!("{svc}/memory.current"), "536870912\n");
        fs.add_file(format!("{svc}/memory.max"), "1073741824\n");
        fs.add_file(format!("{svc}/memory.events"), "low 0\nhigh 0\nmax 0\noom 0\noom_kill 0\n");
        fs.add_file(format!("{svc}/pids.current"), "3\n");
        fs.add_file(
            format!("{svc}/cpu.stat"),
            "usage_usec 45000000\nuser_usec 30000000\nsystem_usec 15000000\nnr_periods 1000\nnr_throttled 50\nthrottled_usec 2000000\n",
        );
        fs.add_file(
            format!("{svc}/io.stat"),
            "8:0 rbytes=1073741824 wbytes=42949672960 rios=100000 wios=900000 dbytes=0 dios=0\n",
        );

        fs
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
            || self.dirs.contains(path)
            || self.links.contains_key(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.dirs.contains(path) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        let mut entries: Vec<PathBuf> = self
            .files
            .keys()
            .chain(self.dirs.iter())
            .chain(self.links.keys())
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect();
        entries.sort();
        entries.dedup();
        Ok(entries)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.links
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn statvfs(&self, path: &Path) -> io::Result<FsUsage> {
        self.usage
            .get(path)
            .copied()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_dir_lists_direct_children() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/1/stat", "x");
        fs.add_file("/proc/2/stat", "y");
        let entries = fs.read_dir(Path::new("/proc")).unwrap();
        assert_eq!(
            entries,
            vec![PathBuf::from("/proc/1"), PathBuf::from("/proc/2")]
        );
    }

    #[test]
    fn missing_paths_error() {
        let fs = MockFs::new();
        assert!(fs.read_to_string(Path::new("/nope")).is_err());
        assert!(fs.read_dir(Path::new("/nope")).is_err());
        assert!(!fs.exists(Path::new("/nope")));
    }
}
