//! Pure parsers for /proc file formats.
//!
//! Every function takes the file content as a string and returns typed
//! records, so parsing is testable with fixtures and independent of the
//! filesystem seam. Unknown lines and fields are skipped silently; a
//! missing counter simply stays at its zero default.

use crate::model::{
    FileHandleInfo, PsiResource, SocketsInfo, SoftirqInfo, SystemCpuInfo, SystemDiskInfo,
    SystemLoadInfo, SystemMemInfo, SystemNetInfo, SystemNetSnmpInfo, SystemStatInfo,
    SystemVmstatInfo, TcpStateCounts,
};

fn parse_u64(s: &str) -> u64 {
    s.parse().unwrap_or(0)
}

// ---------------------------------------------------------------------------
// /proc/stat
// ---------------------------------------------------------------------------

/// Parses CPU lines and global counters from /proc/stat.
pub fn parse_stat(content: &str) -> (Vec<SystemCpuInfo>, SystemStatInfo) {
    let mut cpus = Vec::new();
    let mut stat = SystemStatInfo::default();

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let Some(key) = fields.next() else { continue };
        if let Some(id) = key.strip_prefix("cpu") {
            let cpu_id: i16 = if id.is_empty() {
                -1
            } else {
                match id.parse() {
                    Ok(n) => n,
                    Err(_) => continue,
                }
            };
            let v: Vec<u64> = fields.map(parse_u64).collect();
            let get = |i: usize| v.get(i).copied().unwrap_or(0);
            cpus.push(SystemCpuInfo {
                cpu_id,
                user: get(0),
                nice: get(1),
                system: get(2),
                idle: get(3),
                iowait: get(4),
                irq: get(5),
                softirq: get(6),
                steal: get(7),
            });
        } else {
            match key {
                "ctxt" => stat.ctxt = fields.next().map(parse_u64).unwrap_or(0),
                "processes" => stat.processes = fields.next().map(parse_u64).unwrap_or(0),
                "procs_running" => {
                    stat.procs_running = fields.next().map(parse_u64).unwrap_or(0) as u32;
                }
                "procs_blocked" => {
                    stat.procs_blocked = fields.next().map(parse_u64).unwrap_or(0) as u32;
                }
                "btime" => stat.btime = fields.next().map(parse_u64).unwrap_or(0),
                _ => {}
            }
        }
    }
    (cpus, stat)
}

// ---------------------------------------------------------------------------
// /proc/loadavg
// ---------------------------------------------------------------------------

pub fn parse_loadavg(content: &str) -> SystemLoadInfo {
    let mut load = SystemLoadInfo::default();
    let mut fields = content.split_whitespace();
    load.lavg1 = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0.0);
    load.lavg5 = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0.0);
    load.lavg15 = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0.0);
    if let Some(runnable) = fields.next()
        && let Some((running, threads)) = runnable.split_once('/')
    {
        load.nr_running = running.parse().unwrap_or(0);
        load.nr_threads = threads.parse().unwrap_or(0);
    }
    load
}

// ---------------------------------------------------------------------------
// /proc/meminfo
// ---------------------------------------------------------------------------

pub fn parse_meminfo(content: &str) -> SystemMemInfo {
    let mut mem = SystemMemInfo::default();
    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value = rest
            .split_whitespace()
            .next()
            .map(parse_u64)
            .unwrap_or(0);
        match key {
            "MemTotal" => mem.total = value,
            "MemFree" => mem.free = value,
            "MemAvailable" => mem.available = value,
            "Buffers" => mem.buffers = value,
            "Cached" => mem.cached = value,
            "Dirty" => mem.dirty = value,
            "Writeback" => mem.writeback = value,
            "AnonPages" => mem.anon_pages = value,
            "Shmem" => mem.shmem = value,
            "Mapped" => mem.mapped = value,
            "Slab" => mem.slab = value,
            "SReclaimable" => mem.sreclaimable = value,
            "SUnreclaim" => mem.sunreclaim = value,
            "KernelStack" => mem.kernel_stack = value,
            "PageTables" => mem.page_tables = value,
            "Bounce" => mem.bounce = value,
            "Mlocked" => mem.mlocked = value,
            "Active(anon)" => mem.active_anon = value,
            "Inactive(anon)" => mem.inactive_anon = value,
            "Active(file)" => mem.active_file = value,
            "Inactive(file)" => mem.inactive_file = value,
            "SwapTotal" => mem.swap_total = value,
            "SwapFree" => mem.swap_free = value,
            "SwapCached" => mem.swap_cached = value,
            "HugePages_Total" => mem.hugepages_total = value,
            "HugePages_Free" => mem.hugepages_free = value,
            "Hugepagesize" => mem.hugepage_size = value,
            _ => {}
        }
    }
    mem
}

// ---------------------------------------------------------------------------
// /proc/vmstat
// ---------------------------------------------------------------------------

pub fn parse_vmstat(content: &str) -> SystemVmstatInfo {
    let mut vm = SystemVmstatInfo::default();
    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let value = parse_u64(value);
        match key {
            "pgfault" => vm.pgfault = value,
            "pgmajfault" => vm.pgmajfault = value,
            "pgpgin" => vm.pgpgin = value,
            "pgpgout" => vm.pgpgout = value,
            "pswpin" => vm.pswpin = value,
            "pswpout" => vm.pswpout = value,
            "pgsteal_direct" => vm.pgsteal_direct = value,
            "pgsteal_kswapd" => vm.pgsteal_kswapd = value,
            "pgscan_direct" => vm.pgscan_direct = value,
            "pgscan_kswapd" => vm.pgscan_kswapd = value,
            "allocstall" => vm.allocstall = value,
            "compact_stall" => vm.compact_stall = value,
            "oom_kill" => vm.oom_kill = value,
            "thp_fault_alloc" => vm.thp_fault_alloc = value,
            "thp_collapse_alloc" => vm.thp_collapse_alloc = value,
            // Split per-order counters on newer kernels.
            _ if key.starts_with("allocstall_") => vm.allocstall += value,
            _ => {}
        }
    }
    vm
}

// ---------------------------------------------------------------------------
// /proc/pressure/*
// ---------------------------------------------------------------------------

/// Parses one pressure file (`some` and optional `full` lines).
pub fn parse_psi_resource(content: &str) -> PsiResource {
    let mut psi = PsiResource::default();
    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let Some(kind) = fields.next() else { continue };
        let mut avg10 = 0.0f32;
        let mut avg60 = 0.0f32;
        let mut avg300 = 0.0f32;
        let mut total = 0u64;
        for field in fields {
            if let Some((key, value)) = field.split_once('=') {
                match key {
                    "avg10" => avg10 = value.parse().unwrap_or(0.0),
                    "avg60" => avg60 = value.parse().unwrap_or(0.0),
                    "avg300" => avg300 = value.parse().unwrap_or(0.0),
                    "total" => total = parse_u64(value),
                    _ => {}
                }
            }
        }
        match kind {
            "some" => {
                psi.some_avg10 = avg10;
                psi.some_avg60 = avg60;
                psi.some_avg300 = avg300;
                psi.some_total = total;
            }
            "full" => {
                psi.full_avg10 = avg10;
                psi.full_avg60 = avg60;
                psi.full_avg300 = avg300;
                psi.full_total = total;
            }
            _ => {}
        }
    }
    psi
}

// ---------------------------------------------------------------------------
// /proc/diskstats
// ---------------------------------------------------------------------------

/// Parses block device counters, skipping loop/ram devices and partitions
/// (trailing-digit names, nvme excepted).
pub fn parse_diskstats(content: &str) -> Vec<SystemDiskInfo> {
    let mut disks = Vec::new();
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 14 {
            continue;
        }
        let name = fields[2];
        if name.starts_with("loop") || name.starts_with("ram") {
            continue;
        }
        if name
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_digit())
            && !name.starts_with("nvme")
            && !name.starts_with("md")
        {
            continue;
        }
        disks.push(SystemDiskInfo {
            name: name.to_string(),
            major: fields[0].parse().unwrap_or(0),
            minor: fields[1].parse().unwrap_or(0),
            rio: parse_u64(fields[3]),
            rsz: parse_u64(fields[5]),
            read_time_ms: parse_u64(fields[6]),
            wio: parse_u64(fields[7]),
            wsz: parse_u64(fields[9]),
            write_time_ms: parse_u64(fields[10]),
            io_in_progress: parse_u64(fields[11]),
            io_ticks_ms: parse_u64(fields[12]),
            time_in_queue_ms: parse_u64(fields[13]),
        });
    }
    disks
}

// ---------------------------------------------------------------------------
// /proc/net/dev
// ---------------------------------------------------------------------------

/// Parses per-interface counters. Link speed, oper state, type, and
/// master are filled in later from /sys/class/net.
pub fn parse_net_dev(content: &str) -> Vec<SystemNetInfo> {
    let mut nets = Vec::new();
    for line in content.lines().skip(2) {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name == "lo" {
            continue;
        }
        let v: Vec<u64> = rest.split_whitespace().map(parse_u64).collect();
        if v.len() < 12 {
            continue;
        }
        nets.push(SystemNetInfo {
            name: name.to_string(),
            rx_bytes: v[0],
            rx_packets: v[1],
            rx_errs: v[2],
            rx_drop: v[3],
            tx_bytes: v[8],
            tx_packets: v[9],
            tx_errs: v[10],
            tx_drop: v[11],
            ..Default::default()
        });
    }
    nets
}

// ---------------------------------------------------------------------------
// /proc/net/snmp
// ---------------------------------------------------------------------------

/// Parses the Tcp and Udp header/value line pairs.
pub fn parse_net_snmp(content: &str) -> SystemNetSnmpInfo {
    let mut snmp = SystemNetSnmpInfo::default();
    let lines: Vec<&str> = content.lines().collect();
    for pair in lines.windows(2) {
        let (header, values) = (pair[0], pair[1]);
        let Some(prefix) = header.split(':').next() else {
            continue;
        };
        if !values.starts_with(prefix) {
            continue;
        }
        let keys: Vec<&str> = header.split_whitespace().skip(1).collect();
        let vals: Vec<&str> = values.split_whitespace().skip(1).collect();
        for (key, val) in keys.iter().zip(vals.iter()) {
            let v = parse_u64(val);
            match (prefix, *key) {
                ("Tcp", "ActiveOpens") => snmp.tcp_active_opens = v,
                ("Tcp", "PassiveOpens") => snmp.tcp_passive_opens = v,
                ("Tcp", "AttemptFails") => snmp.tcp_attempt_fails = v,
                ("Tcp", "EstabResets") => snmp.tcp_estab_resets = v,
                ("Tcp", "CurrEstab") => snmp.tcp_curr_estab = v,
                ("Tcp", "InSegs") => snmp.tcp_in_segs = v,
                ("Tcp", "OutSegs") => snmp.tcp_out_segs = v,
                ("Tcp", "RetransSegs") => snmp.tcp_retrans_segs = v,
                ("Tcp", "InErrs") => snmp.tcp_in_errs = v,
                ("Tcp", "OutRsts") => snmp.tcp_out_rsts = v,
                ("Udp", "InDatagrams") => snmp.udp_in_datagrams = v,
                ("Udp", "OutDatagrams") => snmp.udp_out_datagrams = v,
                ("Udp", "InErrors") => snmp.udp_in_errors = v,
                ("Udp", "NoPorts") => snmp.udp_no_ports = v,
                _ => {}
            }
        }
    }
    snmp
}

// ---------------------------------------------------------------------------
// /proc/net/tcp[6]
// ---------------------------------------------------------------------------

/// Accumulates per-state counts and in-range local port usage from one
/// /proc/net/tcp[6] table.
pub fn parse_tcp_table(
    content: &str,
    states: &mut TcpStateCounts,
    port_range: (u32, u32),
    ports_in_use: &mut std::collections::HashSet<u32>,
) {
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let st = u8::from_str_radix(fields[3], 16).unwrap_or(0);
        match st {
            1 => states.established += 1,
            2 => states.syn_sent += 1,
            3 => states.syn_recv += 1,
            4 => states.fin_wait1 += 1,
            5 => states.fin_wait2 += 1,
            6 => states.time_wait += 1,
            7 => states.close += 1,
            8 => states.close_wait += 1,
            9 => states.last_ack += 1,
            10 => states.listen += 1,
            11 => states.closing += 1,
            _ => {}
        }
        // Local port occupies the ephemeral range for any non-listen
        // socket.
        if st != 10
            && let Some((_, port_hex)) = fields[1].rsplit_once(':')
            && let Ok(port) = u32::from_str_radix(port_hex, 16)
            && port >= port_range.0
            && port <= port_range.1
        {
            ports_in_use.insert(port);
        }
    }
}

// ---------------------------------------------------------------------------
// /proc/net/sockstat
// ---------------------------------------------------------------------------

pub fn parse_sockstat(content: &str) -> SocketsInfo {
    let mut info = SocketsInfo::default();
    for line in content.lines() {
        let Some((prefix, rest)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<&str> = rest.split_whitespace().collect();
        let value_of = |key: &str| {
            fields
                .iter()
                .position(|f| *f == key)
                .and_then(|i| fields.get(i + 1))
                .map(|v| parse_u64(v))
                .unwrap_or(0)
        };
        match prefix {
            "sockets" => info.sockets_used = value_of("used"),
            "TCP" => {
                info.tcp_alloc = value_of("alloc");
                info.tcp_orphan = value_of("orphan");
            }
            "UDP" => info.udp_in_use = value_of("inuse"),
            _ => {}
        }
    }
    info
}

// ---------------------------------------------------------------------------
// /proc/softirqs
// ---------------------------------------------------------------------------

pub fn parse_softirqs(content: &str) -> SoftirqInfo {
    let mut info = SoftirqInfo::default();
    for line in content.lines().skip(1) {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let total: u64 = rest.split_whitespace().map(parse_u64).sum();
        match name.trim() {
            "HI" => info.hi = total,
            "TIMER" => info.timer = total,
            "NET_TX" => info.net_tx = total,
            "NET_RX" => info.net_rx = total,
            "BLOCK" => info.block = total,
            "IRQ_POLL" => info.irq_poll = total,
            "TASKLET" => info.tasklet = total,
            "SCHED" => info.sched = total,
            "HRTIMER" => info.hrtimer = total,
            "RCU" => info.rcu = total,
            _ => {}
        }
    }
    info
}

// ---------------------------------------------------------------------------
// /proc/sys/fs/file-nr
// ---------------------------------------------------------------------------

pub fn parse_file_nr(content: &str) -> FileHandleInfo {
    let fields: Vec<&str> = content.split_whitespace().collect();
    FileHandleInfo {
        allocated: fields.first().map(|f| parse_u64(f)).unwrap_or(0),
        max: fields.get(2).map(|f| parse_u64(f)).unwrap_or(0),
    }
}

// ---------------------------------------------------------------------------
// /proc/mounts
// ---------------------------------------------------------------------------

/// Real (device-backed) mounts as (device, mount_point, fs_type).
pub fn parse_mounts(content: &str) -> Vec<(String, String, String)> {
    let mut mounts = Vec::new();
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let (device, mount_point, fs_type) = (fields[0], fields[1], fields[2]);
        if !device.starts_with('/') {
            continue;
        }
        mounts.push((
            device.to_string(),
            mount_point.to_string(),
            fs_type.to_string(),
        ));
    }
    mounts
}

// ---------------------------------------------------------------------------
// /proc/<pid>/*
// ---------------------------------------------------------------------------

/// The fields of /proc/<pid>/stat the model needs.
#[derive(Debug, Default, PartialEq)]
pub struct PidStat {
    pub comm: String,
    pub state: char,
    pub maj_fault: u64,
    pub utime: u64,
    pub stime: u64,
    pub num_threads: u32,
    pub starttime: u64,
}

/// Parses /proc/<pid>/stat. The comm field is delimited by parens and may
/// itself contain spaces or parens, so fields are counted from the last
/// closing paren.
pub fn parse_pid_stat(content: &str) -> Option<PidStat> {
    let open = content.find('(')?;
    let (head, tail) = content.rsplit_once(')')?;
    let comm = head.get(open + 1..)?.to_string();
    let fields: Vec<&str> = tail.split_whitespace().collect();
    // fields[0] is field 3 (state).
    Some(PidStat {
        comm,
        state: fields.first()?.chars().next()?,
        maj_fault: fields.get(9).map(|f| parse_u64(f))?,
        utime: fields.get(11).map(|f| parse_u64(f))?,
        stime: fields.get(12).map(|f| parse_u64(f))?,
        num_threads: fields.get(17).map(|f| parse_u64(f))? as u32,
        starttime: fields.get(19).map(|f| parse_u64(f))?,
    })
}

/// The fields of /proc/<pid>/status the model needs.
#[derive(Debug, Default, PartialEq)]
pub struct PidStatus {
    pub rss_kb: u64,
    pub vm_swap_kb: u64,
    pub vol_ctx_switches: u64,
    pub nonvol_ctx_switches: u64,
}

pub fn parse_pid_status(content: &str) -> PidStatus {
    let mut status = PidStatus::default();
    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value = rest
            .split_whitespace()
            .next()
            .map(parse_u64)
            .unwrap_or(0);
        match key {
            "VmRSS" => status.rss_kb = value,
            "VmSwap" => status.vm_swap_kb = value,
            "voluntary_ctxt_switches" => status.vol_ctx_switches = value,
            "nonvoluntary_ctxt_switches" => status.nonvol_ctx_switches = value,
            _ => {}
        }
    }
    status
}

/// (read_bytes, write_bytes) from /proc/<pid>/io.
pub fn parse_pid_io(content: &str) -> (u64, u64) {
    let mut read_bytes = 0;
    let mut write_bytes = 0;
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key {
            "read_bytes" => read_bytes = parse_u64(value.trim()),
            "write_bytes" => write_bytes = parse_u64(value.trim()),
            _ => {}
        }
    }
    (read_bytes, write_bytes)
}

/// The cgroup v2 path from /proc/<pid>/cgroup (the `0::` line).
pub fn parse_pid_cgroup(content: &str) -> String {
    for line in content.lines() {
        if let Some(path) = line.strip_prefix("0::") {
            return path.trim().to_string();
        }
    }
    String::new()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_cpu_and_counters() {
        let content = "\
cpu  100 5 50 800 20 3 7 15 0 0
cpu0 50 2 25 400 10 1 4 8 0 0
cpu1 50 3 25 400 10 2 3 7 0 0
ctxt 123456
btime 1700000000
processes 4321
procs_running 3
procs_blocked 2
";
        let (cpus, stat) = parse_stat(content);
        assert_eq!(cpus.len(), 3);
        assert_eq!(cpus[0].cpu_id, -1);
        assert_eq!(cpus[1].cpu_id, 0);
        assert_eq!(cpus[2].steal, 7);
        assert_eq!(stat.ctxt, 123456);
        assert_eq!(stat.btime, 1700000000);
        assert_eq!(stat.procs_running, 3);
        assert_eq!(stat.procs_blocked, 2);
    }

    #[test]
    fn loadavg_with_runnable_split() {
        let load = parse_loadavg("0.52 0.58 0.59 3/467 12345\n");
        assert!((load.lavg1 - 0.52).abs() < 1e-6);
        assert_eq!(load.nr_running, 3);
        assert_eq!(load.nr_threads, 467);
    }

    #[test]
    fn meminfo_core_fields() {
        let content = "\
MemTotal:       16384000 kB
MemFree:         1024000 kB
MemAvailable:   12000000 kB
Cached:          4000000 kB
Dirty:             12345 kB
SwapTotal:       8000000 kB
SwapFree:        7000000 kB
Active(anon):    2000000 kB
HugePages_Total:       0
";
        let mem = parse_meminfo(content);
        assert_eq!(mem.total, 16384000);
        assert_eq!(mem.available, 12000000);
        assert_eq!(mem.dirty, 12345);
        assert_eq!(mem.active_anon, 2000000);
        assert_eq!(mem.swap_used(), 1000000);
    }

    #[test]
    fn psi_some_and_full() {
        let content = "\
some avg10=1.50 avg60=0.80 avg300=0.30 total=123456
full avg10=0.50 avg60=0.20 avg300=0.10 total=65432
";
        let psi = parse_psi_resource(content);
        assert!((psi.some_avg10 - 1.5).abs() < 1e-6);
        assert_eq!(psi.some_total, 123456);
        assert!((psi.full_avg10 - 0.5).abs() < 1e-6);
        assert_eq!(psi.full_total, 65432);
    }

    #[test]
    fn diskstats_skips_partitions_and_loops() {
        let content = "\
   8       0 sda 100 0 2000 50 200 0 4000 80 0 120 130
   8       1 sda1 90 0 1800 45 180 0 3600 70 0 100 110
   7       0 loop0 1 0 8 0 0 0 0 0 0 0 0
 259       0 nvme0n1 500 0 9000 100 600 0 12000 200 0 300 310
";
        let disks = parse_diskstats(content);
        let names: Vec<&str> = disks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sda", "nvme0n1"]);
        assert_eq!(disks[0].rio, 100);
        assert_eq!(disks[0].wsz, 4000);
        assert_eq!(disks[1].io_ticks_ms, 300);
    }

    #[test]
    fn net_dev_skips_loopback() {
        let content = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1000 10 0 0 0 0 0 0 1000 10 0 0 0 0 0 0
  eth0: 5000 50 1 2 0 0 0 0 7000 70 3 4 0 0 0 0
";
        let nets = parse_net_dev(content);
        assert_eq!(nets.len(), 1);
        let n = &nets[0];
        assert_eq!(n.name, "eth0");
        assert_eq!(n.rx_bytes, 5000);
        assert_eq!(n.rx_errs, 1);
        assert_eq!(n.rx_drop, 2);
        assert_eq!(n.tx_bytes, 7000);
        assert_eq!(n.tx_drop, 4);
    }

    #[test]
    fn snmp_tcp_udp_pairs() {
        let content = "\
Tcp: RtoAlgorithm RtoMin RtoMax MaxConn ActiveOpens PassiveOpens AttemptFails EstabResets CurrEstab InSegs OutSegs RetransSegs InErrs OutRsts
Tcp: 1 200 120000 -1 100 200 5 3 42 100000 90000 150 2 75
Udp: InDatagrams NoPorts InErrors OutDatagrams
Udp: 5000 7 1 4500
";
        let snmp = parse_net_snmp(content);
        assert_eq!(snmp.tcp_curr_estab, 42);
        assert_eq!(snmp.tcp_retrans_segs, 150);
        assert_eq!(snmp.tcp_out_rsts, 75);
        assert_eq!(snmp.udp_in_datagrams, 5000);
        assert_eq!(snmp.udp_no_ports, 7);
    }

    #[test]
    fn tcp_table_states_and_ports() {
        let content = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 1
   1: 0100007F:C350 0A0A0A0A:0050 01 00000000:00000000 00:00000000 00000000  1000        0 2
   2: 0100007F:C351 0A0A0A0A:0050 06 00000000:00000000 00:00000000 00000000  1000        0 3
   3: 0100007F:C351 0A0A0A0B:0050 08 00000000:00000000 00:00000000 00000000  1000        0 4
";
        let mut states = TcpStateCounts::default();
        let mut ports = std::collections::HashSet::new();
        parse_tcp_table(content, &mut states, (32768, 60999), &mut ports);
        assert_eq!(states.listen, 1);
        assert_eq!(states.established, 1);
        assert_eq!(states.time_wait, 1);
        assert_eq!(states.close_wait, 1);
        // 0xC350 = 50000, 0xC351 = 50001 (counted once).
        assert_eq!(ports.len(), 2);
    }

    #[test]
    fn sockstat_fields() {
        let content = "\
sockets: used 285
TCP: inuse 8 orphan 2 tw 1 alloc 10 mem 3
UDP: inuse 3 mem 2
";
        let info = parse_sockstat(content);
        assert_eq!(info.sockets_used, 285);
        assert_eq!(info.tcp_alloc, 10);
        assert_eq!(info.tcp_orphan, 2);
        assert_eq!(info.udp_in_use, 3);
    }

    #[test]
    fn softirqs_summed_across_cpus() {
        let content = "\
                    CPU0       CPU1
          HI:          1          2
       TIMER:        100        200
      NET_RX:         10         20
";
        let info = parse_softirqs(content);
        assert_eq!(info.hi, 3);
        assert_eq!(info.timer, 300);
        assert_eq!(info.net_rx, 30);
    }

    #[test]
    fn file_nr_first_and_third() {
        let info = parse_file_nr("2944\t0\t9223372036854775807\n");
        assert_eq!(info.allocated, 2944);
        assert_eq!(info.max, 9223372036854775807);
    }

    #[test]
    fn mounts_filters_virtual_filesystems() {
        let content = "\
proc /proc proc rw 0 0
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
tmpfs /run tmpfs rw 0 0
/dev/sda1 /data xfs rw 0 0
";
        let mounts = parse_mounts(content);
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].1, "/");
        assert_eq!(mounts[1].2, "xfs");
    }

    #[test]
    fn pid_stat_with_spaces_in_comm() {
        let content = "4242 (tmux: server) S 1 4242 4242 0 -1 4194304 500 0 12 0 30 20 0 0 20 0 4 0 71234 1000000 250 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0";
        let stat = parse_pid_stat(content).unwrap();
        assert_eq!(stat.comm, "tmux: server");
        assert_eq!(stat.state, 'S');
        assert_eq!(stat.maj_fault, 12);
        assert_eq!(stat.utime, 30);
        assert_eq!(stat.stime, 20);
        assert_eq!(stat.num_threads, 4);
        assert_eq!(stat.starttime, 71234);
    }

    #[test]
    fn pid_status_and_io() {
        let status = parse_pid_status(
            "VmRSS:\t  204800 kB\nVmSwap:\t    1024 kB\nThreads:\t8\nvoluntary_ctxt_switches:\t100\nnonvoluntary_ctxt_switches:\t50\n",
        );
        assert_eq!(status.rss_kb, 204800);
        assert_eq!(status.vm_swap_kb, 1024);
        assert_eq!(status.vol_ctx_switches, 100);
        assert_eq!(status.nonvol_ctx_switches, 50);

        let (r, w) = parse_pid_io("rchar: 100\nwchar: 200\nread_bytes: 4096\nwrite_bytes: 8192\n");
        assert_eq!(r, 4096);
        assert_eq!(w, 8192);
    }

    #[test]
    fn pid_cgroup_v2_line() {
        let path = parse_pid_cgroup("0::/system.slice/cron.service\n");
        assert_eq!(path, "/system.slice/cron.service");
    }
}
