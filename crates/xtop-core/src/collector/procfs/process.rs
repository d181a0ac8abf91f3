//! Per-process collection from /proc/<pid>.
//!
//! The process table on a busy host can run to thousands of entries; the
//! snapshot keeps the top N by a relevance weight combining CPU time, I/O
//! volume, and RSS so the interesting processes survive the cut. Write
//! paths and deleted-but-open files come from a bounded /proc/<pid>/fd
//! scan of the heaviest writers.

use std::path::PathBuf;

use crate::collector::traits::FileSystem;
use crate::model::{DeletedOpenInfo, ProcessInfo};

use super::parser;

/// Processes kept on a snapshot.
const DEFAULT_PROCESS_LIMIT: usize = 120;

/// Writers whose fd tables are scanned for paths, per tick.
const FD_SCAN_LIMIT: usize = 20;

/// Fd entries examined per process; enormous fd tables are not worth
/// walking every second.
const FD_ENTRY_CAP: usize = 256;

pub struct ProcessCollector<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
    limit: usize,
}

impl<F: FileSystem> ProcessCollector<F> {
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            limit: DEFAULT_PROCESS_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Collect the bounded process table and deleted-but-open files.
    /// Processes that vanish mid-scan are skipped silently.
    pub fn collect(&self) -> std::io::Result<(Vec<ProcessInfo>, Vec<DeletedOpenInfo>)> {
        let mut processes = Vec::new();
        for entry in self.fs.read_dir(&self.proc_path)? {
            let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(pid) = name.parse::<u32>() else {
                continue;
            };
            if let Some(proc) = self.collect_one(pid) {
                processes.push(proc);
            }
        }

        processes.sort_by(|a, b| relevance(b).total_cmp(&relevance(a)));
        processes.truncate(self.limit);

        let deleted = self.scan_fds(&mut processes);
        Ok((processes, deleted))
    }

    fn collect_one(&self, pid: u32) -> Option<ProcessInfo> {
        let dir = self.proc_path.join(pid.to_string());
        let stat = parser::parse_pid_stat(&self.fs.read_to_string(&dir.join("stat")).ok()?)?;
        let status = self
            .fs
            .read_to_string(&dir.join("status"))
            .map(|c| parser::parse_pid_status(&c))
            .unwrap_or_default();
        // io requires elevated access for other users' processes.
        let (read_bytes, write_bytes) = self
            .fs
            .read_to_string(&dir.join("io"))
            .map(|c| parser::parse_pid_io(&c))
            .unwrap_or((0, 0));
        let cgroup_path = self
            .fs
            .read_to_string(&dir.join("cgroup"))
            .map(|c| parser::parse_pid_cgroup(&c))
            .unwrap_or_default();

        Some(ProcessInfo {
            pid,
            comm: stat.comm,
            state: stat.state,
            rss_kb: status.rss_kb,
            vm_swap_kb: status.vm_swap_kb,
            num_threads: stat.num_threads,
            cgroup_path,
            utime: stat.utime,
            stime: stat.stime,
            starttime: stat.starttime,
            read_bytes,
            write_bytes,
            write_path: String::new(),
            maj_fault: stat.maj_fault,
            vol_ctx_switches: status.vol_ctx_switches,
            nonvol_ctx_switches: status.nonvol_ctx_switches,
        })
    }

    /// Resolve write paths for the heaviest writers and surface unlinked
    /// open files.
    fn scan_fds(&self, processes: &mut [ProcessInfo]) -> Vec<DeletedOpenInfo> {
        let mut writer_idx: Vec<usize> = (0..processes.len())
            .filter(|&i| processes[i].write_bytes > 0)
            .collect();
        writer_idx.sort_by_key(|&i| std::cmp::Reverse(processes[i].write_bytes));
        writer_idx.truncate(FD_SCAN_LIMIT);

        let mut deleted = Vec::new();
        for i in writer_idx {
            let pid = processes[i].pid;
            let fd_dir = self.proc_path.join(pid.to_string()).join("fd");
            let Ok(entries) = self.fs.read_dir(&fd_dir) else {
                continue;
            };
            for fd in entries.into_iter().take(FD_ENTRY_CAP) {
                let Ok(target) = self.fs.read_link(&fd) else {
                    continue;
                };
                let target = target.to_string_lossy().into_owned();
                if let Some(path) = target.strip_suffix(" (deleted)") {
                    deleted.push(DeletedOpenInfo {
                        pid,
                        comm: processes[i].comm.clone(),
                        path: path.to_string(),
                        size_bytes: 0,
                    });
                    continue;
                }
                if processes[i].write_path.is_empty() && is_plausible_write_target(&target) {
                    processes[i].write_path = target;
                }
            }
        }
        deleted
    }
}

/// Relevance weight for the top-N cut: cumulative CPU plus I/O volume in
/// MiB plus RSS in MiB.
fn relevance(p: &ProcessInfo) -> f64 {
    p.cpu_jiffies() as f64
        + (p.read_bytes + p.write_bytes) as f64 / (1024.0 * 1024.0)
        + p.rss_kb as f64 / 1024.0
}

/// A regular file path outside the pseudo filesystems.
fn is_plausible_write_target(target: &str) -> bool {
    target.starts_with('/')
        && !target.starts_with("/dev/")
        && !target.starts_with("/proc/")
        && !target.starts_with("/sys/")
        && !target.starts_with("/memfd")
}
