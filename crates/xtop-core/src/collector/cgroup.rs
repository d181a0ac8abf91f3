//! Cgroup v2 walker.
//!
//! Walks /sys/fs/cgroup two levels deep (slices and their services) and
//! reads the accounting files each group exposes. Missing files are
//! normal: a controller may not be enabled for a subtree.

use std::path::{Path, PathBuf};

use crate::collector::traits::FileSystem;
use crate::model::{CgroupCpuStat, CgroupInfo, CgroupIoStat};

pub struct CgroupCollector<F: FileSystem> {
    fs: F,
    root: PathBuf,
}

impl<F: FileSystem> CgroupCollector<F> {
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    pub fn collect(&self) -> Vec<CgroupInfo> {
        let mut groups = Vec::new();
        let Ok(top) = self.fs.read_dir(&self.root) else {
            return groups;
        };
        for slice in top {
            if !self.is_cgroup_dir(&slice) {
                continue;
            }
            if let Some(info) = self.collect_one(&slice) {
                groups.push(info);
            }
            if let Ok(children) = self.fs.read_dir(&slice) {
                for child in children {
                    if !self.is_cgroup_dir(&child) {
                        continue;
                    }
                    if let Some(info) = self.collect_one(&child) {
                        groups.push(info);
                    }
                }
            }
        }
        groups.sort_by(|a, b| a.path.cmp(&b.path));
        groups
    }

    fn is_cgroup_dir(&self, path: &Path) -> bool {
        // Every cgroup directory carries cgroup.procs.
        self.fs.exists(&path.join("cgroup.procs"))
    }

    fn collect_one(&self, dir: &Path) -> Option<CgroupInfo> {
        let rel = dir.strip_prefix(&self.root).ok()?;
        let path = format!("/{}", rel.display());
        let name = dir.file_name()?.to_string_lossy().into_owned();

        let read_num = |file: &str| -> u64 {
            self.fs
                .read_to_string(&dir.join(file))
                .ok()
                .map(|s| {
                    let s = s.trim();
                    if s == "max" {
                        u64::MAX
                    } else {
                        s.parse().unwrap_or(0)
                    }
                })
                .unwrap_or(0)
        };

        let mut info = CgroupInfo {
            name,
            path,
            mem_current: read_num("memory.current"),
            mem_max: read_num("memory.max"),
            pid_count: read_num("pids.current"),
            ..Default::default()
        };

        if let Ok(events) = self.fs.read_to_string(&dir.join("memory.events")) {
            for line in events.lines() {
                if let Some(v) = line.strip_prefix("oom_kill ") {
                    info.oom_kills = v.trim().parse().unwrap_or(0);
                }
            }
        }

        if let Ok(stat) = self.fs.read_to_string(&dir.join("cpu.stat")) {
            let mut cpu = CgroupCpuStat::default();
            for line in stat.lines() {
                let mut fields = line.split_whitespace();
                let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
                    continue;
                };
                let value: u64 = value.parse().unwrap_or(0);
                match key {
                    "usage_usec" => cpu.usage_usec = value,
                    "user_usec" => cpu.user_usec = value,
                    "system_usec" => cpu.system_usec = value,
                    "nr_periods" => cpu.nr_periods = value,
                    "nr_throttled" => cpu.nr_throttled = value,
                    "throttled_usec" => cpu.throttled_usec = value,
                    _ => {}
                }
            }
            info.cpu = cpu;
        }

        if let Ok(stat) = self.fs.read_to_string(&dir.join("io.stat")) {
            let mut io = CgroupIoStat::default();
            for line in stat.lines() {
                for field in line.split_whitespace().skip(1) {
                    let Some((key, value)) = field.split_once('=') else {
                        continue;
                    };
                    let value: u64 = value.parse().unwrap_or(0);
                    match key {
                        "rbytes" => io.rbytes += value,
                        "wbytes" => io.wbytes += value,
                        "rios" => io.rios += value,
                        "wios" => io.wios += value,
                        _ => {}
                    }
                }
            }
            info.io = io;
        }

        Some(info)
    }
}
