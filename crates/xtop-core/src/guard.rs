//! Disk-guard: containment of runaway disk writers.
//!
//! The controller reads the disk-space verdict each tick and, depending on
//! its mode, pauses (SIGSTOP), resumes (SIGCONT) or kills (SIGKILL) the
//! top writer. Safety rails:
//!
//! - a denylist of process names that must never be touched,
//! - a start-time identity token (`/proc/<pid>/stat` field 22) stored at
//!   freeze time and re-verified before every later signal, so a recycled
//!   PID is never signalled,
//! - an incident budget of one automatic action plus a 60s cooldown
//!   between any two automatic actions.
//!
//! All kernel interaction goes through [`ProcessControl`] so the policy
//! is testable without sending real signals.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::AnalysisResult;
use crate::rates::{MountState, ProcessRate, RateSnapshot};

/// Writers below this rate are not worth acting on.
const WRITE_RATE_FLOOR_MBS: f64 = 0.5;

/// Minimum spacing between automatic actions.
const ACTION_COOLDOWN_SECS: i64 = 60;

/// Continuous OK time that resumes frozen processes and re-arms the
/// incident budget.
const OK_RESET_SECS: i64 = 30;

/// Automatic actions allowed per incident.
const MAX_ACTIONS_PER_INCIDENT: u32 = 1;

/// Controller operating mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiskGuardMode {
    /// Observe only.
    #[default]
    Monitor,
    /// Log would-be actions, never signal.
    DryRun,
    /// Automatically freeze the top writer on CRIT.
    Contain,
    /// Contain, plus manual kill is armed.
    Action,
}

impl std::str::FromStr for DiskGuardMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monitor" => Ok(DiskGuardMode::Monitor),
            "dry-run" | "dryrun" => Ok(DiskGuardMode::DryRun),
            "contain" => Ok(DiskGuardMode::Contain),
            "action" => Ok(DiskGuardMode::Action),
            other => Err(format!("unknown disk-guard mode: {other}")),
        }
    }
}

impl std::fmt::Display for DiskGuardMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskGuardMode::Monitor => write!(f, "monitor"),
            DiskGuardMode::DryRun => write!(f, "dry-run"),
            DiskGuardMode::Contain => write!(f, "contain"),
            DiskGuardMode::Action => write!(f, "action"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Stop,
    Cont,
    Kill,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Stop => write!(f, "SIGSTOP"),
            Signal::Cont => write!(f, "SIGCONT"),
            Signal::Kill => write!(f, "SIGKILL"),
        }
    }
}

/// Kernel seam: signal delivery and process identity.
pub trait ProcessControl: Send {
    /// Send a signal; errors are human strings, never retried.
    fn send(&mut self, pid: u32, signal: Signal) -> Result<(), String>;

    /// The process's start-time token, or `None` when the PID is gone.
    fn starttime(&self, pid: u32) -> Option<u64>;
}

/// Production implementation over `kill(2)` and `/proc/<pid>/stat`.
pub struct RealProcessControl {
    proc_path: PathBuf,
}

impl RealProcessControl {
    pub fn new(proc_path: impl Into<PathBuf>) -> Self {
        Self {
            proc_path: proc_path.into(),
        }
    }
}

impl ProcessControl for RealProcessControl {
    fn send(&mut self, pid: u32, signal: Signal) -> Result<(), String> {
        let sig = match signal {
            Signal::Stop => libc::SIGSTOP,
            Signal::Cont => libc::SIGCONT,
            Signal::Kill => libc::SIGKILL,
        };
        // SAFETY: plain kill(2) call; pid and signal are valid values.
        let rc = unsafe { libc::kill(pid as libc::pid_t, sig) };
        if rc == 0 {
            Ok(())
        } else {
            Err(format!(
                "{signal} to {pid} failed: {}",
                std::io::Error::last_os_error()
            ))
        }
    }

    fn starttime(&self, pid: u32) -> Option<u64> {
        let content = std::fs::read_to_string(
            self.proc_path.join(pid.to_string()).join("stat"),
        )
        .ok()?;
        parse_starttime(&content)
    }
}

/// Field 22 of /proc/<pid>/stat, parsed after the closing paren so comm
/// values containing spaces or parens cannot shift the fields.
pub fn parse_starttime(stat_line: &str) -> Option<u64> {
    let rest = stat_line.rsplit_once(')')?.1;
    // rest starts at field 3 (state); field 22 is index 19 here.
    rest.split_whitespace().nth(19)?.parse().ok()
}

/// A paused process with its identity token.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrozenRecord {
    pub pid: u32,
    pub starttime: u64,
    pub comm: String,
    pub write_path: String,
    pub frozen_at_ms: i64,
}

/// Mode-driven actuator for disk-space incidents.
pub struct DiskGuard<C: ProcessControl> {
    mode: DiskGuardMode,
    control: C,
    denylist: HashSet<String>,
    frozen: Vec<FrozenRecord>,
    incident_actions: u32,
    last_action_ms: Option<i64>,
    ok_since_ms: Option<i64>,
}

impl<C: ProcessControl> DiskGuard<C> {
    pub fn new(mode: DiskGuardMode, control: C) -> Self {
        Self {
            mode,
            control,
            denylist: default_denylist(),
            frozen: Vec::new(),
            incident_actions: 0,
            last_action_ms: None,
            ok_since_ms: None,
        }
    }

    pub fn mode(&self) -> DiskGuardMode {
        self.mode
    }

    pub fn frozen(&self) -> &[FrozenRecord] {
        &self.frozen
    }

    /// Extend the never-touch list (process basenames).
    pub fn deny(&mut self, name: impl Into<String>) {
        self.denylist.insert(name.into());
    }

    /// Drive one tick. Returns human status lines for anything done,
    /// skipped, or failed.
    pub fn tick(
        &mut self,
        now_ms: i64,
        result: &AnalysisResult,
        rates: &RateSnapshot,
    ) -> Vec<String> {
        let mut status = Vec::new();

        self.housekeep(&mut status);

        if result.disk_guard_worst == MountState::Ok {
            let since = *self.ok_since_ms.get_or_insert(now_ms);
            if now_ms - since >= OK_RESET_SECS * 1000 {
                if !self.frozen.is_empty() {
                    self.resume_all(&mut status);
                }
                self.incident_actions = 0;
            }
            return status;
        }
        self.ok_since_ms = None;

        if result.disk_guard_worst != MountState::Crit {
            return status;
        }

        let Some(writer) = top_writer(rates) else {
            return status;
        };

        match self.mode {
            DiskGuardMode::Monitor => {}
            DiskGuardMode::DryRun => {
                status.push(format!(
                    "dry-run: would freeze {} (pid {}, {:.1} MB/s to {})",
                    writer.comm, writer.pid, writer.write_mbs, writer.write_path
                ));
            }
            DiskGuardMode::Contain | DiskGuardMode::Action => {
                self.auto_freeze(now_ms, &writer, &mut status);
            }
        }
        status
    }

    /// Drop frozen records whose PID exited or was recycled.
    fn housekeep(&mut self, status: &mut Vec<String>) {
        let mut kept = Vec::with_capacity(self.frozen.len());
        for record in self.frozen.drain(..) {
            match self.control.starttime(record.pid) {
                Some(st) if st == record.starttime => kept.push(record),
                Some(_) => status.push(format!(
                    "dropped frozen record for pid {}: PID reused",
                    record.pid
                )),
                None => status.push(format!(
                    "dropped frozen record for pid {}: process exited",
                    record.pid
                )),
            }
        }
        self.frozen = kept;
    }

    fn cooldown_active(&self, now_ms: i64) -> bool {
        self.last_action_ms
            .is_some_and(|t| now_ms - t < ACTION_COOLDOWN_SECS * 1000)
    }

    fn auto_freeze(&mut self, now_ms: i64, writer: &ProcessRate, status: &mut Vec<String>) {
        if self.denylist.contains(writer.comm.as_str()) {
            status.push(format!("skipped {}: denylisted", writer.comm));
            return;
        }
        if self.incident_actions >= MAX_ACTIONS_PER_INCIDENT {
            return;
        }
        if self.cooldown_active(now_ms) {
            status.push("skipped auto-freeze: cooldown active".to_string());
            return;
        }
        if self.frozen.iter().any(|f| f.pid == writer.pid) {
            return;
        }
        // Identity check: the live token must match the snapshot the
        // verdict was computed from, otherwise the PID already belongs to
        // someone else.
        let Some(live) = self.control.starttime(writer.pid) else {
            status.push(format!("skipped pid {}: process exited", writer.pid));
            return;
        };
        if live != writer.starttime {
            status.push(format!("skipped pid {}: PID reused", writer.pid));
            return;
        }

        match self.control.send(writer.pid, Signal::Stop) {
            Ok(()) => {
                info!(pid = writer.pid, comm = %writer.comm, "froze top disk writer");
                self.frozen.push(FrozenRecord {
                    pid: writer.pid,
                    starttime: live,
                    comm: writer.comm.clone(),
                    write_path: writer.write_path.clone(),
                    frozen_at_ms: now_ms,
                });
                self.incident_actions += 1;
                self.last_action_ms = Some(now_ms);
                status.push(format!(
                    "froze {} (pid {}) writing to {}",
                    writer.comm, writer.pid, writer.write_path
                ));
            }
            Err(e) => {
                warn!(pid = writer.pid, error = %e, "freeze failed");
                status.push(format!("freeze of pid {} failed: {e}", writer.pid));
            }
        }
    }

    /// SIGCONT every frozen PID whose identity still matches, then drop
    /// all records, mismatches included.
    fn resume_all(&mut self, status: &mut Vec<String>) {
        for record in std::mem::take(&mut self.frozen) {
            match self.control.starttime(record.pid) {
                Some(st) if st == record.starttime => {
                    match self.control.send(record.pid, Signal::Cont) {
                        Ok(()) => {
                            info!(pid = record.pid, "resumed frozen writer");
                            status.push(format!("resumed {} (pid {})", record.comm, record.pid));
                        }
                        Err(e) => status.push(format!(
                            "resume of pid {} failed: {e}",
                            record.pid
                        )),
                    }
                }
                _ => status.push(format!(
                    "resume of pid {} aborted: PID reused, record dropped",
                    record.pid
                )),
            }
        }
    }

    /// Manual freeze of the current top writer (Contain and Action).
    pub fn freeze_top_writer(&mut self, now_ms: i64, rates: &RateSnapshot) -> Vec<String> {
        let mut status = Vec::new();
        if !matches!(self.mode, DiskGuardMode::Contain | DiskGuardMode::Action) {
            status.push(format!("manual freeze unavailable in {} mode", self.mode));
            return status;
        }
        match top_writer(rates) {
            Some(writer) => self.auto_freeze(now_ms, &writer, &mut status),
            None => status.push("no writer above the rate floor".to_string()),
        }
        status
    }

    /// Manual kill of the current top writer (Action only).
    pub fn kill_top_writer(&mut self, now_ms: i64, rates: &RateSnapshot) -> Vec<String> {
        let mut status = Vec::new();
        if self.mode != DiskGuardMode::Action {
            status.push(format!("kill unavailable in {} mode", self.mode));
            return status;
        }
        let Some(writer) = top_writer(rates) else {
            status.push("no writer above the rate floor".to_string());
            return status;
        };
        if self.denylist.contains(writer.comm.as_str()) {
            status.push(format!("skipped {}: denylisted", writer.comm));
            return status;
        }
        // Prefer the stored token when the target is frozen.
        let expected = self
            .frozen
            .iter()
            .find(|f| f.pid == writer.pid)
            .map(|f| f.starttime)
            .unwrap_or(writer.starttime);
        match self.control.starttime(writer.pid) {
            Some(live) if live == expected => match self.control.send(writer.pid, Signal::Kill) {
                Ok(()) => {
                    self.frozen.retain(|f| f.pid != writer.pid);
                    self.last_action_ms = Some(now_ms);
                    status.push(format!("killed {} (pid {})", writer.comm, writer.pid));
                }
                Err(e) => status.push(format!("kill of pid {} failed: {e}", writer.pid)),
            },
            Some(_) => {
                self.frozen.retain(|f| f.pid != writer.pid);
                status.push(format!(
                    "kill of pid {} aborted: PID reused, record dropped",
                    writer.pid
                ));
            }
            None => status.push(format!("pid {} already exited", writer.pid)),
        }
        status
    }
}

/// The heaviest writer above the rate floor.
fn top_writer(rates: &RateSnapshot) -> Option<ProcessRate> {
    rates
        .processes
        .iter()
        .filter(|p| p.write_mbs >= WRITE_RATE_FLOOR_MBS)
        .max_by(|a, b| a.write_mbs.total_cmp(&b.write_mbs))
        .cloned()
}

/// Process names that must never be paused or killed: init and service
/// management, logging, remote access, container runtimes, database
/// engines, and this tool itself.
fn default_denylist() -> HashSet<String> {
    [
        "systemd",
        "init",
        "systemd-journald",
        "journald",
        "sshd",
        "dockerd",
        "containerd",
        "containerd-shim",
        "crio",
        "kubelet",
        "postgres",
        "mysqld",
        "mariadbd",
        "mongod",
        "redis-server",
        "etcd",
        "xtop",
        "xtopd",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory process table for signal tests.
    #[derive(Default)]
    struct MockControl {
        starttimes: HashMap<u32, u64>,
        sent: Vec<(u32, Signal)>,
        fail_sends: bool,
    }

    impl ProcessControl for &mut MockControl {
        fn send(&mut self, pid: u32, signal: Signal) -> Result<(), String> {
            if self.fail_sends {
                return Err("operation not permitted".to_string());
            }
            self.sent.push((pid, signal));
            Ok(())
        }

        fn starttime(&self, pid: u32) -> Option<u64> {
            self.starttimes.get(&pid).copied()
        }
    }

    fn writer_rates(pid: u32, comm: &str, write_mbs: f64, starttime: u64) -> RateSnapshot {
        RateSnapshot {
            processes: vec![ProcessRate {
                pid,
                comm: comm.into(),
                write_mbs,
                write_path: "/var/log/app.log".into(),
                starttime,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn verdict(worst: MountState) -> AnalysisResult {
        AnalysisResult {
            disk_guard_worst: worst,
            ..Default::default()
        }
    }

    #[test]
    fn contain_freezes_top_writer_then_resumes_after_ok() {
        let mut ctl = MockControl::default();
        ctl.starttimes.insert(4242, 71);
        let mut guard = DiskGuard::new(DiskGuardMode::Contain, &mut ctl);
        let rates = writer_rates(4242, "archiver", 20.0, 71);

        let status = guard.tick(0, &verdict(MountState::Crit), &rates);
        assert!(status.iter().any(|s| s.contains("froze archiver")));
        assert_eq!(guard.frozen().len(), 1);
        assert_eq!(guard.frozen()[0].pid, 4242);
        assert_eq!(guard.frozen()[0].starttime, 71);
        assert_eq!(guard.frozen()[0].write_path, "/var/log/app.log");

        // 30s of continuous OK resumes and clears.
        let ok = verdict(MountState::Ok);
        guard.tick(1_000, &ok, &rates);
        guard.tick(31_000, &ok, &rates);
        assert!(guard.frozen().is_empty());
        drop(guard);
        assert_eq!(ctl.sent, vec![(4242, Signal::Stop), (4242, Signal::Cont)]);
    }

    #[test]
    fn pid_reuse_aborts_resume() {
        let mut ctl = MockControl::default();
        ctl.starttimes.insert(4242, 71);
        let mut guard = DiskGuard::new(DiskGuardMode::Contain, &mut ctl);
        let rates = writer_rates(4242, "archiver", 20.0, 71);
        guard.tick(0, &verdict(MountState::Crit), &rates);
        assert_eq!(guard.frozen().len(), 1);

        // The PID now belongs to a different process.
        guard.control.starttimes.insert(4242, 99);
        let ok = verdict(MountState::Ok);
        let mut all_status = guard.tick(1_000, &ok, &rates);
        all_status.extend(guard.tick(31_000, &ok, &rates));

        assert!(guard.frozen().is_empty());
        assert!(all_status.iter().any(|s| s.contains("PID reused")));
        drop(guard);
        // Only the original SIGSTOP was ever sent.
        assert_eq!(ctl.sent, vec![(4242, Signal::Stop)]);
    }

    #[test]
    fn denylisted_writers_are_never_signalled() {
        let mut ctl = MockControl::default();
        ctl.starttimes.insert(1, 5);
        let mut guard = DiskGuard::new(DiskGuardMode::Contain, &mut ctl);
        let rates = writer_rates(1, "postgres", 50.0, 5);

        let status = guard.tick(0, &verdict(MountState::Crit), &rates);
        assert!(status.iter().any(|s| s.contains("denylisted")));
        assert!(guard.frozen().is_empty());
        drop(guard);
        assert!(ctl.sent.is_empty());
    }

    #[test]
    fn one_auto_action_per_incident_and_cooldown() {
        let mut ctl = MockControl::default();
        ctl.starttimes.insert(10, 1);
        ctl.starttimes.insert(11, 2);
        let mut guard = DiskGuard::new(DiskGuardMode::Contain, &mut ctl);

        let crit = verdict(MountState::Crit);
        guard.tick(0, &crit, &writer_rates(10, "w1", 5.0, 1));
        assert_eq!(guard.frozen().len(), 1);

        // Incident budget exhausted: a second writer is left alone even
        // past the cooldown.
        guard.tick(120_000, &crit, &writer_rates(11, "w2", 9.0, 2));
        assert_eq!(guard.frozen().len(), 1);
        drop(guard);
        assert_eq!(ctl.sent.len(), 1);
    }

    #[test]
    fn budget_rearms_after_thirty_seconds_ok() {
        let mut ctl = MockControl::default();
        ctl.starttimes.insert(10, 1);
        ctl.starttimes.insert(11, 2);
        let mut guard = DiskGuard::new(DiskGuardMode::Contain, &mut ctl);

        let crit = verdict(MountState::Crit);
        let ok = verdict(MountState::Ok);
        guard.tick(0, &crit, &writer_rates(10, "w1", 5.0, 1));
        guard.tick(10_000, &ok, &writer_rates(10, "w1", 0.0, 1));
        guard.tick(45_000, &ok, &writer_rates(10, "w1", 0.0, 1));
        // New incident, new budget; cooldown long expired.
        let status = guard.tick(120_000, &crit, &writer_rates(11, "w2", 9.0, 2));
        assert!(status.iter().any(|s| s.contains("froze w2")));
    }

    #[test]
    fn dry_run_logs_but_never_signals() {
        let mut ctl = MockControl::default();
        ctl.starttimes.insert(7, 3);
        let mut guard = DiskGuard::new(DiskGuardMode::DryRun, &mut ctl);
        let status = guard.tick(
            0,
            &verdict(MountState::Crit),
            &writer_rates(7, "logger", 2.0, 3),
        );
        assert!(status.iter().any(|s| s.starts_with("dry-run: would freeze")));
        drop(guard);
        assert!(ctl.sent.is_empty());
    }

    #[test]
    fn slow_writers_are_ignored() {
        let mut ctl = MockControl::default();
        ctl.starttimes.insert(7, 3);
        let mut guard = DiskGuard::new(DiskGuardMode::Contain, &mut ctl);
        let status = guard.tick(
            0,
            &verdict(MountState::Crit),
            &writer_rates(7, "slowpoke", 0.2, 3),
        );
        assert!(status.is_empty());
        drop(guard);
        assert!(ctl.sent.is_empty());
    }

    #[test]
    fn kill_requires_action_mode_and_identity() {
        let mut ctl = MockControl::default();
        ctl.starttimes.insert(9, 4);
        let mut guard = DiskGuard::new(DiskGuardMode::Contain, &mut ctl);
        let rates = writer_rates(9, "flooder", 30.0, 4);
        let status = guard.kill_top_writer(0, &rates);
        assert!(status.iter().any(|s| s.contains("unavailable")));

        let mut ctl = MockControl::default();
        ctl.starttimes.insert(9, 4);
        let mut guard = DiskGuard::new(DiskGuardMode::Action, &mut ctl);
        let status = guard.kill_top_writer(0, &rates);
        assert!(status.iter().any(|s| s.contains("killed flooder")));
        drop(guard);
        assert_eq!(ctl.sent, vec![(9, Signal::Kill)]);

        // Reused PID: no SIGKILL.
        let mut ctl = MockControl::default();
        ctl.starttimes.insert(9, 999);
        let mut guard = DiskGuard::new(DiskGuardMode::Action, &mut ctl);
        let status = guard.kill_top_writer(0, &rates);
        assert!(status.iter().any(|s| s.contains("PID reused")));
        drop(guard);
        assert!(ctl.sent.is_empty());
    }

    #[test]
    fn signal_failure_is_reported_not_retried() {
        let mut ctl = MockControl::default();
        ctl.starttimes.insert(5, 2);
        ctl.fail_sends = true;
        let mut guard = DiskGuard::new(DiskGuardMode::Contain, &mut ctl);
        let status = guard.tick(
            0,
            &verdict(MountState::Crit),
            &writer_rates(5, "w", 5.0, 2),
        );
        assert!(status.iter().any(|s| s.contains("failed")));
        assert!(guard.frozen().is_empty());
    }

    #[test]
    fn housekeeping_drops_exited_pids() {
        let mut ctl = MockControl::default();
        ctl.starttimes.insert(4242, 71);
        let mut guard = DiskGuard::new(DiskGuardMode::Contain, &mut ctl);
        let rates = writer_rates(4242, "archiver", 20.0, 71);
        guard.tick(0, &verdict(MountState::Crit), &rates);
        assert_eq!(guard.frozen().len(), 1);

        guard.control.starttimes.remove(&4242);
        let status = guard.tick(1_000, &verdict(MountState::Crit), &rates);
        assert!(guard.frozen().is_empty());
        assert!(status.iter().any(|s| s.contains("exited")));
    }

    #[test]
    fn starttime_parser_handles_awkward_comm() {
        let line = "4242 (a) b (x)) R 1 1 1 0 -1 4194304 0 0 0 0 10 5 0 0 20 0 1 0 71234 1000 0 18446744073709551615";
        assert_eq!(parse_starttime(line), Some(71234));
    }
}
