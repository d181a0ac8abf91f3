//! Deep-probe pass management.
//!
//! A probe pass runs one or more instrumentation packs for a fixed 10s
//! window and publishes its findings once, atomically, at the end. The
//! manager is a small state machine (Idle → Running → Done → Idle) driven
//! by the tick clock; the actual kernel-side work is delegated to a
//! [`ProbeRunner`] so the core never touches tracing APIs itself.
//!
//! Ordering guarantee: while `state()` is `Running`, `findings()` is
//! `None`; after the transition to `Done` the findings are stable until
//! the manager returns to `Idle`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analysis::Bottleneck;

/// Length of one probe window.
pub const PROBE_WINDOW_SECS: u64 = 10;

/// How long published findings keep boosting RCA confidence.
pub const FINDINGS_FRESH_SECS: u64 = 30;

/// Available instrumentation packs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbePack {
    /// Run every pack the kernel supports in one window.
    Auto,
    OffCpu,
    IoLatency,
    LockWait,
    TcpRetrans,
    NetThroughput,
    TcpRtt,
    TcpConnLat,
}

impl ProbePack {
    pub fn all_concrete() -> &'static [ProbePack] {
        &[
            ProbePack::OffCpu,
            ProbePack::IoLatency,
            ProbePack::LockWait,
            ProbePack::TcpRetrans,
            ProbePack::NetThroughput,
            ProbePack::TcpRtt,
            ProbePack::TcpConnLat,
        ]
    }

    /// The default pack for a bottleneck domain, used by the watchdog.
    pub fn for_domain(domain: Bottleneck) -> ProbePack {
        match domain {
            Bottleneck::Cpu | Bottleneck::Memory => ProbePack::OffCpu,
            Bottleneck::DiskIo | Bottleneck::DiskSpace => ProbePack::IoLatency,
            Bottleneck::Network => ProbePack::TcpRetrans,
        }
    }
}

impl std::fmt::Display for ProbePack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProbePack::Auto => "auto",
            ProbePack::OffCpu => "offcpu",
            ProbePack::IoLatency => "iolatency",
            ProbePack::LockWait => "lockwait",
            ProbePack::TcpRetrans => "tcpretrans",
            ProbePack::NetThroughput => "netthroughput",
            ProbePack::TcpRtt => "tcprtt",
            ProbePack::TcpConnLat => "tcpconnlat",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ProbePack {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ProbePack::Auto),
            "offcpu" => Ok(ProbePack::OffCpu),
            "iolatency" => Ok(ProbePack::IoLatency),
            "lockwait" => Ok(ProbePack::LockWait),
            "tcpretrans" => Ok(ProbePack::TcpRetrans),
            "netthroughput" => Ok(ProbePack::NetThroughput),
            "tcprtt" => Ok(ProbePack::TcpRtt),
            "tcpconnlat" => Ok(ProbePack::TcpConnLat),
            other => Err(format!("unknown probe pack: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeState {
    Idle,
    Running,
    Done,
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct OffCpuWaiter {
    pub comm: String,
    pub pid: u32,
    pub wait_ms: f64,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct IoLatencySample {
    pub device: String,
    pub p50_us: u64,
    pub p99_us: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct LockWaiter {
    pub comm: String,
    pub pid: u32,
    pub lock: String,
    pub wait_ms: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct TcpRetransSample {
    pub src: String,
    pub dst: String,
    pub retransmits: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct NetThroughputSample {
    pub comm: String,
    pub pid: u32,
    pub rx_mbs: f64,
    pub tx_mbs: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct TcpRttSample {
    pub peer: String,
    pub rtt_ms: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct TcpConnLatSample {
    pub peer: String,
    pub latency_ms: f64,
}

/// Everything one probe pass learned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct ProbeFindings {
    pub pack: Option<ProbePack>,
    pub duration_s: u64,
    /// The domain the findings corroborate, when they corroborate one.
    pub bottleneck: Option<Bottleneck>,
    pub summary: String,
    /// Confidence points added to RCA for the matching domain.
    pub conf_boost: u32,
    pub offcpu_waiters: Vec<OffCpuWaiter>,
    pub io_latency: Vec<IoLatencySample>,
    pub lock_waiters: Vec<LockWaiter>,
    pub tcp_retrans: Vec<TcpRetransSample>,
    pub net_throughput: Vec<NetThroughputSample>,
    pub tcp_rtt: Vec<TcpRttSample>,
    pub tcp_conn_lat: Vec<TcpConnLatSample>,
}

// ---------------------------------------------------------------------------
// Runner seam
// ---------------------------------------------------------------------------

/// Abstraction over the kernel-side probe machinery. Implementations run
/// their packs in the background of the 10s window; [`harvest`] is called
/// exactly once when the window ends and must not block on more work.
///
/// [`harvest`]: ProbeRunner::harvest
pub trait ProbeRunner: Send {
    /// Which packs this kernel can run.
    fn supported(&self, pack: ProbePack) -> bool;

    /// Begin collecting for the given concrete packs.
    fn launch(&mut self, packs: &[ProbePack]);

    /// Stop collecting and return whatever was found.
    fn harvest(&mut self) -> ProbeFindings;
}

/// Runner for kernels without any probe support: always publishes an
/// empty result.
#[derive(Debug, Default)]
pub struct NullProbeRunner;

impl ProbeRunner for NullProbeRunner {
    fn supported(&self, _pack: ProbePack) -> bool {
        false
    }

    fn launch(&mut self, _packs: &[ProbePack]) {}

    fn harvest(&mut self) -> ProbeFindings {
        ProbeFindings {
            summary: "no findings".to_string(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// `start` was called while a pass is running.
    AlreadyRunning,
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::AlreadyRunning => write!(f, "a probe pass is already running"),
        }
    }
}

impl std::error::Error for ProbeError {}

/// State machine for deep-probe passes.
pub struct ProbeManager {
    runner: Box<dyn ProbeRunner>,
    state: ProbeState,
    pack: Option<ProbePack>,
    deadline_ms: i64,
    done_at_ms: i64,
    findings: Option<ProbeFindings>,
}

impl ProbeManager {
    pub fn new(runner: Box<dyn ProbeRunner>) -> Self {
        Self {
            runner,
            state: ProbeState::Idle,
            pack: None,
            deadline_ms: 0,
            done_at_ms: 0,
            findings: None,
        }
    }

    /// Start a probe pass. Only valid from Idle; a running pass rejects
    /// the call rather than cancelling.
    pub fn start(&mut self, pack: ProbePack, now_ms: i64) -> Result<(), ProbeError> {
        if self.state == ProbeState::Running {
            return Err(ProbeError::AlreadyRunning);
        }
        let packs: Vec<ProbePack> = match pack {
            ProbePack::Auto => ProbePack::all_concrete()
                .iter()
                .copied()
                .filter(|p| self.runner.supported(*p))
                .collect(),
            p => vec![p],
        };
        info!(pack = %pack, "starting probe pass");
        self.runner.launch(&packs);
        self.state = ProbeState::Running;
        self.pack = Some(pack);
        self.deadline_ms = now_ms + (PROBE_WINDOW_SECS * 1000) as i64;
        self.findings = None;
        Ok(())
    }

    /// Watchdog entry point: start the default pack for a domain.
    pub fn start_domain(&mut self, domain: Bottleneck, now_ms: i64) -> Result<(), ProbeError> {
        self.start(ProbePack::for_domain(domain), now_ms)
    }

    /// Advance timers. Publishes findings and transitions to Done when
    /// the window has elapsed; returns to Idle once findings go stale.
    pub fn tick(&mut self, now_ms: i64) {
        match self.state {
            ProbeState::Running if now_ms >= self.deadline_ms => {
                let mut findings = self.runner.harvest();
                findings.pack = self.pack;
                findings.duration_s = PROBE_WINDOW_SECS;
                if findings.summary.is_empty() {
                    findings.summary = "no findings".to_string();
                }
                debug!(summary = %findings.summary, "probe pass done");
                self.findings = Some(findings);
                self.done_at_ms = now_ms;
                self.state = ProbeState::Done;
            }
            ProbeState::Done
                if now_ms - self.done_at_ms >= (FINDINGS_FRESH_SECS * 1000) as i64 =>
            {
                self.state = ProbeState::Idle;
                self.pack = None;
                self.findings = None;
            }
            _ => {}
        }
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn pack(&self) -> Option<ProbePack> {
        self.pack
    }

    /// Whole seconds remaining in the window; 0 outside Running.
    pub fn seconds_left(&self, now_ms: i64) -> u64 {
        if self.state != ProbeState::Running {
            return 0;
        }
        ((self.deadline_ms - now_ms).max(0) / 1000) as u64
    }

    /// Findings are only visible after the pass completes.
    pub fn findings(&self) -> Option<&ProbeFindings> {
        match self.state {
            ProbeState::Done => self.findings.as_ref(),
            _ => None,
        }
    }

    pub fn summary(&self) -> String {
        match self.state {
            ProbeState::Idle => "idle".to_string(),
            ProbeState::Running => format!(
                "running {}",
                self.pack.map(|p| p.to_string()).unwrap_or_default()
            ),
            ProbeState::Done => self
                .findings
                .as_ref()
                .map(|f| f.summary.clone())
                .unwrap_or_else(|| "no findings".to_string()),
        }
    }

    /// The confidence boost for a domain, while findings are fresh.
    pub fn fresh_boost(&self, now_ms: i64, domain: Bottleneck) -> Option<u32> {
        let findings = self.findings()?;
        if now_ms - self.done_at_ms >= (FINDINGS_FRESH_SECS * 1000) as i64 {
            return None;
        }
        (findings.bottleneck == Some(domain) && findings.conf_boost > 0)
            .then_some(findings.conf_boost)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
