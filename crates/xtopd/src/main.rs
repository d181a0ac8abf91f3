//! xtopd - sampling daemon.
//!
//! Drives the tick pipeline on a fixed interval, runs the disk-guard
//! controller, persists closed events to events.jsonl, and writes an RCA
//! snapshot plus incident report on shutdown.

use tikv_jemallocator::Jemalloc;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use xtop_core::analysis::Health;
use xtop_core::collector::{Collector, RealFs};
use xtop_core::config::Config;
use xtop_core::events;
use xtop_core::guard::{DiskGuard, DiskGuardMode, RealProcessControl};
use xtop_core::report;
use xtop_core::ticker::Ticker;

/// Root-cause-oriented system monitor daemon.
#[derive(Parser)]
#[command(name = "xtopd", about = "Root-cause-oriented system monitor daemon", version)]
struct Args {
    /// Sampling interval in seconds (overrides the config file).
    #[arg(short, long)]
    interval: Option<u64>,

    /// History ring size in ticks (overrides the config file).
    #[arg(long)]
    history_size: Option<usize>,

    /// Path to the proc filesystem (for testing).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Path to the cgroup v2 filesystem; empty disables cgroup metrics.
    #[arg(long, default_value = "/sys/fs/cgroup")]
    cgroup_path: String,

    /// Directory for events.jsonl and exported reports.
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Disk-guard mode: monitor, dry-run, contain, or action.
    #[arg(long, default_value = "monitor")]
    guard_mode: DiskGuardMode,

    /// Path to config.json (defaults to the XDG location).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.to_string())),
        )
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path);
    let interval = Duration::from_secs(args.interval.unwrap_or(config.interval_sec).max(1));
    let history_size = args.history_size.unwrap_or(config.history_size).max(10);

    if let Err(e) = std::fs::create_dir_all(&args.data_dir) {
        error!("cannot create data dir {}: {e}", args.data_dir.display());
        std::process::exit(1);
    }
    let events_path = args.data_dir.join("events.jsonl");

    let mut collector = Collector::new(RealFs::new(), &args.proc_path);
    if !args.cgroup_path.is_empty() {
        collector = collector.with_cgroup(&args.cgroup_path);
    }

    let mut ticker = Ticker::new(collector, interval, history_size);
    ticker.events_mut().load(events::load_events(&events_path));

    let mut guard = DiskGuard::new(args.guard_mode, RealProcessControl::new(&args.proc_path));

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        }) {
            warn!("cannot install signal handler: {e}");
        }
    }

    info!(
        interval_s = interval.as_secs(),
        history = history_size,
        guard = %guard.mode(),
        "xtopd started"
    );

    let mut last_health = Health::Ok;
    let mut last_output = None;

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();

        match ticker.tick() {
            Ok(output) => {
                if output.analysis.health != last_health {
                    info!(
                        health = %output.analysis.health,
                        bottleneck = %output.analysis.primary_bottleneck,
                        score = output.analysis.primary_score,
                        confidence = output.analysis.confidence,
                        "health changed"
                    );
                    last_health = output.analysis.health;
                }
                for line in guard.tick(
                    output.entry.snapshot.timestamp_ms,
                    &output.analysis,
                    &output.entry.rates,
                ) {
                    info!("disk-guard: {line}");
                }
                if let Some(event) = &output.closed_event {
                    info!(
                        bottleneck = %event.bottleneck,
                        duration_s = event.duration_s,
                        "incident closed"
                    );
                    if let Err(e) = events::append_event(&events_path, event) {
                        warn!("cannot persist event: {e}");
                    }
                }
                last_output = Some(output);
            }
            Err(e) => {
                // Only an unreadable /proc reaches here; nothing to monitor.
                error!("collection failed: {e}");
                std::process::exit(1);
            }
        }

        let elapsed = started.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }

    // Final exports for post-mortem use.
    if let Some(output) = last_output {
        let (active, completed) = ticker.events().all_events();
        let completed: Vec<_> = completed.collect();
        match report::write_rca_json(
            &args.data_dir,
            &output.entry.snapshot,
            &output.entry.rates,
            &output.analysis,
        ) {
            Ok(path) => info!("wrote {}", path.display()),
            Err(e) => warn!("cannot write RCA export: {e}"),
        }
        match report::write_incident_markdown(
            &args.data_dir,
            output.entry.snapshot.timestamp_ms,
            &output.analysis,
            active,
            &completed,
        ) {
            Ok(path) => info!("wrote {}", path.display()),
            Err(e) => warn!("cannot write incident report: {e}"),
        }
    }
    info!("xtopd stopped");
}
