//! # pdu-watch
//!
//! A power-quality monitor for a smart power distribution node.
//!
//! ## Overview
//!
//! `pdu-watch` turns raw electrical and equipment samples into condition
//! states and daily statistics. It answers questions like:
//!
//! - Was the supply stable today, and how long were the outages?
//! - Did voltage, load, phase balance or frequency leave their limits?
//! - Did the breaker, the power meter, the UPS battery or the enclosure
//!   report a fault?
//!
//! ## Features
//!
//! - **Condition tracking**: Normal/Warning/Failure per condition, with
//!   counters that only move on actual transitions
//! - **Outage accounting**: power failures spanning midnight are split
//!   between the two days and still reported as one duration
//! - **Daily rollover**: daily statistics fold into all-time totals and are
//!   written to a date-partitioned CSV summary
//! - **Checksummed persistence**: statistics and settings survive restarts;
//!   damaged blobs fall back to defaults
//! - **TUI Dashboard**: Real-time terminal UI with charts
//!
//! ## Usage
//!
//! ```bash
//! # Replay samples with the dashboard
//! pdu-watch demos/sample_day.csv
//!
//! # Headless, as fast as possible, logging to stderr
//! pdu-watch demos/sample_day.csv --headless --interval-ms 0
//! ```
//!
//! ## Module Organization
//!
//! - [`condition`]: Monitored conditions and their states
//! - [`thresholds`]: Threshold configuration and evaluation
//! - [`registry`]: Live condition states and daily counters
//! - [`power_failure`]: Outage timestamps and durations
//! - [`slice`], [`aggregator`]: Daily/total statistics and rollover
//! - [`codec`], [`snapshot`], [`settings`]: Checksummed persistence
//! - [`storage`], [`csv_log`], [`date_dir`]: Files on the storage medium
//! - [`notify`]: Rendered notifications
//! - [`samples`], [`config`], [`app`], [`ui`]: Sample replay and the front end

mod aggregator;
mod app;
mod codec;
mod condition;
mod config;
mod csv_log;
mod date_dir;
mod error;
mod notify;
mod power_failure;
mod registry;
mod samples;
mod settings;
mod slice;
mod snapshot;
mod storage;
mod thresholds;
mod ui;

use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Config;

fn main() -> error::Result<()> {
    let config = Config::parse();

    // Check if stdout is a TTY - if not, force headless mode
    let use_headless = config.headless || !is_terminal();
    init_logging(&config, use_headless)?;
    if !config.headless && !is_terminal() {
        warn!("stdout is not a TTY, running in headless mode");
    }

    let app = App::new(config.clone())?;

    // Setup Ctrl+C / SIGTERM handler
    let running = Arc::new(AtomicBool::new(true));
    setup_signal_handler(running.clone());

    let interval = Duration::from_millis(config.interval_ms);

    if use_headless {
        ui::run_headless(app, running, interval)
    } else {
        ui::run(app, running, interval)
    }
}

/// Install the tracing subscriber.
///
/// Logs go to `--log-file` when given. Otherwise headless runs log to
/// stderr and the dashboard runs without a subscriber, so nothing is
/// written over the terminal UI.
fn init_logging(config: &Config, headless: bool) -> error::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = &config.log_file {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else if headless {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Global flag for signal handler (must be static for signal safety).
static SIGNAL_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Set up signal handlers for graceful shutdown.
fn setup_signal_handler(running: Arc<AtomicBool>) {
    // Spawn a thread to monitor the signal flag and propagate to running
    let running_clone = running.clone();
    std::thread::spawn(move || {
        while running_clone.load(Ordering::Relaxed) {
            if SIGNAL_RECEIVED.load(Ordering::Relaxed) {
                running_clone.store(false, Ordering::Relaxed);
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    });

    unsafe {
        libc::signal(
            libc::SIGINT,
            signal_handler as *const () as libc::sighandler_t,
        );
        libc::signal(
            libc::SIGTERM,
            signal_handler as *const () as libc::sighandler_t,
        );
    }
}

/// Signal handler that sets the signal flag (async-signal-safe).
extern "C" fn signal_handler(_: i32) {
    SIGNAL_RECEIVED.store(true, Ordering::Relaxed);
}

/// Check if stdout is connected to a terminal.
fn is_terminal() -> bool {
    unsafe { libc::isatty(libc::STDOUT_FILENO) != 0 }
}
