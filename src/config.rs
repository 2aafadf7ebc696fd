//! Command-line configuration for pdu-watch.
//!
//! This module defines all CLI arguments using `clap` for parsing.
//! The configuration controls the sample source, replay pacing, where
//! snapshots and logs are stored, and display mode.

use std::path::PathBuf;

use clap::Parser;

use crate::date_dir::DateDirectoryMode;

/// Power-quality monitor for a smart power distribution node.
///
/// pdu-watch replays samples from an acquisition CSV, derives the state of
/// every monitored condition, and keeps daily and cumulative statistics:
///
/// - Voltage, load, phase balance and frequency quality
/// - Power failures, including outages that span midnight
/// - Equipment signals (breaker, power meter, UPS battery, enclosure)
///
/// # Examples
///
/// ```bash
/// # Replay a day of samples with the dashboard
/// pdu-watch demos/sample_day.csv
///
/// # Headless replay as fast as possible
/// pdu-watch demos/sample_day.csv --headless --interval-ms 0
///
/// # Start over with empty history
/// pdu-watch samples.csv --clear-history
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Monitor power quality and keep daily statistics for a power node")]
pub struct Config {
    /// Path to the sample CSV to replay.
    pub samples: PathBuf,

    /// Directory for snapshots, settings and CSV logs.
    ///
    /// Created if it doesn't exist. Only one pdu-watch instance should
    /// use a given directory at a time.
    #[arg(short, long, default_value = "pdu-data")]
    pub data_dir: PathBuf,

    /// Delay between replayed samples in milliseconds.
    ///
    /// `0` replays as fast as possible.
    #[arg(short, long, default_value_t = 200)]
    pub interval_ms: u64,

    /// Node name used in notifications and summaries.
    #[arg(short, long, default_value = "Node")]
    pub node_name: String,

    /// Local time offset from UTC in minutes.
    ///
    /// Day boundaries (and so rollovers) follow local midnight at this
    /// fixed offset.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub utc_offset_minutes: i32,

    /// Save the snapshot every N samples.
    ///
    /// The snapshot is also saved after every rollover and on shutdown.
    #[arg(long, default_value_t = 60)]
    pub save_every: u64,

    /// Layout of the date directories holding daily summaries.
    #[arg(long, value_enum, default_value_t = DateDirectoryMode::Plain)]
    pub date_dir_mode: DateDirectoryMode,

    /// Use the hottest host sensor when a sample has no temperature.
    #[arg(long)]
    pub host_temperature: bool,

    /// Run in headless mode (no TUI, just logging).
    ///
    /// Forced when stdout is not a terminal.
    #[arg(long)]
    pub headless: bool,

    /// Write log output to this file.
    ///
    /// With the dashboard active, logs are dropped unless a file is given.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Wipe all stored statistics before starting.
    #[arg(long)]
    pub clear_history: bool,

    /// Overwrite stored settings with defaults derived from the nominal
    /// values below.
    #[arg(long)]
    pub reset_settings: bool,

    /// Nominal line voltage (V) used when settings are (re)created.
    #[arg(long, default_value_t = crate::thresholds::NOMINAL_VOLTAGE)]
    pub nominal_voltage: f64,

    /// Nominal line frequency (Hz) used when settings are (re)created.
    #[arg(long, default_value_t = crate::thresholds::NOMINAL_FREQUENCY)]
    pub nominal_frequency: f64,

    /// Rated load (A) used when settings are (re)created.
    #[arg(long, default_value_t = crate::thresholds::RATED_LOAD)]
    pub rated_load: f64,

    /// Number of notifications and chart points kept for the dashboard.
    #[arg(long, default_value_t = 50)]
    pub history_size: usize,
}
