//! Application state and logic for pdu-watch.
//!
//! This module contains the main [`App`] struct which coordinates sample
//! replay, the problem registry, daily aggregation, persistence and
//! logging. Both the dashboard and the headless loop drive it one sample
//! at a time through [`App::step`].

use std::collections::VecDeque;
use std::fs::{self, File};
use std::sync::mpsc::{self, Receiver};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sysinfo::Components;
use tracing::{info, warn};

use crate::aggregator::{DailyAggregator, RolloverRecord};
use crate::codec::DIGEST_LEN;
use crate::config::Config;
use crate::csv_log::{CsvLog, EventRecord};
use crate::error::{Error, Result};
use crate::notify::{self, Notification, Notifier};
use crate::power_failure::UNSET_TS;
use crate::registry::ProblemRegistry;
use crate::samples::{self, Sample};
use crate::settings;
use crate::slice::Baseline;
use crate::snapshot::{LoadOutcome, Snapshot};
use crate::storage::{FileStore, Persistence, StorageMedium};
use crate::thresholds::Thresholds;

/// Snapshot blob file name under the data directory.
pub const SNAPSHOT_FILE: &str = "snapshot.dat";

/// Settings blob file name under the data directory.
pub const SETTINGS_FILE: &str = "settings.dat";

/// Main application state.
pub struct App {
    /// Application configuration from CLI
    pub config: Config,

    /// Live condition states and daily counters
    pub registry: ProblemRegistry,

    /// Daily/total statistics
    pub aggregator: DailyAggregator,

    /// Most recent notifications, oldest first
    pub notifications: VecDeque<Notification>,

    /// Last replayed sample
    pub last_sample: Option<Sample>,

    /// Summary of the last closed day
    pub last_summary: Option<String>,

    /// Samples processed since start
    pub samples_seen: u64,

    /// Rollovers performed since start
    pub rollovers: u64,

    /// Replay source, `None` once exhausted
    source: Option<csv::DeserializeRecordsIntoIter<File, Sample>>,

    snapshot_store: FileStore,
    /// Checksum of the last snapshot written
    saved_checksum: Option<[u8; DIGEST_LEN]>,
    csv_log: CsvLog,
    rx: Receiver<Notification>,
    offset: FixedOffset,
    current_day: Option<NaiveDate>,
    meter_reading: f64,
    host: Option<HostProbe>,
}

impl App {
    /// Create a new application instance.
    ///
    /// Loads (or initialises) settings and the statistics snapshot from the
    /// data directory and opens the sample source.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory or the sample file can't be
    /// opened, or if the storage medium is busy.
    pub fn new(config: Config) -> Result<Self> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60))
            .ok_or(Error::InvalidOffset(config.utc_offset_minutes))?;

        fs::create_dir_all(&config.data_dir)?;
        let medium = StorageMedium::new(&config.data_dir);

        let settings_store = FileStore::new(medium.clone(), SETTINGS_FILE);
        let defaults = Thresholds::for_nominal(
            config.nominal_voltage,
            config.nominal_frequency,
            config.rated_load,
        );
        let thresholds = if config.reset_settings {
            settings::save(&settings_store, &defaults)?;
            defaults
        } else {
            settings::load_or_init(&settings_store, defaults)?.0
        };
        let baseline = Baseline::from_thresholds(&thresholds);

        let snapshot_store = FileStore::new(medium.clone(), SNAPSHOT_FILE);
        let stored = snapshot_store.load()?;
        let (snapshot, outcome) = Snapshot::load(stored.as_deref(), baseline);
        match &outcome {
            LoadOutcome::Loaded => info!(update_ts = snapshot.update_ts, "snapshot loaded"),
            LoadOutcome::DefaultsSubstituted(reason) => {
                warn!(%reason, "starting from empty statistics")
            }
        }

        let (tx, rx) = mpsc::channel();
        let mut registry = ProblemRegistry::new(thresholds);
        registry.add_listener(Box::new(Notifier::new(config.node_name.clone(), tx)));

        let mut aggregator = DailyAggregator::from_snapshot(snapshot, baseline);
        aggregator.restore_into(&mut registry);
        if config.clear_history {
            // unstamped, so the first replayed sample sets the current day
            aggregator.clear(&mut registry, UNSET_TS);
            snapshot_store.save(&aggregator.encode())?;
        }

        let snap = aggregator.snapshot();
        let current_day = local_date(snap.update_ts, offset).filter(|_| snap.update_ts != 0);
        let meter_reading = snap.total.energy + snap.daily.energy;

        let source = samples::reader(&config.samples)?.into_deserialize();
        let host = config.host_temperature.then(HostProbe::new);
        let history_size = config.history_size;
        let csv_log = CsvLog::new(medium, config.date_dir_mode);

        registry.start();
        info!(samples = %config.samples.display(), node = %config.node_name, "monitoring started");

        Ok(Self {
            config,
            registry,
            aggregator,
            notifications: VecDeque::with_capacity(history_size),
            last_sample: None,
            last_summary: None,
            samples_seen: 0,
            rollovers: 0,
            source: Some(source),
            snapshot_store,
            saved_checksum: None,
            csv_log,
            rx,
            offset,
            current_day,
            meter_reading,
            host,
        })
    }

    /// True once every sample has been replayed.
    pub fn is_finished(&self) -> bool {
        self.source.is_none()
    }

    /// Replay the next sample. Returns `false` when the source is exhausted.
    ///
    /// Unparseable rows are logged and skipped.
    pub fn step(&mut self) -> Result<bool> {
        loop {
            let Some(source) = self.source.as_mut() else {
                return Ok(false);
            };
            match source.next() {
                None => {
                    self.source = None;
                    info!(samples = self.samples_seen, "sample source exhausted");
                    return Ok(false);
                }
                Some(Err(e)) if !e.is_io_error() => {
                    warn!(error = %e, "skipping malformed sample");
                }
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(sample)) => {
                    self.process(sample)?;
                    return Ok(true);
                }
            }
        }
    }

    /// Feed one sample through the engine.
    pub fn process(&mut self, mut sample: Sample) -> Result<()> {
        let ts = sample.timestamp;
        if let Some(day) = local_date(ts, self.offset) {
            match self.current_day {
                Some(mut prev) if day > prev => {
                    // one rollover per boundary, skipped days included
                    while prev < day {
                        let Some(next) = prev.succ_opt() else { break };
                        let boundary = local_midnight(next, self.offset).unwrap_or(ts);
                        self.rollover(prev, boundary)?;
                        prev = next;
                    }
                    self.current_day = Some(day);
                }
                None => self.current_day = Some(day),
                Some(_) => {}
            }
        }

        if sample.temperature.is_none() {
            if let Some(host) = self.host.as_mut() {
                sample.temperature = host.hottest();
            }
        }

        sample.apply(&mut self.registry);
        if let Some(energy) = sample.energy {
            self.meter_reading = energy;
        }
        self.aggregator.capture(&self.registry, self.meter_reading, ts);
        self.samples_seen += 1;

        self.drain_notifications(ts)?;

        if self.config.save_every > 0 && self.samples_seen % self.config.save_every == 0 {
            self.save()?;
        }
        self.last_sample = Some(sample);
        Ok(())
    }

    /// Close `day` at `boundary`, log its summary and persist.
    fn rollover(&mut self, day: NaiveDate, boundary: i64) -> Result<RolloverRecord> {
        let record = self
            .aggregator
            .rollover(&mut self.registry, self.meter_reading, boundary);
        self.rollovers += 1;
        self.csv_log.append_daily(day, &record)?;

        let thresholds = self.registry.thresholds();
        if thresholds.publish_summary {
            let summary =
                notify::render_summary(&self.config.node_name, &record, thresholds.nominal_voltage);
            info!(%day, boundary = record.timestamp, "{summary}");
            self.last_summary = Some(summary);
        }
        self.save()?;
        Ok(record)
    }

    fn drain_notifications(&mut self, sample_ts: i64) -> Result<()> {
        while let Ok(n) = self.rx.try_recv() {
            info!(condition = n.condition.key(), state = n.state.label(), "{}", n.text);
            let ts = if n.timestamp != 0 { n.timestamp } else { sample_ts };
            if let Some(time) = local_time(ts, self.offset) {
                let event = EventRecord::new(time, n.condition, n.state, n.text.replace('\n', " "));
                self.csv_log.append_event(&event)?;
            }
            if self.notifications.len() >= self.config.history_size.max(1) {
                self.notifications.pop_front();
            }
            self.notifications.push_back(n);
        }
        Ok(())
    }

    /// Persist the current snapshot, unless it is unchanged since the
    /// last write.
    pub fn save(&mut self) -> Result<()> {
        let checksum = *self.aggregator.checksum();
        if self.saved_checksum == Some(checksum) {
            return Ok(());
        }
        self.snapshot_store.save(&self.aggregator.encode())?;
        self.saved_checksum = Some(checksum);
        Ok(())
    }

    /// Stop monitoring and persist.
    pub fn shutdown(&mut self) -> Result<()> {
        self.registry.stop();
        self.save()?;
        info!(
            samples = self.samples_seen,
            rollovers = self.rollovers,
            "monitoring stopped"
        );
        Ok(())
    }

    /// Local date the statistics currently belong to.
    pub fn current_day(&self) -> Option<NaiveDate> {
        self.current_day
    }

    pub fn meter_reading(&self) -> f64 {
        self.meter_reading
    }

    /// Local time of a sample timestamp.
    pub fn local_time(&self, ts: i64) -> Option<DateTime<FixedOffset>> {
        local_time(ts, self.offset)
    }
}

/// Hottest host sensor via sysinfo.
struct HostProbe {
    components: Components,
}

impl HostProbe {
    fn new() -> Self {
        Self {
            components: Components::new_with_refreshed_list(),
        }
    }

    fn hottest(&mut self) -> Option<f64> {
        self.components.refresh(false);
        self.components
            .list()
            .iter()
            .filter_map(|c| c.temperature())
            .filter(|t| t.is_finite())
            .map(f64::from)
            .reduce(f64::max)
    }
}

fn local_time(ts: i64, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::<Utc>::from_timestamp(ts, 0).map(|t| t.with_timezone(&offset))
}

fn local_date(ts: i64, offset: FixedOffset) -> Option<NaiveDate> {
    local_time(ts, offset).map(|t| t.date_naive())
}

/// Unix time of local midnight starting `day`.
fn local_midnight(day: NaiveDate, offset: FixedOffset) -> Option<i64> {
    day.and_hms_opt(0, 0, 0)?
        .and_local_timezone(offset)
        .single()
        .map(|t| t.timestamp())
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use clap::Parser;
    use tempfile::TempDir;

    use super::*;
    use crate::condition::{Condition, ConditionState};

    const HEADER: &str = "timestamp,voltage_a,voltage_b,voltage_c,current_a,current_b,current_c,frequency,energy,powered,breaker_ok,meter_ok,case_open,battery_ok,ac_line_ok,temperature";

    // 2024-03-01 00:00:00 UTC
    const DAY1: i64 = 1_709_251_200;
    const DAY2: i64 = DAY1 + 86_400;

    fn write_samples(dir: &Path, rows: &[String]) -> std::path::PathBuf {
        let path = dir.join("samples.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        path
    }

    fn row(ts: i64, volts: f64, energy: f64, powered: bool) -> String {
        format!("{ts},{volts},{volts},{volts},10,10,10,50,{energy},{powered},true,true,false,true,true,30")
    }

    fn config(samples: &Path, data: &Path, extra: &[&str]) -> Config {
        let mut args = vec![
            "pdu-watch".to_string(),
            samples.display().to_string(),
            "--data-dir".to_string(),
            data.display().to_string(),
            "--save-every".to_string(),
            "0".to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        Config::try_parse_from(args).unwrap()
    }

    fn run_all(app: &mut App) {
        while app.step().unwrap() {}
        app.shutdown().unwrap();
    }

    #[test]
    fn replay_rolls_over_at_midnight() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let samples = write_samples(
            dir.path(),
            &[
                row(DAY1 + 3_600, 230.0, 100.0, true),
                row(DAY1 + 7_200, 270.0, 101.0, true),
                row(DAY1 + 80_000, 0.0, 102.0, false),
                row(DAY2 + 600, 0.0, 102.0, false),
                row(DAY2 + 1_200, 230.0, 102.5, true),
            ],
        );

        let mut app = App::new(config(&samples, &data, &[])).unwrap();
        run_all(&mut app);

        assert_eq!(app.rollovers, 1);
        assert_eq!(app.current_day(), NaiveDate::from_ymd_opt(2024, 3, 2));
        let snap = app.aggregator.snapshot();
        // outage 80_000..86_400 credited to day one, 86_400..87_600 to day two
        assert_eq!(snap.total.power_failures_duration, 6_400);
        assert_eq!(snap.daily.power_failures_duration, 1_200);
        assert_eq!(snap.daily.failures[Condition::PowerFailure], 1);
        assert_eq!(snap.total.failures[Condition::Overvoltage], 1);
        assert_eq!(app.registry.tracker().last_duration(), 1_200);

        let summary = data.join("2024-03-01").join("datalog.csv");
        let text = fs::read_to_string(summary).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(data.join("events/eventlog.csv").exists());
        assert!(app.last_summary.is_some());
    }

    #[test]
    fn skipped_days_each_get_a_rollover() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let day4 = DAY1 + 3 * 86_400;
        let samples = write_samples(
            dir.path(),
            &[
                row(DAY1 + 60, 0.0, 50.0, false),
                row(day4 + 60, 230.0, 50.0, true),
            ],
        );

        let mut app = App::new(config(&samples, &data, &[])).unwrap();
        run_all(&mut app);

        assert_eq!(app.rollovers, 3);
        assert_eq!(app.current_day(), NaiveDate::from_ymd_opt(2024, 3, 4));
        for day in ["2024-03-01", "2024-03-02", "2024-03-03"] {
            let text = fs::read_to_string(data.join(day).join("datalog.csv")).unwrap();
            assert_eq!(text.lines().count(), 2, "{day}");
        }

        let snap = app.aggregator.snapshot();
        assert_eq!(snap.total.power_failures_duration, 86_340 + 2 * 86_400);
        assert_eq!(snap.total.failures[Condition::PowerFailure], 3);
        assert_eq!(snap.daily.power_failures_duration, 60);
        assert_eq!(snap.daily.failures[Condition::PowerFailure], 1);
        assert_eq!(app.registry.tracker().last_duration(), 60);
    }

    #[test]
    fn cleared_history_still_rolls_over() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let samples = write_samples(
            dir.path(),
            &[
                row(DAY1 + 60, 230.0, 1.0, true),
                row(DAY2 + 60, 230.0, 2.0, true),
                row(DAY2 + 86_400 + 60, 230.0, 3.0, true),
            ],
        );

        let mut app = App::new(config(&samples, &data, &["--clear-history"])).unwrap();
        assert_eq!(app.current_day(), None);
        run_all(&mut app);

        assert_eq!(app.rollovers, 2);
        assert_eq!(app.current_day(), NaiveDate::from_ymd_opt(2024, 3, 3));
        assert!(data.join("2024-03-01").join("datalog.csv").exists());
        assert!(data.join("2024-03-02").join("datalog.csv").exists());
        assert_eq!(app.aggregator.snapshot().total.energy, 2.0);
    }

    #[test]
    fn restart_continues_statistics() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let first = write_samples(dir.path(), &[row(DAY1 + 60, 270.0, 5.0, true)]);
        let mut app = App::new(config(&first, &data, &[])).unwrap();
        run_all(&mut app);
        drop(app);

        let second = write_samples(dir.path(), &[row(DAY1 + 120, 230.0, 6.0, true)]);
        let mut app = App::new(config(&second, &data, &[])).unwrap();
        assert_eq!(app.registry.daily_failures(Condition::Overvoltage), 1);
        run_all(&mut app);
        assert_eq!(app.rollovers, 0);
        assert_eq!(app.aggregator.snapshot().daily.energy, 6.0);
    }

    #[test]
    fn clear_history_starts_empty() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let samples = write_samples(dir.path(), &[row(DAY1 + 60, 270.0, 5.0, true)]);
        let mut app = App::new(config(&samples, &data, &[])).unwrap();
        run_all(&mut app);
        drop(app);

        let app = App::new(config(&samples, &data, &["--clear-history"])).unwrap();
        assert_eq!(app.registry.daily_failures(Condition::Overvoltage), 0);
        assert_eq!(app.aggregator.snapshot().total.energy, 0.0);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let samples = write_samples(
            dir.path(),
            &[
                "not-a-number,1,2,3,,,,,,,,,,,,".to_string(),
                row(DAY1 + 60, 230.0, 1.0, false),
            ],
        );
        let mut app = App::new(config(&samples, &data, &[])).unwrap();
        run_all(&mut app);

        assert_eq!(app.samples_seen, 1);
        assert_eq!(app.registry.state(Condition::PowerFailure), ConditionState::Failure);
        assert_eq!(app.notifications.len(), 1);
    }

    #[test]
    fn midnight_follows_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(local_midnight(day, offset), Some(DAY2 - 7_200));
        assert_eq!(local_date(DAY2 - 3_600, offset), Some(day));
    }
}
