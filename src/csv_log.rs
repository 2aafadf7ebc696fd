//! CSV records: the daily summary log and the event log.
//!
//! Both files use `;` as delimiter and get their header only when the file
//! is created. Every write holds the storage medium claim.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregator::RolloverRecord;
use crate::condition::{Condition, ConditionState};
use crate::date_dir::DateDirectoryMode;
use crate::error::Result;
use crate::storage::StorageMedium;

pub const CSV_DELIMITER: u8 = b';';

/// Daily summary file name inside a date directory.
pub const SUMMARY_FILE: &str = "datalog.csv";

/// Event log path relative to the medium root.
pub const EVENT_LOG_FILE: &str = "events/eventlog.csv";

/// One summary row, built from a closed day.
#[derive(Debug, Serialize, PartialEq)]
pub struct DailyRecord {
    pub date: String,
    pub consumption_per_day: f64,
    pub consumption_total: f64,
    pub power_failures: u32,
    /// Minutes
    pub power_failures_duration: f64,
    pub min_voltage: f64,
    pub max_voltage: f64,
    pub undervoltage_failures: u32,
    pub undervoltage_warnings: u32,
    pub overvoltage_warnings: u32,
    pub overvoltage_failures: u32,
    pub min_current: f64,
    pub max_current: f64,
    pub overload_warnings: u32,
    pub overload_failures: u32,
    pub phase_imbalance_warnings: u32,
    pub phase_imbalance_failures: u32,
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub frequency_warnings: u32,
    pub frequency_failures: u32,
    pub breaker_failures: u32,
    pub power_meter_failures: u32,
    pub overheating_warnings: u32,
    pub overheating_failures: u32,
    pub case_intrusions: u32,
}

impl DailyRecord {
    /// Row for the day `date` closed by `record`.
    pub fn new(date: NaiveDate, record: &RolloverRecord) -> Self {
        let d = &record.daily;
        let w = |c: Condition| d.warnings[c];
        let f = |c: Condition| d.failures[c];
        Self {
            date: date.format("%Y-%m-%d").to_string(),
            consumption_per_day: round(d.energy, 3),
            consumption_total: round(record.total.energy, 3),
            power_failures: f(Condition::PowerFailure),
            power_failures_duration: round(d.power_failures_duration as f64 / 60.0, 2),
            min_voltage: round(d.voltage.min, 3),
            max_voltage: round(d.voltage.max, 3),
            undervoltage_failures: f(Condition::Undervoltage),
            undervoltage_warnings: w(Condition::Undervoltage),
            overvoltage_warnings: w(Condition::Overvoltage),
            overvoltage_failures: f(Condition::Overvoltage),
            min_current: round(d.current.min, 3),
            max_current: round(d.current.max, 3),
            overload_warnings: w(Condition::Overload),
            overload_failures: f(Condition::Overload),
            phase_imbalance_warnings: w(Condition::PhaseImbalance),
            phase_imbalance_failures: f(Condition::PhaseImbalance),
            min_frequency: round(d.frequency.min, 5),
            max_frequency: round(d.frequency.max, 5),
            frequency_warnings: w(Condition::FrequencyShift),
            frequency_failures: f(Condition::FrequencyShift),
            breaker_failures: f(Condition::Breaker),
            power_meter_failures: f(Condition::PowerMeter),
            overheating_warnings: w(Condition::Overheat),
            overheating_failures: f(Condition::Overheat),
            case_intrusions: f(Condition::CaseIntrusion),
        }
    }
}

/// One event log row.
#[derive(Debug, Serialize, PartialEq)]
pub struct EventRecord {
    pub timestamp: String,
    pub event_type: &'static str,
    pub category: &'static str,
    pub message: String,
}

impl EventRecord {
    pub fn new(
        time: DateTime<FixedOffset>,
        condition: Condition,
        state: ConditionState,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: time.format("%Y-%m-%d %H:%M:%S").to_string(),
            event_type: match state {
                ConditionState::Normal => "restore",
                ConditionState::Warning => "warning",
                ConditionState::Failure => "failure",
            },
            category: condition.key(),
            message: message.into(),
        }
    }
}

/// Writer for both CSV files under one storage medium.
#[derive(Clone, Debug)]
pub struct CsvLog {
    medium: StorageMedium,
    mode: DateDirectoryMode,
}

impl CsvLog {
    pub fn new(medium: StorageMedium, mode: DateDirectoryMode) -> Self {
        Self { medium, mode }
    }

    /// Append the summary of a closed day.
    pub fn append_daily(&self, date: NaiveDate, record: &RolloverRecord) -> Result<PathBuf> {
        let _claim = self.medium.claim()?;
        let dir = self.mode.ensure(self.medium.root(), date)?;
        let path = dir.join(SUMMARY_FILE);
        append_row(&path, &DailyRecord::new(date, record))?;
        info!(path = %path.display(), %date, "daily summary written");
        Ok(path)
    }

    /// Append one event.
    pub fn append_event(&self, event: &EventRecord) -> Result<()> {
        let _claim = self.medium.claim()?;
        let path = self.medium.root().join(EVENT_LOG_FILE);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        append_row(&path, event)?;
        debug!(category = event.category, event_type = event.event_type, "event logged");
        Ok(())
    }
}

fn append_row(path: &Path, row: &impl Serialize) -> Result<()> {
    let exists = path.exists();
    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(CSV_DELIMITER)
        .has_headers(!exists)
        .from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;
    Ok(())
}

fn round(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::SnapSlice;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record() -> RolloverRecord {
        let mut daily = SnapSlice {
            energy: 12.3456,
            power_failures_duration: 150,
            ..SnapSlice::default()
        };
        daily.failures[Condition::PowerFailure] = 2;
        daily.warnings[Condition::Overvoltage] = 4;
        daily.failures[Condition::CaseIntrusion] = 1;
        let mut total = daily;
        total.energy = 100.0;
        RolloverRecord {
            timestamp: 86_400,
            daily,
            total,
        }
    }

    #[test]
    fn row_maps_slice_columns() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let row = DailyRecord::new(date, &record());
        assert_eq!(row.date, "2024-05-01");
        assert_eq!(row.consumption_per_day, 12.346);
        assert_eq!(row.consumption_total, 100.0);
        assert_eq!(row.power_failures, 2);
        assert_eq!(row.power_failures_duration, 2.5);
        assert_eq!(row.overvoltage_warnings, 4);
        assert_eq!(row.case_intrusions, 1);
        assert_eq!(row.min_voltage, 230.0);
    }

    #[test]
    fn header_written_once() {
        let dir = TempDir::new().unwrap();
        let log = CsvLog::new(StorageMedium::new(dir.path()), DateDirectoryMode::Month);
        let first = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let second = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();

        let path = log.append_daily(first, &record()).unwrap();
        let again = log.append_daily(second, &record()).unwrap();
        assert_eq!(path, again);
        assert!(path.ends_with("2024-05/datalog.csv"));

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("date;consumption_per_day;consumption_total;power_failures"));
        assert!(lines[0].ends_with("overheating_failures;case_intrusions"));
        assert!(lines[1].starts_with("2024-05-01;12.346;100.0;2;2.5;"));
        assert!(lines[2].starts_with("2024-05-02;"));
    }

    #[test]
    fn events_append_under_events_dir() {
        let dir = TempDir::new().unwrap();
        let log = CsvLog::new(StorageMedium::new(dir.path()), DateDirectoryMode::Plain);
        let tz = FixedOffset::east_opt(3600).unwrap();
        let time = tz.with_ymd_and_hms(2024, 5, 1, 13, 5, 0).unwrap();

        log.append_event(&EventRecord::new(
            time,
            Condition::Breaker,
            ConditionState::Failure,
            "Circuit Breaker failure",
        ))
        .unwrap();

        let text = std::fs::read_to_string(dir.path().join(EVENT_LOG_FILE)).unwrap();
        assert_eq!(
            text,
            "timestamp;event_type;category;message\n\
             2024-05-01 13:05:00;failure;CircuitBreaker;Circuit Breaker failure\n"
        );
    }
}
