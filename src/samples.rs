//! Sample input: one CSV row per acquisition tick.
//!
//! Missing columns or empty cells mean "not measured" and leave the
//! matching condition alone.

use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::registry::ProblemRegistry;

/// One acquisition tick.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Sample {
    /// Unix seconds
    pub timestamp: i64,
    /// Phase voltages (V)
    pub voltage_a: Option<f64>,
    pub voltage_b: Option<f64>,
    pub voltage_c: Option<f64>,
    /// Phase currents (A)
    pub current_a: Option<f64>,
    pub current_b: Option<f64>,
    pub current_c: Option<f64>,
    /// Line frequency (Hz)
    pub frequency: Option<f64>,
    /// Cumulative meter reading (kWh)
    pub energy: Option<f64>,
    pub powered: Option<bool>,
    pub breaker_ok: Option<bool>,
    pub meter_ok: Option<bool>,
    pub case_open: Option<bool>,
    pub battery_ok: Option<bool>,
    pub ac_line_ok: Option<bool>,
    /// Enclosure temperature (C)
    pub temperature: Option<f64>,
}

impl Sample {
    pub fn voltages(&self) -> Option<[f64; 3]> {
        Some([self.voltage_a?, self.voltage_b?, self.voltage_c?])
    }

    pub fn currents(&self) -> Option<[f64; 3]> {
        Some([self.current_a?, self.current_b?, self.current_c?])
    }

    /// Feed every measured value into the registry.
    ///
    /// Supply presence goes first so the electrical checks of the same
    /// tick already see an outage.
    pub fn apply(&self, registry: &mut ProblemRegistry) {
        if let Some(powered) = self.powered {
            registry.monitor_power_failure(powered, self.timestamp);
        }
        if let Some(ok) = self.breaker_ok {
            registry.monitor_breaker(ok);
        }
        if let Some(ok) = self.meter_ok {
            registry.monitor_power_meter(ok);
        }
        if let Some(open) = self.case_open {
            registry.monitor_case_intrusion(open);
        }
        if let Some(ok) = self.battery_ok {
            registry.monitor_battery(ok);
        }
        if let Some(ok) = self.ac_line_ok {
            registry.monitor_ac_line(ok);
        }
        if let Some(phases) = self.voltages() {
            registry.monitor_voltage(phases);
        }
        if let Some(phases) = self.currents() {
            registry.monitor_current(phases);
        }
        if let Some(hz) = self.frequency {
            registry.monitor_frequency(hz);
        }
        if let Some(celsius) = self.temperature {
            registry.monitor_overheating(celsius);
        }
    }
}

/// Open a sample file for replay.
pub fn reader(path: &Path) -> Result<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?)
}
