//! Threshold definitions for pdu-watch.
//!
//! This module defines the nominal operating point of the node and the
//! warning/failure levels used to turn raw measurements into a
//! [`ConditionState`]. "Over" conditions compare with `>=`, "under"
//! conditions with `<=`.

use crate::condition::ConditionState;

/// Nominal line voltage (V)
pub const NOMINAL_VOLTAGE: f64 = 230.0;
/// Nominal line frequency (Hz)
pub const NOMINAL_FREQUENCY: f64 = 50.0;
/// Rated load of the node (A)
pub const RATED_LOAD: f64 = 32.0;

/// Threshold configuration for all monitored measurements.
#[derive(Clone, Debug, PartialEq)]
pub struct Thresholds {
    /// Nominal line voltage (V)
    pub nominal_voltage: f64,
    /// Nominal line frequency (Hz)
    pub nominal_frequency: f64,
    /// Rated load (A)
    pub rated_load: f64,
    /// Undervoltage warning threshold (V)
    pub undervoltage_warning: f64,
    /// Undervoltage failure threshold (V)
    pub undervoltage_failure: f64,
    /// Overvoltage warning threshold (V)
    pub overvoltage_warning: f64,
    /// Overvoltage failure threshold (V)
    pub overvoltage_failure: f64,
    /// Frequency deviation warning threshold (Hz)
    pub frequency_shift_warning: f64,
    /// Frequency deviation failure threshold (Hz)
    pub frequency_shift_failure: f64,
    /// Phase imbalance warning threshold (%)
    pub phase_shift_warning: f64,
    /// Phase imbalance failure threshold (%)
    pub phase_shift_failure: f64,
    /// Overload warning threshold (A)
    pub overload_warning: f64,
    /// Overload failure threshold (A)
    pub overload_failure: f64,
    /// Enclosure temperature warning threshold (C)
    pub overheat_warning: f64,
    /// Enclosure temperature failure threshold (C)
    pub overheat_failure: f64,
    /// Publish a summary notification at every daily rollover
    pub publish_summary: bool,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::for_nominal(NOMINAL_VOLTAGE, NOMINAL_FREQUENCY, RATED_LOAD)
    }
}

impl Thresholds {
    /// Derive the default thresholds from a nominal operating point.
    pub fn for_nominal(voltage: f64, frequency: f64, rated_load: f64) -> Self {
        Self {
            nominal_voltage: voltage,
            nominal_frequency: frequency,
            rated_load,
            undervoltage_warning: 0.85 * voltage,
            undervoltage_failure: 0.60 * voltage,
            overvoltage_warning: 1.05 * voltage,
            overvoltage_failure: 1.15 * voltage,
            frequency_shift_warning: 0.2,
            frequency_shift_failure: 1.5,
            phase_shift_warning: 5.0,
            phase_shift_failure: 15.0,
            overload_warning: 0.90 * rated_load,
            overload_failure: 1.05 * rated_load,
            overheat_warning: 50.0,
            overheat_failure: 120.0,
            publish_summary: true,
        }
    }

    /// Evaluate overvoltage from the highest phase voltage.
    pub fn overvoltage_state(&self, max_voltage: f64) -> ConditionState {
        evaluate_over(max_voltage, self.overvoltage_warning, self.overvoltage_failure)
    }

    /// Evaluate undervoltage from the lowest phase voltage (low is bad).
    pub fn undervoltage_state(&self, min_voltage: f64) -> ConditionState {
        evaluate_under(min_voltage, self.undervoltage_warning, self.undervoltage_failure)
    }

    /// Evaluate overload from the highest phase current.
    pub fn overload_state(&self, max_current: f64) -> ConditionState {
        evaluate_over(max_current, self.overload_warning, self.overload_failure)
    }

    /// Evaluate phase imbalance. Only the magnitude of the shift matters.
    pub fn phase_shift_state(&self, shift_percent: f64) -> ConditionState {
        evaluate_over(
            shift_percent.abs(),
            self.phase_shift_warning,
            self.phase_shift_failure,
        )
    }

    /// Evaluate frequency drift away from nominal, in either direction.
    pub fn frequency_state(&self, frequency: f64) -> ConditionState {
        evaluate_over(
            (frequency - self.nominal_frequency).abs(),
            self.frequency_shift_warning,
            self.frequency_shift_failure,
        )
    }

    /// Evaluate enclosure temperature.
    pub fn overheat_state(&self, celsius: f64) -> ConditionState {
        evaluate_over(celsius, self.overheat_warning, self.overheat_failure)
    }
}

/// Compare against an ascending threshold pair (high is bad).
pub fn evaluate_over(value: f64, warning: f64, failure: f64) -> ConditionState {
    if value >= failure {
        ConditionState::Failure
    } else if value >= warning {
        ConditionState::Warning
    } else {
        ConditionState::Normal
    }
}

/// Compare against a descending threshold pair (low is bad).
pub fn evaluate_under(value: f64, warning: f64, failure: f64) -> ConditionState {
    if value <= failure {
        ConditionState::Failure
    } else if value <= warning {
        ConditionState::Warning
    } else {
        ConditionState::Normal
    }
}

/// True for a finite, non-negative magnitude.
pub fn is_valid_magnitude(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Reduce three phase readings to `(min, max)`.
///
/// Returns `None` when any phase is not a valid magnitude; the whole
/// sample must then be skipped.
pub fn phase_range(phases: [f64; 3]) -> Option<(f64, f64)> {
    if !phases.iter().all(|&p| is_valid_magnitude(p)) {
        return None;
    }
    let min = phases.iter().copied().fold(f64::INFINITY, f64::min);
    let max = phases.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((min, max))
}

/// Largest relative deviation of any phase from the phase average, in %.
///
/// With no load at all the phases are trivially balanced and 0 % is
/// returned. Invalid phase readings yield `None`.
pub fn phase_imbalance_percent(phases: [f64; 3]) -> Option<f64> {
    phase_range(phases)?;
    let avg = phases.iter().sum::<f64>() / 3.0;
    if avg <= 0.0 {
        return Some(0.0);
    }
    let max_shift = phases
        .iter()
        .map(|&p| (p / avg - 1.0).abs())
        .fold(0.0, f64::max);
    Some(max_shift * 100.0)
}
