//! Aggregated statistics for one period.
//!
//! A [`SnapSlice`] holds everything kept for a day (or for all days folded
//! together). Slices combine with `+`: counters, durations and energy add,
//! the unpowered flag ORs, minima take the min and maxima take the max.

use std::ops::Add;

use crate::condition::ConditionMap;
use crate::registry::Extrema;
use crate::thresholds::Thresholds;

/// Nominal values an empty slice seeds its extrema with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Baseline {
    pub voltage: f64,
    pub current: f64,
    pub frequency: f64,
}

impl Baseline {
    pub fn from_thresholds(thresholds: &Thresholds) -> Self {
        Self {
            voltage: thresholds.nominal_voltage,
            current: thresholds.rated_load,
            frequency: thresholds.nominal_frequency,
        }
    }
}

/// Statistics of one period.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapSlice {
    /// Energy consumption (kWh)
    pub energy: f64,
    /// The line was unpowered at some point of the period
    pub is_unpowered: bool,
    pub warnings: ConditionMap<u32>,
    pub failures: ConditionMap<u32>,
    /// Seconds without supply
    pub power_failures_duration: u64,
    pub voltage: Extrema,
    pub current: Extrema,
    pub frequency: Extrema,
}

impl SnapSlice {
    /// Slice with zero counters and extrema seeded to the baseline.
    pub fn empty(baseline: Baseline) -> Self {
        Self {
            energy: 0.0,
            is_unpowered: false,
            warnings: ConditionMap::filled(0),
            failures: ConditionMap::filled(0),
            power_failures_duration: 0,
            voltage: Extrema::seeded(baseline.voltage),
            current: Extrema::seeded(baseline.current),
            frequency: Extrema::seeded(baseline.frequency),
        }
    }
}

impl Default for SnapSlice {
    fn default() -> Self {
        Self::empty(Baseline::from_thresholds(&Thresholds::default()))
    }
}

impl Add for SnapSlice {
    type Output = SnapSlice;

    fn add(self, rhs: SnapSlice) -> SnapSlice {
        SnapSlice {
            energy: self.energy + rhs.energy,
            is_unpowered: self.is_unpowered || rhs.is_unpowered,
            warnings: self.warnings.zip_with(rhs.warnings, u32::saturating_add),
            failures: self.failures.zip_with(rhs.failures, u32::saturating_add),
            power_failures_duration: self
                .power_failures_duration
                .saturating_add(rhs.power_failures_duration),
            voltage: self.voltage.merge(rhs.voltage),
            current: self.current.merge(rhs.current),
            frequency: self.frequency.merge(rhs.frequency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;

    fn slice(energy: f64, vmin: f64, vmax: f64, overloads: u32, outage: u64) -> SnapSlice {
        let mut s = SnapSlice {
            energy,
            voltage: Extrema {
                min: vmin,
                max: vmax,
            },
            power_failures_duration: outage,
            ..SnapSlice::default()
        };
        s.failures[Condition::Overload] = overloads;
        s
    }

    #[test]
    fn add_combines_each_field() {
        let mut a = slice(1.5, 220.0, 240.0, 2, 60);
        a.is_unpowered = true;
        a.warnings[Condition::Overheat] = 1;
        let b = slice(2.25, 210.0, 235.0, 1, 30);

        let sum = a + b;
        assert_eq!(sum.energy, 3.75);
        assert!(sum.is_unpowered);
        assert_eq!(sum.failures[Condition::Overload], 3);
        assert_eq!(sum.warnings[Condition::Overheat], 1);
        assert_eq!(sum.power_failures_duration, 90);
        assert_eq!(sum.voltage.min, 210.0);
        assert_eq!(sum.voltage.max, 240.0);
    }

    #[test]
    fn add_is_associative_and_commutative() {
        let a = slice(0.5, 225.0, 231.0, 1, 10);
        let b = slice(1.25, 219.0, 245.0, 0, 0);
        let c = slice(4.0, 228.0, 229.0, 5, 7);

        assert_eq!((a + b) + c, a + (b + c));
        assert_eq!(a + b, b + a);
    }

    #[test]
    fn empty_slice_uses_baseline() {
        let s = SnapSlice::empty(Baseline {
            voltage: 120.0,
            current: 16.0,
            frequency: 60.0,
        });
        assert_eq!(s.voltage, Extrema::seeded(120.0));
        assert_eq!(s.current, Extrema::seeded(16.0));
        assert_eq!(s.frequency, Extrema::seeded(60.0));
        assert_eq!(s.failures, ConditionMap::filled(0));
    }
}
