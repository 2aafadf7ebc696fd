//! Daily aggregation and rollover.
//!
//! The [`DailyAggregator`] owns the persisted [`Snapshot`]. During the day
//! it mirrors the registry's live counters into the daily slice
//! ([`DailyAggregator::capture`]); at the day boundary it folds the daily
//! slice into the total and starts a new day
//! ([`DailyAggregator::rollover`]).
//!
//! A power failure that is still open at the boundary is split: the part
//! before the boundary is credited to the closing day, the open interval
//! is re-anchored to the boundary, and the new day starts with one failure
//! already counted.

use tracing::{debug, info};

use crate::codec::DIGEST_LEN;
use crate::condition::{Condition, ConditionState};
use crate::power_failure::{PowerFailureTracker, UNSET_TS};
use crate::registry::ProblemRegistry;
use crate::slice::{Baseline, SnapSlice};
use crate::snapshot::Snapshot;

/// What a rollover produced, for the daily log and summary.
#[derive(Clone, Debug, PartialEq)]
pub struct RolloverRecord {
    /// Rollover instant
    pub timestamp: i64,
    /// The day that just closed
    pub daily: SnapSlice,
    /// Cumulative statistics including that day
    pub total: SnapSlice,
}

pub struct DailyAggregator {
    snapshot: Snapshot,
    baseline: Baseline,
    checksum: [u8; DIGEST_LEN],
}

impl DailyAggregator {
    /// Aggregator continuing from a loaded snapshot.
    pub fn from_snapshot(snapshot: Snapshot, baseline: Baseline) -> Self {
        let checksum = snapshot.checksum();
        Self {
            snapshot,
            baseline,
            checksum,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Checksum of the snapshot as of the last capture, rollover or clear.
    pub fn checksum(&self) -> &[u8; DIGEST_LEN] {
        &self.checksum
    }

    /// Sealed snapshot blob, ready to persist.
    pub fn encode(&self) -> Vec<u8> {
        self.snapshot.encode()
    }

    /// Copy the registry's live day into the daily slice.
    ///
    /// Daily energy is the meter reading minus everything already credited
    /// to previous days.
    pub fn capture(&mut self, registry: &ProblemRegistry, meter_reading: f64, timestamp: i64) {
        let daily = &mut self.snapshot.daily;
        daily.energy = (meter_reading - self.snapshot.total.energy).max(0.0);
        daily.is_unpowered |= registry.state(Condition::PowerFailure) != ConditionState::Normal;
        daily.warnings = registry.data().daily_warnings;
        daily.failures = registry.data().daily_failures;
        daily.power_failures_duration = registry.tracker().daily_duration();
        daily.voltage = registry.voltage();
        daily.current = registry.current();
        daily.frequency = registry.frequency();

        self.store_power_state(registry);
        self.snapshot.update_ts = timestamp;
        self.reseal();
    }

    /// Push a loaded day back into a freshly set up registry.
    ///
    /// Counters are overwritten, extrema merged with whatever the registry
    /// already observed. When the power-failure condition was in Failure at
    /// the last capture, the registry is put back into Failure, so the next
    /// powered sample closes the outage. An unfinished duration alone does
    /// not reopen it: a restore without a timestamp leaves one behind.
    pub fn restore_into(&self, registry: &mut ProblemRegistry) {
        let s = &self.snapshot;
        let mut end_ts = s.failure_end_ts;
        if registry.state(Condition::PowerFailure) == ConditionState::Failure {
            end_ts = UNSET_TS;
        }
        let tracker = PowerFailureTracker::restore(
            s.failure_shift_start_ts,
            s.failure_start_ts,
            end_ts,
            s.last_failure_duration,
            s.daily.power_failures_duration,
        );
        registry.restore_day(
            s.daily.warnings,
            s.daily.failures,
            s.daily.voltage,
            s.daily.current,
            s.daily.frequency,
            tracker,
        );
        if s.power_failed {
            registry.mark_open_failure();
        }
        debug!(update_ts = s.update_ts, "restored daily statistics");
    }

    /// Close the current day at `timestamp` and start the next one.
    pub fn rollover(
        &mut self,
        registry: &mut ProblemRegistry,
        meter_reading: f64,
        timestamp: i64,
    ) -> RolloverRecord {
        self.capture(registry, meter_reading, timestamp);

        let open_failure = registry.state(Condition::PowerFailure) == ConditionState::Failure;
        let mut closed_day = self.snapshot.daily;
        if open_failure {
            let elapsed = registry.tracker_mut().reanchor(timestamp);
            closed_day.power_failures_duration =
                closed_day.power_failures_duration.saturating_add(elapsed);
        }

        let mut total = self.snapshot.total + closed_day;
        if total.energy < meter_reading {
            total.energy = meter_reading;
        }
        self.snapshot.total = total;

        registry.reset();
        let mut next_day = SnapSlice::empty(self.baseline);
        if open_failure {
            registry.seed_failures(Condition::PowerFailure, 1);
            next_day.failures[Condition::PowerFailure] = 1;
            next_day.is_unpowered = true;
        }
        self.snapshot.daily = next_day;

        self.store_power_state(registry);
        self.snapshot.update_ts = timestamp;
        self.reseal();

        info!(
            timestamp,
            energy = closed_day.energy,
            outage_secs = closed_day.power_failures_duration,
            open_failure,
            "daily rollover"
        );
        RolloverRecord {
            timestamp,
            daily: closed_day,
            total,
        }
    }

    /// Wipe all history, whatever is currently open.
    pub fn clear(&mut self, registry: &mut ProblemRegistry, timestamp: i64) {
        self.snapshot = Snapshot::fresh(self.baseline);
        self.snapshot.update_ts = timestamp;
        registry.reset();
        registry.tracker_mut().clear();
        self.reseal();
        info!(timestamp, "statistics history cleared");
    }

    fn store_power_state(&mut self, registry: &ProblemRegistry) {
        let tracker = registry.tracker();
        self.snapshot.power_failed =
            registry.state(Condition::PowerFailure) == ConditionState::Failure;
        self.snapshot.failure_start_ts = tracker.start_ts();
        self.snapshot.failure_shift_start_ts = tracker.shift_start_ts();
        self.snapshot.failure_end_ts = tracker.end_ts();
        self.snapshot.last_failure_duration = tracker.last_duration();
    }

    fn reseal(&mut self) {
        self.checksum = self.snapshot.checksum();
    }
}
