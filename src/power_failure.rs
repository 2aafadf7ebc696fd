//! Outage bookkeeping for the generic power-failure condition.
//!
//! Timestamps are Unix seconds. [`UNSET_TS`] marks a timestamp that was
//! never recorded and [`DURATION_IN_PROGRESS`] marks a failure whose
//! duration is not known yet. Both sentinels survive snapshot round-trips.
//!
//! Two start points are kept, `start_ts` for the per-day outage
//! accumulation and `shift_start_ts` for the reported duration. Both are
//! set together when a failure opens, and a rollover while a failure is
//! open moves both to the rollover instant, so they always hold the same
//! value. Each day only accounts for its own share, and the duration
//! reported on restore is measured from the last boundary.

/// Timestamp value meaning "not recorded".
pub const UNSET_TS: i64 = 0;

/// Duration value meaning "failure still in progress".
pub const DURATION_IN_PROGRESS: i64 = -1;

/// Temporal accounting for power failures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PowerFailureTracker {
    shift_start_ts: i64,
    start_ts: i64,
    end_ts: i64,
    last_duration: i64,
    daily_duration: u64,
}

impl PowerFailureTracker {
    /// Record a transition into failure.
    pub fn on_failure(&mut self, timestamp: i64) {
        if timestamp == UNSET_TS {
            return;
        }
        self.shift_start_ts = timestamp;
        self.start_ts = timestamp;
        self.last_duration = DURATION_IN_PROGRESS;
        self.end_ts = UNSET_TS;
    }

    /// Record a transition back to normal.
    ///
    /// Ignored without a timestamp or when no failure start was recorded.
    pub fn on_restore(&mut self, timestamp: i64) {
        if timestamp == UNSET_TS || self.start_ts == UNSET_TS {
            return;
        }
        self.end_ts = timestamp;
        self.last_duration = self.end_ts - self.shift_start_ts;
        self.daily_duration = self
            .daily_duration
            .saturating_add(non_negative(self.end_ts - self.start_ts));
    }

    /// Move the open interval's reference points to `timestamp`.
    ///
    /// Returns the seconds of outage that belong to the period before
    /// `timestamp`. Nothing moves when no timestamped interval is open.
    pub fn reanchor(&mut self, timestamp: i64) -> u64 {
        if self.start_ts == UNSET_TS || self.end_ts != UNSET_TS {
            return 0;
        }
        let elapsed = non_negative(timestamp - self.start_ts);
        self.start_ts = timestamp;
        self.shift_start_ts = timestamp;
        elapsed
    }

    /// Zero the per-day outage accumulator.
    pub fn reset_daily(&mut self) {
        self.daily_duration = 0;
    }

    /// Forget every recorded timestamp and duration.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Rebuild a tracker from persisted fields.
    pub fn restore(
        shift_start_ts: i64,
        start_ts: i64,
        end_ts: i64,
        last_duration: i64,
        daily_duration: u64,
    ) -> Self {
        Self {
            shift_start_ts,
            start_ts,
            end_ts,
            last_duration,
            daily_duration,
        }
    }

    pub fn shift_start_ts(&self) -> i64 {
        self.shift_start_ts
    }

    pub fn start_ts(&self) -> i64 {
        self.start_ts
    }

    pub fn end_ts(&self) -> i64 {
        self.end_ts
    }

    /// Duration of the last completed failure in seconds, `-1` while one is
    /// open, `0` if none was recorded.
    pub fn last_duration(&self) -> i64 {
        self.last_duration
    }

    /// Seconds of completed outage accumulated today.
    pub fn daily_duration(&self) -> u64 {
        self.daily_duration
    }

    /// True while a timestamped failure is open.
    pub fn in_progress(&self) -> bool {
        self.last_duration == DURATION_IN_PROGRESS
    }
}

fn non_negative(secs: i64) -> u64 {
    u64::try_from(secs).unwrap_or(0)
}
