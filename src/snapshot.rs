//! Persisted daily/total statistics.
//!
//! A [`Snapshot`] is what survives a restart: both slices plus the open
//! power-failure interval. It is stored as a sealed blob (see
//! [`crate::codec`]). Loading never fails; any problem with the stored blob
//! yields a fresh snapshot and a [`LoadOutcome::DefaultsSubstituted`] that
//! says why.

use std::fmt;

use thiserror::Error;

use crate::codec::{self, Reader, SealError, Writer};
use crate::condition::{Condition, ConditionMap};
use crate::power_failure::UNSET_TS;
use crate::registry::Extrema;
use crate::slice::{Baseline, SnapSlice};

/// Layout version written into every snapshot.
pub const SNAPSHOT_VERSION: u16 = 2;

const SLICE_LEN: usize = 8 + 1 + 2 * 4 * Condition::COUNT + 8 + 6 * 8;

/// Encoded payload length, without the checksum trailer.
pub const PAYLOAD_LEN: usize = 2 + 8 + 2 * SLICE_LEN + 4 * 8 + 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error(transparent)]
    Seal(#[from] SealError),
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u16),
}

/// Why a stored snapshot was not used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstitutionReason {
    /// Nothing stored yet
    Absent,
    Invalid(SnapshotError),
}

impl fmt::Display for SubstitutionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "no stored snapshot"),
            Self::Invalid(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    DefaultsSubstituted(SubstitutionReason),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub version: u16,
    /// Time of the last capture or rollover
    pub update_ts: i64,
    pub total: SnapSlice,
    pub daily: SnapSlice,
    pub failure_start_ts: i64,
    pub failure_shift_start_ts: i64,
    pub failure_end_ts: i64,
    pub last_failure_duration: i64,
    /// Generic power-failure condition was in Failure at the last capture
    pub power_failed: bool,
}

impl Snapshot {
    /// Snapshot with empty slices and no recorded failure.
    pub fn fresh(baseline: Baseline) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            update_ts: UNSET_TS,
            total: SnapSlice::empty(baseline),
            daily: SnapSlice::empty(baseline),
            failure_start_ts: UNSET_TS,
            failure_shift_start_ts: UNSET_TS,
            failure_end_ts: UNSET_TS,
            last_failure_duration: 0,
            power_failed: false,
        }
    }

    /// Encoded payload, without the checksum.
    pub fn payload(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(PAYLOAD_LEN + codec::DIGEST_LEN);
        w.u16(self.version).i64(self.update_ts);
        write_slice(&mut w, &self.total);
        write_slice(&mut w, &self.daily);
        w.i64(self.failure_start_ts)
            .i64(self.failure_shift_start_ts)
            .i64(self.failure_end_ts)
            .i64(self.last_failure_duration)
            .bool(self.power_failed);
        w.into_inner()
    }

    /// Payload followed by its SHA-256.
    pub fn encode(&self) -> Vec<u8> {
        codec::seal(self.payload())
    }

    pub fn decode(blob: &[u8]) -> Result<Self, SnapshotError> {
        let payload = codec::unseal(blob, PAYLOAD_LEN)?;
        let mut r = Reader::new(payload);
        let truncated = || SealError::Truncated {
            len: blob.len(),
            min: PAYLOAD_LEN + codec::DIGEST_LEN,
        };

        let version = r.u16().ok_or_else(truncated)?;
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        let update_ts = r.i64().ok_or_else(truncated)?;
        let total = read_slice(&mut r).ok_or_else(truncated)?;
        let daily = read_slice(&mut r).ok_or_else(truncated)?;
        let failure_start_ts = r.i64().ok_or_else(truncated)?;
        let failure_shift_start_ts = r.i64().ok_or_else(truncated)?;
        let failure_end_ts = r.i64().ok_or_else(truncated)?;
        let last_failure_duration = r.i64().ok_or_else(truncated)?;
        let power_failed = r.bool().ok_or_else(truncated)?;

        Ok(Self {
            version,
            update_ts,
            total,
            daily,
            failure_start_ts,
            failure_shift_start_ts,
            failure_end_ts,
            last_failure_duration,
            power_failed,
        })
    }

    /// Decode a stored blob, substituting a fresh snapshot on any problem.
    pub fn load(blob: Option<&[u8]>, baseline: Baseline) -> (Self, LoadOutcome) {
        let Some(blob) = blob else {
            return (
                Self::fresh(baseline),
                LoadOutcome::DefaultsSubstituted(SubstitutionReason::Absent),
            );
        };
        match Self::decode(blob) {
            Ok(snapshot) => (snapshot, LoadOutcome::Loaded),
            Err(e) => (
                Self::fresh(baseline),
                LoadOutcome::DefaultsSubstituted(SubstitutionReason::Invalid(e)),
            ),
        }
    }

    /// SHA-256 of the encoded payload.
    pub fn checksum(&self) -> [u8; codec::DIGEST_LEN] {
        codec::checksum(&self.payload())
    }
}

fn write_counters(w: &mut Writer, counters: &ConditionMap<u32>) {
    for (_, n) in counters.iter() {
        w.u32(n);
    }
}

fn write_extrema(w: &mut Writer, e: Extrema) {
    w.f64(e.min).f64(e.max);
}

fn write_slice(w: &mut Writer, s: &SnapSlice) {
    w.f64(s.energy).bool(s.is_unpowered);
    write_counters(w, &s.warnings);
    write_counters(w, &s.failures);
    w.u64(s.power_failures_duration);
    write_extrema(w, s.voltage);
    write_extrema(w, s.current);
    write_extrema(w, s.frequency);
}

fn read_counters(r: &mut Reader<'_>) -> Option<ConditionMap<u32>> {
    let mut counters = ConditionMap::filled(0);
    for condition in Condition::ALL {
        counters[condition] = r.u32()?;
    }
    Some(counters)
}

fn read_extrema(r: &mut Reader<'_>) -> Option<Extrema> {
    Some(Extrema {
        min: r.f64()?,
        max: r.f64()?,
    })
}

fn read_slice(r: &mut Reader<'_>) -> Option<SnapSlice> {
    Some(SnapSlice {
        energy: r.f64()?,
        is_unpowered: r.bool()?,
        warnings: read_counters(r)?,
        failures: read_counters(r)?,
        power_failures_duration: r.u64()?,
        voltage: read_extrema(r)?,
        current: read_extrema(r)?,
        frequency: read_extrema(r)?,
    })
}
