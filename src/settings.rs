//! Persisted node settings.
//!
//! The [`Thresholds`] of a node survive restarts as a sealed blob, with
//! the same checksum contract as the statistics snapshot. A missing or
//! damaged blob is replaced by defaults, which are written back at once so
//! the next start finds a valid copy.

use thiserror::Error;
use tracing::{info, warn};

use crate::codec::{self, Reader, SealError, Writer};
use crate::error::Result;
use crate::storage::Persistence;
use crate::thresholds::Thresholds;

/// Layout version of the settings blob.
pub const SETTINGS_VERSION: u16 = 1;

const PAYLOAD_LEN: usize = 2 + 15 * 8 + 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error(transparent)]
    Seal(#[from] SealError),
    #[error("unsupported settings version {0}")]
    UnsupportedVersion(u16),
    #[error("invalid value for {0}")]
    InvalidValue(&'static str),
}

/// Encode thresholds as a sealed blob.
pub fn encode(t: &Thresholds) -> Vec<u8> {
    let mut w = Writer::with_capacity(PAYLOAD_LEN + codec::DIGEST_LEN);
    w.u16(SETTINGS_VERSION);
    for (_, value) in fields(t) {
        w.f64(value);
    }
    w.bool(t.publish_summary);
    codec::seal(w.into_inner())
}

pub fn decode(blob: &[u8]) -> std::result::Result<Thresholds, SettingsError> {
    let payload = codec::unseal(blob, PAYLOAD_LEN)?;
    let mut r = Reader::new(payload);
    let truncated = || SealError::Truncated {
        len: blob.len(),
        min: PAYLOAD_LEN + codec::DIGEST_LEN,
    };

    let version = r.u16().ok_or_else(truncated)?;
    if version != SETTINGS_VERSION {
        return Err(SettingsError::UnsupportedVersion(version));
    }

    let mut t = Thresholds::default();
    for (name, slot) in fields_mut(&mut t) {
        let value = r.f64().ok_or_else(truncated)?;
        if !value.is_finite() {
            return Err(SettingsError::InvalidValue(name));
        }
        *slot = value;
    }
    t.publish_summary = r.bool().ok_or_else(truncated)?;
    Ok(t)
}

/// Load the stored settings, writing defaults back when none are usable.
///
/// Returns the thresholds in effect and whether defaults were substituted.
pub fn load_or_init(store: &impl Persistence, defaults: Thresholds) -> Result<(Thresholds, bool)> {
    let reason = match store.load()? {
        Some(blob) => match decode(&blob) {
            Ok(t) => return Ok((t, false)),
            Err(e) => e.to_string(),
        },
        None => "no stored settings".to_string(),
    };
    warn!(%reason, "using default settings");
    store.save(&encode(&defaults))?;
    Ok((defaults, true))
}

/// Overwrite the stored settings with `thresholds`.
pub fn save(store: &impl Persistence, thresholds: &Thresholds) -> Result<()> {
    store.save(&encode(thresholds))?;
    info!("settings saved");
    Ok(())
}

fn fields(t: &Thresholds) -> [(&'static str, f64); 15] {
    [
        ("nominal_voltage", t.nominal_voltage),
        ("nominal_frequency", t.nominal_frequency),
        ("rated_load", t.rated_load),
        ("undervoltage_warning", t.undervoltage_warning),
        ("undervoltage_failure", t.undervoltage_failure),
        ("overvoltage_warning", t.overvoltage_warning),
        ("overvoltage_failure", t.overvoltage_failure),
        ("frequency_shift_warning", t.frequency_shift_warning),
        ("frequency_shift_failure", t.frequency_shift_failure),
        ("phase_shift_warning", t.phase_shift_warning),
        ("phase_shift_failure", t.phase_shift_failure),
        ("overload_warning", t.overload_warning),
        ("overload_failure", t.overload_failure),
        ("overheat_warning", t.overheat_warning),
        ("overheat_failure", t.overheat_failure),
    ]
}

fn fields_mut(t: &mut Thresholds) -> [(&'static str, &mut f64); 15] {
    [
        ("nominal_voltage", &mut t.nominal_voltage),
        ("nominal_frequency", &mut t.nominal_frequency),
        ("rated_load", &mut t.rated_load),
        ("undervoltage_warning", &mut t.undervoltage_warning),
        ("undervoltage_failure", &mut t.undervoltage_failure),
        ("overvoltage_warning", &mut t.overvoltage_warning),
        ("overvoltage_failure", &mut t.overvoltage_failure),
        ("frequency_shift_warning", &mut t.frequency_shift_warning),
        ("frequency_shift_failure", &mut t.frequency_shift_failure),
        ("phase_shift_warning", &mut t.phase_shift_warning),
        ("phase_shift_failure", &mut t.phase_shift_failure),
        ("overload_warning", &mut t.overload_warning),
        ("overload_failure", &mut t.overload_failure),
        ("overheat_warning", &mut t.overheat_warning),
        ("overheat_failure", &mut t.overheat_failure),
    ]
}
