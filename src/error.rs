//! Error type for pdu-watch.

use thiserror::Error;

/// Errors surfaced by storage, logging, and sample replay.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Storage medium {0} is busy")]
    MediumBusy(String),

    #[error("Invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),
}

pub type Result<T> = std::result::Result<T, Error>;
