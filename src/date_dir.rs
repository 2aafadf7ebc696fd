//! Date-partitioned output directories.
//!
//! Daily records are filed under a directory derived from their date.
//! The layout is chosen with [`DateDirectoryMode`].

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::ValueEnum;

use crate::error::Result;

/// How a date maps to a directory below the output root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DateDirectoryMode {
    /// `/YYYY-MM-DD`, same layout as `day`
    #[default]
    Plain,
    /// `/YYYY`
    Year,
    /// `/YYYY-MM`
    Month,
    /// `/YYYY-MM-DD`
    Day,
    /// `/YYYY/MM`
    YearMonth,
    /// `/YYYY/MM/DD`
    YearMonthDay,
    /// `/YYYY-MM/DD`
    MonthDay,
}

impl DateDirectoryMode {
    /// chrono format string for the relative directory.
    pub const fn template(self) -> &'static str {
        match self {
            Self::Plain | Self::Day => "%Y-%m-%d",
            Self::Year => "%Y",
            Self::Month => "%Y-%m",
            Self::YearMonth => "%Y/%m",
            Self::YearMonthDay => "%Y/%m/%d",
            Self::MonthDay => "%Y-%m/%d",
        }
    }

    /// Directory for `date` under `root`, without touching the filesystem.
    pub fn path_for(self, root: &Path, date: NaiveDate) -> PathBuf {
        root.join(date.format(self.template()).to_string())
    }

    /// Directory for `date` under `root`, created if missing.
    pub fn ensure(self, root: &Path, date: NaiveDate) -> Result<PathBuf> {
        let dir = self.path_for(root, date);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}
