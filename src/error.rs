use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Failures while reading or joining the source tables. All of them are fatal
/// for the session.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Source file does not exist
    #[error("source file not found: {}", path.display())]
    Missing { path: PathBuf },

    /// Source file exists but could not be read or parsed as CSV
    #[error("failed to read {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A required column is absent from the header row
    #[error("{} is missing required column `{column}`", path.display())]
    MissingColumn { path: PathBuf, column: String },

    /// A cell could not be converted to its declared type
    #[error("{} line {line}: invalid {column} value `{value}`", path.display())]
    InvalidValue {
        path: PathBuf,
        line: u64,
        column: String,
        value: String,
    },

    /// The same (location, date) key appears twice in one source
    #[error("{} has duplicate rows for {location} on {date}", path.display())]
    DuplicateKey {
        path: PathBuf,
        location: String,
        date: NaiveDate,
    },

    /// A (location, date) key exists in one source but not the other
    #[error("no {missing_from} row for {location} on {date}")]
    JoinMismatch {
        location: String,
        date: NaiveDate,
        missing_from: &'static str,
    },

    /// Both sources have the key but disagree on its region
    #[error("{location} on {date} is in region {deaths:?} in the deaths source but {vaccinations:?} in the vaccinations source")]
    RegionMismatch {
        location: String,
        date: NaiveDate,
        deaths: Option<String>,
        vaccinations: Option<String>,
    },
}

/// A selection value outside its enumerated set.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field} `{value}` (expected one of: {})", allowed.join(", "))]
pub struct InvalidSelectionError {
    pub field: &'static str,
    pub value: String,
    pub allowed: Vec<&'static str>,
}
