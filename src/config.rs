use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "COVID_DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "dataset";
pub const DEATHS_FILE: &str = "covid_deaths.csv";
pub const VACCINATIONS_FILE: &str = "covid_vaccinations.csv";

/// Locations of the two source tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub deaths: PathBuf,
    pub vaccinations: PathBuf,
}

impl DataPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            deaths: dir.join(DEATHS_FILE),
            vaccinations: dir.join(VACCINATIONS_FILE),
        }
    }

    /// The given directory, or `dataset/` when none is set. The CLI fills
    /// the directory from `--data-dir` or `COVID_DATA_DIR`.
    pub fn resolve(data_dir: Option<&Path>) -> Self {
        match data_dir {
            Some(dir) if !dir.as_os_str().is_empty() => Self::in_dir(dir),
            _ => Self::in_dir(Path::new(DEFAULT_DATA_DIR)),
        }
    }
}
