use chrono::NaiveDate;
use serde::Serialize;

/// One joined row of the deaths and vaccinations sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub region: Option<String>,
    pub location: String,
    pub date: NaiveDate,
    pub population: Option<u64>,
    pub new_cases: Option<f64>,
    pub total_cases: Option<f64>,
    pub new_vaccinations: Option<f64>,
    pub people_vaccinated: Option<f64>,
    pub hospital_beds_per_thousand: Option<f64>,
    pub hosp_patients: Option<f64>,
    pub new_deaths: Option<f64>,
    pub total_deaths: Option<f64>,
    pub stringency_index: Option<f64>,
}

/// Which raw input table to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Source {
    #[default]
    Deaths,
    Vaccinations,
}

impl Source {
    pub fn title(self) -> &'static str {
        match self {
            Source::Deaths => "Covid Deaths",
            Source::Vaccinations => "Covid Vaccinations",
        }
    }
}

/// A source file as read, every column kept as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// The unified table, loaded once and read by every aggregation, plus the
/// two raw tables it was joined from.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<Record>,
    pub deaths: SourceTable,
    pub vaccinations: SourceTable,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn with_sources(records: Vec<Record>, deaths: SourceTable, vaccinations: SourceTable) -> Self {
        Self {
            records,
            deaths,
            vaccinations,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn source(&self, source: Source) -> &SourceTable {
        match source {
            Source::Deaths => &self.deaths,
            Source::Vaccinations => &self.vaccinations,
        }
    }

    /// Distinct location names, sorted.
    pub fn locations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.iter().map(|r| r.location.clone()).collect();
        names.sort();
        names.dedup();
        names
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountrySummary {
    pub location: String,
    pub population: u64,
    pub total_cases: Option<f64>,
    pub people_vaccinated: Option<f64>,
    pub total_deaths: Option<f64>,
    pub cases_pct: Option<f64>,
    pub vaccinations_pct: Option<f64>,
    pub deaths_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesPoint {
    pub location: String,
    pub date: NaiveDate,
    pub new_cases: f64,
    pub new_deaths: f64,
    pub new_vaccinations: f64,
    pub total_cases: Option<f64>,
    pub total_deaths: Option<f64>,
    pub people_vaccinated: Option<f64>,
    pub new_cases_avg: Option<f64>,
    pub new_deaths_avg: Option<f64>,
    pub new_vaccinations_avg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MortalitySummary {
    pub location: String,
    pub total_cases: f64,
    pub total_deaths: f64,
    pub population: f64,
    pub mortality_rate: f64,
    pub cases_per_million: f64,
    pub deaths_per_million: f64,
}

/// Headline metric cards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GlobalStats {
    pub total_cases: Option<f64>,
    pub people_vaccinated: Option<f64>,
    pub hosp_patients: Option<f64>,
    pub total_deaths: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScatterPoint {
    pub location: String,
    pub region: String,
    pub x: f64,
    pub y: f64,
    pub population: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format("%B, %Y"),
            self.end.format("%B, %Y")
        )
    }
}
