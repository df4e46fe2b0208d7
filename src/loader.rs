use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use crate::config::DataPaths;
use crate::error::LoadError;
use crate::models::{Dataset, Record, SourceTable};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Cells pandas reads as missing by default.
const NA_TOKENS: [&str; 19] = [
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null", "",
];

const DEATHS_COLUMNS: [&str; 10] = [
    "location",
    "date",
    "population",
    "new_cases",
    "total_cases",
    "new_deaths",
    "total_deaths",
    "hosp_patients",
    "hospital_beds_per_thousand",
    "stringency_index",
];

const VACCINATIONS_COLUMNS: [&str; 4] =
    ["location", "date", "new_vaccinations", "people_vaccinated"];

fn is_na(value: &str) -> bool {
    NA_TOKENS.contains(&value.trim())
}

fn na_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|v| !is_na(v)))
}

fn na_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None => Ok(None),
        Some(v) if is_na(v) => Ok(None),
        Some(v) => v
            .parse::<f64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid number `{v}`"))),
    }
}

#[derive(Deserialize)]
struct DeathsRow {
    #[serde(alias = "continent", deserialize_with = "na_text")]
    region: Option<String>,
    location: String,
    date: String,
    #[serde(deserialize_with = "na_number")]
    population: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    new_cases: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    total_cases: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    new_deaths: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    total_deaths: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    hosp_patients: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    hospital_beds_per_thousand: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    stringency_index: Option<f64>,
}

impl DeathsRow {
    fn numbers(&self) -> [(&'static str, Option<f64>); 8] {
        [
            ("new_cases", self.new_cases),
            ("total_cases", self.total_cases),
            ("new_deaths", self.new_deaths),
            ("total_deaths", self.total_deaths),
            ("hosp_patients", self.hosp_patients),
            ("hospital_beds_per_thousand", self.hospital_beds_per_thousand),
            ("stringency_index", self.stringency_index),
            ("population", self.population),
        ]
    }
}

#[derive(Deserialize)]
struct VaccinationsRow {
    #[serde(alias = "continent", deserialize_with = "na_text")]
    region: Option<String>,
    location: String,
    date: String,
    #[serde(deserialize_with = "na_number")]
    new_vaccinations: Option<f64>,
    #[serde(deserialize_with = "na_number")]
    people_vaccinated: Option<f64>,
}

impl VaccinationsRow {
    fn numbers(&self) -> [(&'static str, Option<f64>); 2] {
        [
            ("new_vaccinations", self.new_vaccinations),
            ("people_vaccinated", self.people_vaccinated),
        ]
    }
}

/// Reads both sources and joins them on (location, date).
///
/// The unified table keeps the row order of the deaths source. Every deaths
/// row must have exactly one vaccinations partner with the same region, and
/// vice versa.
pub fn load_dataset(paths: &DataPaths) -> Result<Dataset, LoadError> {
    let (deaths_table, deaths): (SourceTable, Vec<(u64, DeathsRow)>) =
        read_rows(&paths.deaths, &DEATHS_COLUMNS)?;
    let (vaccinations_table, vaccinations): (SourceTable, Vec<(u64, VaccinationsRow)>) =
        read_rows(&paths.vaccinations, &VACCINATIONS_COLUMNS)?;
    debug!(
        deaths = deaths.len(),
        vaccinations = vaccinations.len(),
        "read source rows"
    );

    let mut by_key: BTreeMap<(String, NaiveDate), VaccinationsRow> = BTreeMap::new();
    for (line, row) in vaccinations {
        let date = parse_date(&paths.vaccinations, line, &row.date)?;
        check_finite(&paths.vaccinations, line, &row.numbers())?;
        let key = (row.location.clone(), date);
        if by_key.contains_key(&key) {
            return Err(LoadError::DuplicateKey {
                path: paths.vaccinations.clone(),
                location: key.0,
                date,
            });
        }
        by_key.insert(key, row);
    }

    let mut seen: HashSet<(String, NaiveDate)> = HashSet::with_capacity(deaths.len());
    let mut records = Vec::with_capacity(deaths.len());
    for (line, row) in deaths {
        let date = parse_date(&paths.deaths, line, &row.date)?;
        check_finite(&paths.deaths, line, &row.numbers())?;
        let key = (row.location.clone(), date);
        if !seen.insert(key.clone()) {
            return Err(LoadError::DuplicateKey {
                path: paths.deaths.clone(),
                location: key.0,
                date,
            });
        }
        let Some(vaccination) = by_key.remove(&key) else {
            return Err(LoadError::JoinMismatch {
                location: key.0,
                date,
                missing_from: "vaccinations",
            });
        };
        if vaccination.region != row.region {
            return Err(LoadError::RegionMismatch {
                location: key.0,
                date,
                deaths: row.region,
                vaccinations: vaccination.region,
            });
        }
        let population = parse_population(&paths.deaths, line, row.population)?;

        records.push(Record {
            region: row.region,
            location: row.location,
            date,
            population,
            new_cases: row.new_cases,
            total_cases: row.total_cases,
            new_vaccinations: vaccination.new_vaccinations,
            people_vaccinated: vaccination.people_vaccinated,
            hospital_beds_per_thousand: row.hospital_beds_per_thousand,
            hosp_patients: row.hosp_patients,
            new_deaths: row.new_deaths,
            total_deaths: row.total_deaths,
            stringency_index: row.stringency_index,
        });
    }

    if let Some(((location, date), _)) = by_key.into_iter().next() {
        return Err(LoadError::JoinMismatch {
            location,
            date,
            missing_from: "deaths",
        });
    }

    info!(records = records.len(), "dataset loaded");
    Ok(Dataset::with_sources(records, deaths_table, vaccinations_table))
}

fn read_rows<T: DeserializeOwned>(
    path: &Path,
    required: &[&str],
) -> Result<(SourceTable, Vec<(u64, T)>), LoadError> {
    if !path.exists() {
        return Err(LoadError::Missing {
            path: path.to_path_buf(),
        });
    }
    let csv_error = |source: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .map_err(csv_error)?;
    let headers = reader.headers().map_err(csv_error)?.clone();
    check_columns(path, &headers, required)?;

    let mut table = SourceTable {
        headers: headers.iter().map(String::from).collect(),
        rows: Vec::new(),
    };
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row: T = record.deserialize(Some(&headers)).map_err(csv_error)?;
        table.rows.push(record.iter().map(String::from).collect());
        rows.push((line, row));
    }
    Ok((table, rows))
}

fn check_columns(path: &Path, headers: &StringRecord, required: &[&str]) -> Result<(), LoadError> {
    let has = |name: &str| headers.iter().any(|h| h == name);
    if !has("region") && !has("continent") {
        return Err(LoadError::MissingColumn {
            path: path.to_path_buf(),
            column: "region".to_string(),
        });
    }
    match required.iter().find(|column| !has(column)) {
        Some(column) => Err(LoadError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        }),
        None => Ok(()),
    }
}

fn check_finite(path: &Path, line: u64, values: &[(&'static str, Option<f64>)]) -> Result<(), LoadError> {
    match values.iter().find(|(_, v)| v.is_some_and(|v| !v.is_finite())) {
        Some((column, value)) => Err(LoadError::InvalidValue {
            path: path.to_path_buf(),
            line,
            column: column.to_string(),
            value: value.map(|v| v.to_string()).unwrap_or_default(),
        }),
        None => Ok(()),
    }
}

fn parse_date(path: &Path, line: u64, value: &str) -> Result<NaiveDate, LoadError> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .ok_or_else(|| LoadError::InvalidValue {
            path: path.to_path_buf(),
            line,
            column: "date".to_string(),
            value: value.to_string(),
        })
}

fn parse_population(path: &Path, line: u64, value: Option<f64>) -> Result<Option<u64>, LoadError> {
    match value {
        None => Ok(None),
        Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(v.round() as u64)),
        Some(v) => Err(LoadError::InvalidValue {
            path: path.to_path_buf(),
            line,
            column: "population".to_string(),
            value: v.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DEATHS_HEADER: &str = "iso_code,continent,location,date,population,new_cases,total_cases,new_deaths,total_deaths,hosp_patients,hospital_beds_per_thousand,stringency_index";
    const VACCINATIONS_HEADER: &str =
        "iso_code,continent,location,date,new_vaccinations,people_vaccinated";

    fn write_sources(deaths: &[&str], vaccinations: &[&str]) -> (TempDir, DataPaths) {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::in_dir(dir.path());
        fs::write(&paths.deaths, deaths.join("\n")).unwrap();
        fs::write(&paths.vaccinations, vaccinations.join("\n")).unwrap();
        (dir, paths)
    }

    #[test]
    fn joins_sources_by_key_in_deaths_order() {
        let (_dir, paths) = write_sources(
            &[
                DEATHS_HEADER,
                "ITA,Europe,Italy,2021-01-01,59000000.0,100,1000,5,50,,3.2,80",
                "FRA,Europe,France,2021-01-01,67000000,200,2000,,60,30,5.9,",
            ],
            &[
                VACCINATIONS_HEADER,
                "FRA,Europe,France,2021-01-01,10,20",
                "ITA,Europe,Italy,2021-01-01,,7",
            ],
        );

        let dataset = load_dataset(&paths).unwrap();
        let records = dataset.records();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].location, "Italy");
        assert_eq!(records[0].region.as_deref(), Some("Europe"));
        assert_eq!(records[0].population, Some(59_000_000));
        assert_eq!(records[0].new_vaccinations, None);
        assert_eq!(records[0].people_vaccinated, Some(7.0));
        assert_eq!(records[0].hosp_patients, None);

        assert_eq!(records[1].location, "France");
        assert_eq!(records[1].new_vaccinations, Some(10.0));
        assert_eq!(records[1].new_deaths, None);
        assert_eq!(records[1].stringency_index, None);
    }

    #[test]
    fn accepts_slash_dates_and_null_region() {
        let (_dir, paths) = write_sources(
            &[DEATHS_HEADER, "OWID_WRL,,World,2/24/2020,,1,1,0,0,,,"],
            &[VACCINATIONS_HEADER, "OWID_WRL,,World,2020-02-24,,"],
        );

        let dataset = load_dataset(&paths).unwrap();
        let record = &dataset.records()[0];
        assert_eq!(record.region, None);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2020, 2, 24).unwrap());
    }

    #[test]
    fn sample_dataset_loads_identically_twice() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("dataset");
        let paths = DataPaths::in_dir(&dir);
        let first = load_dataset(&paths).unwrap();
        let second = load_dataset(&paths).unwrap();

        assert_eq!(first.records().len(), 50);
        assert_eq!(first.records(), second.records());
        assert_eq!(first.locations().len(), 5);

        let selection = crate::selection::Selection::default();
        assert_eq!(
            crate::report::build_report(&first, &selection),
            crate::report::build_report(&second, &selection)
        );
        assert_eq!(
            crate::aggregate::build_time_series(first.records(), &[]),
            crate::aggregate::build_time_series(second.records(), &[])
        );
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::in_dir(dir.path());
        let err = load_dataset(&paths).unwrap_err();
        assert!(matches!(err, LoadError::Missing { .. }));
    }

    #[test]
    fn missing_column_is_reported() {
        let (_dir, paths) = write_sources(
            &[DEATHS_HEADER, "ITA,Europe,Italy,2021-01-01,1,1,1,1,1,1,1,1"],
            &["continent,location,date,people_vaccinated", "Europe,Italy,2021-01-01,1"],
        );
        match load_dataset(&paths).unwrap_err() {
            LoadError::MissingColumn { column, .. } => assert_eq!(column, "new_vaccinations"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unmatched_rows_fail_loudly() {
        let (_dir, paths) = write_sources(
            &[DEATHS_HEADER, "ITA,Europe,Italy,2021-01-01,1,1,1,1,1,1,1,1"],
            &[
                VACCINATIONS_HEADER,
                "ITA,Europe,Italy,2021-01-01,1,1",
                "ITA,Europe,Italy,2021-01-02,1,1",
            ],
        );
        match load_dataset(&paths).unwrap_err() {
            LoadError::JoinMismatch { missing_from, date, .. } => {
                assert_eq!(missing_from, "deaths");
                assert_eq!(date, NaiveDate::from_ymd_opt(2021, 1, 2).unwrap());
            }
            other => panic!("unexpected error: {other}"),
        }

        let (_dir, paths) = write_sources(
            &[DEATHS_HEADER, "ITA,Europe,Italy,2021-01-01,1,1,1,1,1,1,1,1"],
            &[VACCINATIONS_HEADER, "FRA,Europe,France,2021-01-01,1,1"],
        );
        match load_dataset(&paths).unwrap_err() {
            LoadError::JoinMismatch { missing_from, location, .. } => {
                assert_eq!(missing_from, "vaccinations");
                assert_eq!(location, "Italy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let (_dir, paths) = write_sources(
            &[
                DEATHS_HEADER,
                "ITA,Europe,Italy,2021-01-01,1,1,1,1,1,1,1,1",
                "ITA,Europe,Italy,2021-01-01,1,1,1,1,1,1,1,1",
            ],
            &[VACCINATIONS_HEADER, "ITA,Europe,Italy,2021-01-01,1,1"],
        );
        assert!(matches!(
            load_dataset(&paths).unwrap_err(),
            LoadError::DuplicateKey { .. }
        ));
    }

    #[test]
    fn bad_values_are_rejected() {
        let (_dir, paths) = write_sources(
            &[DEATHS_HEADER, "ITA,Europe,Italy,yesterday,1,1,1,1,1,1,1,1"],
            &[VACCINATIONS_HEADER, "ITA,Europe,Italy,2021-01-01,1,1"],
        );
        match load_dataset(&paths).unwrap_err() {
            LoadError::InvalidValue { column, line, .. } => {
                assert_eq!(column, "date");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }

        let (_dir, paths) = write_sources(
            &[DEATHS_HEADER, "ITA,Europe,Italy,2021-01-01,-5,1,1,1,1,1,1,1"],
            &[VACCINATIONS_HEADER, "ITA,Europe,Italy,2021-01-01,1,1"],
        );
        assert!(matches!(
            load_dataset(&paths).unwrap_err(),
            LoadError::InvalidValue { .. }
        ));

        let (_dir, paths) = write_sources(
            &[DEATHS_HEADER, "ITA,Europe,Italy,2021-01-01,1,many,1,1,1,1,1,1"],
            &[VACCINATIONS_HEADER, "ITA,Europe,Italy,2021-01-01,1,1"],
        );
        assert!(matches!(
            load_dataset(&paths).unwrap_err(),
            LoadError::Csv { .. }
        ));
    }

    #[test]
    fn vaccinations_duplicate_keys_are_rejected() {
        let (_dir, paths) = write_sources(
            &[DEATHS_HEADER, "ITA,Europe,Italy,2021-01-01,1,1,1,1,1,1,1,1"],
            &[
                VACCINATIONS_HEADER,
                "ITA,Europe,Italy,2021-01-01,1,1",
                "ITA,Europe,Italy,2021-01-01,2,2",
            ],
        );
        match load_dataset(&paths).unwrap_err() {
            LoadError::DuplicateKey { path, location, .. } => {
                assert_eq!(path, paths.vaccinations);
                assert_eq!(location, "Italy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn region_header_is_accepted() {
        let (_dir, paths) = write_sources(
            &[
                "region,location,date,population,new_cases,total_cases,new_deaths,total_deaths,hosp_patients,hospital_beds_per_thousand,stringency_index",
                "Asia,Japan,2021-01-01,125000000,1,1,1,1,1,1,1",
            ],
            &[
                "region,location,date,new_vaccinations,people_vaccinated",
                "Asia,Japan,2021-01-01,1,1",
            ],
        );
        let dataset = load_dataset(&paths).unwrap();
        assert_eq!(dataset.records()[0].region.as_deref(), Some("Asia"));
    }

    #[test]
    fn missing_region_column_is_reported() {
        let (_dir, paths) = write_sources(
            &[
                "location,date,population,new_cases,total_cases,new_deaths,total_deaths,hosp_patients,hospital_beds_per_thousand,stringency_index",
                "Japan,2021-01-01,125000000,1,1,1,1,1,1,1",
            ],
            &[VACCINATIONS_HEADER, "JPN,Asia,Japan,2021-01-01,1,1"],
        );
        match load_dataset(&paths).unwrap_err() {
            LoadError::MissingColumn { column, path } => {
                assert_eq!(column, "region");
                assert_eq!(path, paths.deaths);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn na_tokens_load_as_nulls() {
        let (_dir, paths) = write_sources(
            &[
                DEATHS_HEADER,
                "ITA,Europe,Italy,2021-01-01,1000,NaN,NA,n/a,NULL,,#N/A,nan",
                "FRA,NA,France,2021-01-01,1000,1,5,1,1,1,1,1",
            ],
            &[
                VACCINATIONS_HEADER,
                "ITA,Europe,Italy,2021-01-01,NaN,NA",
                "FRA,,France,2021-01-01,<NA>,null",
            ],
        );
        let dataset = load_dataset(&paths).unwrap();
        let italy = &dataset.records()[0];
        assert_eq!(italy.new_cases, None);
        assert_eq!(italy.total_cases, None);
        assert_eq!(italy.new_deaths, None);
        assert_eq!(italy.total_deaths, None);
        assert_eq!(italy.hospital_beds_per_thousand, None);
        assert_eq!(italy.stringency_index, None);
        assert_eq!(italy.new_vaccinations, None);
        assert_eq!(italy.people_vaccinated, None);

        let france = &dataset.records()[1];
        assert_eq!(france.region, None);
        assert_eq!(france.new_vaccinations, None);

        for summary in crate::aggregate::summarize_by_country(dataset.records()) {
            for pct in [summary.cases_pct, summary.vaccinations_pct, summary.deaths_pct] {
                assert!(pct.map_or(true, |p| (0.0..=100.0).contains(&p)));
            }
        }
    }

    #[test]
    fn infinite_values_are_rejected() {
        let (_dir, paths) = write_sources(
            &[DEATHS_HEADER, "ITA,Europe,Italy,2021-01-01,1,1,inf,1,1,1,1,1"],
            &[VACCINATIONS_HEADER, "ITA,Europe,Italy,2021-01-01,1,1"],
        );
        match load_dataset(&paths).unwrap_err() {
            LoadError::InvalidValue { column, line, .. } => {
                assert_eq!(column, "total_cases");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn region_must_agree_between_sources() {
        let (_dir, paths) = write_sources(
            &[DEATHS_HEADER, "TUR,Europe,Turkey,2021-01-01,1,1,1,1,1,1,1,1"],
            &[VACCINATIONS_HEADER, "TUR,Asia,Turkey,2021-01-01,1,1"],
        );
        match load_dataset(&paths).unwrap_err() {
            LoadError::RegionMismatch { location, deaths, vaccinations, .. } => {
                assert_eq!(location, "Turkey");
                assert_eq!(deaths.as_deref(), Some("Europe"));
                assert_eq!(vaccinations.as_deref(), Some("Asia"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn raw_sources_are_kept_as_read() {
        let (_dir, paths) = write_sources(
            &[DEATHS_HEADER, "ITA,Europe,Italy,2021-01-01,1,1,1,1,1,1,1,NaN"],
            &[VACCINATIONS_HEADER, "ITA,Europe,Italy,2021-01-01,1,1"],
        );
        let dataset = load_dataset(&paths).unwrap();
        let deaths = dataset.source(crate::models::Source::Deaths);
        assert_eq!(deaths.headers[0], "iso_code");
        assert_eq!(deaths.rows.len(), 1);
        assert_eq!(deaths.rows[0][11], "NaN");
        let vaccinations = dataset.source(crate::models::Source::Vaccinations);
        assert_eq!(vaccinations.headers.len(), 6);
        assert_eq!(vaccinations.rows[0][2], "Italy");
    }
}
