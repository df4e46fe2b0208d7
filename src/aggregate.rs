use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::models::{
    CountrySummary, DateRange, GlobalStats, MortalitySummary, Record, ScatterPoint,
    TimeSeriesPoint,
};
use crate::selection::{MapMetric, ScatterX, ScatterY};

pub const ROLLING_WINDOW: usize = 7;
pub const DEFAULT_TOP_LOCATIONS: usize = 5;
pub const MORTALITY_MIN_CASES: f64 = 10_000.0;
const SCATTER_DEFAULT_POPULATION: f64 = 1_000_000.0;

fn max_opt(acc: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (acc, value) {
        (Some(a), Some(v)) => Some(a.max(v)),
        (None, v) => v,
        (a, None) => a,
    }
}

/// `numerator / denominator * scale`, or 0 when the denominator is zero or
/// either side is not finite.
pub fn guarded_ratio(numerator: f64, denominator: f64, scale: f64) -> f64 {
    if numerator.is_finite() && denominator.is_finite() && denominator > 0.0 {
        numerator / denominator * scale
    } else {
        0.0
    }
}

fn percent_of(value: Option<f64>, population: u64) -> Option<f64> {
    value.map(|v| guarded_ratio(v, population as f64, 100.0).clamp(0.0, 100.0))
}

/// Descending order with nulls last.
fn desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// One row per location for the map and the top-5 bar chart.
pub fn summarize_by_country(records: &[Record]) -> Vec<CountrySummary> {
    #[derive(Default)]
    struct Acc {
        population: Option<u64>,
        total_cases: Option<f64>,
        people_vaccinated: Option<f64>,
        total_deaths: Option<f64>,
    }

    let mut groups: BTreeMap<&str, Acc> = BTreeMap::new();
    for record in records.iter().filter(|r| r.region.is_some()) {
        let acc = groups.entry(record.location.as_str()).or_default();
        acc.population = acc.population.or(record.population);
        acc.total_cases = max_opt(acc.total_cases, record.total_cases);
        acc.people_vaccinated = max_opt(acc.people_vaccinated, record.people_vaccinated);
        acc.total_deaths = max_opt(acc.total_deaths, record.total_deaths);
    }

    groups
        .into_iter()
        .filter_map(|(location, acc)| {
            let population = acc.population?;
            Some(CountrySummary {
                location: location.to_string(),
                population,
                total_cases: acc.total_cases,
                people_vaccinated: acc.people_vaccinated,
                total_deaths: acc.total_deaths,
                cases_pct: percent_of(acc.total_cases, population),
                vaccinations_pct: percent_of(acc.people_vaccinated, population),
                deaths_pct: percent_of(acc.total_deaths, population),
            })
        })
        .collect()
}

/// Highest `n` countries by the chosen map metric.
pub fn top_countries(summaries: &[CountrySummary], metric: MapMetric, n: usize) -> Vec<CountrySummary> {
    let mut ranked = summaries.to_vec();
    ranked.sort_by(|a, b| desc_nulls_last(metric.value(a), metric.value(b)));
    ranked.truncate(n);
    ranked
}

/// The `n` locations with the greatest maximum total_cases. Ties keep the
/// order in which locations first appear; locations without any
/// total_cases are never chosen.
pub fn top_locations_by_cases(records: &[Record], n: usize) -> Vec<String> {
    let mut order: Vec<&str> = Vec::new();
    let mut maxima: BTreeMap<&str, Option<f64>> = BTreeMap::new();
    for record in records {
        let entry = maxima.entry(record.location.as_str()).or_insert_with(|| {
            order.push(record.location.as_str());
            None
        });
        *entry = max_opt(*entry, record.total_cases);
    }

    let mut ranked: Vec<(&str, f64)> = order
        .into_iter()
        .filter_map(|location| maxima[location].map(|cases| (location, cases)))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.into_iter().take(n).map(|(l, _)| l.to_string()).collect()
}

/// Per-(location, date) series with 7-point trailing means of the new_* fields.
///
/// An empty `locations` list selects the five locations with the most cases.
pub fn build_time_series(records: &[Record], locations: &[String]) -> Vec<TimeSeriesPoint> {
    let chosen = if locations.is_empty() {
        let top = top_locations_by_cases(records, DEFAULT_TOP_LOCATIONS);
        debug!(?top, "no locations selected, using top locations by cases");
        top
    } else {
        locations.to_vec()
    };

    let mut groups: BTreeMap<(&str, NaiveDate), TimeSeriesPoint> = BTreeMap::new();
    for record in records.iter().filter(|r| chosen.contains(&r.location)) {
        let point = groups
            .entry((record.location.as_str(), record.date))
            .or_insert_with(|| TimeSeriesPoint {
                location: record.location.clone(),
                date: record.date,
                new_cases: 0.0,
                new_deaths: 0.0,
                new_vaccinations: 0.0,
                total_cases: None,
                total_deaths: None,
                people_vaccinated: None,
                new_cases_avg: None,
                new_deaths_avg: None,
                new_vaccinations_avg: None,
            });
        point.new_cases += record.new_cases.unwrap_or(0.0);
        point.new_deaths += record.new_deaths.unwrap_or(0.0);
        point.new_vaccinations += record.new_vaccinations.unwrap_or(0.0);
        point.total_cases = max_opt(point.total_cases, record.total_cases);
        point.total_deaths = max_opt(point.total_deaths, record.total_deaths);
        point.people_vaccinated = max_opt(point.people_vaccinated, record.people_vaccinated);
    }

    let mut series: Vec<TimeSeriesPoint> = groups.into_values().collect();
    let mut start = 0;
    while start < series.len() {
        let end = series[start..]
            .iter()
            .position(|p| p.location != series[start].location)
            .map_or(series.len(), |offset| start + offset);
        apply_rolling_means(&mut series[start..end]);
        start = end;
    }
    series
}

/// Fills the `_avg` fields of one location's date-ordered points.
fn apply_rolling_means(points: &mut [TimeSeriesPoint]) {
    let new_cases = rolling_mean(&points.iter().map(|p| p.new_cases).collect::<Vec<_>>(), ROLLING_WINDOW);
    let new_deaths = rolling_mean(&points.iter().map(|p| p.new_deaths).collect::<Vec<_>>(), ROLLING_WINDOW);
    let new_vaccinations = rolling_mean(
        &points.iter().map(|p| p.new_vaccinations).collect::<Vec<_>>(),
        ROLLING_WINDOW,
    );
    for (i, point) in points.iter_mut().enumerate() {
        point.new_cases_avg = new_cases[i];
        point.new_deaths_avg = new_deaths[i];
        point.new_vaccinations_avg = new_vaccinations[i];
    }
}

/// Trailing mean over `window` values; `None` until the window is full.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                None
            } else {
                let slice = &values[i + 1 - window..=i];
                Some(slice.iter().sum::<f64>() / window as f64)
            }
        })
        .collect()
}

/// Mortality and per-million rates for locations above 10,000 cases, highest
/// mortality first.
pub fn compute_mortality(records: &[Record]) -> Vec<MortalitySummary> {
    #[derive(Default)]
    struct Acc {
        total_cases: Option<f64>,
        total_deaths: Option<f64>,
        population: Option<u64>,
    }

    let mut groups: BTreeMap<&str, Acc> = BTreeMap::new();
    for record in records {
        let acc = groups.entry(record.location.as_str()).or_default();
        acc.total_cases = max_opt(acc.total_cases, record.total_cases);
        acc.total_deaths = max_opt(acc.total_deaths, record.total_deaths);
        acc.population = acc.population.or(record.population);
    }

    let mut rows: Vec<MortalitySummary> = groups
        .into_iter()
        .map(|(location, acc)| {
            mortality_summary(
                location,
                acc.total_cases.unwrap_or(0.0),
                acc.total_deaths.unwrap_or(0.0),
                acc.population.map_or(1.0, |p| p as f64),
            )
        })
        .filter(|row| row.total_cases > MORTALITY_MIN_CASES)
        .collect();

    rows.sort_by(|a, b| {
        b.mortality_rate
            .partial_cmp(&a.mortality_rate)
            .unwrap_or(Ordering::Equal)
    });
    rows
}

fn mortality_summary(
    location: &str,
    total_cases: f64,
    total_deaths: f64,
    population: f64,
) -> MortalitySummary {
    MortalitySummary {
        location: location.to_string(),
        total_cases,
        total_deaths,
        population,
        mortality_rate: guarded_ratio(total_deaths, total_cases, 100.0),
        cases_per_million: guarded_ratio(total_cases, population, 1_000_000.0),
        deaths_per_million: guarded_ratio(total_deaths, population, 1_000_000.0),
    }
}

/// Selected locations that made it into the mortality table, in selection
/// order. These get annotated on the mortality scatter.
pub fn highlight_locations<'a>(
    mortality: &'a [MortalitySummary],
    locations: &[String],
) -> Vec<&'a MortalitySummary> {
    locations
        .iter()
        .filter_map(|name| mortality.iter().find(|row| &row.location == name))
        .collect()
}

/// The most recent row of every location that has a region.
pub fn latest_per_location(records: &[Record]) -> Vec<Record> {
    let mut latest: BTreeMap<&str, &Record> = BTreeMap::new();
    for record in records {
        latest
            .entry(record.location.as_str())
            .and_modify(|current| {
                if record.date >= current.date {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    latest
        .into_values()
        .filter(|r| r.region.is_some())
        .cloned()
        .collect()
}

/// Points for the comparative scatter. Missing x/y values count as 0 and a
/// missing population as one million.
pub fn build_scatter(records: &[Record], x: ScatterX, y: ScatterY) -> Vec<ScatterPoint> {
    latest_per_location(records)
        .into_iter()
        .map(|record| ScatterPoint {
            x: scatter_x_value(&record, x).unwrap_or(0.0),
            y: scatter_y_value(&record, y).unwrap_or(0.0),
            population: record
                .population
                .map_or(SCATTER_DEFAULT_POPULATION, |p| p as f64),
            region: record.region.unwrap_or_default(),
            location: record.location,
        })
        .collect()
}

fn scatter_x_value(record: &Record, x: ScatterX) -> Option<f64> {
    match x {
        ScatterX::TotalCases => record.total_cases,
        ScatterX::PeopleVaccinated => record.people_vaccinated,
        ScatterX::StringencyIndex => record.stringency_index,
        ScatterX::HospitalBedsPerThousand => record.hospital_beds_per_thousand,
    }
}

fn scatter_y_value(record: &Record, y: ScatterY) -> Option<f64> {
    match y {
        ScatterY::TotalDeaths => record.total_deaths,
        ScatterY::HospitalBedsPerThousand => record.hospital_beds_per_thousand,
        ScatterY::StringencyIndex => record.stringency_index,
    }
}

pub fn global_stats(records: &[Record]) -> GlobalStats {
    records.iter().fold(GlobalStats::default(), |acc, r| GlobalStats {
        total_cases: max_opt(acc.total_cases, r.total_cases),
        people_vaccinated: max_opt(acc.people_vaccinated, r.people_vaccinated),
        hosp_patients: max_opt(acc.hosp_patients, r.hosp_patients),
        total_deaths: max_opt(acc.total_deaths, r.total_deaths),
    })
}

pub fn date_range(records: &[Record]) -> Option<DateRange> {
    let start = records.iter().map(|r| r.date).min()?;
    let end = records.iter().map(|r| r.date).max()?;
    Some(DateRange { start, end })
}
