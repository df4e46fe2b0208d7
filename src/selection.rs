use std::str::FromStr;

use tracing::warn;

use crate::error::InvalidSelectionError;
use crate::models::{CountrySummary, TimeSeriesPoint};

macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($variant:ident => $key:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub enum $name {
            #[default]
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn key(self) -> &'static str {
                match self {
                    $($name::$variant => $key),+
                }
            }

            pub fn keys() -> Vec<&'static str> {
                Self::ALL.iter().map(|v| v.key()).collect()
            }
        }

        impl FromStr for $name {
            type Err = InvalidSelectionError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let wanted = value.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.key().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| InvalidSelectionError {
                        field: $field,
                        value: value.to_string(),
                        allowed: Self::keys(),
                    })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.key())
            }
        }
    };
}

choice_enum! {
    /// Colour column of the choropleth map and its top-5 bar chart.
    MapMetric, "map metric" {
        Cases => "cases",
        Vaccinations => "vaccinations",
        Deaths => "deaths",
    }
}

choice_enum! {
    /// Y column of the time-series line chart.
    SeriesMetric, "series metric" {
        NewCases => "new-cases",
        NewDeaths => "new-deaths",
        NewVaccinations => "new-vaccinations",
        TotalCases => "total-cases",
        TotalDeaths => "total-deaths",
        TotalVaccinations => "total-vaccinations",
    }
}

choice_enum! {
    /// X variable of the comparative scatter plot.
    ScatterX, "scatter x variable" {
        TotalCases => "total_cases",
        PeopleVaccinated => "people_vaccinated",
        StringencyIndex => "stringency_index",
        HospitalBedsPerThousand => "hospital_beds_per_thousand",
    }
}

choice_enum! {
    /// Y variable of the comparative scatter plot.
    ScatterY, "scatter y variable" {
        TotalDeaths => "total_deaths",
        HospitalBedsPerThousand => "hospital_beds_per_thousand",
        StringencyIndex => "stringency_index",
    }
}

impl MapMetric {
    pub fn column(self) -> &'static str {
        match self {
            MapMetric::Cases => "cases_pct",
            MapMetric::Vaccinations => "vaccinations_pct",
            MapMetric::Deaths => "deaths_pct",
        }
    }

    /// Raw count shown next to the percentage.
    pub fn count_column(self) -> &'static str {
        match self {
            MapMetric::Cases => "total_cases",
            MapMetric::Vaccinations => "people_vaccinated",
            MapMetric::Deaths => "total_deaths",
        }
    }

    pub fn value(self, summary: &CountrySummary) -> Option<f64> {
        match self {
            MapMetric::Cases => summary.cases_pct,
            MapMetric::Vaccinations => summary.vaccinations_pct,
            MapMetric::Deaths => summary.deaths_pct,
        }
    }

    pub fn count(self, summary: &CountrySummary) -> Option<f64> {
        match self {
            MapMetric::Cases => summary.total_cases,
            MapMetric::Vaccinations => summary.people_vaccinated,
            MapMetric::Deaths => summary.total_deaths,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MapMetric::Cases => "Cases (% of Population)",
            MapMetric::Vaccinations => "Vaccinations (% of Population)",
            MapMetric::Deaths => "Deaths (% of Population)",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            MapMetric::Cases => "COVID-19 Cases as % of Population",
            MapMetric::Vaccinations => "COVID-19 Vaccinations as % of Population",
            MapMetric::Deaths => "COVID-19 Deaths as % of Population",
        }
    }
}

impl SeriesMetric {
    pub fn column(self) -> &'static str {
        match self {
            SeriesMetric::NewCases => "new_cases_avg",
            SeriesMetric::NewDeaths => "new_deaths_avg",
            SeriesMetric::NewVaccinations => "new_vaccinations_avg",
            SeriesMetric::TotalCases => "total_cases",
            SeriesMetric::TotalDeaths => "total_deaths",
            SeriesMetric::TotalVaccinations => "people_vaccinated",
        }
    }

    pub fn value(self, point: &TimeSeriesPoint) -> Option<f64> {
        match self {
            SeriesMetric::NewCases => point.new_cases_avg,
            SeriesMetric::NewDeaths => point.new_deaths_avg,
            SeriesMetric::NewVaccinations => point.new_vaccinations_avg,
            SeriesMetric::TotalCases => point.total_cases,
            SeriesMetric::TotalDeaths => point.total_deaths,
            SeriesMetric::TotalVaccinations => point.people_vaccinated,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            SeriesMetric::NewCases => "New COVID-19 Cases",
            SeriesMetric::NewDeaths => "New COVID-19 Deaths",
            SeriesMetric::NewVaccinations => "New COVID-19 Vaccinations",
            SeriesMetric::TotalCases => "Total COVID-19 Cases",
            SeriesMetric::TotalDeaths => "Total COVID-19 Deaths",
            SeriesMetric::TotalVaccinations => "Total COVID-19 Vaccinations",
        }
    }

    pub fn axis_title(self) -> &'static str {
        match self {
            SeriesMetric::NewCases => "New Cases (7-day avg)",
            SeriesMetric::NewDeaths => "New Deaths (7-day avg)",
            SeriesMetric::NewVaccinations => "New Vaccinations (7-day avg)",
            SeriesMetric::TotalCases => "Total Cases",
            SeriesMetric::TotalDeaths => "Total Deaths",
            SeriesMetric::TotalVaccinations => "Total Vaccinations",
        }
    }
}

impl ScatterX {
    pub fn label(self) -> String {
        title_case(self.key())
    }
}

impl ScatterY {
    pub fn label(self) -> String {
        title_case(self.key())
    }
}

/// `hospital_beds_per_thousand` -> `Hospital Beds Per Thousand`
pub fn title_case(column: &str) -> String {
    column
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Raw, unvalidated choices as they arrive from the command line.
#[derive(Debug, Clone, Default)]
pub struct SelectionInput {
    pub map_metric: Option<String>,
    pub series_metric: Option<String>,
    pub locations: Vec<String>,
    pub scatter_x: Option<String>,
    pub scatter_y: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub map_metric: MapMetric,
    pub series_metric: SeriesMetric,
    /// Empty means "top five by total cases".
    pub locations: Vec<String>,
    pub scatter_x: ScatterX,
    pub scatter_y: ScatterY,
}

impl Selection {
    /// Validates raw input. Invalid enum values fall back to their defaults,
    /// unknown locations are dropped; both are logged and never returned.
    pub fn from_input(input: &SelectionInput, known_locations: &[String]) -> Self {
        let locations = input
            .locations
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .filter(|name| {
                let known = known_locations.iter().any(|k| k == name);
                if !known {
                    warn!(location = %name, "ignoring unknown location");
                }
                known
            })
            .fold(Vec::<String>::new(), |mut acc, name| {
                if !acc.iter().any(|existing| existing == name) {
                    acc.push(name.to_string());
                }
                acc
            });

        Self {
            map_metric: parse_or_default(input.map_metric.as_deref()),
            series_metric: parse_or_default(input.series_metric.as_deref()),
            locations,
            scatter_x: parse_or_default(input.scatter_x.as_deref()),
            scatter_y: parse_or_default(input.scatter_y.as_deref()),
        }
    }
}

fn parse_or_default<T>(value: Option<&str>) -> T
where
    T: FromStr<Err = InvalidSelectionError> + Default + std::fmt::Display,
{
    let Some(value) = value else {
        return T::default();
    };
    value.parse().unwrap_or_else(|err: InvalidSelectionError| {
        let fallback = T::default();
        warn!(error = %err, fallback = %fallback, "invalid selection, using default");
        fallback
    })
}
