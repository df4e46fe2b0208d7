use std::fmt::Write;

use crate::aggregate;
use crate::models::{Dataset, DateRange, GlobalStats, SourceTable, TimeSeriesPoint};
use crate::selection::{MapMetric, ScatterX, ScatterY, Selection, SeriesMetric};

const TOP_COUNTRIES: usize = 5;
const MORTALITY_ROWS: usize = 10;
const SCATTER_ROWS: usize = 10;

/// `1234567.0` -> `1.23M`. Values under a thousand are printed whole.
pub fn compact_number(value: f64) -> String {
    const UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "k")];

    let magnitude = value.abs();
    for (scale, suffix) in UNITS {
        if magnitude >= scale {
            let scaled = format!("{:.2}", value / scale);
            let trimmed = scaled.trim_end_matches('0').trim_end_matches('.');
            return format!("{trimmed}{suffix}");
        }
    }
    format!("{value:.0}")
}

fn display_opt(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{v:.decimals$}"),
        None => "n/a".to_string(),
    }
}

pub fn render_headline(stats: &GlobalStats, range: Option<DateRange>) -> String {
    let metric = |value: Option<f64>| value.map_or_else(|| "n/a".to_string(), compact_number);

    let mut output = String::new();
    let _ = writeln!(output, "## Headline Metrics");
    let _ = writeln!(output, "- Total Cases: {}", metric(stats.total_cases));
    let _ = writeln!(output, "- Total Vaccinations: {}", metric(stats.people_vaccinated));
    let _ = writeln!(output, "- Hospitalized Patients: {}", metric(stats.hosp_patients));
    let _ = writeln!(output, "- Total Deaths: {}", metric(stats.total_deaths));
    if let Some(range) = range {
        let _ = writeln!(output);
        let _ = writeln!(output, "Data period is limited to {range}");
    }
    output
}

pub fn render_map(dataset: &Dataset, metric: MapMetric, limit: usize) -> String {
    let summaries = aggregate::summarize_by_country(dataset.records());
    let top = aggregate::top_countries(&summaries, metric, limit);

    let mut output = String::new();
    let _ = writeln!(output, "## {}", metric.title());
    let _ = writeln!(
        output,
        "Top {} countries by {} ({} countries mapped)",
        limit,
        metric.label(),
        summaries.len()
    );
    let _ = writeln!(output);

    if top.is_empty() {
        let _ = writeln!(output, "No countries with population data.");
        return output;
    }
    let _ = writeln!(
        output,
        "| location | {} | {} | population |",
        metric.column(),
        metric.count_column()
    );
    let _ = writeln!(output, "|---|---|---|---|");
    for row in &top {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} |",
            row.location,
            display_opt(metric.value(row), 2),
            display_opt(metric.count(row), 0),
            row.population
        );
    }
    output
}

/// Latest `tail` points of each selected location's series.
pub fn render_series(
    dataset: &Dataset,
    metric: SeriesMetric,
    locations: &[String],
    tail: usize,
) -> String {
    let series = aggregate::build_time_series(dataset.records(), locations);

    let mut output = String::new();
    let _ = writeln!(output, "## {}", metric.title());
    if locations.is_empty() {
        let _ = writeln!(output, "No countries selected, showing the top 5 by total cases.");
    }
    let _ = writeln!(output);

    if series.is_empty() {
        let _ = writeln!(output, "No data for the selected countries.");
        return output;
    }
    let _ = writeln!(output, "{}", metric.axis_title());
    let _ = writeln!(output);
    let _ = writeln!(output, "| location | date | {} |", metric.column());
    let _ = writeln!(output, "|---|---|---|");
    for chunk in series.chunk_by(|a, b| a.location == b.location) {
        let skip = chunk.len().saturating_sub(tail);
        for point in &chunk[skip..] {
            let _ = writeln!(output, "{}", series_row(metric, point));
        }
    }
    output
}

fn series_row(metric: SeriesMetric, point: &TimeSeriesPoint) -> String {
    format!(
        "| {} | {} | {} |",
        point.location,
        point.date,
        display_opt(metric.value(point), 1)
    )
}

pub fn render_mortality(dataset: &Dataset, highlight: &[String], limit: usize) -> String {
    let mortality = aggregate::compute_mortality(dataset.records());
    let highlighted = aggregate::highlight_locations(&mortality, highlight);

    let mut output = String::new();
    let _ = writeln!(output, "## COVID-19 Mortality Rate vs. Case Rate");
    let _ = writeln!(
        output,
        "{} countries with more than 10,000 cases",
        mortality.len()
    );
    let _ = writeln!(output);

    if mortality.is_empty() {
        let _ = writeln!(output, "No countries above the case threshold.");
        return output;
    }
    let _ = writeln!(
        output,
        "| location | mortality_rate | cases_per_million | deaths_per_million |"
    );
    let _ = writeln!(output, "|---|---|---|---|");
    for row in mortality.iter().take(limit) {
        let _ = writeln!(
            output,
            "| {} | {:.2}% | {:.0} | {:.0} |",
            row.location, row.mortality_rate, row.cases_per_million, row.deaths_per_million
        );
    }

    if !highlighted.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Selected countries:");
        for row in highlighted {
            let _ = writeln!(
                output,
                "- {}: {:.2}% mortality, {:.0} cases per million",
                row.location, row.mortality_rate, row.cases_per_million
            );
        }
    }
    output
}

pub fn render_scatter(dataset: &Dataset, x: ScatterX, y: ScatterY, limit: usize) -> String {
    let mut points = aggregate::build_scatter(dataset.records(), x, y);
    points.sort_by(|a, b| b.x.partial_cmp(&a.x).unwrap_or(std::cmp::Ordering::Equal));

    let mut output = String::new();
    let _ = writeln!(
        output,
        "## Relationship between {} and {}",
        x.label(),
        y.label()
    );
    let _ = writeln!(output);

    if points.is_empty() {
        let _ = writeln!(output, "No countries with a region recorded.");
        return output;
    }
    let _ = writeln!(
        output,
        "| location | region | {} | {} | population |",
        x.key(),
        y.key()
    );
    let _ = writeln!(output, "|---|---|---|---|---|");
    for point in points.iter().take(limit) {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            point.location,
            point.region,
            point.x,
            point.y,
            compact_number(point.population)
        );
    }
    output
}

/// The first `limit` rows of a raw source, cells as they appear in the file.
pub fn render_source(table: &SourceTable, title: &str, limit: usize) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## {title}");
    let _ = writeln!(
        output,
        "Showing {} of {} rows",
        limit.min(table.rows.len()),
        table.rows.len()
    );
    let _ = writeln!(output);

    if table.rows.is_empty() {
        let _ = writeln!(output, "No rows.");
        return output;
    }
    let _ = writeln!(output, "| {} |", table.headers.join(" | "));
    let _ = writeln!(output, "|{}", "---|".repeat(table.headers.len()));
    for row in table.rows.iter().take(limit) {
        let _ = writeln!(output, "| {} |", row.join(" | "));
    }
    output
}

/// Full markdown report for one selection.
pub fn build_report(dataset: &Dataset, selection: &Selection) -> String {
    let records = dataset.records();
    let sections = [
        render_headline(&aggregate::global_stats(records), aggregate::date_range(records)),
        render_map(dataset, selection.map_metric, TOP_COUNTRIES),
        render_series(dataset, selection.series_metric, &selection.locations, 1),
        render_mortality(dataset, &selection.locations, MORTALITY_ROWS),
        render_scatter(dataset, selection.scatter_x, selection.scatter_y, SCATTER_ROWS),
    ];

    let mut output = String::new();
    let _ = writeln!(output, "# COVID-19 Pandemic Impact");
    for section in sections {
        let _ = writeln!(output);
        output.push_str(&section);
    }
    output
}
