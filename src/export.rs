use std::io::Write;

use anyhow::Context;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::aggregate;
use crate::models::{Dataset, ScatterPoint};
use crate::selection::{ScatterX, ScatterY, Selection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Table {
    /// Headline metric maxima
    Stats,
    /// Per-country percentages (map)
    Countries,
    /// Top 5 countries by the selected map metric (bar chart)
    Top,
    /// Per-location time series with 7-day averages
    Series,
    /// Mortality and per-million rates
    Mortality,
    /// Latest row per location
    Latest,
    /// Comparative scatter points
    Scatter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    #[default]
    Json,
    Csv,
}

/// Writes one derived table and returns the number of rows written.
pub fn export_table<W: Write>(
    dataset: &Dataset,
    selection: &Selection,
    table: Table,
    format: Format,
    writer: W,
) -> anyhow::Result<usize> {
    let records = dataset.records();
    match table {
        Table::Stats => write_rows(&[aggregate::global_stats(records)], format, writer),
        Table::Countries => write_rows(&aggregate::summarize_by_country(records), format, writer),
        Table::Top => {
            let summaries = aggregate::summarize_by_country(records);
            let top = aggregate::top_countries(
                &summaries,
                selection.map_metric,
                aggregate::DEFAULT_TOP_LOCATIONS,
            );
            write_rows(&top, format, writer)
        }
        Table::Series => write_rows(
            &aggregate::build_time_series(records, &selection.locations),
            format,
            writer,
        ),
        Table::Mortality => write_rows(&aggregate::compute_mortality(records), format, writer),
        Table::Latest => write_rows(&aggregate::latest_per_location(records), format, writer),
        Table::Scatter => {
            let points = aggregate::build_scatter(records, selection.scatter_x, selection.scatter_y);
            write_scatter(&points, selection.scatter_x, selection.scatter_y, format, writer)
        }
    }
}

fn write_rows<T: Serialize, W: Write>(rows: &[T], format: Format, mut writer: W) -> anyhow::Result<usize> {
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut writer, rows).context("failed to write JSON")?;
            writeln!(writer)?;
        }
        Format::Csv => {
            let mut csv_writer = csv::Writer::from_writer(writer);
            for row in rows {
                csv_writer.serialize(row).context("failed to write CSV row")?;
            }
            csv_writer.flush()?;
        }
    }
    Ok(rows.len())
}

/// Scatter columns are named after the chosen x/y variables.
fn scatter_columns(x: ScatterX, y: ScatterY) -> Vec<&'static str> {
    let mut columns = vec!["location", "region", x.key()];
    if y.key() != x.key() {
        columns.push(y.key());
    }
    columns.push("population");
    columns
}

fn write_scatter<W: Write>(
    points: &[ScatterPoint],
    x: ScatterX,
    y: ScatterY,
    format: Format,
    mut writer: W,
) -> anyhow::Result<usize> {
    match format {
        Format::Json => {
            let rows: Vec<Value> = points
                .iter()
                .map(|point| {
                    let mut row = Map::new();
                    row.insert("location".into(), Value::from(point.location.clone()));
                    row.insert("region".into(), Value::from(point.region.clone()));
                    row.insert(x.key().into(), Value::from(point.x));
                    row.insert(y.key().into(), Value::from(point.y));
                    row.insert("population".into(), Value::from(point.population));
                    Value::Object(row)
                })
                .collect();
            serde_json::to_writer_pretty(&mut writer, &rows).context("failed to write JSON")?;
            writeln!(writer)?;
        }
        Format::Csv => {
            let columns = scatter_columns(x, y);
            let mut csv_writer = csv::Writer::from_writer(writer);
            csv_writer.write_record(&columns)?;
            for point in points {
                let mut record = vec![
                    point.location.clone(),
                    point.region.clone(),
                    point.x.to_string(),
                ];
                if columns.len() == 5 {
                    record.push(point.y.to_string());
                }
                record.push(point.population.to_string());
                csv_writer.write_record(&record)?;
            }
            csv_writer.flush()?;
        }
    }
    Ok(points.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::{day, sample_record};
    use crate::models::Record;

    fn dataset() -> Dataset {
        let records = (0..7)
            .map(|n| Record {
                new_cases: Some(7.0),
                total_cases: Some(20_000.0),
                total_deaths: Some(200.0),
                stringency_index: Some(40.0),
                ..sample_record("Japan", day(n))
            })
            .collect();
        Dataset::new(records)
    }

    fn export_string(table: Table, format: Format, selection: &Selection) -> String {
        let mut buffer = Vec::new();
        export_table(&dataset(), selection, table, format, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn series_json_keeps_rolling_gaps_as_null() {
        let text = export_string(Table::Series, Format::Json, &Selection::default());
        let rows: Vec<Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0]["new_cases_avg"], Value::Null);
        assert_eq!(rows[6]["new_cases_avg"], Value::from(7.0));
        assert_eq!(rows[0]["date"], Value::from("2021-01-01"));
    }

    #[test]
    fn mortality_csv_uses_field_names_as_header() {
        let text = export_string(Table::Mortality, Format::Csv, &Selection::default());
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("location,total_cases,total_deaths,population,mortality_rate,cases_per_million,deaths_per_million")
        );
        let fields: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(&fields[..4], &["Japan", "20000.0", "200.0", "1000000.0"]);
        let rate: f64 = fields[4].parse().unwrap();
        assert!((rate - 1.0).abs() < 1e-9);
        assert!(lines.next().is_none());
    }

    #[test]
    fn scatter_columns_follow_selection() {
        let selection = Selection {
            scatter_x: ScatterX::StringencyIndex,
            scatter_y: ScatterY::StringencyIndex,
            ..Selection::default()
        };
        let text = export_string(Table::Scatter, Format::Csv, &selection);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("location,region,stringency_index,population"));
        assert_eq!(lines.next(), Some("Japan,Europe,40,1000000"));

        let text = export_string(Table::Scatter, Format::Json, &Selection::default());
        let rows: Vec<Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(rows[0]["total_cases"], Value::from(20_000.0));
        assert_eq!(rows[0]["total_deaths"], Value::from(200.0));
    }

    #[test]
    fn exports_are_deterministic() {
        let selection = Selection::default();
        for table in Table::value_variants() {
            let first = export_string(*table, Format::Json, &selection);
            let second = export_string(*table, Format::Json, &selection);
            assert_eq!(first, second);
        }
    }
}
