use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod config;
mod error;
mod export;
mod loader;
mod models;
mod report;
mod selection;

use config::DataPaths;
use models::{Dataset, Source};
use selection::{Selection, SelectionInput};

#[derive(Parser)]
#[command(name = "covid-impact")]
#[command(about = "Chart-ready COVID-19 case, death and vaccination tables", long_about = None)]
struct Cli {
    /// Directory holding covid_deaths.csv and covid_vaccinations.csv
    #[arg(long, global = true, env = config::DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,
    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SelectionArgs {
    /// cases | vaccinations | deaths
    #[arg(long)]
    map_metric: Option<String>,
    /// new-cases | new-deaths | new-vaccinations | total-cases | total-deaths | total-vaccinations
    #[arg(long)]
    series_metric: Option<String>,
    /// Countries to chart; empty means the top 5 by total cases
    #[arg(long = "location", value_delimiter = ',')]
    locations: Vec<String>,
    /// total_cases | people_vaccinated | stringency_index | hospital_beds_per_thousand
    #[arg(long)]
    x: Option<String>,
    /// total_deaths | hospital_beds_per_thousand | stringency_index
    #[arg(long)]
    y: Option<String>,
}

impl SelectionArgs {
    fn resolve(self, dataset: &Dataset) -> Selection {
        let input = SelectionInput {
            map_metric: self.map_metric,
            series_metric: self.series_metric,
            locations: self.locations,
            scatter_x: self.x,
            scatter_y: self.y,
        };
        Selection::from_input(&input, &dataset.locations())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Headline metrics and the covered date range
    Summary,
    /// Countries ranked by a percentage-of-population metric
    Map {
        #[command(flatten)]
        selection: SelectionArgs,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Time series with 7-day averages for selected countries
    Series {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Most recent points to print per country
        #[arg(long, default_value_t = 7)]
        tail: usize,
    },
    /// Mortality rate against case rate
    Mortality {
        #[command(flatten)]
        selection: SelectionArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Latest values of two variables per country
    Scatter {
        #[command(flatten)]
        selection: SelectionArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        selection: SelectionArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Print the first rows of a raw source table
    Dataset {
        #[arg(value_enum, default_value_t = Source::Deaths)]
        source: Source,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Export a derived table for a chart renderer
    Export {
        #[arg(value_enum)]
        table: export::Table,
        #[arg(long, value_enum, default_value_t = export::Format::Json)]
        format: export::Format,
        #[command(flatten)]
        selection: SelectionArgs,
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let paths = DataPaths::resolve(cli.data_dir.as_deref());
    info!(deaths = %paths.deaths.display(), vaccinations = %paths.vaccinations.display(), "loading dataset");
    let dataset = loader::load_dataset(&paths).context("failed to load the COVID-19 dataset")?;

    match cli.command {
        Commands::Summary => {
            let records = dataset.records();
            print!(
                "{}",
                report::render_headline(
                    &aggregate::global_stats(records),
                    aggregate::date_range(records)
                )
            );
            println!(
                "{} rows across {} locations.",
                records.len(),
                dataset.locations().len()
            );
        }
        Commands::Map { selection, limit } => {
            let selection = selection.resolve(&dataset);
            print!("{}", report::render_map(&dataset, selection.map_metric, limit));
        }
        Commands::Series { selection, tail } => {
            let selection = selection.resolve(&dataset);
            print!(
                "{}",
                report::render_series(&dataset, selection.series_metric, &selection.locations, tail)
            );
        }
        Commands::Mortality { selection, limit } => {
            let selection = selection.resolve(&dataset);
            print!(
                "{}",
                report::render_mortality(&dataset, &selection.locations, limit)
            );
        }
        Commands::Scatter { selection, limit } => {
            let selection = selection.resolve(&dataset);
            print!(
                "{}",
                report::render_scatter(&dataset, selection.scatter_x, selection.scatter_y, limit)
            );
        }
        Commands::Report { selection, out } => {
            let selection = selection.resolve(&dataset);
            let report = report::build_report(&dataset, &selection);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Dataset { source, limit } => {
            print!(
                "{}",
                report::render_source(dataset.source(source), source.title(), limit)
            );
        }
        Commands::Export {
            table,
            format,
            selection,
            out,
        } => {
            let selection = selection.resolve(&dataset);
            match out {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    let rows = export::export_table(&dataset, &selection, table, format, BufWriter::new(file))?;
                    println!("Exported {rows} rows to {}.", path.display());
                }
                None => {
                    export::export_table(&dataset, &selection, table, format, io::stdout().lock())?;
                }
            }
        }
    }

    Ok(())
}
