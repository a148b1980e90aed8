use clap::{Args, Parser, Subcommand};
use sales_explorer::master::{build_master, filter_products};
use sales_explorer::records::{read_sales, write_csv_to};
use sales_explorer::{
    DateRange, Dimension, ExplorerConfig, ExplorerError, FilterEvent, FilterState, Period,
    RecomputeDriver, Selection,
};
use std::{error::Error, fs::File, io, path::PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "sales-explorer", version, about = "Explore aggregated sales with cascading filters")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Aggregate a master file, apply filters, and print the chart rows as CSV.
    Explore(ExploreArgs),
    /// Join the product catalog onto raw sell-in rows.
    BuildMaster(BuildMasterArgs),
    /// Keep only the master rows of the listed products.
    FilterProducts(FilterProductsArgs),
}

#[derive(Debug, Args)]
struct ExploreArgs {
    /// Master sales file.
    #[arg(long)]
    input: PathBuf,
    /// Field delimiter (a single character, or `tab`).
    #[arg(long, default_value = ",", value_parser = parse_delimiter)]
    delimiter: u8,
    /// JSON filter state to start from.
    #[arg(long)]
    state: Option<PathBuf>,
    /// First period to include (YYYYMM).
    #[arg(long)]
    start: Option<Period>,
    /// Last period to include (YYYYMM).
    #[arg(long)]
    end: Option<Period>,
    /// Categorical filter as `dimension=value`, applied in the order given.
    #[arg(long = "select", value_parser = parse_selection)]
    selections: Vec<(Dimension, Selection)>,
    #[arg(long)]
    sample_threshold: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    /// Write the option lists and effective state as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Write the effective filter state as JSON.
    #[arg(long)]
    save_state: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct BuildMasterArgs {
    /// Tab separated sell-in file.
    #[arg(long)]
    sales: PathBuf,
    /// Tab separated product catalog.
    #[arg(long)]
    products: PathBuf,
    #[arg(long)]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct FilterProductsArgs {
    #[arg(long)]
    master: PathBuf,
    /// One product id per line.
    #[arg(long)]
    products: PathBuf,
    #[arg(long)]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match Cli::parse().command {
        Command::Explore(args) => explore(args)?,
        Command::BuildMaster(args) => {
            let summary = build_master(&args.sales, &args.products, &args.output)?;
            info!(?summary, "master file built");
        }
        Command::FilterProducts(args) => {
            let summary = filter_products(&args.master, &args.products, &args.output)?;
            info!(?summary, "product filter applied");
        }
    }

    Ok(())
}

fn explore(args: ExploreArgs) -> Result<(), Box<dyn Error>> {
    let dataset = read_sales(&args.input, args.delimiter)?;

    let defaults = ExplorerConfig::default();
    let config = ExplorerConfig {
        sample_threshold: args.sample_threshold.unwrap_or(defaults.sample_threshold),
        sample_seed: args.seed.unwrap_or(defaults.sample_seed),
        ..defaults
    };
    let state: FilterState = match &args.state {
        Some(path) => serde_json::from_reader(File::open(path)?)?,
        None => FilterState::default(),
    };

    let mut driver = RecomputeDriver::new(dataset, config).with_state(state);
    let mut output = driver.recompute();

    if args.start.is_some() || args.end.is_some() {
        if let Some(full) = output.data_range() {
            let range = DateRange::new(args.start.unwrap_or(full.start), args.end.unwrap_or(full.end));
            output = driver.handle(FilterEvent::SetDateRange(Some(range)));
        }
    }
    for (dimension, selection) in args.selections {
        output = driver.handle(FilterEvent::Select {
            dimension,
            selection,
        });
    }

    if let Some(err) = output.date_error() {
        eprintln!("Error: {err}");
    }
    if output.is_sampled() {
        eprintln!(
            "{} filtered rows; the chart rows are a random sample of {}",
            output.filtered_len(),
            output.sample_len()
        );
    }

    write_csv_to(io::stdout(), output.sample())?;

    if let Some(path) = &args.report {
        serde_json::to_writer_pretty(File::create(path)?, &output.view())?;
    }
    if let Some(path) = &args.save_state {
        serde_json::to_writer_pretty(File::create(path)?, driver.state())?;
    }

    Ok(())
}

fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        _ if value.len() == 1 && value.is_ascii() => Ok(value.as_bytes()[0]),
        _ => Err(format!("delimiter must be a single ASCII character, got '{value}'")),
    }
}

fn parse_selection(value: &str) -> Result<(Dimension, Selection), ExplorerError> {
    let (dimension, choice) = value
        .split_once('=')
        .ok_or_else(|| ExplorerError::InvalidSelection(value.to_owned()))?;
    Ok((dimension.parse()?, Selection::from_label(choice)))
}
