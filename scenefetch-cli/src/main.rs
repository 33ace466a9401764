//! Command-line interface to the scenefetch library.
//!
//! Searches a scene catalog for products covering the given sites, filters
//! them by overlap, and either downloads them or exports a download script.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

use scenefetch::{
    Credentials, DateField, ExportFormat, HarvestConfig, HttpHarvester, OverlapDenominator,
    SearchQuery,
};

#[derive(Parser)]
#[command(
    name = "scenefetch",
    version,
    about = "Search and download Earth-observation scenes for your areas of interest"
)]
struct Cli {
    /// Catalog base URL, e.g. https://catalog.example.com/api
    #[arg(long, env = "SCENEFETCH_URL")]
    url: String,

    /// Catalog username
    #[arg(short, long, env = "SCENEFETCH_USER")]
    user: String,

    /// Catalog password
    #[arg(short, long, env = "SCENEFETCH_PASSWORD", hide_env_values = true)]
    password: String,

    /// Product name pattern, wildcards allowed (e.g. "S1A*")
    #[arg(long, default_value = "S1A*")]
    pattern: String,

    /// GeoJSON file with site polygons
    #[arg(long)]
    sites: Option<PathBuf>,

    /// Inline WKT polygon in WGS84, used as the single site "aoi"
    #[arg(long, conflicts_with = "sites")]
    geometry: Option<String>,

    /// Start of the acquisition date range (YYYY-MM-DD)
    #[arg(long, requires = "end")]
    start: Option<NaiveDate>,

    /// End of the acquisition date range (YYYY-MM-DD, inclusive)
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,

    /// Extra keyword filter, repeatable (e.g. --filter producttype=GRD)
    #[arg(long = "filter", value_name = "NAME=VALUE")]
    filters: Vec<String>,

    /// Minimum overlap ratio a scene must reach for one site
    #[arg(long)]
    min_overlap: Option<f64>,

    /// Reference area for the overlap ratio
    #[arg(long, value_enum, default_value = "site")]
    overlap_relative_to: Denominator,

    /// Directory for completed downloads
    #[arg(short = 'o', long, default_value = ".")]
    download_dir: PathBuf,

    /// Extra directory checked for already-downloaded scenes, repeatable
    #[arg(long = "data-dir")]
    data_dirs: Vec<PathBuf>,

    /// Number of concurrent downloads
    #[arg(long)]
    concurrency: Option<usize>,

    /// Cap on the number of scenes collected per query
    #[arg(long)]
    max_results: Option<usize>,

    /// Skip downloading; print an export script instead
    #[arg(long, value_enum)]
    export: Option<Export>,

    /// Increase log verbosity (also honors RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Denominator {
    Site,
    Footprint,
    Union,
}

impl From<Denominator> for OverlapDenominator {
    fn from(value: Denominator) -> Self {
        match value {
            Denominator::Site => OverlapDenominator::Site,
            Denominator::Footprint => OverlapDenominator::Footprint,
            Denominator::Union => OverlapDenominator::Union,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Export {
    Wget,
    Urls,
    Json,
}

impl From<Export> for ExportFormat {
    fn from(value: Export) -> Self {
        match value {
            Export::Wget => ExportFormat::Wget,
            Export::Urls => ExportFormat::Urls,
            Export::Json => ExportFormat::Json,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = HarvestConfig::new(Credentials::new(&cli.user, &cli.password), &cli.url);
    config.download.download_dir = cli.download_dir.clone();
    config.download.data_dirs = cli.data_dirs.clone();
    if let Some(concurrency) = cli.concurrency {
        config.download.concurrency = concurrency;
    }
    if let Some(min_overlap) = cli.min_overlap {
        config.filter.min_overlap = min_overlap;
    }
    config.filter.denominator = cli.overlap_relative_to.into();
    config.search.max_results = cli.max_results;

    let mut harvester = HttpHarvester::connect(config)?;

    if let Some(path) = &cli.sites {
        let geojson = std::fs::read_to_string(path)?;
        harvester.load_sites(&geojson)?;
    } else if let Some(wkt) = &cli.geometry {
        harvester.set_geometry("aoi", wkt)?;
    }

    let mut query = SearchQuery::builder(&cli.pattern);
    if let (Some(start), Some(end)) = (cli.start, cli.end) {
        query = query.date_range(DateField::BeginPosition, day_start(start), day_end(end));
    }
    for filter in &cli.filters {
        let (name, value) = filter
            .split_once('=')
            .ok_or_else(|| format!("filter '{filter}' is not of the form NAME=VALUE"))?;
        query = query.keyword(name, value);
    }

    let found = harvester.search(&query)?;
    let retained = harvester.filter()?;
    println!("Found {found} scenes, {retained} cover a site");

    if let Some(format) = cli.export {
        print!("{}", harvester.export(format.into())?);
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = harvester.cancel_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing current chunks...");
        cancel.store(true, Ordering::SeqCst);
    })?;

    let summary = harvester.download()?;
    println!(
        "Downloads: {} complete, {} failed, {} pending ({} bytes)",
        summary.complete, summary.failed, summary.pending, summary.bytes_transferred
    );
    if summary.pending > 0 {
        println!("Pending tasks keep their partial files; re-run to resume.");
    }

    // Individual failures are reported above but do not abort the run.
    Ok(ExitCode::SUCCESS)
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .unwrap_or_default()
        .and_utc()
}
