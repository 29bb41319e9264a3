use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use plant_quality_etl::config::Config;
use plant_quality_etl::consolidate::{fetch_and_consolidate, OutputTargets};
use plant_quality_etl::importers::SourceFetcher;
use plant_quality_etl::output::TableCompression;
use plant_quality_etl::specs::SpecCatalog;

#[derive(Parser, Debug)]
#[command(name = "plant-quality-etl")]
#[command(about = "Consolidate the plant quality workbook into series and batch tables", long_about = None)]
struct Cli {
    /// Workbook URL or local path (falls back to SPREADSHEET_SOURCE)
    #[arg(long)]
    source: Option<String>,

    /// Output path of the series table
    #[arg(long)]
    series_output: Option<PathBuf>,

    /// Output path of the batch table
    #[arg(long)]
    batch_output: Option<PathBuf>,

    /// JSON spec catalogue replacing the built-in one
    #[arg(long)]
    spec_catalog: Option<PathBuf>,

    /// Parquet compression: snappy, zstd, gzip or none
    #[arg(long)]
    compression: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,plant_quality_etl=debug")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let source = match cli.source {
        Some(source) => source,
        None => config.require_source()?.to_string(),
    };
    let compression = match cli.compression {
        Some(raw) => raw.parse::<TableCompression>()?,
        None => config.compression,
    };
    let catalog_path = cli.spec_catalog.or(config.spec_catalog_path);
    let catalog = SpecCatalog::load(catalog_path.as_deref())?;
    let targets = OutputTargets {
        series_path: cli.series_output.unwrap_or(config.series_output_path),
        batch_path: cli.batch_output.unwrap_or(config.batch_output_path),
        compression,
    };

    info!(
        "Loaded {} series specs and {} batch specs",
        catalog.series().len(),
        catalog.batch().len()
    );

    let start = Instant::now();
    let fetcher = SourceFetcher::new();
    let tables = fetch_and_consolidate(&fetcher, &source, catalog, targets.clone()).await?;

    println!("\nSummary:");
    for report in &tables.reports {
        println!(
            "  {:<22} {:>6} accepted {:>6} rejected",
            report.source_tag, report.counts.accepted, report.counts.rejected
        );
    }
    println!(
        "  Series rows: {} -> {}",
        tables.series.len(),
        targets.series_path.display()
    );
    println!(
        "  Batch rows:  {} -> {} ({} duplicates removed)",
        tables.batch.len(),
        targets.batch_path.display(),
        tables.duplicates_removed
    );
    println!("  Elapsed: {:.2}s", start.elapsed().as_secs_f64());

    Ok(())
}
