use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use plant_quality_etl::config::{Config, ConfigError};
use plant_quality_etl::sync::RemoteTableStore;

#[derive(Parser, Debug)]
#[command(name = "plant-quality-upload")]
#[command(about = "Replace the remote series and batch tables with the local Parquet files", long_about = None)]
struct Cli {
    /// Series table file (falls back to SERIES_OUTPUT_PATH)
    #[arg(long)]
    series_file: Option<PathBuf>,

    /// Batch table file (falls back to BATCH_OUTPUT_PATH)
    #[arg(long)]
    batch_file: Option<PathBuf>,

    /// Rows per insert request (falls back to UPLOAD_CHUNK_SIZE)
    #[arg(long)]
    chunk_size: Option<usize>,
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

    let (url, key) = config.require_remote()?;
    let series_table = config
        .series_table
        .as_deref()
        .ok_or(ConfigError::Missing("SUPABASE_SERIES_TABLE"))?;
    let batch_table = config
        .batch_table
        .as_deref()
        .ok_or(ConfigError::Missing("SUPABASE_BATCH_TABLE"))?;
    let chunk_size = cli.chunk_size.unwrap_or(config.upload_chunk_size);

    let store = RemoteTableStore::new(url, key);
    let series_file = cli
        .series_file
        .unwrap_or_else(|| config.series_output_path.clone());
    let batch_file = cli
        .batch_file
        .unwrap_or_else(|| config.batch_output_path.clone());

    let series = store
        .upload_series_file(&series_file, series_table, chunk_size)
        .await?;
    info!("Series upload complete: {:?}", series);

    let batch = store
        .upload_batch_file(&batch_file, batch_table, chunk_size)
        .await?;
    info!("Batch upload complete: {:?}", batch);

    println!(
        "Uploaded {} rows to {} and {} rows to {}",
        series.rows_sent, series.table, batch.rows_sent, batch.table
    );
    Ok(())
}
