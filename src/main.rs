use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use plant_quality_etl::orchestrator::{run_pipeline, Stage};

#[derive(Parser, Debug)]
#[command(name = "plant-quality-pipeline")]
#[command(about = "Run the plant quality ETL and upload stages, logging each run", long_about = None)]
struct Cli {
    /// Directory for the run and error logs
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    /// ETL executable (default: plant-quality-etl next to this binary)
    #[arg(long)]
    etl_bin: Option<PathBuf>,

    /// Upload executable (default: plant-quality-upload next to this binary)
    #[arg(long)]
    upload_bin: Option<PathBuf>,

    /// Only run the ETL stage
    #[arg(long)]
    skip_upload: bool,
}

fn sibling_binary(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX))
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,plant_quality_etl=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let exe = std::env::current_exe()?;
    let bin_dir = exe.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut stages = vec![Stage::new(
        "plant-quality-etl",
        cli.etl_bin
            .unwrap_or_else(|| sibling_binary(&bin_dir, "plant-quality-etl")),
    )];
    if !cli.skip_upload {
        stages.push(Stage::new(
            "plant-quality-upload",
            cli.upload_bin
                .unwrap_or_else(|| sibling_binary(&bin_dir, "plant-quality-upload")),
        ));
    }

    println!("Starting plant quality data pipeline\n");
    info!("Running {} stages, logs in {}", stages.len(), cli.log_dir.display());

    let summary = run_pipeline(&stages, &cli.log_dir).await?;

    for outcome in &summary.outcomes {
        println!(
            "[{}] {} ({:.2}s)",
            outcome.status, outcome.stage, outcome.duration_seconds
        );
    }

    match &summary.error_log {
        Some(error_log) => println!(
            "\nPipeline finished with errors. See: {}",
            error_log.display()
        ),
        None => println!(
            "\nPipeline finished without errors. Log: {}",
            summary.run_log.display()
        ),
    }

    Ok(())
}
