use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use vit_tracker::config::ServiceConfig;
use vit_tracker::export::{ExportRequest, Exporter};
use vit_tracker::{CorrelationNetwork, Model, VitTrackBuilder};

#[derive(Parser)]
#[command(author, version, about = "VitTrack tracking service tools", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "VIT_TRACKER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overrides the configuration
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count the frames of a video
    FrameCount { video: PathBuf },
    /// Extract frames and write YOLO labels from a JSON export request
    Export { request: PathBuf },
    /// Load the model the way the service does at startup and print it
    Params,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.parse().unwrap_or(Level::INFO).into())
                .parse_lossy(config.logging.filter.as_deref().unwrap_or("")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    match cli.command {
        Commands::FrameCount { video } => {
            let count = Exporter::new().frame_count(&video)?;
            println!("{count}");
        }
        Commands::Export { request } => {
            let body = fs::read_to_string(&request)
                .with_context(|| format!("reading {}", request.display()))?;
            let req: ExportRequest =
                serde_json::from_str(&body).context("parsing export request")?;
            let summary = Exporter::new().export_yolo(&req)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Params => {
            let network = Arc::new(CorrelationNetwork::default());
            let model = Model::load(&config.model, Box::new(VitTrackBuilder::new(network)))
                .context("loading model")?;
            info!("parameter set '{}' is valid", config.model.param_name);
            println!("device: {}", model.device());
            println!("{}", serde_json::to_string_pretty(model.params())?);
        }
    }

    Ok(())
}
