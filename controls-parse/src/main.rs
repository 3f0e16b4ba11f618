//! controls - control sample classifier parsing
//!
//! Pulls sample folders from the sequencing archive, runs the configured
//! classifiers over samples that have no result yet and stores the
//! normalized per-genus records.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use controls_common::config::{resolve_config_path, Settings};
use controls_parse::{open_repository, report, ParsePipeline};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for controls
#[derive(Parser, Debug)]
#[command(name = "controls")]
#[command(about = "Parse classifier results for control samples")]
#[command(version)]
struct Args {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file, or directory containing config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run classifiers over new samples and store the results
    Parse {
        /// Mode to run; repeatable. Defaults to every configured mode
        #[arg(short, long = "mode")]
        modes: Vec<String>,

        /// Storage root, overriding archive.storage
        #[arg(short, long)]
        storage: Option<PathBuf>,

        /// Do not pull from the sequencing archive first
        #[arg(long)]
        skip_pull: bool,
    },

    /// Create or refresh control types from the config
    InitDb,

    /// Write the per-control-type report feed
    Export {
        /// Output directory, overriding folders.output
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(settings: &Settings, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.logging.level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref())?;
    let settings = Settings::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_tracing(&settings, args.verbose);
    info!("controls {}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config_path.display());

    match args.command {
        Command::Parse {
            modes,
            storage,
            skip_pull,
        } => {
            let modes = if modes.is_empty() {
                settings.mode_names()
            } else {
                modes
            };

            // The pull and the sample store must agree on the project folder
            let settings = settings.with_storage(storage);
            let repo = open_repository(&settings)
                .await
                .context("Failed to open database")?;
            let pipeline =
                ParsePipeline::from_settings(&settings, repo).context("Failed to set up pipeline")?;

            if skip_pull {
                info!("Skipping archive pull");
            } else {
                pipeline.pull_archive();
            }

            let summary = pipeline.run(&modes).await.context("Parse run failed")?;
            info!(persisted = summary.persisted(), "Done");
        }
        Command::InitDb => {
            let repo = open_repository(&settings)
                .await
                .context("Failed to open database")?;
            repo.ensure_control_types(&settings.control_types).await?;
        }
        Command::Export { output } => {
            let Some(output) = output.or_else(|| settings.folders.output.clone()) else {
                bail!("No output directory: pass --output or set folders.output");
            };
            let repo = open_repository(&settings)
                .await
                .context("Failed to open database")?;
            let written = report::export_reports(&repo, &output)
                .await
                .context("Failed to write report feed")?;
            info!(files = written.len(), path = %output.display(), "Export complete");
        }
    }

    Ok(())
}
