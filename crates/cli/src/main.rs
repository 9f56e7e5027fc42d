//! Runtime Tuner CLI
//!
//! A command-line front end for the tuning engine: registers experiments,
//! ingests result windows, produces recommendations and summarizes trials
//! from JSON documents on disk.

mod commands;
mod config;
mod output;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use commands::{experiments, recommend, summarize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tuner_lib::profile::{DirectoryLoader, ProfileStore};
use tuner_lib::store::InMemoryExperimentStore;
use tuner_lib::{StructuredLogger, TuningEngine};

/// Runtime Tuner CLI
#[derive(Parser)]
#[command(name = "tuner")]
#[command(author, version, about = "Runtime tuning recommendations for containers, JVMs and Quarkus", long_about = None)]
pub struct Cli {
    /// Output format (defaults to the user setting, then table)
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    /// Engine configuration file (TUNER_* environment variables override it)
    #[arg(long, global = true, env = "TUNER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Directory of performance profile JSON files
    #[arg(long, global = true)]
    pub profiles: Option<PathBuf>,

    /// Write Prometheus metrics to this file on exit
    #[arg(long, global = true)]
    pub metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate and register experiments
    Validate {
        /// JSON file with one experiment or an array of experiments
        experiments: PathBuf,
    },

    /// Register experiments, then ingest result windows and show recommendations
    UpdateResults {
        /// JSON file with the experiments the results belong to
        #[arg(long, short)]
        experiments: PathBuf,

        /// JSON files with result windows
        #[arg(required = true)]
        results: Vec<PathBuf>,
    },

    /// Recommend tunables from seeded container resources
    Recommend {
        /// Container CPU limit (e.g. 1.5 or 1500m)
        #[arg(long)]
        cpu: String,

        /// Container memory limit (e.g. 2Gi or 2147483648)
        #[arg(long)]
        memory: String,

        /// JDK version string (e.g. 17.0.2 or 1.8.0_292)
        #[arg(long)]
        jdk: Option<String>,

        /// Runtime and framework layers to include
        #[arg(long = "layer", default_values_t = ["hotspot".to_string()])]
        layers: Vec<String>,
    },

    /// Summarize trial results
    Summarize {
        /// JSON file with an array of {trial_number, result}
        trials: PathBuf,

        /// Profile whose SLO direction ranks the trials
        #[arg(long, default_value = "default")]
        profile: String,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let settings = config::UserSettings::load()?;
    let format = cli
        .format
        .or_else(|| {
            settings
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::parse_setting)
        })
        .unwrap_or_default();

    let engine_config = config::load_engine_config(cli.config.as_deref())?;
    debug!(config = ?engine_config, "Engine configured");

    let profiles = match cli.profiles.clone().or(settings.profiles_dir) {
        Some(dir) => {
            info!(profiles_dir = %dir.display(), "Loading performance profiles");
            ProfileStore::new(DirectoryLoader::new(dir))
        }
        None => ProfileStore::default(),
    };

    let engine = Arc::new(
        TuningEngine::with_parts(
            engine_config,
            Arc::new(InMemoryExperimentStore::new()),
            Arc::new(profiles),
        )
        .with_logger(StructuredLogger::new("tuner-cli")),
    );

    let outcome = run(cli.command, engine.clone(), format).await;

    if let Some(path) = &cli.metrics_out {
        tokio::fs::write(path, engine.metrics().encode_text()?).await?;
        info!(path = %path.display(), "Metrics written");
    }

    if let Err(e) = outcome {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Commands, engine: Arc<TuningEngine>, format: output::OutputFormat) -> Result<()> {
    match command {
        Commands::Validate { experiments: path } => {
            let report = experiments::validate(engine, &path, format).await?;
            if !report.is_success() {
                bail!("{} experiment(s) rejected", report.failed());
            }
        }
        Commands::UpdateResults {
            experiments: experiments_path,
            results,
        } => {
            let (registered, ingested) =
                experiments::update_results(engine, &experiments_path, &results, format).await?;
            if !registered.is_success() || !ingested.is_success() {
                bail!(
                    "{} experiment(s) and {} result window(s) rejected",
                    registered.failed(),
                    ingested.failed()
                );
            }
        }
        Commands::Recommend {
            cpu,
            memory,
            jdk,
            layers,
        } => {
            let args = recommend::RecommendArgs {
                cpu,
                memory,
                jdk_version: jdk,
                layers,
            };
            recommend::recommend(engine, args, format).await?;
        }
        Commands::Summarize { trials, profile } => {
            summarize::summarize(engine, &trials, &profile, format).await?;
        }
    }
    Ok(())
}
