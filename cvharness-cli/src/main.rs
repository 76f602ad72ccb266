//! cvharness: command-line front end for the training harness.
//!
//! Carves stratified dev corpora, writes cross-validation folds and inspects corpus files.

mod commands;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// cvharness: corpus splitting and cross-validation for classifier training
#[derive(Parser, Debug)]
#[command(name = "cvharness", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds `.cvharness.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Additional configuration file, layered above the workspace config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Carve a class-stratified dev corpus out of a train corpus
    Split {
        /// Train corpus (defaults to `data.train`)
        #[arg(long)]
        train: Option<PathBuf>,
        /// Test corpus whose class proportions the dev corpus should follow
        #[arg(long)]
        test: Option<PathBuf>,
        /// Share of the train corpus moved to dev, in percent (defaults to `data.auto_dev_percent`)
        #[arg(short, long)]
        percent: Option<i32>,
        /// Write the remaining train corpus here
        #[arg(long)]
        out_train: Option<PathBuf>,
        /// Write the dev corpus here (defaults to `data.save_dev`)
        #[arg(long)]
        out_dev: Option<PathBuf>,
        /// Random seed (defaults to `training.seed`)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Write the (train, dev, test) corpora of every cross-validation round
    Folds {
        /// Corpus to partition (defaults to `data.train`)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Number of folds
        #[arg(short = 'k', long)]
        folds: Option<usize>,
        /// Folds after the test fold that form the dev corpus
        #[arg(long)]
        dev_folds: Option<usize>,
        /// One fold per example
        #[arg(long)]
        leave_one_out: bool,
        /// Shuffle the corpus before partitioning
        #[arg(long)]
        shuffle: bool,
        /// Output directory; receives `fold-<i>/{train,dev,test}.data`
        #[arg(short, long)]
        out_dir: PathBuf,
        /// Random seed (defaults to `training.seed`)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print size, dimensions and class histogram of a corpus
    Inspect {
        /// Corpus file
        input: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Show the effective configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.quiet);

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    let config =
        cvharness_core::load_config_from(Some(workspace.as_path()), cli.config.as_deref(), None)
            .context("failed to load configuration")?;

    commands::handle_command(cli.command, config, &workspace)
}

/// Human-readable stderr output plus JSON file logging.
fn init_tracing(verbose: u8, quiet: bool) -> WorkerGuard {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    let log_dir = directories::ProjectDirs::from("dev", "cvharness", "cvharness")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "cvharness.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}
