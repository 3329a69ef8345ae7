use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Latent yield-curve factors from a linear-Gaussian state-space model.
#[derive(Parser)]
#[command(
    name = "yieldkf",
    version,
    about = "Kalman filter, RTS smoother and EM for yield-curve level, slope and convexity"
)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Fit model parameters by EM and write them as JSON.
    Train(TrainArgs),
    /// Filter and smooth a yield panel with stored parameters.
    Apply(ApplyArgs),
    /// Merge newer yield rows into a stored panel.
    Append(AppendArgs),
}

/// Arguments for the `train` subcommand.
#[derive(clap::Args)]
pub struct TrainArgs {
    /// Path to TOML configuration file.
    #[arg(short, long, default_value = "yieldkf.toml")]
    pub config: PathBuf,

    /// Override the yield panel Parquet path from config.
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Override the parameter JSON output path from config.
    #[arg(short, long)]
    pub params: Option<PathBuf>,

    /// Override the number of EM iterations from config.
    #[arg(short, long = "n-iter")]
    pub n_iter: Option<usize>,
}

/// Arguments for the `apply` subcommand.
#[derive(clap::Args)]
pub struct ApplyArgs {
    /// Path to TOML configuration file.
    #[arg(short, long, default_value = "yieldkf.toml")]
    pub config: PathBuf,

    /// Override the yield panel Parquet path from config.
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Override the parameter JSON input path from config.
    #[arg(short, long)]
    pub params: Option<PathBuf>,

    /// First date (inclusive) written to the factor tables.
    #[arg(short, long = "start-date")]
    pub start_date: Option<NaiveDate>,
}

/// Arguments for the `append` subcommand.
#[derive(clap::Args)]
pub struct AppendArgs {
    /// Path to TOML configuration file.
    #[arg(short, long, default_value = "yieldkf.toml")]
    pub config: PathBuf,

    /// Stored yield panel, rewritten in place.
    #[arg(short, long)]
    pub store: PathBuf,

    /// Yield panel holding the newer rows.
    #[arg(short, long)]
    pub input: PathBuf,
}
