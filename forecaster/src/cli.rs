use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use gbmatlas::prelude::WriteMode;

use crate::{config::ForecastConfig, logging::LogFormat};

/// Monte-Carlo price path forecaster
#[derive(Debug, Parser)]
#[command(name = "forecaster", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch history, simulate and write the averaged forecast path
    Run(RunArgs),
    /// Write a configuration file holding the default run
    Init {
        #[arg(short, long, default_value = "forecast.yaml")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Flags given here take precedence over the configuration file.
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// YAML configuration file
    #[arg(short, long, env = "FORECAST_CONFIG")]
    pub config: Option<PathBuf>,
    /// Security identifier, e.g. AMZN
    #[arg(short, long)]
    pub security: Option<String>,
    /// Retrospective start time (UTC), e.g. 2020-04-13T13:00:00
    #[arg(long)]
    pub start: Option<NaiveDateTime>,
    /// Length of the history window in minutes
    #[arg(short, long)]
    pub window: Option<u32>,
    /// Annual risk-free rate used as drift
    #[arg(short, long, allow_hyphen_values = true)]
    pub risk_rate: Option<f64>,
    /// Paths averaged inside each task
    #[arg(long)]
    pub in_monte: Option<usize>,
    /// Number of parallel tasks
    #[arg(long)]
    pub out_monte: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub threads: Option<usize>,
    #[arg(long)]
    pub volatility_scale: Option<f64>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Replace the output file instead of appending to it
    #[arg(long)]
    pub truncate: bool,
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
    /// Show a progress bar while simulating
    #[arg(long)]
    pub progress: bool,
    /// Forecast without writing any output
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    pub fn apply(&self, config: &mut ForecastConfig) {
        if let Some(security) = &self.security {
            config.security = security.clone();
        }
        if let Some(start) = self.start {
            config.start_time = start;
        }
        if let Some(window) = self.window {
            config.window_minutes = window;
        }
        if let Some(rate) = self.risk_rate {
            config.risk_rate = rate;
        }
        if let Some(n) = self.in_monte {
            config.simulation.in_monte = n;
        }
        if let Some(n) = self.out_monte {
            config.simulation.out_monte = n;
        }
        if self.seed.is_some() {
            config.simulation.seed = self.seed;
        }
        if self.threads.is_some() {
            config.simulation.threads = self.threads;
        }
        if let Some(scale) = self.volatility_scale {
            config.simulation.volatility_scale = scale;
        }
        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        if self.truncate {
            config.output.mode = WriteMode::Truncate;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if self.progress {
            config.logging.progress = true;
        }
    }
}
