//! Forecaster binary: one Monte-Carlo forecast run per invocation.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use forecaster::{
    chart::ChartApiProvider,
    cli::{Cli, Commands, RunArgs},
    config::{load_config, save_config, ForecastConfig},
    logging::{init_logging, LogFormat},
};
use gbmatlas::prelude::*;
use tracing::{debug, info};

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_command(args),
        Commands::Init { output, force } => init_command(&output, force),
    }
}

fn run_command(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ForecastConfig::default(),
    };
    args.apply(&mut config);
    init_logging(config.logging.format)?;
    debug!(?config, "effective configuration");
    config.validate().context("Invalid forecast configuration")?;

    let provider = ChartApiProvider::new(
        config.provider.base_url.as_str(),
        Duration::from_secs(config.provider.timeout_secs),
    )?;
    let estimator = VolatilityEstimator::new().with_scale(config.simulation.volatility_scale)?;
    let orchestrator = ForecastOrchestrator::new()
        .with_seed(config.simulation.seed)
        .with_threads(config.simulation.threads)
        .with_progress(config.logging.progress);
    let pipeline = ForecastPipeline::new(estimator, orchestrator);
    let request = config.request();

    let outcome = if args.dry_run {
        pipeline.forecast(&provider, &request)
    } else {
        let mut sink = CsvFileSink::new(&config.output.path).with_mode(config.output.mode);
        pipeline.run(&provider, &request, &mut sink)
    };
    let report = outcome.with_context(|| format!("Forecast for {} failed", request.security))?;

    info!(
        run_seed = report.run_seed,
        spot = report.quote.spot_price(),
        sigma = report.estimate.sigma,
        steps = report.estimate.step_count,
        paths = report.result.total_paths(),
        "run complete"
    );
    if let Some(terminal) = report.result.terminal() {
        println!(
            "{}: spot {:.4} -> forecast {:.4} over {} steps (seed {})",
            report.quote.security(),
            report.quote.spot_price(),
            terminal,
            report.result.len(),
            report.run_seed
        );
    }
    Ok(())
}

fn init_command(output: &Path, force: bool) -> Result<()> {
    init_logging(LogFormat::Compact)?;
    if output.exists() && !force {
        anyhow::bail!("{:?} already exists, pass --force to overwrite", output);
    }
    save_config(&ForecastConfig::default(), output)?;
    println!("Default configuration written to {}", output.display());
    Ok(())
}
