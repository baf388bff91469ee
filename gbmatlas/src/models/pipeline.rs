use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::data::{priceseries::Quote, provider::HistoricalDataProvider, sink::ResultSink};
use crate::models::{
    forecaster::{ForecastOrchestrator, ForecastParameters, ForecastResult},
    volatility::{VolatilityEstimate, VolatilityEstimator},
};
use crate::utils::errors::{ForecastError, Result};

/// Selects one forecast run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub security: String,
    pub start_time: DateTime<Utc>,
    pub window_minutes: u32,
    pub risk_rate: f64,
    pub in_monte: usize,
    pub out_monte: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastReport {
    pub quote: Quote,
    pub estimate: VolatilityEstimate,
    pub result: ForecastResult,
    pub run_seed: u64,
}

/// History → volatility → Monte-Carlo forecast → sink.
#[derive(Debug, Clone, Default)]
pub struct ForecastPipeline {
    estimator: VolatilityEstimator,
    orchestrator: ForecastOrchestrator,
}

impl ForecastPipeline {
    pub fn new(estimator: VolatilityEstimator, orchestrator: ForecastOrchestrator) -> Self {
        Self {
            estimator,
            orchestrator,
        }
    }

    pub fn estimator(&self) -> &VolatilityEstimator {
        &self.estimator
    }

    pub fn orchestrator(&self) -> &ForecastOrchestrator {
        &self.orchestrator
    }

    /// Runs the forecast and hands the result to `sink`. The sink is only
    /// touched once the full forecast is available.
    #[instrument(skip_all, fields(security = %request.security))]
    pub fn run<P, S>(
        &self,
        provider: &P,
        request: &ForecastRequest,
        sink: &mut S,
    ) -> Result<ForecastReport>
    where
        P: HistoricalDataProvider + ?Sized,
        S: ResultSink + ?Sized,
    {
        let report = self.forecast(provider, request)?;
        sink.append(report.result.values())?;
        Ok(report)
    }

    /// Same as [`ForecastPipeline::run`] without persisting anything.
    pub fn forecast<P>(&self, provider: &P, request: &ForecastRequest) -> Result<ForecastReport>
    where
        P: HistoricalDataProvider + ?Sized,
    {
        let started = Utc::now();
        info!(
            started = %started.format("%H:%M:%S"),
            window_minutes = request.window_minutes,
            "forecast started"
        );

        let data = provider
            .fetch(&request.security, request.start_time, request.window_minutes)
            .map_err(|e| match e {
                ForecastError::DataUnavailableError(_) => e,
                other => ForecastError::DataUnavailableError(other.to_string()),
            })?;

        let missing = data.prices.missing();
        if missing > 0 {
            warn!(missing, total = data.prices.len(), "dropping missing observations");
        }
        let clean = data.prices.clean()?;
        let estimate = self
            .estimator
            .estimate(&clean, data.quote.spot_price())?;
        info!(
            spot = data.quote.spot_price(),
            observations = clean.len(),
            sigma = estimate.sigma,
            steps = estimate.step_count,
            "volatility estimated"
        );

        let params = ForecastParameters::from_estimate(
            data.quote.spot_price(),
            &estimate,
            request.risk_rate,
            request.in_monte,
            request.out_monte,
        );
        let run_seed = self.orchestrator.resolve_seed();
        let result = self.orchestrator.forecast_with_seed(&params, run_seed)?;

        let finished = Utc::now();
        info!(
            finished = %finished.format("%H:%M:%S"),
            elapsed_ms = (finished - started).num_milliseconds(),
            terminal = result.terminal(),
            "forecast produced"
        );

        Ok(ForecastReport {
            quote: data.quote,
            estimate,
            result,
            run_seed,
        })
    }
}
