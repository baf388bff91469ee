//! Parallel Monte-Carlo forecast.
//!
//! * The budget of `in_monte × out_monte` paths is split into `out_monte`
//!   independent tasks of `in_monte` paths each.
//! * Every task owns a `StdRng` seeded with **run_seed + task index** and
//!   folds its paths into a [`BatchAverager`], so only one averaged path per
//!   task crosses back to the caller.
//! * The task averages are averaged once more into the final forecast.
//!
//! The first task to fail stops the remaining tasks before their next path
//! and its error is returned; there is no partial result.

use std::sync::Mutex;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::StdRng, SeedableRng};
use rayon::{
    iter::{IntoParallelIterator, ParallelIterator},
    ThreadPool, ThreadPoolBuilder,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::models::{
    averaging::{average, AveragePath, BatchAverager},
    cancellation::CancellationToken,
    gbm::GbmPathSimulator,
    volatility::VolatilityEstimate,
};
use crate::utils::errors::{ForecastError, Result};

/// Inputs of one forecast run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastParameters {
    pub spot_price: f64,
    pub step_count: usize,
    pub risk_rate: f64,
    pub sigma: f64,
    pub in_monte: usize,
    pub out_monte: usize,
}

impl ForecastParameters {
    pub fn from_estimate(
        spot_price: f64,
        estimate: &VolatilityEstimate,
        risk_rate: f64,
        in_monte: usize,
        out_monte: usize,
    ) -> Self {
        Self {
            spot_price,
            step_count: estimate.step_count,
            risk_rate,
            sigma: estimate.sigma,
            in_monte,
            out_monte,
        }
    }

    pub fn total_paths(&self) -> usize {
        self.in_monte.saturating_mul(self.out_monte)
    }
}

/// Mean of every simulated path of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    values: Vec<f64>,
    total_paths: usize,
}

impl ForecastResult {
    pub fn new(values: Vec<f64>, total_paths: usize) -> Self {
        Self {
            values,
            total_paths,
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn total_paths(&self) -> usize {
        self.total_paths
    }

    pub fn spot(&self) -> Option<f64> {
        self.values.first().copied()
    }

    pub fn terminal(&self) -> Option<f64> {
        self.values.last().copied()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

impl AsRef<[f64]> for ForecastResult {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}

/// Seed of the rng stream owned by `task`.
pub fn task_seed(run_seed: u64, task: usize) -> u64 {
    run_seed.wrapping_add(task as u64)
}

/// Fans the simulation budget out over a rayon pool and reduces the results.
#[derive(Debug, Clone, Default)]
pub struct ForecastOrchestrator {
    seed: Option<u64>,
    threads: Option<usize>,
    cancellation: CancellationToken,
    show_progress: bool,
}

impl ForecastOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// `None` sizes the pool to the available parallelism.
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Seed used when none was configured: drawn once per run.
    /// Unseeded runs are not reproducible.
    pub fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }

    /// Runs with the configured seed, or a fresh one on every call.
    pub fn forecast(&self, params: &ForecastParameters) -> Result<ForecastResult> {
        self.forecast_with_seed(params, self.resolve_seed())
    }

    pub fn forecast_with_seed(
        &self,
        params: &ForecastParameters,
        run_seed: u64,
    ) -> Result<ForecastResult> {
        if params.in_monte == 0 || params.out_monte == 0 {
            return Err(ForecastError::EmptyBatchError);
        }
        let simulator = GbmPathSimulator::new(
            params.spot_price,
            params.step_count,
            params.risk_rate,
            params.sigma,
        )?;

        let mut builder =
            ThreadPoolBuilder::new().thread_name(|i| format!("forecast-worker-{}", i));
        if let Some(threads) = self.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;

        info!(
            run_seed,
            workers = pool.current_num_threads(),
            tasks = params.out_monte,
            paths_per_task = params.in_monte,
            steps = params.step_count,
            sigma = params.sigma,
            "dispatching forecast"
        );
        let started = Instant::now();

        let progress = self.progress_bar(params.out_monte);
        let collected = self.dispatch(&pool, params.out_monte, &progress, |task, abort| {
            self.run_task(&simulator, task, run_seed, params.in_monte, abort)
        });
        progress.finish_and_clear();
        let partials = collected?;
        debug!(partials = partials.len(), "collected task averages");

        let values = average(&partials, params.out_monte)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            total_paths = params.total_paths(),
            "forecast reduced"
        );
        Ok(ForecastResult::new(values, params.total_paths()))
    }

    /// Runs `task_fn` for every task index on `pool`.
    ///
    /// A failing task trips the run-local abort token handed to the others, and
    /// its error is the one returned even if later tasks fail too.
    fn dispatch<F>(
        &self,
        pool: &ThreadPool,
        tasks: usize,
        progress: &ProgressBar,
        task_fn: F,
    ) -> Result<Vec<AveragePath>>
    where
        F: Fn(usize, &CancellationToken) -> Result<AveragePath> + Send + Sync,
    {
        let abort = CancellationToken::new();
        let first_failure: Mutex<Option<ForecastError>> = Mutex::new(None);

        let collected: Result<Vec<AveragePath>> = pool.install(|| {
            (0..tasks)
                .into_par_iter()
                .map(|task| {
                    let outcome = if self.cancellation.is_cancelled() || abort.is_cancelled() {
                        Err(ForecastError::CancelledError)
                    } else {
                        task_fn(task, &abort)
                    };
                    progress.inc(1);
                    match outcome {
                        Err(ForecastError::CancelledError) => Err(ForecastError::CancelledError),
                        Err(e) => {
                            abort.cancel();
                            debug!(task, error = %e, "forecast task failed");
                            match first_failure.lock() {
                                Ok(mut slot) if slot.is_none() => {
                                    *slot = Some(e);
                                    Err(ForecastError::CancelledError)
                                }
                                _ => Err(e),
                            }
                        }
                        ok => ok,
                    }
                })
                .collect()
        });

        collected.map_err(|e| first_failure.into_inner().ok().flatten().unwrap_or(e))
    }

    fn run_task(
        &self,
        simulator: &GbmPathSimulator,
        task: usize,
        run_seed: u64,
        in_monte: usize,
        abort: &CancellationToken,
    ) -> Result<AveragePath> {
        let mut rng = StdRng::seed_from_u64(task_seed(run_seed, task));
        let mut averager = BatchAverager::new(simulator.step_count());
        let mut path = Vec::with_capacity(simulator.step_count());

        for _ in 0..in_monte {
            if self.cancellation.is_cancelled() || abort.is_cancelled() {
                return Err(ForecastError::CancelledError);
            }
            simulator
                .simulate_into(&mut rng, &mut path)
                .map_err(|e| match e {
                    ForecastError::SimulationError(msg) => {
                        ForecastError::SimulationError(format!("task {}: {}", task, msg))
                    }
                    other => other,
                })?;
            averager.add(&path)?;
        }
        trace!(task, "task finished");
        averager.finish(in_monte)
    }

    fn progress_bar(&self, tasks: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(tasks as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} tasks ({eta})",
        ) {
            bar.set_style(style);
        }
        bar
    }
}

/// Single-call form of [`ForecastOrchestrator::forecast`] with default settings.
pub fn forecast(
    spot_price: f64,
    step_count: usize,
    risk_rate: f64,
    sigma: f64,
    in_monte: usize,
    out_monte: usize,
) -> Result<ForecastResult> {
    ForecastOrchestrator::new().forecast(&ForecastParameters {
        spot_price,
        step_count,
        risk_rate,
        sigma,
        in_monte,
        out_monte,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn params(sigma: f64, risk_rate: f64) -> ForecastParameters {
        ForecastParameters {
            spot_price: 100.0,
            step_count: 10,
            risk_rate,
            sigma,
            in_monte: 5,
            out_monte: 5,
        }
    }

    #[test]
    fn test_zero_volatility_forecast() -> Result<()> {
        let result = forecast(100.0, 10, 0.0, 0.0, 5, 5)?;
        assert_eq!(result.values(), &[100.0; 10]);
        assert_eq!(result.total_paths(), 25);
        Ok(())
    }

    #[test]
    fn test_zero_volatility_with_drift() -> Result<()> {
        let result = ForecastOrchestrator::new()
            .with_threads(Some(2))
            .forecast(&params(0.0, 0.05))?;
        assert_eq!(result.spot(), Some(100.0));
        for (i, value) in result.values().iter().enumerate() {
            let expected = 100.0 * (0.05 * 0.1 * i as f64).exp();
            assert_relative_eq!(*value, expected, max_relative = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_reproducible_with_seed() -> Result<()> {
        let orchestrator = ForecastOrchestrator::new().with_seed(Some(42));
        let a = orchestrator.forecast(&params(0.2, 0.01))?;
        let b = orchestrator.forecast(&params(0.2, 0.01))?;
        assert_eq!(a, b);

        let c = ForecastOrchestrator::new()
            .with_seed(Some(43))
            .forecast(&params(0.2, 0.01))?;
        assert_ne!(a, c);
        Ok(())
    }

    #[test]
    fn test_thread_count_does_not_change_result() -> Result<()> {
        let single = ForecastOrchestrator::new()
            .with_seed(Some(5))
            .with_threads(Some(1))
            .forecast(&params(0.3, 0.0))?;
        let many = ForecastOrchestrator::new()
            .with_seed(Some(5))
            .with_threads(Some(4))
            .forecast(&params(0.3, 0.0))?;
        assert_eq!(single, many);
        Ok(())
    }

    #[test]
    fn test_result_shape() -> Result<()> {
        let result = ForecastOrchestrator::new()
            .with_seed(Some(1))
            .forecast(&params(0.5, 0.001))?;
        assert_eq!(result.len(), 10);
        assert_eq!(result.values()[0], 100.0);
        assert!(result.terminal().is_some_and(|t| t > 0.0));
        Ok(())
    }

    #[test]
    fn test_empty_budget() {
        let mut p = params(0.1, 0.0);
        p.in_monte = 0;
        assert!(matches!(
            ForecastOrchestrator::new().forecast(&p),
            Err(ForecastError::EmptyBatchError)
        ));
        let mut p = params(0.1, 0.0);
        p.out_monte = 0;
        assert!(matches!(
            ForecastOrchestrator::new().forecast(&p),
            Err(ForecastError::EmptyBatchError)
        ));
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let result = ForecastOrchestrator::new()
            .with_cancellation(token)
            .forecast(&params(0.1, 0.0));
        assert!(matches!(result, Err(ForecastError::CancelledError)));
    }

    #[test]
    fn test_task_failure_is_propagated() {
        let p = ForecastParameters {
            spot_price: f64::MAX,
            step_count: 4,
            risk_rate: 1e6,
            sigma: 0.0,
            in_monte: 3,
            out_monte: 8,
        };
        let result = ForecastOrchestrator::new().with_seed(Some(9)).forecast(&p);
        match result {
            Err(ForecastError::SimulationError(msg)) => assert!(msg.starts_with("task ")),
            other => panic!("expected simulation error, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_while_running() {
        let token = CancellationToken::new();
        let orchestrator = ForecastOrchestrator::new()
            .with_seed(Some(3))
            .with_threads(Some(1))
            .with_cancellation(token.clone());
        let p = ForecastParameters {
            spot_price: 100.0,
            step_count: 200,
            risk_rate: 0.0,
            sigma: 0.1,
            in_monte: 1_000,
            out_monte: 10_000,
        };
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            token.cancel();
        });
        let result = orchestrator.forecast(&p);
        canceller.join().unwrap();
        assert!(matches!(result, Err(ForecastError::CancelledError)));
    }

    #[test]
    fn test_failure_stops_other_tasks() -> Result<()> {
        let tasks = 8;
        let in_monte = 100;
        let simulated = AtomicUsize::new(0);
        let pool = ThreadPoolBuilder::new().num_threads(2).build()?;
        let result = ForecastOrchestrator::new().dispatch(
            &pool,
            tasks,
            &ProgressBar::hidden(),
            |task, abort| {
                if task == 0 {
                    return Err(ForecastError::SimulationError("task 0: overflow".to_string()));
                }
                for _ in 0..in_monte {
                    if abort.is_cancelled() {
                        return Err(ForecastError::CancelledError);
                    }
                    simulated.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(1));
                }
                Ok(vec![0.0])
            },
        );
        match result {
            Err(ForecastError::SimulationError(msg)) => assert_eq!(msg, "task 0: overflow"),
            other => panic!("expected simulation error, got {:?}", other),
        }
        assert!(simulated.load(Ordering::SeqCst) < (tasks - 1) * in_monte);
        Ok(())
    }

    #[test]
    fn test_first_failure_wins_over_later_ones() -> Result<()> {
        let pool = ThreadPoolBuilder::new().num_threads(1).build()?;
        let result = ForecastOrchestrator::new().dispatch(
            &pool,
            4,
            &ProgressBar::hidden(),
            |task, _| Err(ForecastError::SimulationError(format!("task {}", task))),
        );
        assert!(matches!(result, Err(ForecastError::SimulationError(_))));
        Ok(())
    }

    #[test]
    fn test_uniform_paths_average_exactly() -> Result<()> {
        let result = forecast(0.1, 4, 0.0, 0.0, 3, 3)?;
        assert_eq!(result.values(), &[0.1; 4]);

        let result = ForecastOrchestrator::new()
            .with_seed(Some(17))
            .forecast(&ForecastParameters {
                spot_price: 2042.76,
                step_count: 30,
                risk_rate: 0.001,
                sigma: 0.05,
                in_monte: 7,
                out_monte: 3,
            })?;
        assert_eq!(result.spot(), Some(2042.76));
        Ok(())
    }

    #[test]
    fn test_task_seeds_differ() {
        assert_ne!(task_seed(10, 0), task_seed(10, 1));
        assert_eq!(task_seed(u64::MAX, 1), 0);
    }
}
