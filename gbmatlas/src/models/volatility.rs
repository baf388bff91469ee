//! Historical volatility for the path simulator.
//!
//! The raw dispersion of the price levels is divided by a calibration scale
//! to obtain a per-step volatility fraction. The default scale of `100` is
//! an empirical constant, not a statistical law; it stays configurable so it
//! can be reviewed without touching the estimator.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::utils::errors::{ForecastError, Result};

pub const DEFAULT_VOLATILITY_SCALE: f64 = 100.0;

/// Per-step volatility and the number of simulation steps it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityEstimate {
    pub sigma: f64,
    pub step_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityEstimator {
    scale: f64,
}

impl Default for VolatilityEstimator {
    fn default() -> Self {
        Self {
            scale: DEFAULT_VOLATILITY_SCALE,
        }
    }
}

impl VolatilityEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scale(mut self, scale: f64) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ForecastError::InvalidParameterError(format!(
                "volatility scale must be positive, got {}",
                scale
            )));
        }
        self.scale = scale;
        Ok(self)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Population standard deviation of `prices` with `spot_price` appended,
    /// divided by the scale. `step_count` is `prices.len() + 1`.
    ///
    /// `prices` must already be free of missing entries.
    pub fn estimate<P: AsRef<[f64]>>(&self, prices: P, spot_price: f64) -> Result<VolatilityEstimate> {
        let prices = prices.as_ref();
        if prices.is_empty() {
            return Err(ForecastError::InsufficientDataError(
                "cannot estimate volatility from an empty price history".to_string(),
            ));
        }

        let sample = prices.iter().chain(std::iter::once(&spot_price));
        let std_dev = sample.population_std_dev();
        if !std_dev.is_finite() {
            return Err(ForecastError::InsufficientDataError(format!(
                "price history yields non-finite dispersion {}",
                std_dev
            )));
        }

        Ok(VolatilityEstimate {
            sigma: std_dev / self.scale,
            step_count: prices.len() + 1,
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any non-empty finite history yields a non-negative sigma and one
        /// step per observation plus the spot.
        #[test]
        fn prop_estimate_shape(
            prices in prop::collection::vec(0.01_f64..1e6, 1..200),
            spot in 0.01_f64..1e6,
            scale in 1.0_f64..1000.0,
        ) {
            let estimator = VolatilityEstimator::new().with_scale(scale).unwrap();
            let estimate = estimator.estimate(&prices, spot).unwrap();
            prop_assert!(estimate.sigma >= 0.0);
            prop_assert!(estimate.sigma.is_finite());
            prop_assert_eq!(estimate.step_count, prices.len() + 1);
        }

        /// Flat histories only carry rounding noise.
        #[test]
        fn prop_constant_history_is_flat(
            price in 0.01_f64..1e6,
            len in 1_usize..100,
        ) {
            let estimate = VolatilityEstimator::new().estimate(vec![price; len], price).unwrap();
            prop_assert!(estimate.sigma <= price * 1e-10);
        }
    }
}
