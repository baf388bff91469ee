//! Geometric Brownian Motion path generator.
//!
//! Each step applies the exact log-normal increment
//! **S<sub>i+1</sub> = S<sub>i</sub> exp((r - σ²/2)Δt + σ√Δt Z<sub>i</sub>)**
//! with **Δt = 1 / steps** and independent standard normal draws.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::utils::errors::{ForecastError, Result};

/// One simulated price path; index 0 is the spot price.
pub type SimulatedPath = Vec<f64>;

/// Black-Scholes dynamics for a single underlying.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GbmPathSimulator {
    spot_price: f64,
    step_count: usize,
    risk_rate: f64,
    sigma: f64,
    drift: f64,
    diffusion: f64,
}

impl GbmPathSimulator {
    pub fn new(spot_price: f64, step_count: usize, risk_rate: f64, sigma: f64) -> Result<Self> {
        if step_count == 0 {
            return Err(ForecastError::InvalidParameterError(
                "step count must be at least 1".to_string(),
            ));
        }
        if !spot_price.is_finite() || spot_price < 0.0 {
            return Err(ForecastError::InvalidParameterError(format!(
                "spot price must be finite and non-negative, got {}",
                spot_price
            )));
        }
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(ForecastError::InvalidParameterError(format!(
                "sigma must be finite and non-negative, got {}",
                sigma
            )));
        }
        if !risk_rate.is_finite() {
            return Err(ForecastError::InvalidParameterError(format!(
                "risk rate must be finite, got {}",
                risk_rate
            )));
        }

        let delta_t = 1.0 / step_count as f64;
        Ok(Self {
            spot_price,
            step_count,
            risk_rate,
            sigma,
            drift: (risk_rate - sigma * sigma * 0.5) * delta_t,
            diffusion: sigma * delta_t.sqrt(),
        })
    }

    pub fn spot_price(&self) -> f64 {
        self.spot_price
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn risk_rate(&self) -> f64 {
        self.risk_rate
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn delta_t(&self) -> f64 {
        1.0 / self.step_count as f64
    }

    /// Simulates into `path`, reusing its allocation.
    pub fn simulate_into<R: Rng + ?Sized>(&self, rng: &mut R, path: &mut SimulatedPath) -> Result<()> {
        path.clear();
        path.reserve(self.step_count);
        path.push(self.spot_price);

        let mut price = self.spot_price;
        for step in 1..self.step_count {
            let z: f64 = rng.sample(StandardNormal);
            price *= (self.drift + self.diffusion * z).exp();
            if !price.is_finite() {
                return Err(ForecastError::SimulationError(format!(
                    "non-finite price {} at step {}",
                    price, step
                )));
            }
            path.push(price);
        }
        Ok(())
    }

    pub fn simulate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SimulatedPath> {
        let mut path = Vec::with_capacity(self.step_count);
        self.simulate_into(rng, &mut path)?;
        Ok(path)
    }
}

/// Single-call form of [`GbmPathSimulator::simulate`].
pub fn simulate<R: Rng + ?Sized>(
    spot_price: f64,
    step_count: usize,
    risk_rate: f64,
    sigma: f64,
    rng: &mut R,
) -> Result<SimulatedPath> {
    GbmPathSimulator::new(spot_price, step_count, risk_rate, sigma)?.simulate(rng)
}
