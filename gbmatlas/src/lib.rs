//! Monte-Carlo price path forecasting under Black-Scholes dynamics.
//!
//! Historical minute prices give a volatility estimate; many Geometric
//! Brownian Motion paths are simulated in parallel from the current spot
//! price and averaged into a single forecast path.

pub mod data;
pub mod models;
pub mod prelude;
pub mod utils;
