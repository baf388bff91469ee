//! Command-line front end for the `gbmatlas` forecaster: configuration,
//! logging and the chart-API history provider.

pub mod chart;
pub mod cli;
pub mod config;
pub mod logging;
