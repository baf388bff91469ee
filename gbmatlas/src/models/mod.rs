pub mod averaging;
pub mod cancellation;
pub mod forecaster;
pub mod gbm;
pub mod pipeline;
pub mod volatility;
