use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Data unavailable: {0}")]
    DataUnavailableError(String),
    #[error("Insufficient data: {0}")]
    InsufficientDataError(String),
    #[error("Cannot average an empty batch")]
    EmptyBatchError,
    #[error("Simulation failed: {0}")]
    SimulationError(String),
    #[error("Forecast cancelled")]
    CancelledError,
    #[error("Invalid parameter: {0}")]
    InvalidParameterError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Thread pool error: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<ForecastError> for String {
    fn from(e: ForecastError) -> Self {
        e.to_string()
    }
}
