use chrono::{DateTime, Utc};

use crate::data::priceseries::HistoricalData;
use crate::utils::errors::{ForecastError, Result};

/// Source of minute-granularity price history for a security.
///
/// Implementations are network-bound and may fail; any failure has to come
/// back as [`ForecastError::DataUnavailableError`].
pub trait HistoricalDataProvider {
    /// Prices in the `window_minutes` preceding `start_time`, plus the
    /// current quote.
    fn fetch(
        &self,
        security: &str,
        start_time: DateTime<Utc>,
        window_minutes: u32,
    ) -> Result<HistoricalData>;
}

impl<P: HistoricalDataProvider + ?Sized> HistoricalDataProvider for &P {
    fn fetch(
        &self,
        security: &str,
        start_time: DateTime<Utc>,
        window_minutes: u32,
    ) -> Result<HistoricalData> {
        (**self).fetch(security, start_time, window_minutes)
    }
}

impl<P: HistoricalDataProvider + ?Sized> HistoricalDataProvider for Box<P> {
    fn fetch(
        &self,
        security: &str,
        start_time: DateTime<Utc>,
        window_minutes: u32,
    ) -> Result<HistoricalData> {
        (**self).fetch(security, start_time, window_minutes)
    }
}

/// Provider serving a fixed data set for one security.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    data: HistoricalData,
}

impl StaticProvider {
    pub fn new(data: HistoricalData) -> Self {
        Self { data }
    }
}

impl HistoricalDataProvider for StaticProvider {
    fn fetch(
        &self,
        security: &str,
        _start_time: DateTime<Utc>,
        _window_minutes: u32,
    ) -> Result<HistoricalData> {
        if security != self.data.quote.security() {
            return Err(ForecastError::DataUnavailableError(format!(
                "no data for security {}",
                security
            )));
        }
        Ok(self.data.clone())
    }
}
