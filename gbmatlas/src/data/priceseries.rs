use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::errors::{ForecastError, Result};

/// Raw historical observations, one per minute, ascending in time. Entries
/// that the feed left empty are kept as `None` until [`PriceSeries::clean`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceSeries {
    observations: Vec<Option<f64>>,
}

impl PriceSeries {
    pub fn new(observations: Vec<Option<f64>>) -> Self {
        Self { observations }
    }

    pub fn observations(&self) -> &[Option<f64>] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Number of entries that are missing or not finite.
    pub fn missing(&self) -> usize {
        self.observations
            .iter()
            .filter(|v| !matches!(v, Some(x) if x.is_finite()))
            .count()
    }

    /// Drops missing and non-finite entries, preserving order.
    pub fn clean(&self) -> Result<CleanPriceSeries> {
        let prices: Vec<f64> = self
            .observations
            .iter()
            .filter_map(|v| *v)
            .filter(|v| v.is_finite())
            .collect();
        CleanPriceSeries::new(prices)
    }
}

impl From<Vec<f64>> for PriceSeries {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values.into_iter().map(Some).collect())
    }
}

/// Finite, non-empty price history ready for volatility estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanPriceSeries {
    prices: Vec<f64>,
}

impl CleanPriceSeries {
    pub fn new(prices: Vec<f64>) -> Result<Self> {
        if prices.is_empty() {
            return Err(ForecastError::InsufficientDataError(
                "no usable observations in price history".to_string(),
            ));
        }
        if let Some(bad) = prices.iter().find(|v| !v.is_finite()) {
            return Err(ForecastError::InsufficientDataError(format!(
                "non-finite observation {} in price history",
                bad
            )));
        }
        Ok(Self { prices })
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl AsRef<[f64]> for CleanPriceSeries {
    fn as_ref(&self) -> &[f64] {
        &self.prices
    }
}

/// Reference spot price every simulated path is anchored to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    security: String,
    spot_price: f64,
    as_of: DateTime<Utc>,
}

impl Quote {
    pub fn new(security: impl Into<String>, spot_price: f64, as_of: DateTime<Utc>) -> Result<Self> {
        let security = security.into();
        if !spot_price.is_finite() || spot_price < 0.0 {
            return Err(ForecastError::DataUnavailableError(format!(
                "invalid spot price {} for {}",
                spot_price, security
            )));
        }
        Ok(Self {
            security,
            spot_price,
            as_of,
        })
    }

    pub fn security(&self) -> &str {
        &self.security
    }

    pub fn spot_price(&self) -> f64 {
        self.spot_price
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }
}

/// What a [`HistoricalDataProvider`](crate::data::provider::HistoricalDataProvider) hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalData {
    pub prices: PriceSeries,
    pub quote: Quote,
}

impl HistoricalData {
    pub fn new(prices: PriceSeries, quote: Quote) -> Self {
        Self { prices, quote }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_drops_missing() -> Result<()> {
        let series = PriceSeries::new(vec![Some(100.0), None, Some(f64::NAN), Some(101.5)]);
        assert_eq!(series.missing(), 2);
        let clean = series.clean()?;
        assert_eq!(clean.prices(), &[100.0, 101.5]);
        Ok(())
    }

    #[test]
    fn test_clean_all_missing() {
        let series = PriceSeries::new(vec![None, None]);
        assert!(matches!(
            series.clean(),
            Err(ForecastError::InsufficientDataError(_))
        ));
    }

    #[test]
    fn test_clean_series_rejects_nan() {
        let result = CleanPriceSeries::new(vec![1.0, f64::INFINITY]);
        assert!(matches!(result, Err(ForecastError::InsufficientDataError(_))));
    }

    #[test]
    fn test_quote_rejects_negative_spot() {
        let result = Quote::new("TEST", -1.0, Utc::now());
        assert!(matches!(result, Err(ForecastError::DataUnavailableError(_))));
        assert!(Quote::new("TEST", f64::NAN, Utc::now()).is_err());
        assert!(Quote::new("TEST", 0.0, Utc::now()).is_ok());
    }
}
