//! Minute-bar history from a Yahoo-style chart endpoint.
//!
//! The requested start time is read as UTC and moved back by
//! [`ANCHOR_SHIFT_SECS`]; the window ends at that anchor. Bar timestamps are
//! shifted by the exchange's `gmtoffset` before they are compared with the
//! window, and the final bar of the response is never used.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use gbmatlas::prelude::*;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};

pub const DEFAULT_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
pub const ANCHOR_SHIFT_SECS: i64 = 60 * 60;
const LOOKBACK_SECS: i64 = 3 * 24 * 60 * 60;
const LOOKAHEAD_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
    regular_market_price: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBars>,
}

#[derive(Debug, Deserialize)]
struct QuoteBars {
    #[serde(default)]
    open: Vec<Option<f64>>,
}

/// End of the history window, in epoch seconds.
pub fn anchor(start_time: DateTime<Utc>) -> i64 {
    start_time.timestamp() - ANCHOR_SHIFT_SECS
}

/// Query string of a chart request covering three days before and one day
/// after the anchor at one-minute granularity.
pub fn query_params(security: &str, anchor: i64) -> Vec<(&'static str, String)> {
    vec![
        ("symbol", security.to_string()),
        ("period1", (anchor - LOOKBACK_SECS).to_string()),
        ("period2", (anchor + LOOKAHEAD_SECS).to_string()),
        ("interval", "1m".to_string()),
        ("includePrePost", "true".to_string()),
    ]
}

/// Opening prices whose shifted timestamp lies in `[anchor - window_secs, anchor]`.
pub fn select_window(
    timestamps: &[i64],
    opens: &[Option<f64>],
    gmtoffset: i64,
    anchor: i64,
    window_secs: i64,
) -> Result<PriceSeries> {
    let bars = timestamps.len().saturating_sub(1);
    if opens.len() < bars {
        return Err(ForecastError::DataUnavailableError(format!(
            "{} timestamps but only {} prices",
            timestamps.len(),
            opens.len()
        )));
    }
    let earliest = anchor - window_secs;
    let selected = timestamps[..bars]
        .iter()
        .zip(opens)
        .filter(|(ts, _)| {
            let shifted = **ts + gmtoffset;
            shifted <= anchor && shifted >= earliest
        })
        .map(|(_, open)| *open)
        .collect();
    Ok(PriceSeries::new(selected))
}

/// Decodes a chart response body into history and quote.
pub fn parse_chart(
    body: &str,
    security: &str,
    anchor: i64,
    window_minutes: u32,
) -> Result<HistoricalData> {
    let response: ChartResponse = serde_json::from_str(body)
        .map_err(|e| ForecastError::DataUnavailableError(format!("malformed chart response: {}", e)))?;

    if let Some(error) = response.chart.error.filter(|e| !e.is_null()) {
        return Err(ForecastError::DataUnavailableError(format!(
            "chart error for {}: {}",
            security, error
        )));
    }
    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| {
            ForecastError::DataUnavailableError(format!("empty chart result for {}", security))
        })?;

    let opens = result
        .indicators
        .quote
        .first()
        .map(|q| q.open.as_slice())
        .unwrap_or_default();
    let prices = select_window(
        &result.timestamp,
        opens,
        result.meta.gmtoffset,
        anchor,
        i64::from(window_minutes) * 60,
    )?;

    let spot = result.meta.regular_market_price.ok_or_else(|| {
        ForecastError::DataUnavailableError(format!("no market price for {}", security))
    })?;
    let as_of = result
        .meta
        .regular_market_time
        .and_then(|t| Utc.timestamp_opt(t, 0).single())
        .unwrap_or_else(Utc::now);

    Ok(HistoricalData::new(prices, Quote::new(security, spot, as_of)?))
}

/// Blocking HTTP provider for the chart endpoint.
#[derive(Debug, Clone)]
pub struct ChartApiProvider {
    client: Client,
    base_url: String,
}

impl ChartApiProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForecastError::DataUnavailableError(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl HistoricalDataProvider for ChartApiProvider {
    #[instrument(skip(self))]
    fn fetch(
        &self,
        security: &str,
        start_time: DateTime<Utc>,
        window_minutes: u32,
    ) -> Result<HistoricalData> {
        let anchor = anchor(start_time);
        let url = format!("{}/{}", self.base_url, security);
        debug!(%url, anchor, "requesting chart");

        let body = self
            .client
            .get(&url)
            .query(&query_params(security, anchor))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| ForecastError::DataUnavailableError(format!("{}: {}", url, e)))?;

        let data = parse_chart(&body, security, anchor, window_minutes)?;
        info!(
            observations = data.prices.len(),
            spot = data.quote.spot_price(),
            "history fetched"
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"gmtoffset": -14400, "regularMarketPrice": 2042.76, "regularMarketTime": 1586800000},
                "timestamp": [1586793600, 1586793660, 1586793720, 1586793780, 1586793840],
                "indicators": {"quote": [{"open": [2040.0, null, 2041.5, 2043.0, 2044.0]}]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_anchor_shift() {
        let start = Utc.with_ymd_and_hms(2020, 4, 13, 13, 0, 0).unwrap();
        assert_eq!(anchor(start), start.timestamp() - 3600);
    }

    #[test]
    fn test_query_params() {
        let params = query_params("AMZN", 1_000_000);
        assert_eq!(params[0], ("symbol", "AMZN".to_string()));
        assert_eq!(params[1], ("period1", (1_000_000 - 259_200).to_string()));
        assert_eq!(params[2], ("period2", (1_000_000 + 86_400).to_string()));
        assert_eq!(params[3], ("interval", "1m".to_string()));
    }

    #[test]
    fn test_select_window_skips_last_bar() -> Result<()> {
        let timestamps = [100, 160, 220, 280];
        let opens = [Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        let series = select_window(&timestamps, &opens, 0, 280, 180)?;
        assert_eq!(series.observations(), &[Some(1.0), Some(2.0), Some(3.0)]);

        let series = select_window(&timestamps, &opens, 0, 200, 60)?;
        assert_eq!(series.observations(), &[Some(2.0)]);
        Ok(())
    }

    #[test]
    fn test_select_window_applies_offset() -> Result<()> {
        let series = select_window(&[1000, 1060, 1120], &[Some(1.0), Some(2.0), Some(3.0)], -1000, 60, 60)?;
        assert_eq!(series.observations(), &[Some(1.0), Some(2.0)]);
        Ok(())
    }

    #[test]
    fn test_select_window_length_mismatch() {
        let result = select_window(&[1, 2, 3], &[Some(1.0)], 0, 10, 10);
        assert!(matches!(result, Err(ForecastError::DataUnavailableError(_))));
    }

    #[test]
    fn test_select_window_without_last_price() -> Result<()> {
        let series = select_window(&[100, 160, 220], &[Some(1.0), Some(2.0)], 0, 220, 180)?;
        assert_eq!(series.observations(), &[Some(1.0), Some(2.0)]);
        Ok(())
    }

    #[test]
    fn test_parse_chart() -> Result<()> {
        // shifted timestamps run 1586779200..=1586779440
        let data = parse_chart(BODY, "AMZN", 1586779440, 4)?;
        assert_eq!(data.quote.spot_price(), 2042.76);
        assert_eq!(data.quote.security(), "AMZN");
        assert_eq!(data.quote.as_of().timestamp(), 1586800000);
        assert_eq!(
            data.prices.observations(),
            &[Some(2040.0), None, Some(2041.5), Some(2043.0)]
        );
        assert_eq!(data.prices.clean()?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_parse_chart_error_payload() {
        let body = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found"}}}"#;
        let result = parse_chart(body, "NOPE", 0, 60);
        assert!(matches!(result, Err(ForecastError::DataUnavailableError(_))));
    }

    #[test]
    fn test_parse_chart_garbage() {
        assert!(matches!(
            parse_chart("<html>", "AMZN", 0, 60),
            Err(ForecastError::DataUnavailableError(_))
        ));
        assert!(matches!(
            parse_chart(r#"{"chart": {"result": []}}"#, "AMZN", 0, 60),
            Err(ForecastError::DataUnavailableError(_))
        ));
    }

    #[test]
    fn test_provider_trims_base_url() -> Result<()> {
        let provider = ChartApiProvider::new("http://localhost:9/chart/", Duration::from_secs(1))?;
        assert_eq!(provider.base_url(), "http://localhost:9/chart");
        Ok(())
    }
}
