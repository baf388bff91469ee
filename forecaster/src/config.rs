use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use gbmatlas::prelude::{ForecastError, ForecastRequest, WriteMode, DEFAULT_VOLATILITY_SCALE};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{chart::DEFAULT_CHART_URL, logging::LogFormat};

/// Complete description of a forecast run. Every field falls back to the
/// default run so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub security: String,
    /// Start of the forecast, read as UTC.
    pub start_time: NaiveDateTime,
    pub window_minutes: u32,
    pub risk_rate: f64,
    pub simulation: SimulationConfig,
    pub provider: ProviderConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub in_monte: usize,
    pub out_monte: usize,
    pub seed: Option<u64>,
    pub threads: Option<usize>,
    pub volatility_scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub mode: WriteMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub progress: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            security: "AMZN".to_string(),
            start_time: default_start_time(),
            window_minutes: 180,
            risk_rate: 0.001,
            simulation: SimulationConfig::default(),
            provider: ProviderConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            in_monte: 100,
            out_monte: 10_000,
            seed: None,
            threads: None,
            volatility_scale: DEFAULT_VOLATILITY_SCALE,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHART_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./output/output.csv"),
            mode: WriteMode::Append,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            progress: false,
        }
    }
}

fn default_start_time() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2020, 4, 13)
        .and_then(|d| d.and_hms_opt(13, 0, 0))
        .unwrap_or_default()
}

impl ForecastConfig {
    pub fn start_time_utc(&self) -> DateTime<Utc> {
        self.start_time.and_utc()
    }

    pub fn request(&self) -> ForecastRequest {
        ForecastRequest {
            security: self.security.clone(),
            start_time: self.start_time_utc(),
            window_minutes: self.window_minutes,
            risk_rate: self.risk_rate,
            in_monte: self.simulation.in_monte,
            out_monte: self.simulation.out_monte,
        }
    }

    /// Rejects settings that cannot produce a forecast.
    pub fn validate(&self) -> std::result::Result<(), ForecastError> {
        let invalid = |msg: String| Err(ForecastError::InvalidParameterError(msg));
        if self.security.trim().is_empty() {
            return invalid("security must not be empty".to_string());
        }
        if self.window_minutes == 0 {
            return invalid("window_minutes must be at least 1".to_string());
        }
        if !self.risk_rate.is_finite() {
            return invalid(format!("risk_rate must be finite, got {}", self.risk_rate));
        }
        if self.simulation.in_monte == 0 || self.simulation.out_monte == 0 {
            return invalid(format!(
                "in_monte and out_monte must be at least 1, got {} and {}",
                self.simulation.in_monte, self.simulation.out_monte
            ));
        }
        if self.simulation.threads == Some(0) {
            return invalid("threads must be at least 1 when set".to_string());
        }
        let scale = self.simulation.volatility_scale;
        if !scale.is_finite() || scale <= 0.0 {
            return invalid(format!("volatility_scale must be positive, got {}", scale));
        }
        if self.provider.timeout_secs == 0 {
            return invalid("provider timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ForecastConfig> {
    let path = path.as_ref();
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    debug!("Config file content length: {} bytes", content.len());

    let config: ForecastConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML configuration: {:?}", path))?;
    Ok(config)
}

#[instrument(skip(config))]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(config: &ForecastConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize configuration to YAML")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;
    info!("Configuration saved to: {:?}", path);
    Ok(())
}
