//! Configuration management for the detection engine

use crate::types::evidence::RiskBands;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Detection tuning; every field has a production default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectionConfig {
    #[serde(default)]
    pub risk_bands: RiskBands,
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default)]
    pub deviation: DeviationConfig,
    #[serde(default)]
    pub smurfing: SmurfingConfig,
    #[serde(default)]
    pub layering: LayeringConfig,
    #[serde(default)]
    pub structuring: StructuringConfig,
    #[serde(default)]
    pub income: IncomeMismatchConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub suspicion: SuspicionConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
}

/// Evidence-to-score weights
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreWeights {
    pub suspicious_transaction: u32,
    pub pattern: u32,
    pub network_signal: u32,
    pub probable_ml_bonus: u32,
    pub cap: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            suspicious_transaction: 10,
            pattern: 20,
            network_signal: 30,
            probable_ml_bonus: 20,
            cap: 100,
        }
    }
}

/// Baseline deviation thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct DeviationConfig {
    /// Outflow amount over average daily outflow that counts as a deviation
    pub outflow_ratio: f64,
    /// Ratio above which the deviation is high severity
    pub outflow_ratio_high: f64,
    /// Multiplier over p90 that counts as out of the typical range
    pub range_factor: f64,
}

impl Default for DeviationConfig {
    fn default() -> Self {
        Self {
            outflow_ratio: 3.0,
            outflow_ratio_high: 5.0,
            range_factor: 1.5,
        }
    }
}

/// Many-to-one inflow pattern
#[derive(Debug, Clone, Deserialize)]
pub struct SmurfingConfig {
    pub min_unique_senders: usize,
    pub window_hours: i64,
    /// Relative distance from the mean inflow that still counts as clustered
    pub cluster_tolerance: f64,
    /// Fraction of inflows that must cluster for the clustered flag
    pub cluster_fraction: f64,
}

impl Default for SmurfingConfig {
    fn default() -> Self {
        Self {
            min_unique_senders: 6,
            window_hours: 48,
            cluster_tolerance: 0.2,
            cluster_fraction: 0.6,
        }
    }
}

/// Rapid in-out pattern
#[derive(Debug, Clone, Deserialize)]
pub struct LayeringConfig {
    pub window_hours: i64,
    pub amount_tolerance: f64,
    pub min_cycles: usize,
}

impl Default for LayeringConfig {
    fn default() -> Self {
        Self {
            window_hours: 2,
            amount_tolerance: 0.10,
            min_cycles: 3,
        }
    }
}

/// Below-reporting-threshold pattern
#[derive(Debug, Clone, Deserialize)]
pub struct StructuringConfig {
    pub default_threshold: f64,
    /// Multiplier over the account's p90 when that exceeds the default
    pub p90_factor: f64,
    pub band_low: f64,
    pub band_high: f64,
    pub min_outflows: usize,
    pub min_distinct_days: usize,
}

impl Default for StructuringConfig {
    fn default() -> Self {
        Self {
            default_threshold: 10_000.0,
            p90_factor: 1.1,
            band_low: 0.85,
            band_high: 0.99,
            min_outflows: 3,
            min_distinct_days: 2,
        }
    }
}

/// Inflow surge against the account's own history
#[derive(Debug, Clone, Deserialize)]
pub struct IncomeMismatchConfig {
    pub min_account_age_days: i64,
    pub lookback_days: i64,
    pub ratio: f64,
    pub high_ratio: f64,
}

impl Default for IncomeMismatchConfig {
    fn default() -> Self {
        Self {
            min_account_age_days: 7,
            lookback_days: 7,
            ratio: 3.0,
            high_ratio: 5.0,
        }
    }
}

/// Fund-flow graph analysis
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub max_path_depth: usize,
    pub min_cycle_length: usize,
    /// Minimum distinct senders and distinct receivers for hub candidacy
    pub hub_min_counterparties: usize,
    pub rapid_redistribution_hours: i64,
    pub min_rapid_redistributions: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_path_depth: 5,
            min_cycle_length: 3,
            hub_min_counterparties: 5,
            rapid_redistribution_hours: 24,
            min_rapid_redistributions: 3,
        }
    }
}

/// Per-transaction suspicion tests
#[derive(Debug, Clone, Deserialize)]
pub struct SuspicionConfig {
    /// Same-day transaction count over the daily average
    pub frequency_multiplier: f64,
    /// Same-day unique senders over the daily average
    pub sender_count_multiplier: f64,
    pub similar_value_window_hours: i64,
    pub similar_value_tolerance: f64,
    pub similar_value_min_count: usize,
    /// Hours in [0, unusual_hour_end) are the unusual window
    pub unusual_hour_end: u32,
    /// Fraction of history that must be daytime for night activity to stand out
    pub daytime_fraction: f64,
}

impl Default for SuspicionConfig {
    fn default() -> Self {
        Self {
            frequency_multiplier: 3.0,
            sender_count_multiplier: 2.0,
            similar_value_window_hours: 24,
            similar_value_tolerance: 0.05,
            similar_value_min_count: 3,
            unusual_hour_end: 5,
            daytime_fraction: 0.8,
        }
    }
}

/// Alert creation policy
#[derive(Debug, Clone, Deserialize)]
pub struct AlertingConfig {
    pub dedup_window_hours: i64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            dedup_window_hours: 1,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file location
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
