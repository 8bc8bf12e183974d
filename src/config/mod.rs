//! Configuration types for the retention pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::processors::acceptance::{
    AcceptanceError, Thresholds, DEFAULT_CEILING_THRESHOLD, DEFAULT_FLOOR_THRESHOLD,
};

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Thresholds(#[from] AcceptanceError),

    #[error("invalid smoothing span {0}: must be in (0, 1]")]
    SmoothingSpan(f64),

    #[error("invalid smoothing iterations {0}: must be in [0, 6]")]
    SmoothingIterations(u32),
}

/// How the batch driver treats groups whose rows are out of cycle order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingPolicy {
    /// Sort each group by cycle index before evaluation.
    #[default]
    Sort,
    /// Report out-of-order groups as errors.
    Strict,
}

/// Configuration for the acceptance filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptanceConfig {
    /// Minimum acceptable retention fraction
    #[serde(default = "default_floor_threshold")]
    pub floor_threshold: f64,

    /// Maximum physically plausible retention fraction; values above signal
    /// sensor or process error
    #[serde(default = "default_ceiling_threshold")]
    pub ceiling_threshold: f64,

    #[serde(default)]
    pub ordering: OrderingPolicy,
}

fn default_floor_threshold() -> f64 {
    DEFAULT_FLOOR_THRESHOLD
}

fn default_ceiling_threshold() -> f64 {
    DEFAULT_CEILING_THRESHOLD
}

impl AcceptanceConfig {
    /// Validated thresholds for building a filter.
    pub fn thresholds(&self) -> Result<Thresholds, AcceptanceError> {
        Thresholds::new(self.floor_threshold, self.ceiling_threshold)
    }
}

impl Default for AcceptanceConfig {
    fn default() -> Self {
        Self {
            floor_threshold: default_floor_threshold(),
            ceiling_threshold: default_ceiling_threshold(),
            ordering: OrderingPolicy::default(),
        }
    }
}

/// Parameters of the upstream LOWESS smoothing step that produced the
/// smoothed column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Smoothing span as a fraction of the series; larger is smoother
    #[serde(default = "default_smoothing_span")]
    pub span: f64,

    /// Number of residual-based reweightings
    #[serde(default = "default_smoothing_iterations")]
    pub iterations: u32,
}

fn default_smoothing_span() -> f64 {
    0.1
}

fn default_smoothing_iterations() -> u32 {
    5
}

impl SmoothingConfig {
    pub const MAX_ITERATIONS: u32 = 6;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.span > 0.0 && self.span <= 1.0) {
            return Err(ConfigError::SmoothingSpan(self.span));
        }
        if self.iterations > Self::MAX_ITERATIONS {
            return Err(ConfigError::SmoothingIterations(self.iterations));
        }
        Ok(())
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            span: default_smoothing_span(),
            iterations: default_smoothing_iterations(),
        }
    }
}

/// Column names in the input and output tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(default = "default_entity_column")]
    pub entity_id: String,

    #[serde(default = "default_cycle_column")]
    pub cycle: String,

    #[serde(default = "default_raw_column")]
    pub raw: String,

    #[serde(default = "default_smoothed_column")]
    pub smoothed: String,
}

fn default_entity_column() -> String {
    "battery_file_id".to_string()
}

fn default_cycle_column() -> String {
    "Cyc_".to_string()
}

fn default_raw_column() -> String {
    "DischargeCapacityRetention".to_string()
}

fn default_smoothed_column() -> String {
    "Smoothed".to_string()
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            entity_id: default_entity_column(),
            cycle: default_cycle_column(),
            raw: default_raw_column(),
            smoothed: default_smoothed_column(),
        }
    }
}

/// Output file names, relative to the output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_accepted_file")]
    pub accepted_file: String,

    #[serde(default = "default_dropped_file")]
    pub dropped_file: String,
}

fn default_accepted_file() -> String {
    "denoise_accepted.csv".to_string()
}

fn default_dropped_file() -> String {
    "denoise_dropped.csv".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            accepted_file: default_accepted_file(),
            dropped_file: default_dropped_file(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub acceptance: AcceptanceConfig,

    #[serde(default)]
    pub smoothing: SmoothingConfig,

    #[serde(default)]
    pub columns: ColumnConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every constraint that must hold before any data is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.acceptance.thresholds()?;
        self.smoothing.validate()?;
        Ok(())
    }
}
