//! Configuration management for the supply chain dashboard

use crate::feature_aligner::MissingFieldPolicy;
use crate::types::record::FormInput;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Report output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Sectioned plain-text dashboard
    #[default]
    Text,
    /// Serialized report for other tools
    Json,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub form: FormInput,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Locations of the dataset and trained artifacts
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory the file names below are resolved against
    #[serde(default = "default_dir")]
    pub dir: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_delay_model")]
    pub delay_model: String,
    #[serde(default = "default_demand_model")]
    pub demand_model: String,
    #[serde(default = "default_scaler")]
    pub scaler: String,
    #[serde(default = "default_delay_schema")]
    pub delay_schema: String,
    #[serde(default = "default_demand_schema")]
    pub demand_schema: String,
}

fn default_dir() -> String {
    "artifacts".to_string()
}

fn default_dataset() -> String {
    "processed_data.csv".to_string()
}

fn default_delay_model() -> String {
    "delay_model.onnx".to_string()
}

fn default_demand_model() -> String {
    "demand_model.onnx".to_string()
}

fn default_scaler() -> String {
    "scaler.json".to_string()
}

fn default_delay_schema() -> String {
    "delay_feature_columns.json".to_string()
}

fn default_demand_schema() -> String {
    "demand_feature_columns.json".to_string()
}

impl ArtifactsConfig {
    fn resolve(&self, file: &str) -> PathBuf {
        Path::new(&self.dir).join(file)
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.resolve(&self.dataset)
    }

    pub fn delay_model_path(&self) -> PathBuf {
        self.resolve(&self.delay_model)
    }

    pub fn demand_model_path(&self) -> PathBuf {
        self.resolve(&self.demand_model)
    }

    pub fn scaler_path(&self) -> PathBuf {
        self.resolve(&self.scaler)
    }

    pub fn delay_schema_path(&self) -> PathBuf {
        self.resolve(&self.delay_schema)
    }

    pub fn demand_schema_path(&self) -> PathBuf {
        self.resolve(&self.demand_schema)
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            dataset: default_dataset(),
            delay_model: default_delay_model(),
            demand_model: default_demand_model(),
            scaler: default_scaler(),
            delay_schema: default_delay_schema(),
            demand_schema: default_demand_schema(),
        }
    }
}

/// Inference pipeline behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How absent schema fields are filled
    pub missing_field_policy: MissingFieldPolicy,
    /// Feed the demand model unscaled features (historical behaviour).
    /// Setting this to false scales the demand path with the delay scaler.
    pub demand_path_skips_scaling: bool,
    /// Label value the delay model uses for "delayed"
    pub delay_class: i64,
    /// Allowed deviation of a probability pair's sum from 1.0
    pub probability_tolerance: f64,
    /// Number of threads for ONNX inference per model
    pub onnx_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            missing_field_policy: MissingFieldPolicy::Zero,
            demand_path_skips_scaling: true,
            delay_class: 1,
            probability_tolerance: 1e-4,
            onnx_threads: 1,
        }
    }
}

/// Report presentation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Attach full error chains and artifact paths to error banners
    pub diagnostics: bool,
    pub format: OutputFormat,
    /// Maximum rows printed per table in text output
    pub max_rows: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            diagnostics: false,
            format: OutputFormat::Text,
            max_rows: 20,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
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
    /// Load configuration from file
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            artifacts: ArtifactsConfig::default(),
            pipeline: PipelineConfig::default(),
            form: FormInput::default(),
            display: DisplayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
