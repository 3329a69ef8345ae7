use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

/// Top-level yieldkf configuration.
///
/// A missing configuration file is equivalent to an empty one.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YieldKfConfig {
    /// I/O settings.
    #[serde(default)]
    pub io: IoToml,

    /// Model settings.
    #[serde(default)]
    pub model: ModelToml,

    /// EM settings.
    #[serde(default)]
    pub em: EmToml,

    /// Apply settings.
    #[serde(default)]
    pub apply: ApplyToml,
}

impl YieldKfConfig {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let toml_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&toml_str)
            .with_context(|| format!("failed to parse TOML config: {}", path.display()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoToml {
    #[serde(default = "default_data")]
    pub data: PathBuf,
    #[serde(default = "default_params")]
    pub params: PathBuf,
    #[serde(default = "default_filtered")]
    pub filtered: PathBuf,
    #[serde(default = "default_smoothed")]
    pub smoothed: PathBuf,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,
}

impl Default for IoToml {
    fn default() -> Self {
        Self {
            data: default_data(),
            params: default_params(),
            filtered: default_filtered(),
            smoothed: default_smoothed(),
            compression: default_compression(),
            row_group_size: default_row_group_size(),
        }
    }
}

fn default_data() -> PathBuf {
    PathBuf::from("yields.parquet")
}
fn default_params() -> PathBuf {
    PathBuf::from("params.json")
}
fn default_filtered() -> PathBuf {
    PathBuf::from("filtered.parquet")
}
fn default_smoothed() -> PathBuf {
    PathBuf::from("smoothed.parquet")
}
fn default_compression() -> String {
    "snappy".to_string()
}
fn default_row_group_size() -> usize {
    1_000_000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelToml {
    #[serde(default = "default_factors")]
    pub factors: usize,
    /// Added to the diagonal of R before filtering, if set.
    #[serde(default)]
    pub observation_regularization: Option<f64>,
}

impl Default for ModelToml {
    fn default() -> Self {
        Self {
            factors: default_factors(),
            observation_regularization: None,
        }
    }
}

fn default_factors() -> usize {
    3
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmToml {
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_em_vars")]
    pub em_vars: Vec<String>,
    #[serde(default = "default_psd_tolerance")]
    pub psd_tolerance: f64,
}

impl Default for EmToml {
    fn default() -> Self {
        Self {
            n_iter: default_n_iter(),
            tolerance: None,
            strict: false,
            em_vars: default_em_vars(),
            psd_tolerance: default_psd_tolerance(),
        }
    }
}

fn default_n_iter() -> usize {
    5
}
fn default_em_vars() -> Vec<String> {
    vec![
        "transition_matrix".to_string(),
        "transition_covariance".to_string(),
        "observation_covariance".to_string(),
    ]
}
fn default_psd_tolerance() -> f64 {
    1e-10
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplyToml {
    /// First date (inclusive) of the written factor tables; all rows when unset.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}
