//! Configuration loader
//!
//! Every section is optional; missing values fall back to the defaults
//! used for the synthetic benchmark (4 variables, 800 samples, alpha 0.05).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::core::granger::GrangerTest;
use crate::core::method::MethodSettings;
use crate::core::stationarity::StationarityStrategy;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub stationarity: StationarityConfig,
    #[serde(default)]
    pub granger: GrangerConfig,
    #[serde(default)]
    pub pcmci: PcmciConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SystemConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_name() -> String {
    "temporal-causality".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

/// Synthetic data used when no input CSV is given
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_n_vars")]
    pub n_vars: usize,
    #[serde(default = "default_n_samples")]
    pub n_samples: usize,
    #[serde(default)]
    pub seed: u64,
}

fn default_n_vars() -> usize {
    4
}

fn default_n_samples() -> usize {
    800
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            n_vars: default_n_vars(),
            n_samples: default_n_samples(),
            seed: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StationarityConfig {
    #[serde(default = "default_max_diff")]
    pub max_diff: usize,
    #[serde(default)]
    pub strategy: StationarityStrategy,
}

fn default_max_diff() -> usize {
    2
}

impl Default for StationarityConfig {
    fn default() -> Self {
        Self {
            max_diff: default_max_diff(),
            strategy: StationarityStrategy::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GrangerConfig {
    #[serde(default = "default_max_lag")]
    pub max_lag: usize,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub test: GrangerTest,
}

fn default_max_lag() -> usize {
    5
}

fn default_alpha() -> f64 {
    0.05
}

impl Default for GrangerConfig {
    fn default() -> Self {
        Self {
            max_lag: default_max_lag(),
            alpha: default_alpha(),
            test: GrangerTest::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PcmciConfig {
    #[serde(default = "default_max_lag")]
    pub tau_max: usize,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

impl Default for PcmciConfig {
    fn default() -> Self {
        Self {
            tau_max: default_max_lag(),
            alpha: default_alpha(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

fn default_output_dir() -> String {
    "results".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (section, alpha) in [("granger", self.granger.alpha), ("pcmci", self.pcmci.alpha)] {
            if !(alpha > 0.0 && alpha < 1.0) {
                bail!("{}.alpha must lie in (0, 1), got {}", section, alpha);
            }
        }
        if self.granger.max_lag == 0 {
            bail!("granger.max_lag must be at least 1");
        }
        if self.pcmci.tau_max == 0 {
            bail!("pcmci.tau_max must be at least 1");
        }
        if self.data.n_vars < 2 {
            bail!("data.n_vars must be at least 2, got {}", self.data.n_vars);
        }
        Ok(())
    }

    /// Method parameters; Granger methods use the Granger alpha, PCMCI its own
    pub fn method_settings(&self, alpha: f64) -> MethodSettings {
        MethodSettings {
            alpha,
            max_lag: self.granger.max_lag,
            granger_test: self.granger.test,
            tau_max: self.pcmci.tau_max,
        }
    }
}
