//! Configuration management for density-fitted J/K builds
//!
//! This module handles the fitting parameters shared by every builder and the
//! YAML document read by the command-line driver.

mod args;

pub use args::Args;

use crate::error::{DfError, Result};
use serde::{Deserialize, Serialize};

/// Number of auxiliary functions contracted per block.
pub const BLOCKDIM: usize = 160;

/// Speed of light in atomic units.
pub const LIGHT_SPEED: f64 = 137.03599967994;

/// Main configuration structure for the driver
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub fitting: DfParams,
    pub system: ModelParams,
    pub relativistic: Option<bool>,
}

/// Density-fitting parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DfParams {
    pub auxbasis: Option<String>,
    /// Memory budget in MB (1 MB = 1e6 bytes).
    pub max_memory_mb: Option<f64>,
    pub block_size: Option<usize>,
    pub parallel: Option<bool>,
    pub light_speed: Option<f64>,
}

impl Default for DfParams {
    fn default() -> Self {
        DfParams {
            auxbasis: Some("weigend".to_string()),
            max_memory_mb: Some(2000.0),
            block_size: Some(BLOCKDIM),
            parallel: Some(false),
            light_speed: Some(LIGHT_SPEED),
        }
    }
}

impl DfParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.auxbasis.is_none() {
            self.auxbasis = defaults.auxbasis;
        }
        if self.max_memory_mb.is_none() {
            self.max_memory_mb = defaults.max_memory_mb;
        }
        if self.block_size.is_none() {
            self.block_size = defaults.block_size;
        }
        if self.parallel.is_none() {
            self.parallel = defaults.parallel;
        }
        if self.light_speed.is_none() {
            self.light_speed = defaults.light_speed;
        }
        self
    }

    pub fn auxbasis(&self) -> &str {
        self.auxbasis.as_deref().unwrap_or("weigend")
    }

    /// Memory budget in bytes.
    pub fn memory_budget(&self) -> usize {
        let mb = self.max_memory_mb.unwrap_or(2000.0).max(0.0);
        (mb * 1e6) as usize
    }

    pub fn block_size(&self) -> usize {
        self.block_size.unwrap_or(BLOCKDIM)
    }

    pub fn parallel(&self) -> bool {
        self.parallel.unwrap_or(false)
    }

    pub fn light_speed(&self) -> f64 {
        self.light_speed.unwrap_or(LIGHT_SPEED)
    }

    /// Reject parameter combinations no builder can work with.
    pub fn validate(&self) -> Result<()> {
        if self.block_size() == 0 {
            return Err(DfError::Configuration(
                "block_size must be at least 1".to_string(),
            ));
        }
        if let Some(mb) = self.max_memory_mb {
            if !mb.is_finite() || mb < 0.0 {
                return Err(DfError::Configuration(format!(
                    "max_memory_mb must be a non-negative number, got {mb}"
                )));
            }
        }
        if !(self.light_speed() > 0.0) {
            return Err(DfError::Configuration(format!(
                "light_speed must be positive, got {}",
                self.light_speed()
            )));
        }
        Ok(())
    }
}

/// Shape of the synthetic model system run by the driver
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelParams {
    pub nao: Option<usize>,
    pub naux: Option<usize>,
    pub spacing: Option<f64>,
    pub seed: Option<u64>,
}

impl Default for ModelParams {
    fn default() -> Self {
        ModelParams {
            nao: Some(12),
            naux: Some(36),
            spacing: Some(1.4),
            seed: Some(7),
        }
    }
}

impl ModelParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.nao.is_none() {
            self.nao = defaults.nao;
        }
        if self.naux.is_none() {
            self.naux = defaults.naux;
        }
        if self.spacing.is_none() {
            self.spacing = defaults.spacing;
        }
        if self.seed.is_none() {
            self.seed = defaults.seed;
        }
        self
    }
}

impl Config {
    /// Apply defaults to all configuration sections
    pub fn with_defaults(mut self) -> Self {
        self.fitting = self.fitting.with_defaults();
        self.system = self.system.with_defaults();
        if self.relativistic.is_none() {
            self.relativistic = Some(false);
        }
        self
    }

    /// Apply command-line overrides on top of the file values
    pub fn apply_overrides(mut self, args: &Args) -> Self {
        if let Some(auxbasis) = &args.auxbasis {
            self.fitting.auxbasis = Some(auxbasis.clone());
        }
        if let Some(mb) = args.max_memory {
            self.fitting.max_memory_mb = Some(mb);
        }
        if let Some(block_size) = args.block_size {
            self.fitting.block_size = Some(block_size);
        }
        if args.parallel {
            self.fitting.parallel = Some(true);
        }
        if args.relativistic {
            self.relativistic = Some(true);
        }
        self
    }

    pub fn is_relativistic(&self) -> bool {
        self.relativistic.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let yaml = "fitting:\n  block_size: 32\nsystem:\n  nao: 4\n";
        let config: Config = serde_yml::from_str::<Config>(yaml).unwrap().with_defaults();

        assert_eq!(config.fitting.block_size(), 32);
        assert_eq!(config.fitting.auxbasis(), "weigend");
        assert_eq!(config.fitting.memory_budget(), 2_000_000_000);
        assert_eq!(config.system.nao, Some(4));
        assert_eq!(config.system.naux, Some(36));
        assert!(!config.is_relativistic());
    }

    #[test]
    fn test_zero_block_size_is_rejected() {
        let params = DfParams {
            block_size: Some(0),
            ..DfParams::default()
        };
        assert!(matches!(params.validate(), Err(DfError::Configuration(_))));
    }

    #[test]
    fn test_negative_memory_is_rejected() {
        let params = DfParams {
            max_memory_mb: Some(-1.0),
            ..DfParams::default()
        };
        assert!(matches!(params.validate(), Err(DfError::Configuration(_))));
    }
}
