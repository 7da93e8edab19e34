use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

use crate::domain::{BessParams, GridLimits, Weights, DEFAULT_RESOLUTION_MINUTES};
use crate::optimizer::{
    SolverBackend, SolverSettings, DEFAULT_BINDING_TOLERANCE, DEFAULT_MIP_GAP, DEFAULT_TIMEOUT,
};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "DISPATCH__";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub solver: SolverConfig,
    #[validate(nested)]
    pub defaults: ParamDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SolverConfig {
    /// Use the MILP; when false every run goes straight to the rule-based scheduler
    pub enabled: bool,
    pub backend: SolverBackend,
    /// At most one hour
    #[validate(range(exclusive_min = 0.0, max = 3600.0))]
    pub timeout_seconds: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub mip_gap: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub binding_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: SolverBackend::Microlp,
            timeout_seconds: DEFAULT_TIMEOUT.as_secs_f64(),
            mip_gap: DEFAULT_MIP_GAP,
            binding_tolerance: DEFAULT_BINDING_TOLERANCE,
        }
    }
}

impl SolverConfig {
    pub fn to_solver_settings(&self) -> Result<SolverSettings> {
        let timeout = Duration::try_from_secs_f64(self.timeout_seconds).with_context(|| {
            format!("solver timeout {} is not a valid duration", self.timeout_seconds)
        })?;
        Ok(SolverSettings {
            backend: self.backend,
            timeout,
            mip_gap: self.mip_gap,
            binding_tolerance: self.binding_tolerance,
        })
    }
}

/// Site parameters used when a request leaves them out.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ParamDefaults {
    #[validate(nested)]
    pub bess: BessParams,
    #[validate(nested)]
    pub limits: GridLimits,
    #[validate(nested)]
    pub weights: Weights,
    #[validate(range(min = 1))]
    pub resolution_minutes: u32,
}

impl Default for ParamDefaults {
    fn default() -> Self {
        Self {
            bess: BessParams::default(),
            limits: GridLimits::default(),
            weights: Weights::default(),
            resolution_minutes: DEFAULT_RESOLUTION_MINUTES,
        }
    }
}

impl Config {
    /// Load `config/default.toml` (if present) overlaid with `DISPATCH__*` env vars.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment(DEFAULT_CONFIG_PATH))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("config file {} not found", path.display());
        }
        Self::from_figment(Self::figment(path))
    }

    fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().context("failed to read configuration")?;
        config.validate().context("invalid configuration")?;
        config.solver.to_solver_settings()?;
        Ok(config)
    }
}
