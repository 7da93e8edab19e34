use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::optimizer::OptimizeError;

pub const DEFAULT_CAPACITY_KWH: f64 = 100.0;
pub const DEFAULT_P_CHARGE_MAX_KW: f64 = 50.0;
pub const DEFAULT_P_DISCHARGE_MAX_KW: f64 = 50.0;
pub const DEFAULT_SOC0: f64 = 0.5;
pub const DEFAULT_SOC_MIN: f64 = 0.2;
pub const DEFAULT_SOC_MAX: f64 = 0.9;
pub const DEFAULT_ETA_CHARGE: f64 = 0.95;
pub const DEFAULT_ETA_DISCHARGE: f64 = 0.95;

pub const DEFAULT_GRID_IMPORT_MAX_KW: f64 = 200.0;
pub const DEFAULT_GRID_EXPORT_MAX_KW: f64 = 200.0;
pub const DEFAULT_TRANSFORMER_MAX_KW: f64 = 250.0;

pub const DEFAULT_WEIGHT_COST: f64 = 1.0;
pub const DEFAULT_WEIGHT_CURTAIL: f64 = 0.2;
pub const DEFAULT_WEIGHT_VIOLATION: f64 = 1000.0;

pub const DEFAULT_RESOLUTION_MINUTES: u32 = 15;

/// Battery parameters. SOC values are fractions of `capacity_kwh`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_soc_window"))]
#[serde(default)]
pub struct BessParams {
    #[validate(range(exclusive_min = 0.0))]
    pub capacity_kwh: f64,
    #[validate(range(min = 0.0))]
    pub p_charge_max_kw: f64,
    #[validate(range(min = 0.0))]
    pub p_discharge_max_kw: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub soc0: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub soc_min: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub soc_max: f64,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub eta_charge: f64,
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub eta_discharge: f64,
}

impl Default for BessParams {
    fn default() -> Self {
        Self {
            capacity_kwh: DEFAULT_CAPACITY_KWH,
            p_charge_max_kw: DEFAULT_P_CHARGE_MAX_KW,
            p_discharge_max_kw: DEFAULT_P_DISCHARGE_MAX_KW,
            soc0: DEFAULT_SOC0,
            soc_min: DEFAULT_SOC_MIN,
            soc_max: DEFAULT_SOC_MAX,
            eta_charge: DEFAULT_ETA_CHARGE,
            eta_discharge: DEFAULT_ETA_DISCHARGE,
        }
    }
}

impl BessParams {
    /// Energy that can still be drawn from the cells before hitting `soc_min`.
    pub fn usable_energy_kwh(&self, soc: f64) -> f64 {
        ((soc - self.soc_min) * self.capacity_kwh).max(0.0)
    }

    /// Energy that can still be stored before hitting `soc_max`.
    pub fn headroom_kwh(&self, soc: f64) -> f64 {
        ((self.soc_max - soc) * self.capacity_kwh).max(0.0)
    }

    /// SOC after one step of the given charge/discharge power.
    pub fn next_soc(&self, soc: f64, charge_kw: f64, discharge_kw: f64, dt_hours: f64) -> f64 {
        soc + (charge_kw * self.eta_charge - discharge_kw / self.eta_discharge) * dt_hours
            / self.capacity_kwh
    }
}

fn validate_soc_window(params: &BessParams) -> Result<(), ValidationError> {
    if params.soc_min > params.soc_max {
        let mut err = ValidationError::new("soc_window");
        err.message = Some("soc_min must not exceed soc_max".into());
        return Err(err);
    }
    if params.soc0 < params.soc_min || params.soc0 > params.soc_max {
        let mut err = ValidationError::new("soc0_out_of_window");
        err.message = Some("soc0 must lie within [soc_min, soc_max]".into());
        return Err(err);
    }
    Ok(())
}

/// Grid connection limits (kW).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GridLimits {
    #[validate(range(min = 0.0))]
    pub grid_import_max_kw: f64,
    #[validate(range(min = 0.0))]
    pub grid_export_max_kw: f64,
    #[validate(range(min = 0.0))]
    pub transformer_max_kw: f64,
}

impl Default for GridLimits {
    fn default() -> Self {
        Self {
            grid_import_max_kw: DEFAULT_GRID_IMPORT_MAX_KW,
            grid_export_max_kw: DEFAULT_GRID_EXPORT_MAX_KW,
            transformer_max_kw: DEFAULT_TRANSFORMER_MAX_KW,
        }
    }
}

/// Objective coefficients. `violation` should dominate the others so the
/// transformer slack is only used when nothing else is feasible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Weights {
    #[validate(range(min = 0.0))]
    pub cost: f64,
    #[validate(range(min = 0.0))]
    pub curtail: f64,
    #[validate(range(min = 0.0))]
    pub violation: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            cost: DEFAULT_WEIGHT_COST,
            curtail: DEFAULT_WEIGHT_CURTAIL,
            violation: DEFAULT_WEIGHT_VIOLATION,
        }
    }
}

/// Everything one optimize-and-report call consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchProblem {
    pub pv_forecast_kw: Vec<f64>,
    pub load_kw: Vec<f64>,
    pub tariff_buy: Vec<f64>,
    pub tariff_sell: Vec<f64>,
    #[serde(default)]
    pub bess: BessParams,
    #[serde(default)]
    pub limits: GridLimits,
    #[serde(default)]
    pub weights: Weights,
    #[serde(default = "default_resolution_minutes")]
    pub resolution_minutes: u32,
}

fn default_resolution_minutes() -> u32 {
    DEFAULT_RESOLUTION_MINUTES
}

impl DispatchProblem {
    /// Problem with default battery, limits and weights at the default resolution.
    pub fn new(
        pv_forecast_kw: Vec<f64>,
        load_kw: Vec<f64>,
        tariff_buy: Vec<f64>,
        tariff_sell: Vec<f64>,
    ) -> Self {
        Self {
            pv_forecast_kw,
            load_kw,
            tariff_buy,
            tariff_sell,
            bess: BessParams::default(),
            limits: GridLimits::default(),
            weights: Weights::default(),
            resolution_minutes: DEFAULT_RESOLUTION_MINUTES,
        }
    }

    pub fn with_bess(mut self, bess: BessParams) -> Self {
        self.bess = bess;
        self
    }

    pub fn with_limits(mut self, limits: GridLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_resolution_minutes(mut self, resolution_minutes: u32) -> Self {
        self.resolution_minutes = resolution_minutes;
        self
    }

    pub fn horizon(&self) -> usize {
        self.load_kw.len()
    }

    pub fn dt_hours(&self) -> f64 {
        self.resolution_minutes as f64 / 60.0
    }

    /// Check shapes and parameter ranges before any scheduler touches the data.
    pub fn validate(&self) -> Result<(), OptimizeError> {
        let n = self.pv_forecast_kw.len();
        if n == 0 {
            return Err(OptimizeError::InvalidInput("empty input arrays".to_string()));
        }
        if self.load_kw.len() != n || self.tariff_buy.len() != n || self.tariff_sell.len() != n {
            return Err(OptimizeError::InvalidInput(format!(
                "input arrays must have the same length (pv={}, load={}, buy={}, sell={})",
                n,
                self.load_kw.len(),
                self.tariff_buy.len(),
                self.tariff_sell.len()
            )));
        }
        if self.resolution_minutes == 0 {
            return Err(OptimizeError::InvalidInput(
                "resolution_minutes must be positive".to_string(),
            ));
        }

        for (name, series) in [("pv_forecast_kw", &self.pv_forecast_kw), ("load_kw", &self.load_kw)] {
            if let Some(t) = series.iter().position(|v| !v.is_finite() || *v < 0.0) {
                return Err(OptimizeError::InvalidInput(format!(
                    "{name}[{t}] must be finite and non-negative, got {}",
                    series[t]
                )));
            }
        }
        for (name, series) in [("tariff_buy", &self.tariff_buy), ("tariff_sell", &self.tariff_sell)] {
            if let Some(t) = series.iter().position(|v| !v.is_finite()) {
                return Err(OptimizeError::InvalidInput(format!("{name}[{t}] is not finite")));
            }
        }

        self.bess
            .validate()
            .map_err(|e| OptimizeError::InvalidInput(format!("bess: {e}")))?;
        self.limits
            .validate()
            .map_err(|e| OptimizeError::InvalidInput(format!("limits: {e}")))?;
        self.weights
            .validate()
            .map_err(|e| OptimizeError::InvalidInput(format!("weights: {e}")))?;

        Ok(())
    }
}
