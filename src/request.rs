use serde::{Deserialize, Serialize};

use crate::config::ParamDefaults;
use crate::domain::{BessParams, DispatchProblem, GridLimits, Weights};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tariff {
    pub buy: Vec<f64>,
    pub sell: Vec<f64>,
}

/// A dispatch request as submitted by a caller. Anything left out is taken
/// from the configured site defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub resolution_minutes: Option<u32>,
    #[serde(default)]
    pub pv_forecast_kw: Vec<f64>,
    pub load_kw: Vec<f64>,
    pub tariff: Tariff,
    #[serde(default)]
    pub bess: Option<BessParams>,
    #[serde(default)]
    pub limits: Option<GridLimits>,
    #[serde(default)]
    pub weights: Option<Weights>,
    #[serde(default)]
    pub use_milp: Option<bool>,
}

impl DispatchRequest {
    /// Build the problem, filling gaps from `defaults`.
    ///
    /// The load series defines the horizon: the PV forecast is zero-padded or
    /// truncated to its length. Tariffs are passed through untouched, so a
    /// tariff length mismatch still surfaces as invalid input.
    pub fn into_problem(self, defaults: &ParamDefaults) -> DispatchProblem {
        let n = self.load_kw.len();
        let mut pv = self.pv_forecast_kw;
        pv.resize(n, 0.0);

        DispatchProblem::new(pv, self.load_kw, self.tariff.buy, self.tariff.sell)
            .with_bess(self.bess.unwrap_or(defaults.bess))
            .with_limits(self.limits.unwrap_or(defaults.limits))
            .with_weights(self.weights.unwrap_or(defaults.weights))
            .with_resolution_minutes(self.resolution_minutes.unwrap_or(defaults.resolution_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> DispatchRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_short_pv_is_zero_padded() {
        let request = parse(
            r#"{"pv_forecast_kw": [5.0], "load_kw": [1.0, 2.0, 3.0],
                "tariff": {"buy": [0.3, 0.3, 0.3], "sell": [0.1, 0.1, 0.1]}}"#,
        );
        let problem = request.into_problem(&ParamDefaults::default());
        assert_eq!(problem.pv_forecast_kw, vec![5.0, 0.0, 0.0]);
        assert!(problem.validate().is_ok());
    }

    #[test]
    fn test_long_pv_is_truncated() {
        let request = parse(
            r#"{"pv_forecast_kw": [1.0, 2.0, 3.0], "load_kw": [1.0],
                "tariff": {"buy": [0.3], "sell": [0.1]}}"#,
        );
        let problem = request.into_problem(&ParamDefaults::default());
        assert_eq!(problem.pv_forecast_kw, vec![1.0]);
    }

    #[test]
    fn test_defaults_fill_missing_parameters() {
        let request = parse(
            r#"{"load_kw": [1.0], "resolution_minutes": 30,
                "tariff": {"buy": [0.3], "sell": [0.1]},
                "bess": {"capacity_kwh": 500.0}}"#,
        );
        let defaults = ParamDefaults::default();
        let problem = request.into_problem(&defaults);
        assert_eq!(problem.resolution_minutes, 30);
        assert_eq!(problem.bess.capacity_kwh, 500.0);
        assert_eq!(problem.bess.soc_min, defaults.bess.soc_min);
        assert_eq!(problem.limits, defaults.limits);
    }

    #[test]
    fn test_tariff_mismatch_still_invalid() {
        let request = parse(
            r#"{"load_kw": [1.0, 1.0], "tariff": {"buy": [0.3], "sell": [0.1, 0.1]}}"#,
        );
        assert!(request.into_problem(&ParamDefaults::default()).validate().is_err());
    }
}
