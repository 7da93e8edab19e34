use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{AsRefStr, Display, EnumString};

/// How a schedule was produced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SolverStatus {
    /// MILP solved to optimality (within the configured gap)
    Optimal,
    /// MILP hit its time limit but returned a feasible incumbent
    Timeout,
    /// MILP failed and the rule-based scheduler took over
    FallbackRule,
    /// MILP disabled, rule-based scheduler used directly
    RuleBased,
}

impl SolverStatus {
    pub fn is_fallback(&self) -> bool {
        matches!(self, SolverStatus::FallbackRule | SolverStatus::RuleBased)
    }
}

/// Dispatch schedule over the planning horizon, one value per timestep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub pv_set_kw: Vec<f64>,
    pub batt_ch_kw: Vec<f64>,
    pub batt_dis_kw: Vec<f64>,
    pub grid_imp_kw: Vec<f64>,
    pub grid_exp_kw: Vec<f64>,
    pub curtail_kw: Vec<f64>,
    pub soc: Vec<f64>,
    /// Transformer soft-limit slack (MILP only, zeros otherwise)
    pub slack_transformer_kw: Vec<f64>,
    /// Load left unserved because grid import was clamped (fallback only)
    pub unserved_kw: Vec<f64>,
    pub objective_value: f64,
    pub solver_status: SolverStatus,
    /// Backend that produced the schedule (e.g. "microlp", "highs", "fallback_rule")
    pub solver: String,
    pub solve_time_secs: f64,
}

impl Solution {
    /// All-zero schedule of length `n` with SOC held at `soc0`.
    pub fn idle(n: usize, soc0: f64, solver_status: SolverStatus, solver: impl Into<String>) -> Self {
        Self {
            pv_set_kw: vec![0.0; n],
            batt_ch_kw: vec![0.0; n],
            batt_dis_kw: vec![0.0; n],
            grid_imp_kw: vec![0.0; n],
            grid_exp_kw: vec![0.0; n],
            curtail_kw: vec![0.0; n],
            soc: vec![soc0; n],
            slack_transformer_kw: vec![0.0; n],
            unserved_kw: vec![0.0; n],
            objective_value: 0.0,
            solver_status,
            solver: solver.into(),
            solve_time_secs: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.soc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.soc.is_empty()
    }

    /// Number of timesteps for which every flow series and the SOC have a value.
    /// Equals `len()` for schedules produced by this crate.
    pub fn aligned_len(&self) -> usize {
        [
            self.pv_set_kw.len(),
            self.batt_ch_kw.len(),
            self.batt_dis_kw.len(),
            self.grid_imp_kw.len(),
            self.grid_exp_kw.len(),
            self.curtail_kw.len(),
            self.soc.len(),
        ]
        .into_iter()
        .min()
        .unwrap_or(0)
    }

    /// Flow values at timestep `t`, `None` if any series is too short.
    pub fn try_flows_at(&self, t: usize) -> Option<StepFlows> {
        Some(StepFlows {
            pv_set_kw: *self.pv_set_kw.get(t)?,
            batt_ch_kw: *self.batt_ch_kw.get(t)?,
            batt_dis_kw: *self.batt_dis_kw.get(t)?,
            grid_imp_kw: *self.grid_imp_kw.get(t)?,
            grid_exp_kw: *self.grid_exp_kw.get(t)?,
            curtail_kw: *self.curtail_kw.get(t)?,
        })
    }

    /// Flow values at timestep `t`. Panics if `t` is out of range.
    pub fn flows_at(&self, t: usize) -> StepFlows {
        StepFlows {
            pv_set_kw: self.pv_set_kw[t],
            batt_ch_kw: self.batt_ch_kw[t],
            batt_dis_kw: self.batt_dis_kw[t],
            grid_imp_kw: self.grid_imp_kw[t],
            grid_exp_kw: self.grid_exp_kw[t],
            curtail_kw: self.curtail_kw[t],
        }
    }

    /// SOC at the start of timestep `t`.
    pub fn soc_before(&self, t: usize, soc0: f64) -> f64 {
        if t == 0 {
            soc0
        } else {
            self.soc[t - 1]
        }
    }

    pub fn has_unserved_load(&self) -> bool {
        self.unserved_kw.iter().any(|u| *u > 0.0)
    }
}

/// The six flow variables of a single timestep.
///
/// Power balance: PV + discharge + import = load + charge + export
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepFlows {
    pub pv_set_kw: f64,
    pub batt_ch_kw: f64,
    pub batt_dis_kw: f64,
    pub grid_imp_kw: f64,
    pub grid_exp_kw: f64,
    pub curtail_kw: f64,
}

impl StepFlows {
    pub fn supply(&self) -> f64 {
        self.pv_set_kw + self.batt_dis_kw + self.grid_imp_kw
    }

    pub fn demand(&self, load_kw: f64) -> f64 {
        load_kw + self.batt_ch_kw + self.grid_exp_kw
    }

    /// Supply minus demand; positive means surplus.
    pub fn imbalance(&self, load_kw: f64) -> f64 {
        self.supply() - self.demand(load_kw)
    }
}

impl fmt::Display for StepFlows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PV: {:.2}kW, Charge: {:.2}kW, Discharge: {:.2}kW, Import: {:.2}kW, Export: {:.2}kW, Curtail: {:.2}kW",
            self.pv_set_kw,
            self.batt_ch_kw,
            self.batt_dis_kw,
            self.grid_imp_kw,
            self.grid_exp_kw,
            self.curtail_kw
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_string_forms() {
        assert_eq!(SolverStatus::FallbackRule.to_string(), "fallback_rule");
        assert_eq!(SolverStatus::RuleBased.as_ref(), "rule_based");
        assert_eq!(SolverStatus::from_str("timeout").unwrap(), SolverStatus::Timeout);
        assert_eq!(
            serde_json::to_string(&SolverStatus::Optimal).unwrap(),
            "\"optimal\""
        );
    }

    #[test]
    fn test_ragged_series_are_cut_to_common_length() {
        let mut solution = Solution::idle(4, 0.5, SolverStatus::Optimal, "test");
        assert_eq!(solution.aligned_len(), 4);

        solution.grid_exp_kw.truncate(2);
        assert_eq!(solution.len(), 4);
        assert_eq!(solution.aligned_len(), 2);
        assert!(solution.try_flows_at(1).is_some());
        assert!(solution.try_flows_at(2).is_none());
    }

    #[test]
    fn test_step_flows_balance() {
        let flows = StepFlows {
            pv_set_kw: 30.0,
            batt_ch_kw: 0.0,
            batt_dis_kw: 10.0,
            grid_imp_kw: 10.0,
            grid_exp_kw: 0.0,
            curtail_kw: 0.0,
        };
        assert_eq!(flows.supply(), 50.0);
        assert_eq!(flows.imbalance(50.0), 0.0);
        assert_eq!(flows.imbalance(60.0), -10.0);
    }

    #[test]
    fn test_soc_before_anchors_to_soc0() {
        let mut solution = Solution::idle(3, 0.5, SolverStatus::Optimal, "test");
        solution.soc = vec![0.6, 0.7, 0.8];
        assert_eq!(solution.soc_before(0, 0.5), 0.5);
        assert_eq!(solution.soc_before(2, 0.5), 0.7);
    }
}
