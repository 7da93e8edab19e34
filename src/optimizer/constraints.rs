use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::domain::{BessParams, DispatchProblem, GridLimits, Solution};

/// Default distance from a bound under which a constraint counts as binding
pub const DEFAULT_BINDING_TOLERANCE: f64 = 1e-3;

/// Power tolerance (kW) for balance checks
pub const BALANCE_TOLERANCE_KW: f64 = 1e-2;

/// SOC tolerance for bound and dynamics checks
const SOC_TOLERANCE: f64 = 1e-4;

/// A schedule constraint that can actively limit the dispatch.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BindingConstraint {
    SocMin,
    SocMax,
    PChargeMax,
    PDischargeMax,
    GridImportMax,
    GridExportMax,
    TransformerMax,
}

impl BindingConstraint {
    /// Human-readable name used in explanations
    pub fn label(&self) -> &'static str {
        match self {
            BindingConstraint::SocMin => "min SOC",
            BindingConstraint::SocMax => "max SOC",
            BindingConstraint::PChargeMax => "max charge power",
            BindingConstraint::PDischargeMax => "max discharge power",
            BindingConstraint::GridImportMax => "grid import limit",
            BindingConstraint::GridExportMax => "grid export limit",
            BindingConstraint::TransformerMax => "transformer limit",
        }
    }
}

/// Tag every timestep with the constraints sitting within `tolerance` of their bound.
///
/// Derived purely from the solution values, so it works on fallback schedules
/// too, but it is only meaningful for explanation.
pub fn binding_constraints(
    solution: &Solution,
    bess: &BessParams,
    limits: &GridLimits,
    tolerance: f64,
) -> Vec<Vec<BindingConstraint>> {
    let at_bound = |value: f64, bound: f64| (value - bound).abs() < tolerance;

    (0..solution.len())
        .map(|t| {
            let mut bound = Vec::new();
            if at_bound(solution.soc[t], bess.soc_min) {
                bound.push(BindingConstraint::SocMin);
            }
            if at_bound(solution.soc[t], bess.soc_max) {
                bound.push(BindingConstraint::SocMax);
            }
            if at_bound(solution.batt_ch_kw[t], bess.p_charge_max_kw) {
                bound.push(BindingConstraint::PChargeMax);
            }
            if at_bound(solution.batt_dis_kw[t], bess.p_discharge_max_kw) {
                bound.push(BindingConstraint::PDischargeMax);
            }
            if at_bound(solution.grid_imp_kw[t], limits.grid_import_max_kw) {
                bound.push(BindingConstraint::GridImportMax);
            }
            if at_bound(solution.grid_exp_kw[t], limits.grid_export_max_kw) {
                bound.push(BindingConstraint::GridExportMax);
            }
            let grid_flow = solution.grid_imp_kw[t] + solution.grid_exp_kw[t];
            if at_bound(grid_flow, limits.transformer_max_kw) {
                bound.push(BindingConstraint::TransformerMax);
            }
            bound
        })
        .collect()
}

/// Full invariant check of a schedule against its problem: balances, SOC
/// dynamics and every variable bound. Returns one message per violation.
pub fn check_invariants(solution: &Solution, problem: &DispatchProblem) -> Vec<String> {
    let mut violations = Vec::new();
    let n = problem.horizon();
    if solution.len() != n {
        violations.push(format!(
            "schedule length {} does not match horizon {}",
            solution.len(),
            n
        ));
        return violations;
    }

    let bess = &problem.bess;
    let limits = &problem.limits;
    let dt = problem.dt_hours();
    let kw_tol = BALANCE_TOLERANCE_KW;

    for t in 0..n {
        let flows = solution.flows_at(t);
        let imbalance = flows.imbalance(problem.load_kw[t]);
        if imbalance.abs() > kw_tol {
            violations.push(format!("t={t}: power imbalance {imbalance:.3} kW"));
        }

        let pv_total = flows.pv_set_kw + flows.curtail_kw;
        if (pv_total - problem.pv_forecast_kw[t]).abs() > kw_tol {
            violations.push(format!(
                "t={t}: PV balance {pv_total:.3} != {:.3}",
                problem.pv_forecast_kw[t]
            ));
        }

        let expected_soc = bess.next_soc(
            solution.soc_before(t, bess.soc0),
            flows.batt_ch_kw,
            flows.batt_dis_kw,
            dt,
        );
        if (solution.soc[t] - expected_soc).abs() > SOC_TOLERANCE {
            violations.push(format!(
                "t={t}: SOC {:.5} does not follow dynamics (expected {expected_soc:.5})",
                solution.soc[t]
            ));
        }
        if solution.soc[t] < bess.soc_min - SOC_TOLERANCE || solution.soc[t] > bess.soc_max + SOC_TOLERANCE {
            violations.push(format!("t={t}: SOC {:.5} out of bounds", solution.soc[t]));
        }

        let bounded = [
            ("batt_ch_kw", flows.batt_ch_kw, bess.p_charge_max_kw),
            ("batt_dis_kw", flows.batt_dis_kw, bess.p_discharge_max_kw),
            ("grid_imp_kw", flows.grid_imp_kw, limits.grid_import_max_kw),
            ("grid_exp_kw", flows.grid_exp_kw, limits.grid_export_max_kw),
            ("pv_set_kw", flows.pv_set_kw, problem.pv_forecast_kw[t]),
            ("curtail_kw", flows.curtail_kw, problem.pv_forecast_kw[t]),
        ];
        for (name, value, max) in bounded {
            if value < -kw_tol || value > max + kw_tol {
                violations.push(format!("t={t}: {name}={value:.3} outside [0, {max:.3}]"));
            }
        }
    }

    violations
}
