use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, warn};

use super::constraints::BALANCE_TOLERANCE_KW;
use crate::domain::{
    DispatchProblem, Solution, SolverStatus, TariffBands, DEFAULT_WEIGHT_CURTAIL,
};

pub const FALLBACK_SOLVER_NAME: &str = "fallback_rule";

/// Rule-based scheduler used when the MILP cannot deliver a schedule.
///
/// Walks the horizon once, in order:
/// - PV serves load first
/// - Peak tariff steps discharge the battery into the remaining load
/// - Off-peak steps store excess PV
/// - Remaining load is imported (clamped to the import limit)
/// - Remaining PV is exported up to the export limit, the rest curtailed
///
/// It never fails. When the import limit cannot cover the remaining load the
/// shortfall is recorded in `Solution::unserved_kw` (brownout) and power
/// balance is knowingly violated at that step.
#[derive(Debug, Clone)]
pub struct FallbackScheduler {
    /// Weight applied to curtailed energy in the reported objective estimate
    pub curtail_weight: f64,
}

impl Default for FallbackScheduler {
    fn default() -> Self {
        Self {
            curtail_weight: DEFAULT_WEIGHT_CURTAIL,
        }
    }
}

/// Per-step decision of the rule-based scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct StepDispatch {
    pv_set: f64,
    charge: f64,
    discharge: f64,
    import: f64,
    export: f64,
    curtail: f64,
    unserved: f64,
    soc_after: f64,
}

impl FallbackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_curtail_weight(mut self, curtail_weight: f64) -> Self {
        self.curtail_weight = curtail_weight;
        self
    }

    /// Build a schedule for the whole horizon.
    ///
    /// Expects equal-length arrays; a shorter series truncates the horizon
    /// rather than panicking.
    pub fn schedule(&self, problem: &DispatchProblem) -> Solution {
        let started = Instant::now();
        let n = problem
            .pv_forecast_kw
            .len()
            .min(problem.load_kw.len())
            .min(problem.tariff_buy.len())
            .min(problem.tariff_sell.len());
        let dt = problem.dt_hours();
        let bands = TariffBands::from_buy_tariff(&problem.tariff_buy[..n]);

        let mut solution = Solution::idle(
            n,
            problem.bess.soc0,
            SolverStatus::FallbackRule,
            FALLBACK_SOLVER_NAME,
        );
        let mut soc = problem.bess.soc0;

        for t in 0..n {
            let step = self.dispatch_step(
                problem,
                t,
                soc,
                dt,
                bands.is_peak(problem.tariff_buy[t]),
            );
            soc = step.soc_after;

            if step.unserved > 0.0 {
                warn!(
                    timestep = t,
                    unserved_kw = step.unserved,
                    grid_import_max_kw = problem.limits.grid_import_max_kw,
                    "grid import clamped below remaining load, serving partially"
                );
            }

            solution.pv_set_kw[t] = step.pv_set;
            solution.batt_ch_kw[t] = step.charge;
            solution.batt_dis_kw[t] = step.discharge;
            solution.grid_imp_kw[t] = step.import;
            solution.grid_exp_kw[t] = step.export;
            solution.curtail_kw[t] = step.curtail;
            solution.unserved_kw[t] = step.unserved;
            solution.soc[t] = step.soc_after;
        }

        solution.objective_value = self.objective_estimate(&solution, problem);
        solution.solve_time_secs = started.elapsed().as_secs_f64();

        debug!(
            horizon = n,
            objective = solution.objective_value,
            unserved_steps = solution.unserved_kw.iter().filter(|u| **u > 0.0).count(),
            "fallback schedule built"
        );

        solution
    }

    fn dispatch_step(
        &self,
        problem: &DispatchProblem,
        t: usize,
        soc: f64,
        dt: f64,
        is_peak: bool,
    ) -> StepDispatch {
        let bess = &problem.bess;
        let limits = &problem.limits;

        // PV serves load first
        let pv_available = problem.pv_forecast_kw[t];
        let load_demand = problem.load_kw[t];
        let pv_to_load = pv_available.min(load_demand);
        let mut pv_excess = pv_available - pv_to_load;
        let mut load_remaining = load_demand - pv_to_load;

        let mut step = StepDispatch {
            soc_after: soc,
            ..StepDispatch::default()
        };

        if is_peak && load_remaining > 0.0 && soc > bess.soc_min {
            // Cell energy drawn is discharge / eta, so the deliverable power is scaled by eta
            let energy_limited_kw = bess.usable_energy_kwh(soc) * bess.eta_discharge / dt;
            step.discharge = bess
                .p_discharge_max_kw
                .min(load_remaining)
                .min(energy_limited_kw)
                .max(0.0);
            load_remaining -= step.discharge;
        } else if !is_peak && pv_excess > 0.0 && soc < bess.soc_max {
            let headroom_limited_kw = bess.headroom_kwh(soc) / (bess.eta_charge * dt);
            step.charge = bess
                .p_charge_max_kw
                .min(pv_excess)
                .min(headroom_limited_kw)
                .max(0.0);
            pv_excess -= step.charge;
        }
        step.soc_after = bess
            .next_soc(soc, step.charge, step.discharge, dt)
            .clamp(bess.soc_min, bess.soc_max);

        if load_remaining > 0.0 {
            step.import = load_remaining.min(limits.grid_import_max_kw);
            step.unserved = load_remaining - step.import;
        }

        if pv_excess > 0.0 {
            step.export = pv_excess.min(limits.grid_export_max_kw);
            step.curtail = pv_excess - step.export;
        }

        step.pv_set = pv_to_load + step.charge + step.export;
        step
    }

    /// Reported cost estimate; not an optimization target.
    fn objective_estimate(&self, solution: &Solution, problem: &DispatchProblem) -> f64 {
        let dt = problem.dt_hours();
        let energy_cost: f64 = (0..solution.len())
            .map(|t| {
                (problem.tariff_buy[t] * solution.grid_imp_kw[t]
                    - problem.tariff_sell[t] * solution.grid_exp_kw[t])
                    * dt
            })
            .sum();
        let curtailed_kwh: f64 = solution.curtail_kw.iter().sum::<f64>() * dt;
        energy_cost + self.curtail_weight * curtailed_kwh
    }
}

/// A balance violation found by [`validate_schedule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    PowerImbalance { t: usize, supply: f64, demand: f64 },
    PvImbalance { t: usize, used: f64, forecast: f64 },
}

impl Violation {
    pub fn timestep(&self) -> usize {
        match self {
            Violation::PowerImbalance { t, .. } | Violation::PvImbalance { t, .. } => *t,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::PowerImbalance { t, supply, demand } => {
                write!(f, "t={t}: Power imbalance {supply:.2} != {demand:.2}")
            }
            Violation::PvImbalance { t, used, forecast } => {
                write!(f, "t={t}: PV balance {used:.2} != {forecast:.2}")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleValidation {
    pub violations: Vec<Violation>,
}

impl ScheduleValidation {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

/// Check power balance and PV balance of a schedule within 1e-2 kW.
pub fn validate_schedule(
    solution: &Solution,
    pv_forecast_kw: &[f64],
    load_kw: &[f64],
) -> ScheduleValidation {
    let n = load_kw.len().min(pv_forecast_kw.len()).min(solution.len());
    let mut violations = Vec::new();

    for t in 0..n {
        let flows = solution.flows_at(t);
        let supply = flows.supply();
        let demand = flows.demand(load_kw[t]);
        if (supply - demand).abs() > BALANCE_TOLERANCE_KW {
            violations.push(Violation::PowerImbalance { t, supply, demand });
        }

        let used = flows.pv_set_kw + flows.curtail_kw;
        if (used - pv_forecast_kw[t]).abs() > BALANCE_TOLERANCE_KW {
            violations.push(Violation::PvImbalance {
                t,
                used,
                forecast: pv_forecast_kw[t],
            });
        }
    }

    ScheduleValidation { violations }
}
