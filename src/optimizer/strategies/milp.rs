//! MILP (Mixed-Integer Linear Programming) Optimizer
//!
//! Cost-minimal BESS dispatch over a fixed horizon. The formulation considers:
//! - Time-of-use buy and sell tariffs
//! - PV curtailment penalty
//! - Battery SoC bounds and charge/discharge power limits
//! - Battery efficiency losses (separate charge and discharge efficiencies)
//! - Grid import/export limits
//! - Transformer limit as a soft constraint with penalized slack
//!
//! Two binaries per timestep forbid simultaneous charge/discharge and
//! simultaneous import/export (big-M bounds on the paired flows).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::domain::{DispatchProblem, Solution, SolverStatus};
use crate::optimizer::constraints::{
    binding_constraints, check_invariants, BindingConstraint, DEFAULT_BINDING_TOLERANCE,
};
use crate::optimizer::{DispatchOptimizer, OptimizeError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_MIP_GAP: f64 = 0.01;

/// Extra time granted to backends that enforce their own time limit, so they
/// can hand back an incumbent before the outer deadline fires.
const DEADLINE_GRACE: Duration = Duration::from_millis(500);

const SOLVER_THREAD_NAME: &str = "milp-solver";

/// Horizon above which the pure-Rust backend gets slow
const MICROLP_COMFORTABLE_HORIZON: usize = 96;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SolverBackend {
    /// Pure Rust branch & bound (default, always compiled with `optimization`)
    Microlp,
    /// HiGHS (requires the `highs` feature); honours time limit and MIP gap natively
    Highs,
}

impl SolverBackend {
    pub fn has_native_time_limit(&self) -> bool {
        matches!(self, SolverBackend::Highs)
    }
}

/// Solver configuration handed to the optimizer at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    pub backend: SolverBackend,
    pub timeout: Duration,
    /// Relative optimality gap accepted as optimal
    pub mip_gap: f64,
    pub binding_tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            backend: SolverBackend::Microlp,
            timeout: DEFAULT_TIMEOUT,
            mip_gap: DEFAULT_MIP_GAP,
            binding_tolerance: DEFAULT_BINDING_TOLERANCE,
        }
    }
}

impl SolverSettings {
    /// Wall-clock budget for one solve including the worker hand-off
    pub fn deadline(&self) -> Duration {
        if self.backend.has_native_time_limit() {
            self.timeout + DEADLINE_GRACE
        } else {
            self.timeout
        }
    }
}

/// MILP optimizer for BESS dispatch
#[derive(Debug, Clone, Default)]
pub struct MilpOptimizer {
    settings: SolverSettings,
}

impl MilpOptimizer {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Solve on the current thread. The only time bound is the backend's own
    /// limit; use [`DispatchOptimizer::optimize`] for an enforced deadline.
    pub fn solve(&self, problem: &DispatchProblem) -> Result<Solution, OptimizeError> {
        problem.validate()?;

        let n = problem.horizon();
        if n > MICROLP_COMFORTABLE_HORIZON && self.settings.backend == SolverBackend::Microlp {
            warn!(
                horizon = n,
                "MILP received a long horizon for the microlp backend. \
                 Consider the highs backend or a coarser resolution."
            );
        }

        let started = Instant::now();
        let mut solution = self.solve_model(problem)?;
        let elapsed = started.elapsed();
        solution.solve_time_secs = elapsed.as_secs_f64();

        if elapsed >= self.settings.timeout {
            // Time limit reached: only keep the incumbent if it is actually feasible
            let violations = check_invariants(&solution, problem);
            if !violations.is_empty() {
                warn!(
                    violations = violations.len(),
                    first = %violations[0],
                    "solver hit its time limit without a feasible incumbent"
                );
                return Err(OptimizeError::Timeout);
            }
            solution.solver_status = SolverStatus::Timeout;
        }

        info!(
            horizon = n,
            solver = %self.settings.backend,
            status = %solution.solver_status,
            objective = solution.objective_value,
            elapsed_ms = elapsed.as_millis() as u64,
            "MILP solve finished"
        );

        Ok(solution)
    }

    #[cfg(feature = "optimization")]
    fn solve_model(&self, problem: &DispatchProblem) -> Result<Solution, OptimizeError> {
        use good_lp::{
            constraint, variable, Constraint, Expression, IntoAffineExpression, ProblemVariables,
            SolverModel,
        };

        let n = problem.horizon();
        let dt = problem.dt_hours();
        let bess = &problem.bess;
        let limits = &problem.limits;
        let weights = &problem.weights;

        let mut problem_vars = ProblemVariables::new();

        // pv_set[t], curtail[t]: PV used / PV discarded (kW)
        // batt_ch[t], batt_dis[t]: battery flows (kW)
        // grid_imp[t], grid_exp[t]: grid flows (kW)
        // soc[t]: state of charge at the end of step t (fraction)
        // charging[t], importing[t]: direction binaries
        // slack[t]: transformer overload (kW)
        let vars = ModelVars {
            pv_set: problem_vars.add_vector(variable().min(0.0), n),
            batt_ch: problem_vars.add_vector(variable().min(0.0).max(bess.p_charge_max_kw), n),
            batt_dis: problem_vars.add_vector(variable().min(0.0).max(bess.p_discharge_max_kw), n),
            grid_imp: problem_vars.add_vector(variable().min(0.0).max(limits.grid_import_max_kw), n),
            grid_exp: problem_vars.add_vector(variable().min(0.0).max(limits.grid_export_max_kw), n),
            curtail: problem_vars.add_vector(variable().min(0.0), n),
            soc: problem_vars.add_vector(variable().min(bess.soc_min).max(bess.soc_max), n),
            slack: problem_vars.add_vector(variable().min(0.0), n),
        };
        let charging = problem_vars.add_vector(variable().binary(), n);
        let importing = problem_vars.add_vector(variable().binary(), n);

        let energy_cost = (0..n)
            .map(|t| {
                vars.grid_imp[t] * (problem.tariff_buy[t] * dt)
                    - vars.grid_exp[t] * (problem.tariff_sell[t] * dt)
            })
            .sum::<Expression>();
        let curtailment = vars.curtail.iter().map(|c| *c * dt).sum::<Expression>();
        let violation = vars.slack.iter().map(|s| s.into_expression()).sum::<Expression>();

        let objective = energy_cost * weights.cost
            + curtailment * weights.curtail
            + violation * weights.violation;

        let soc_per_kw = dt / bess.capacity_kwh;
        let mut constraints: Vec<Constraint> = Vec::with_capacity(n * 8);

        for t in 0..n {
            let (pv_set, curtail, soc) = (vars.pv_set[t], vars.curtail[t], vars.soc[t]);
            let (batt_ch, batt_dis) = (vars.batt_ch[t], vars.batt_dis[t]);
            let (grid_imp, grid_exp) = (vars.grid_imp[t], vars.grid_exp[t]);
            let load = problem.load_kw[t];

            // Power balance
            constraints.push(constraint!(pv_set + batt_dis + grid_imp == batt_ch + grid_exp + load));

            // PV is either used or curtailed
            constraints.push(constraint!(pv_set + curtail == problem.pv_forecast_kw[t]));

            // SoC dynamics, anchored to soc0 at t = 0
            let soc_delta = batt_ch * (bess.eta_charge * soc_per_kw)
                - batt_dis * (soc_per_kw / bess.eta_discharge);
            if t == 0 {
                constraints.push(constraint!(soc == soc_delta + bess.soc0));
            } else {
                constraints.push(constraint!(soc == vars.soc[t - 1] + soc_delta));
            }

            // No simultaneous charge and discharge
            constraints.push(constraint!(batt_ch <= charging[t] * bess.p_charge_max_kw));
            constraints.push(constraint!(
                batt_dis + charging[t] * bess.p_discharge_max_kw <= bess.p_discharge_max_kw
            ));

            // No simultaneous import and export
            constraints.push(constraint!(grid_imp <= importing[t] * limits.grid_import_max_kw));
            constraints.push(constraint!(
                grid_exp + importing[t] * limits.grid_export_max_kw <= limits.grid_export_max_kw
            ));

            // Transformer capacity, soft
            constraints.push(constraint!(
                grid_imp + grid_exp <= vars.slack[t] + limits.transformer_max_kw
            ));
        }

        debug!(
            horizon = n,
            binaries = 2 * n,
            constraints = constraints.len(),
            backend = %self.settings.backend,
            "MILP model built"
        );

        let solver_name = self.settings.backend.to_string();
        match self.settings.backend {
            SolverBackend::Microlp => {
                if self.settings.mip_gap > 0.0 {
                    debug!(
                        mip_gap = self.settings.mip_gap,
                        "microlp solves to proven optimality, gap ignored"
                    );
                }
                let model = problem_vars
                    .minimise(objective.clone())
                    .using(good_lp::microlp);
                let model = constraints.into_iter().fold(model, |model, c| model.with(c));
                let solved = model.solve()?;
                Ok(vars.read(&solved, objective, solver_name))
            }
            #[cfg(feature = "highs")]
            SolverBackend::Highs => {
                let model = problem_vars
                    .minimise(objective.clone())
                    .using(good_lp::highs)
                    .set_option("time_limit", self.settings.timeout.as_secs_f64())
                    .set_option("mip_rel_gap", self.settings.mip_gap);
                let model = constraints.into_iter().fold(model, |model, c| model.with(c));
                let solved = model.solve()?;
                Ok(vars.read(&solved, objective, solver_name))
            }
            #[cfg(not(feature = "highs"))]
            SolverBackend::Highs => Err(OptimizeError::SolverUnavailable(
                "highs backend requires the 'highs' feature".to_string(),
            )),
        }
    }

    #[cfg(not(feature = "optimization"))]
    fn solve_model(&self, _problem: &DispatchProblem) -> Result<Solution, OptimizeError> {
        Err(OptimizeError::SolverUnavailable(
            "MILP optimization requires the 'optimization' feature to be enabled".to_string(),
        ))
    }
}

#[cfg(feature = "optimization")]
struct ModelVars {
    pv_set: Vec<good_lp::Variable>,
    batt_ch: Vec<good_lp::Variable>,
    batt_dis: Vec<good_lp::Variable>,
    grid_imp: Vec<good_lp::Variable>,
    grid_exp: Vec<good_lp::Variable>,
    curtail: Vec<good_lp::Variable>,
    soc: Vec<good_lp::Variable>,
    slack: Vec<good_lp::Variable>,
}

#[cfg(feature = "optimization")]
impl ModelVars {
    /// Pull variable values out of a solved model. Flows are clipped at zero to
    /// drop solver noise like -1e-12.
    fn read(
        &self,
        solved: &impl good_lp::Solution,
        objective: good_lp::Expression,
        solver: String,
    ) -> Solution {
        let flow = |vars: &[good_lp::Variable]| -> Vec<f64> {
            vars.iter().map(|v| solved.value(*v).max(0.0)).collect()
        };
        let n = self.soc.len();

        Solution {
            pv_set_kw: flow(&self.pv_set),
            batt_ch_kw: flow(&self.batt_ch),
            batt_dis_kw: flow(&self.batt_dis),
            grid_imp_kw: flow(&self.grid_imp),
            grid_exp_kw: flow(&self.grid_exp),
            curtail_kw: flow(&self.curtail),
            soc: self.soc.iter().map(|v| solved.value(*v)).collect(),
            slack_transformer_kw: flow(&self.slack),
            unserved_kw: vec![0.0; n],
            objective_value: solved.eval(objective),
            solver_status: SolverStatus::Optimal,
            solver,
            solve_time_secs: 0.0,
        }
    }
}

#[async_trait]
impl DispatchOptimizer for MilpOptimizer {
    fn name(&self) -> &'static str {
        self.settings.backend.into()
    }

    /// Solve on a detached worker thread under a wall-clock deadline. An
    /// exceeded deadline is reported exactly like a solver timeout without
    /// incumbent. The abandoned solve is not joined, so neither this call nor
    /// runtime shutdown waits for it.
    async fn optimize(&self, problem: &DispatchProblem) -> Result<Solution, OptimizeError> {
        problem.validate()?;

        let optimizer = self.clone();
        let owned = problem.clone();
        let deadline = self.settings.deadline();
        let (result_tx, result_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name(SOLVER_THREAD_NAME.to_string())
            .spawn(move || {
                // receiver is gone once the deadline fired
                let _ = result_tx.send(optimizer.solve(&owned));
            })
            .map_err(|e| OptimizeError::SolverError(format!("failed to start solver: {e}")))?;

        match tokio::time::timeout(deadline, result_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(OptimizeError::SolverError(
                "solver worker exited without a result".to_string(),
            )),
            Err(_) => {
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    horizon = problem.horizon(),
                    "MILP deadline exceeded"
                );
                Err(OptimizeError::Timeout)
            }
        }
    }

    fn binding_constraints(
        &self,
        solution: &Solution,
        problem: &DispatchProblem,
    ) -> Vec<Vec<BindingConstraint>> {
        binding_constraints(
            solution,
            &problem.bess,
            &problem.limits,
            self.settings.binding_tolerance,
        )
    }
}
