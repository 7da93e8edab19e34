pub mod constraints;
pub mod error;
pub mod fallback;
pub mod strategies;

pub use constraints::*;
pub use error::*;
pub use fallback::*;
pub use strategies::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{DispatchProblem, Solution, SolverStatus};
use crate::explain::{explain_schedule, StepExplanation};
use crate::kpi::{calculate_kpis, Metrics};

/// An exact (or time-limited) dispatch optimizer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DispatchOptimizer: Send + Sync {
    /// Backend name reported in logs
    fn name(&self) -> &'static str;

    async fn optimize(&self, problem: &DispatchProblem) -> Result<Solution, OptimizeError>;

    fn binding_constraints(
        &self,
        solution: &Solution,
        problem: &DispatchProblem,
    ) -> Vec<Vec<BindingConstraint>> {
        binding_constraints(
            solution,
            &problem.bess,
            &problem.limits,
            DEFAULT_BINDING_TOLERANCE,
        )
    }
}

/// Result of one dispatch run: the schedule plus everything reported about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub solution: Solution,
    /// Only present for MILP schedules
    pub binding: Option<Vec<Vec<BindingConstraint>>>,
    pub explanations: Vec<StepExplanation>,
    pub metrics: Metrics,
    /// Why the MILP result was replaced by the fallback schedule
    pub fallback_reason: Option<String>,
}

impl DispatchOutcome {
    pub fn status(&self) -> SolverStatus {
        self.solution.solver_status
    }
}

/// Runs the optimizer and falls back to the rule-based scheduler exactly once
/// when it cannot deliver.
pub struct Dispatcher {
    optimizer: Box<dyn DispatchOptimizer>,
    use_milp: bool,
}

impl Dispatcher {
    pub fn new(optimizer: Box<dyn DispatchOptimizer>) -> Self {
        Self {
            optimizer,
            use_milp: true,
        }
    }

    pub fn with_milp_enabled(mut self, use_milp: bool) -> Self {
        self.use_milp = use_milp;
        self
    }

    pub async fn run(&self, problem: &DispatchProblem) -> Result<DispatchOutcome, OptimizeError> {
        problem.validate()?;

        let fallback = FallbackScheduler::new().with_curtail_weight(problem.weights.curtail);
        let mut fallback_reason = None;

        let solution = if !self.use_milp {
            let mut solution = fallback.schedule(problem);
            solution.solver_status = SolverStatus::RuleBased;
            solution
        } else {
            match self.optimizer.optimize(problem).await {
                Ok(solution) => solution,
                Err(err) if err.is_recoverable() => {
                    warn!(
                        optimizer = self.optimizer.name(),
                        kind = err.kind(),
                        error = %err,
                        "MILP failed, using fallback schedule"
                    );
                    fallback_reason = Some(err.to_string());
                    fallback.schedule(problem)
                }
                Err(err) => return Err(err),
            }
        };

        let binding = match solution.solver_status {
            SolverStatus::Optimal | SolverStatus::Timeout => {
                Some(self.optimizer.binding_constraints(&solution, problem))
            }
            SolverStatus::FallbackRule | SolverStatus::RuleBased => None,
        };

        let explanations = explain_schedule(&solution, problem, binding.as_deref());
        let metrics = calculate_kpis(
            &solution,
            &problem.tariff_buy,
            &problem.tariff_sell,
            problem.resolution_minutes,
        );

        let outcome = DispatchOutcome {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            solution,
            binding,
            explanations,
            metrics,
            fallback_reason,
        };

        info!(
            run_id = %outcome.run_id,
            status = %outcome.status(),
            horizon = problem.horizon(),
            total_cost = outcome.metrics.total_cost,
            "dispatch run complete"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_problem() -> DispatchProblem {
        DispatchProblem::new(
            vec![0.0, 100.0, 100.0, 0.0],
            vec![50.0; 4],
            vec![0.3; 4],
            vec![0.1; 4],
        )
        .with_resolution_minutes(60)
    }

    #[tokio::test]
    async fn test_unavailable_solver_falls_back_once() {
        let mut mock = MockDispatchOptimizer::new();
        mock.expect_name().return_const("mock");
        mock.expect_optimize()
            .times(1)
            .returning(|_| Err(OptimizeError::SolverUnavailable("no backend".to_string())));

        let outcome = Dispatcher::new(Box::new(mock))
            .run(&scenario_problem())
            .await
            .unwrap();

        assert_eq!(outcome.status(), SolverStatus::FallbackRule);
        assert_eq!(outcome.solution.solver, FALLBACK_SOLVER_NAME);
        assert!(outcome.binding.is_none());
        assert_eq!(outcome.solution.len(), 4);
        assert_eq!(outcome.explanations.len(), 4);
        assert!(outcome
            .fallback_reason
            .as_deref()
            .is_some_and(|r| r.contains("no backend")));
    }

    #[tokio::test]
    async fn test_timeout_without_incumbent_falls_back() {
        let mut mock = MockDispatchOptimizer::new();
        mock.expect_name().return_const("mock");
        mock.expect_optimize()
            .times(1)
            .returning(|_| Err(OptimizeError::Timeout));

        let outcome = Dispatcher::new(Box::new(mock))
            .run(&scenario_problem())
            .await
            .unwrap();
        assert_eq!(outcome.status(), SolverStatus::FallbackRule);
    }

    #[tokio::test]
    async fn test_disabled_milp_is_rule_based() {
        let mut mock = MockDispatchOptimizer::new();
        mock.expect_optimize().never();

        let outcome = Dispatcher::new(Box::new(mock))
            .with_milp_enabled(false)
            .run(&scenario_problem())
            .await
            .unwrap();

        assert_eq!(outcome.status(), SolverStatus::RuleBased);
        assert!(outcome.fallback_reason.is_none());
        assert!(outcome.binding.is_none());
    }

    #[tokio::test]
    async fn test_invalid_input_is_surfaced() {
        let mut mock = MockDispatchOptimizer::new();
        mock.expect_optimize().never();

        let problem = DispatchProblem::new(vec![], vec![], vec![], vec![]);
        let err = Dispatcher::new(Box::new(mock)).run(&problem).await.unwrap_err();
        assert!(matches!(err, OptimizeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_optimal_solution_gets_binding_constraints() {
        let problem = scenario_problem();
        let mut mock = MockDispatchOptimizer::new();
        mock.expect_optimize().times(1).returning(|p| {
            Ok(Solution::idle(p.horizon(), p.bess.soc0, SolverStatus::Optimal, "mock"))
        });
        mock.expect_binding_constraints()
            .times(1)
            .returning(|s, _| vec![Vec::new(); s.len()]);

        let outcome = Dispatcher::new(Box::new(mock)).run(&problem).await.unwrap();
        assert_eq!(outcome.status(), SolverStatus::Optimal);
        assert_eq!(outcome.binding.map(|b| b.len()), Some(4));
        assert!(outcome.fallback_reason.is_none());
    }

    #[tokio::test]
    async fn test_timeout_incumbent_is_kept_with_binding_constraints() {
        let problem = scenario_problem();
        let mut mock = MockDispatchOptimizer::new();
        mock.expect_optimize().times(1).returning(|p| {
            Ok(Solution::idle(p.horizon(), p.bess.soc0, SolverStatus::Timeout, "mock"))
        });
        mock.expect_binding_constraints()
            .times(1)
            .returning(|s, _| vec![Vec::new(); s.len()]);

        let outcome = Dispatcher::new(Box::new(mock)).run(&problem).await.unwrap();
        assert_eq!(outcome.status(), SolverStatus::Timeout);
        assert_eq!(outcome.solution.solver, "mock");
        assert!(outcome.binding.is_some());
        assert!(outcome.fallback_reason.is_none());
    }
}
