#![allow(dead_code)]

use async_trait::async_trait;
use bess_dispatch::domain::{DispatchProblem, Solution};
use bess_dispatch::optimizer::{DispatchOptimizer, OptimizeError};
#[cfg(feature = "optimization")]
use bess_dispatch::optimizer::{MilpOptimizer, SolverSettings};
#[cfg(feature = "optimization")]
use std::time::Duration;

/// Hourly problem with default battery, limits and weights.
pub fn hourly_problem(pv: Vec<f64>, load: Vec<f64>, buy: Vec<f64>, sell: Vec<f64>) -> DispatchProblem {
    DispatchProblem::new(pv, load, buy, sell).with_resolution_minutes(60)
}

/// Four-step PV midday bump against a flat 50 kW load.
pub fn pv_bump_problem() -> DispatchProblem {
    hourly_problem(
        vec![0.0, 100.0, 100.0, 0.0],
        vec![50.0; 4],
        vec![0.3; 4],
        vec![0.1; 4],
    )
}

/// A day with a morning shoulder, a midday PV peak and an evening tariff peak.
pub fn daily_problem() -> DispatchProblem {
    let pv = (0..24)
        .map(|h| {
            if (6..=18).contains(&h) {
                let x = (h as f64 - 6.0) / 12.0 * std::f64::consts::PI;
                120.0 * x.sin()
            } else {
                0.0
            }
        })
        .collect();
    let load = (0..24)
        .map(|h| if (17..=21).contains(&h) { 80.0 } else { 45.0 })
        .collect();
    let buy = (0..24)
        .map(|h| match h {
            0..=6 => 0.18,
            17..=21 => 0.55,
            _ => 0.3,
        })
        .collect();
    hourly_problem(pv, load, buy, vec![0.08; 24])
}

pub fn assert_power_balance(solution: &Solution, problem: &DispatchProblem) {
    for t in 0..solution.len() {
        if solution.unserved_kw[t] > 0.0 {
            continue;
        }
        let imbalance = solution.flows_at(t).imbalance(problem.load_kw[t]);
        assert!(imbalance.abs() < 1e-2, "t={t}: power imbalance {imbalance}");
    }
}

pub fn assert_soc_within_bounds(solution: &Solution, problem: &DispatchProblem) {
    let bess = &problem.bess;
    for (t, soc) in solution.soc.iter().enumerate() {
        assert!(
            *soc >= bess.soc_min - 1e-6 && *soc <= bess.soc_max + 1e-6,
            "t={t}: soc {soc} outside [{}, {}]",
            bess.soc_min,
            bess.soc_max
        );
    }
}

/// MILP with a deadline loose enough for unoptimized test builds.
#[cfg(feature = "optimization")]
pub fn test_optimizer() -> MilpOptimizer {
    MilpOptimizer::new(SolverSettings {
        timeout: Duration::from_secs(60),
        ..SolverSettings::default()
    })
}

/// Optimizer that always fails with the given error.
pub struct FailingOptimizer(pub OptimizeError);

#[async_trait]
impl DispatchOptimizer for FailingOptimizer {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn optimize(&self, _problem: &DispatchProblem) -> Result<Solution, OptimizeError> {
        Err(self.0.clone())
    }
}
