//! End-to-end dispatch scenarios through the public API.

mod common;

use bess_dispatch::domain::{GridLimits, SolverStatus};
use bess_dispatch::explain::explain_schedule_text;
use bess_dispatch::kpi::calculate_kpis;
use bess_dispatch::optimizer::{
    validate_schedule, Dispatcher, FallbackScheduler, OptimizeError, Violation,
};
use common::*;
use rstest::rstest;

#[rstest]
#[case(OptimizeError::SolverUnavailable("no backend installed".to_string()))]
#[case(OptimizeError::Infeasible)]
#[case(OptimizeError::Timeout)]
#[case(OptimizeError::SolverError("numerical trouble".to_string()))]
#[tokio::test]
async fn failed_milp_yields_fallback_with_reports(#[case] error: OptimizeError) {
    let problem = pv_bump_problem();
    let dispatcher = Dispatcher::new(Box::new(FailingOptimizer(error.clone())));

    let outcome = dispatcher.run(&problem).await.expect("fallback never fails");

    assert_eq!(outcome.status(), SolverStatus::FallbackRule);
    assert_eq!(outcome.solution.solver, "fallback_rule");
    assert_eq!(outcome.solution.len(), 4);
    assert_eq!(outcome.explanations.len(), 4);
    assert_eq!(outcome.fallback_reason, Some(error.to_string()));
    assert!(outcome.binding.is_none());
    assert!(outcome.metrics.total_grid_import_kwh > 0.0);
}

#[tokio::test]
async fn invalid_input_is_not_masked_by_fallback() {
    let mut problem = pv_bump_problem();
    problem.tariff_buy.pop();
    let dispatcher = Dispatcher::new(Box::new(FailingOptimizer(OptimizeError::Infeasible)));

    let err = dispatcher.run(&problem).await.unwrap_err();
    assert!(matches!(err, OptimizeError::InvalidInput(_)));
}

#[test]
fn clamped_import_is_reported_by_validator() {
    let limits = GridLimits {
        grid_import_max_kw: 0.0,
        ..GridLimits::default()
    };
    let problem = hourly_problem(vec![0.0; 3], vec![40.0; 3], vec![0.3; 3], vec![0.1; 3])
        .with_limits(limits);

    let solution = FallbackScheduler::new().schedule(&problem);
    assert!(solution.grid_imp_kw.iter().all(|imp| *imp == 0.0));
    assert_eq!(solution.unserved_kw, vec![40.0; 3]);

    let report = validate_schedule(&solution, &problem.pv_forecast_kw, &problem.load_kw);
    assert_eq!(report.violations.len(), 3);
    for (t, violation) in report.violations.iter().enumerate() {
        assert_eq!(
            violation,
            &Violation::PowerImbalance {
                t,
                supply: 0.0,
                demand: 40.0
            }
        );
    }

    let kpis = calculate_kpis(&solution, &problem.tariff_buy, &problem.tariff_sell, 60);
    assert_eq!(kpis.total_unserved_kwh, 120.0);
}

#[test]
fn idle_site_stays_idle_with_fallback() {
    let problem = hourly_problem(vec![0.0; 6], vec![0.0; 6], vec![0.3; 6], vec![0.1; 6]);
    let solution = FallbackScheduler::new().schedule(&problem);

    for t in 0..6 {
        let flows = solution.flows_at(t);
        assert_eq!(flows.supply(), 0.0);
        assert_eq!(flows.demand(0.0), 0.0);
        assert_eq!(flows.curtail_kw, 0.0);
        assert_eq!(solution.soc[t], problem.bess.soc0);
    }
}

#[tokio::test]
async fn disabled_milp_runs_rule_based() {
    let problem = daily_problem();
    let outcome = Dispatcher::new(Box::new(FailingOptimizer(OptimizeError::Infeasible)))
        .with_milp_enabled(false)
        .run(&problem)
        .await
        .unwrap();

    assert_eq!(outcome.status(), SolverStatus::RuleBased);
    assert!(outcome.fallback_reason.is_none());
    assert_power_balance(&outcome.solution, &problem);
    assert_soc_within_bounds(&outcome.solution, &problem);
}

#[test]
fn reports_are_idempotent() {
    let problem = daily_problem();
    let solution = FallbackScheduler::new().schedule(&problem);

    assert_eq!(
        calculate_kpis(&solution, &problem.tariff_buy, &problem.tariff_sell, 60),
        calculate_kpis(&solution, &problem.tariff_buy, &problem.tariff_sell, 60)
    );
    assert_eq!(
        explain_schedule_text(&solution, &problem, None),
        explain_schedule_text(&solution, &problem, None)
    );
}

#[cfg(feature = "optimization")]
mod milp {
    use super::common::*;
    use bess_dispatch::domain::{GridLimits, SolverStatus};
    use bess_dispatch::optimizer::{
        check_invariants, DispatchOptimizer, Dispatcher, FallbackScheduler,
    };

    #[tokio::test]
    async fn pv_surplus_is_stored_and_discharged_later() {
        let problem = pv_bump_problem();
        let solution = test_optimizer().optimize(&problem).await.unwrap();

        assert_eq!(solution.solver_status, SolverStatus::Optimal);
        assert!(check_invariants(&solution, &problem).is_empty());
        assert_soc_within_bounds(&solution, &problem);

        let surplus_charge = solution.batt_ch_kw[1] + solution.batt_ch_kw[2];
        let shoulder_discharge = solution.batt_dis_kw[0] + solution.batt_dis_kw[3];
        assert!(surplus_charge > 1.0, "surplus PV should charge the battery");
        assert!(shoulder_discharge > 1.0, "battery should cover load without PV");

        let no_battery_import = 50.0 + 50.0;
        let import = solution.grid_imp_kw[0] + solution.grid_imp_kw[3];
        assert!(import < no_battery_import - 1.0);
    }

    #[tokio::test]
    async fn idle_site_stays_idle_with_milp() {
        // no export: otherwise discharging into the grid would earn money
        let limits = GridLimits {
            grid_export_max_kw: 0.0,
            ..GridLimits::default()
        };
        let problem = hourly_problem(vec![0.0; 4], vec![0.0; 4], vec![0.3; 4], vec![0.1; 4])
            .with_limits(limits);
        let solution = test_optimizer().optimize(&problem).await.unwrap();

        for t in 0..4 {
            let flows = solution.flows_at(t);
            assert!(flows.supply() < 1e-6, "t={t}: {flows}");
            assert!(flows.demand(0.0) < 1e-6, "t={t}: {flows}");
            assert!((solution.soc[t] - problem.bess.soc0).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn milp_is_never_worse_than_fallback() {
        let problem = daily_problem();
        let milp = test_optimizer().optimize(&problem).await.unwrap();
        let fallback = FallbackScheduler::new().schedule(&problem);

        assert!(check_invariants(&milp, &problem).is_empty());
        assert!(
            milp.objective_value <= fallback.objective_value + 1e-6,
            "milp {} > fallback {}",
            milp.objective_value,
            fallback.objective_value
        );
    }

    #[tokio::test]
    async fn infeasible_site_falls_back_with_brownout() {
        let limits = GridLimits {
            grid_import_max_kw: 0.0,
            ..GridLimits::default()
        };
        let problem = hourly_problem(vec![0.0; 3], vec![40.0; 3], vec![0.3; 3], vec![0.1; 3])
            .with_limits(limits);

        let outcome = Dispatcher::new(Box::new(test_optimizer()))
            .run(&problem)
            .await
            .unwrap();

        assert_eq!(outcome.status(), SolverStatus::FallbackRule);
        assert!(outcome.fallback_reason.is_some());
        assert!(outcome.solution.has_unserved_load());
        assert!(outcome.metrics.total_unserved_kwh > 0.0);
    }

    #[tokio::test]
    async fn milp_outcome_carries_binding_constraints() {
        let problem = daily_problem();
        let outcome = Dispatcher::new(Box::new(test_optimizer()))
            .run(&problem)
            .await
            .unwrap();

        assert_eq!(outcome.status(), SolverStatus::Optimal);
        let binding = outcome.binding.expect("binding constraints for MILP schedules");
        assert_eq!(binding.len(), problem.horizon());
        assert_eq!(outcome.explanations.len(), problem.horizon());
    }
}
