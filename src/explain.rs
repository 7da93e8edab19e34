//! Human-readable reasons for dispatch decisions
//!
//! Every timestep is classified by a fixed sequence of independent rules; all
//! rules that fire contribute a [`Reason`], rendered semicolon-joined. The
//! rules only look at the schedule and its inputs, so they apply equally to
//! MILP and fallback schedules.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{DispatchProblem, Solution, StepFlows, TariffBands};
use crate::kpi::calculate_kpis;
use crate::optimizer::BindingConstraint;

/// Flows below this are treated as inactive (kW)
pub const ACTIVITY_THRESHOLD_KW: f64 = 1.0;
/// Import above this share of its limit counts as "near limit"
pub const IMPORT_NEAR_LIMIT_RATIO: f64 = 0.8;
/// Export at or above this share of its limit counts as "at limit"
pub const EXPORT_NEAR_LIMIT_RATIO: f64 = 0.9;
/// SOC distance from a bound that counts as "at" the bound
pub const SOC_MARGIN: f64 = 0.05;
/// PV above this is mentioned in the default reason (kW)
const PV_PRESENT_KW: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    DischargePeakTariff,
    DischargeImportNearLimit,
    DischargeForDemand,
    ChargeFromCurtailedPv,
    ChargeLowTariff,
    ChargeExcessPv,
    ChargeFromGrid,
    CurtailBatteryFull,
    CurtailExportLimit,
    CurtailEconomic,
    ExportExcessPv,
    ImportNoPvOrBattery,
    ImportRemainingDemand,
    ImportForCharging,
    SocAtMinimum,
    SocAtMaximum,
    Constraint(Vec<BindingConstraint>),
    PvMeetsDemand,
    NormalOperation,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Reason::DischargePeakTariff => "Discharge battery during peak tariff hours",
            Reason::DischargeImportNearLimit => "Discharge battery to reduce grid import near limit",
            Reason::DischargeForDemand => "Discharge battery to meet demand",
            Reason::ChargeFromCurtailedPv => "Charge battery using curtailed PV",
            Reason::ChargeLowTariff => "Charge battery during low tariff period",
            Reason::ChargeExcessPv => "Charge battery with excess PV",
            Reason::ChargeFromGrid => "Charge battery from grid",
            Reason::CurtailBatteryFull => "PV curtailed (battery full)",
            Reason::CurtailExportLimit => "PV curtailed (grid export limit)",
            Reason::CurtailEconomic => "PV curtailed (economic decision)",
            Reason::ExportExcessPv => "Export excess PV to grid",
            Reason::ImportNoPvOrBattery => "Grid import to meet demand (no PV/battery)",
            Reason::ImportRemainingDemand => "Grid import to meet remaining demand",
            Reason::ImportForCharging => "Grid import for battery charging",
            Reason::SocAtMinimum => "SOC protected at minimum threshold",
            Reason::SocAtMaximum => "SOC at maximum limit",
            Reason::Constraint(bound) => {
                let labels: Vec<&str> = bound.iter().map(|c| c.label()).collect();
                return write!(f, "Constraint: {}", labels.join(", "));
            }
            Reason::PvMeetsDemand => "PV generation meets demand",
            Reason::NormalOperation => "Normal operation",
        };
        f.write_str(text)
    }
}

/// Reasons for one timestep. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExplanation {
    pub timestep: usize,
    pub reasons: Vec<Reason>,
}

impl fmt::Display for StepExplanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, reason) in self.reasons.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{reason}")?;
        }
        Ok(())
    }
}

/// Explain every timestep of `solution`. `binding` is the per-step list of
/// active constraints, normally only available for MILP schedules.
pub fn explain_schedule(
    solution: &Solution,
    problem: &DispatchProblem,
    binding: Option<&[Vec<BindingConstraint>]>,
) -> Vec<StepExplanation> {
    let bands = TariffBands::from_buy_tariff(&problem.tariff_buy);
    let input = |series: &[f64], t: usize| series.get(t).copied().unwrap_or(0.0);

    (0..solution.aligned_len())
        .map(|t| {
            let flows = solution.flows_at(t);
            let ctx = StepContext {
                flows,
                soc: solution.soc[t],
                pv_available: input(&problem.pv_forecast_kw, t),
                load: input(&problem.load_kw, t),
                tariff: input(&problem.tariff_buy, t),
            };
            let bound = binding.and_then(|b| b.get(t)).map(Vec::as_slice);
            StepExplanation {
                timestep: t,
                reasons: classify_step(&ctx, problem, &bands, bound),
            }
        })
        .collect()
}

/// Rendered reason strings, one per timestep.
pub fn explain_schedule_text(
    solution: &Solution,
    problem: &DispatchProblem,
    binding: Option<&[Vec<BindingConstraint>]>,
) -> Vec<String> {
    explain_schedule(solution, problem, binding)
        .iter()
        .map(ToString::to_string)
        .collect()
}

struct StepContext {
    flows: StepFlows,
    soc: f64,
    pv_available: f64,
    load: f64,
    tariff: f64,
}

fn classify_step(
    ctx: &StepContext,
    problem: &DispatchProblem,
    bands: &TariffBands,
    bound: Option<&[BindingConstraint]>,
) -> Vec<Reason> {
    let StepFlows {
        batt_ch_kw: charge,
        batt_dis_kw: discharge,
        grid_imp_kw: import,
        grid_exp_kw: export,
        curtail_kw: curtail,
        ..
    } = ctx.flows;
    let bess = &problem.bess;
    let limits = &problem.limits;
    let active = |kw: f64| kw > ACTIVITY_THRESHOLD_KW;

    let mut reasons = Vec::new();

    if active(discharge) {
        reasons.push(if bands.is_peak(ctx.tariff) {
            Reason::DischargePeakTariff
        } else if import > limits.grid_import_max_kw * IMPORT_NEAR_LIMIT_RATIO {
            Reason::DischargeImportNearLimit
        } else {
            Reason::DischargeForDemand
        });
    }

    if active(charge) {
        reasons.push(if active(curtail) {
            Reason::ChargeFromCurtailedPv
        } else if bands.is_low(ctx.tariff) {
            Reason::ChargeLowTariff
        } else if ctx.pv_available > ctx.load {
            Reason::ChargeExcessPv
        } else {
            Reason::ChargeFromGrid
        });
    }

    if active(curtail) {
        reasons.push(if ctx.soc >= bess.soc_max - SOC_MARGIN {
            Reason::CurtailBatteryFull
        } else if export >= limits.grid_export_max_kw * EXPORT_NEAR_LIMIT_RATIO {
            Reason::CurtailExportLimit
        } else {
            Reason::CurtailEconomic
        });
    }

    if active(export) {
        reasons.push(Reason::ExportExcessPv);
    }

    if active(import) {
        reasons.push(
            if ctx.pv_available < ACTIVITY_THRESHOLD_KW && discharge < ACTIVITY_THRESHOLD_KW {
                Reason::ImportNoPvOrBattery
            } else if ctx.load > ctx.pv_available + discharge {
                Reason::ImportRemainingDemand
            } else {
                Reason::ImportForCharging
            },
        );
    }

    if ctx.soc <= bess.soc_min + SOC_MARGIN {
        reasons.push(Reason::SocAtMinimum);
    } else if ctx.soc >= bess.soc_max - SOC_MARGIN {
        reasons.push(Reason::SocAtMaximum);
    }

    if let Some(bound) = bound.filter(|b| !b.is_empty()) {
        reasons.push(Reason::Constraint(bound.to_vec()));
    }

    if reasons.is_empty() {
        reasons.push(if ctx.pv_available > PV_PRESENT_KW {
            Reason::PvMeetsDemand
        } else {
            Reason::NormalOperation
        });
    }
    reasons
}

/// Full numeric state of one timestep, for drill-down views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedExplanation {
    pub timestep: usize,
    pub state: StepState,
    pub actions: StepFlows,
    pub power_balance: PowerBalance,
    pub cost: StepCost,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub pv_available_kw: f64,
    pub load_demand_kw: f64,
    pub tariff_buy: f64,
    pub tariff_sell: f64,
    pub soc_before: f64,
    pub soc_after: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerBalance {
    pub supply: f64,
    pub demand: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepCost {
    pub import_cost: f64,
    pub export_revenue: f64,
    pub net_cost: f64,
}

/// Numeric breakdown of timestep `t`, or `None` if `t` is outside the
/// schedule or the problem inputs.
pub fn generate_detailed_explanation(
    t: usize,
    solution: &Solution,
    problem: &DispatchProblem,
) -> Option<DetailedExplanation> {
    let flows = solution.try_flows_at(t)?;
    let soc_after = *solution.soc.get(t)?;
    let pv_available_kw = *problem.pv_forecast_kw.get(t)?;
    let load_demand_kw = *problem.load_kw.get(t)?;
    let tariff_buy = *problem.tariff_buy.get(t)?;
    let tariff_sell = *problem.tariff_sell.get(t)?;

    let dt = problem.dt_hours();
    let import_cost = tariff_buy * flows.grid_imp_kw * dt;
    let export_revenue = tariff_sell * flows.grid_exp_kw * dt;

    Some(DetailedExplanation {
        timestep: t,
        state: StepState {
            pv_available_kw,
            load_demand_kw,
            tariff_buy,
            tariff_sell,
            soc_before: solution.soc_before(t, problem.bess.soc0),
            soc_after,
        },
        actions: flows,
        power_balance: PowerBalance {
            supply: flows.supply(),
            demand: flows.demand(load_demand_kw),
        },
        cost: StepCost {
            import_cost,
            export_revenue,
            net_cost: import_cost - export_revenue,
        },
    })
}

/// Optimized schedule against a baseline over the same horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub optimized_cost: f64,
    pub baseline_cost: f64,
    pub savings: f64,
    pub savings_pct: f64,
    pub optimized_peak_kw: f64,
    pub baseline_peak_kw: f64,
    pub peak_reduction_kw: f64,
    pub battery_discharge_kwh: f64,
}

pub fn compare_scenarios(
    optimized: &Solution,
    baseline: &Solution,
    tariff_buy: &[f64],
    tariff_sell: &[f64],
    resolution_minutes: u32,
) -> ScenarioComparison {
    let opt = calculate_kpis(optimized, tariff_buy, tariff_sell, resolution_minutes);
    let base = calculate_kpis(baseline, tariff_buy, tariff_sell, resolution_minutes);

    let savings = base.total_cost - opt.total_cost;
    let savings_pct = if base.total_cost > 0.0 {
        savings / base.total_cost * 100.0
    } else {
        0.0
    };

    ScenarioComparison {
        optimized_cost: opt.total_cost,
        baseline_cost: base.total_cost,
        savings,
        savings_pct,
        optimized_peak_kw: opt.peak_grid_import_kw,
        baseline_peak_kw: base.peak_grid_import_kw,
        peak_reduction_kw: base.peak_grid_import_kw - opt.peak_grid_import_kw,
        battery_discharge_kwh: opt.total_batt_discharge_kwh,
    }
}
