//! Dispatch KPIs
//!
//! Cost, energy, peak and battery usage indicators derived from a schedule,
//! plus savings of one schedule relative to a baseline. Values are kept at
//! full precision; rounding is left to presentation.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Solution;

/// Key performance indicators of one schedule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Import cost minus export revenue
    pub total_cost: f64,
    pub total_curtail_kwh: f64,
    pub peak_grid_import_kw: f64,
    pub avg_soc: f64,
    pub total_grid_import_kwh: f64,
    pub total_grid_export_kwh: f64,
    pub total_batt_charge_kwh: f64,
    pub total_batt_discharge_kwh: f64,
    /// Share of PV generation used on site; `None` without any PV
    pub self_consumption_rate: Option<f64>,
    /// First timestep at which the import peak occurs
    pub peak_import_timestep: usize,
    pub min_soc: f64,
    pub max_soc: f64,
    pub total_import_cost: f64,
    pub total_export_revenue: f64,
    pub net_cost: f64,
    /// Load the schedule could not serve (fallback brownout)
    pub total_unserved_kwh: f64,
}

/// Savings of an optimized schedule against a baseline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Savings {
    pub cost_savings: f64,
    pub cost_savings_pct: f64,
    pub peak_reduction_kw: f64,
    pub peak_reduction_pct: f64,
    pub curtail_reduction_kwh: f64,
}

/// Compute all KPIs of a schedule. Pure; an empty schedule yields zeros.
pub fn calculate_kpis(
    solution: &Solution,
    tariff_buy: &[f64],
    tariff_sell: &[f64],
    resolution_minutes: u32,
) -> Metrics {
    let n = solution.len();
    if n == 0 {
        return Metrics::default();
    }
    let dt = resolution_minutes as f64 / 60.0;
    let energy = |series: &[f64]| series.iter().sum::<f64>() * dt;
    let at = |series: &[f64], t: usize| series.get(t).copied().unwrap_or(0.0);

    let total_import_cost: f64 = (0..n)
        .map(|t| at(tariff_buy, t) * at(&solution.grid_imp_kw, t) * dt)
        .sum();
    let total_export_revenue: f64 = (0..n)
        .map(|t| at(tariff_sell, t) * at(&solution.grid_exp_kw, t) * dt)
        .sum();

    let (peak_import_timestep, peak_grid_import_kw) = argmax(&solution.grid_imp_kw);

    let total_curtail_kwh = energy(&solution.curtail_kw);
    let pv_used_kwh = energy(&solution.pv_set_kw);
    let pv_generated_kwh = pv_used_kwh + total_curtail_kwh;
    let self_consumption_rate = (pv_generated_kwh > 0.0).then(|| pv_used_kwh / pv_generated_kwh);

    let min_soc = solution
        .soc
        .iter()
        .copied()
        .map(OrderedFloat)
        .min()
        .map_or(0.0, |v| v.0);
    let max_soc = solution
        .soc
        .iter()
        .copied()
        .map(OrderedFloat)
        .max()
        .map_or(0.0, |v| v.0);

    Metrics {
        total_cost: total_import_cost - total_export_revenue,
        total_curtail_kwh,
        peak_grid_import_kw,
        avg_soc: solution.soc.iter().sum::<f64>() / n as f64,
        total_grid_import_kwh: energy(&solution.grid_imp_kw),
        total_grid_export_kwh: energy(&solution.grid_exp_kw),
        total_batt_charge_kwh: energy(&solution.batt_ch_kw),
        total_batt_discharge_kwh: energy(&solution.batt_dis_kw),
        self_consumption_rate,
        peak_import_timestep,
        min_soc,
        max_soc,
        total_import_cost,
        total_export_revenue,
        net_cost: total_import_cost - total_export_revenue,
        total_unserved_kwh: energy(&solution.unserved_kw),
    }
}

/// Index and value of the first maximum; `(0, 0.0)` for an empty series.
fn argmax(values: &[f64]) -> (usize, f64) {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (t, v)| match best {
            Some((_, max)) if OrderedFloat(*v) <= OrderedFloat(max) => best,
            _ => Some((t, *v)),
        })
        .unwrap_or((0, 0.0))
}

/// Savings of `optimized` relative to `baseline` (e.g. the same site without a battery)
pub fn calculate_savings(optimized: &Metrics, baseline: &Metrics) -> Savings {
    let pct = |delta: f64, base: f64| if base > 0.0 { delta / base * 100.0 } else { 0.0 };

    let cost_savings = baseline.total_cost - optimized.total_cost;
    let peak_reduction_kw = baseline.peak_grid_import_kw - optimized.peak_grid_import_kw;

    Savings {
        cost_savings,
        cost_savings_pct: pct(cost_savings, baseline.total_cost),
        peak_reduction_kw,
        peak_reduction_pct: pct(peak_reduction_kw, baseline.peak_grid_import_kw),
        curtail_reduction_kwh: baseline.total_curtail_kwh - optimized.total_curtail_kwh,
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "DISPATCH KPI SUMMARY")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Total Cost:              {:>10.2}", self.total_cost)?;
        writeln!(f, "  - Import Cost:         {:>10.2}", self.total_import_cost)?;
        writeln!(f, "  - Export Revenue:      {:>10.2}", self.total_export_revenue)?;
        writeln!(f, "  - Net Cost:            {:>10.2}", self.net_cost)?;
        writeln!(f)?;
        writeln!(
            f,
            "Peak Grid Import:        {:>10.2} kW (t={})",
            self.peak_grid_import_kw, self.peak_import_timestep
        )?;
        writeln!(f, "Total Curtailment:       {:>10.2} kWh", self.total_curtail_kwh)?;
        if self.total_unserved_kwh > 0.0 {
            writeln!(f, "Unserved Load:           {:>10.2} kWh", self.total_unserved_kwh)?;
        }
        writeln!(f)?;
        writeln!(f, "Battery Utilization:")?;
        writeln!(f, "  - Average SOC:         {:>9.1}%", self.avg_soc * 100.0)?;
        writeln!(
            f,
            "  - SOC Range:           {:>9.1}% - {:.1}%",
            self.min_soc * 100.0,
            self.max_soc * 100.0
        )?;
        writeln!(f, "  - Total Charge:        {:>10.2} kWh", self.total_batt_charge_kwh)?;
        writeln!(f, "  - Total Discharge:     {:>10.2} kWh", self.total_batt_discharge_kwh)?;
        writeln!(f)?;
        writeln!(f, "Grid Interaction:")?;
        writeln!(f, "  - Total Import:        {:>10.2} kWh", self.total_grid_import_kwh)?;
        writeln!(f, "  - Total Export:        {:>10.2} kWh", self.total_grid_export_kwh)?;
        if let Some(rate) = self.self_consumption_rate {
            writeln!(f, "  - Self-Consumption:    {:>9.1}%", rate * 100.0)?;
        }
        write!(f, "{rule}")
    }
}
