//! BESS dispatch engine: cost-optimal battery scheduling over a forecast
//! horizon with a rule-based fallback, KPIs and per-step explanations.

pub mod config;
pub mod domain;
pub mod explain;
pub mod kpi;
pub mod optimizer;
pub mod request;
pub mod telemetry;
