use anyhow::{Context, Result};
use bess_dispatch::{
    config::Config,
    optimizer::{Dispatcher, MilpOptimizer},
    request::DispatchRequest,
    telemetry::init_tracing,
};
use tracing::{info, warn};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let opts = match cli::parse_args() {
        Ok(opts) => opts,
        Err(msg) => {
            cli::print_usage();
            anyhow::bail!(msg);
        }
    };

    let cfg = match &opts.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    let raw = std::fs::read_to_string(&opts.request)
        .with_context(|| format!("failed to read request {}", opts.request.display()))?;
    let request: DispatchRequest =
        serde_json::from_str(&raw).context("request is not a valid dispatch request")?;

    let use_milp = request.use_milp.unwrap_or(cfg.solver.enabled);
    if !use_milp {
        warn!("MILP disabled for this run, using rule-based schedule");
    }
    let site_id = request.site_id.clone();
    let problem = request.into_problem(&cfg.defaults);

    info!(
        site_id = site_id.as_deref().unwrap_or("-"),
        horizon = problem.horizon(),
        resolution_minutes = problem.resolution_minutes,
        backend = %cfg.solver.backend,
        "starting dispatch run"
    );

    let optimizer = MilpOptimizer::new(cfg.solver.to_solver_settings()?);
    let outcome = Dispatcher::new(Box::new(optimizer))
        .with_milp_enabled(use_milp)
        .run(&problem)
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    eprintln!("{}", outcome.metrics);
    Ok(())
}
