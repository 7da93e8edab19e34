use std::env;
use std::path::PathBuf;

pub struct CliOptions {
    pub request: PathBuf,
    pub config: Option<PathBuf>,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(&args)
}

fn parse_args_from(args: &[String]) -> Result<CliOptions, String> {
    let mut i = 0usize;
    let mut request = None;
    let mut config = None;

    while i < args.len() {
        match args[i].as_str() {
            "--request" => {
                i += 1;
                let path = args.get(i).ok_or_else(|| {
                    "missing value for --request (expected a JSON file path)".to_string()
                })?;
                if request.replace(PathBuf::from(path)).is_some() {
                    return Err("--request provided more than once".to_string());
                }
            }
            "--config" => {
                i += 1;
                let path = args.get(i).ok_or_else(|| {
                    "missing value for --config (expected a TOML file path)".to_string()
                })?;
                if config.replace(PathBuf::from(path)).is_some() {
                    return Err("--config provided more than once".to_string());
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    let request = request.ok_or_else(|| "--request is required".to_string())?;
    Ok(CliOptions { request, config })
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  bess-dispatch --request <request.json> [--config <config.toml>]");
    eprintln!();
    eprintln!("Environment overrides use the DISPATCH__ prefix, e.g. DISPATCH__SOLVER__TIMEOUT_SECONDS=5");
}
