use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::Path;
use tracing::{debug, error, info, warn};
use warden_config::{ConfigLoader, WardenConfig};
use warden_execution::{locate_engine, run, LaunchRequest, RunError, RunOptions};
use warden_ipc::IpcResult;
use warden_logging::{init_logging, EngineLogLevel, LogHandle};

mod cli;
use cli::Cli;

/// IPC key carrying the engine's verbosity
const LOGLEVEL_KEY: &str = "loglevel";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.sample_config {
        print!("{}", WardenConfig::generate_sample());
        return Ok(());
    }

    let exit_code = run_engine(cli).await?;
    std::process::exit(exit_code);
}

async fn run_engine(cli: Cli) -> Result<i32> {
    let mut config = ConfigLoader::new()
        .load(cli.config.as_ref())
        .context("Failed to load configuration")?;
    cli.apply_to(&mut config)?;

    let log = init_logging(&config.logging).context("Failed to initialize logging")?;

    let engine = locate_engine(&config.engine)?;
    let mut request =
        LaunchRequest::from_config(engine.executable, &config.engine, &config.execution)
            .with_args(cli.engine_args.iter().cloned());
    if let Some(name) = program_name() {
        request = request.with_program_name(name);
    }

    let outcome = match run(request, RunOptions::from(&config.execution)).await {
        Ok(outcome) => outcome,
        Err(RunError::Launch(e)) => return Err(e).context("Failed to run the engine"),
        Err(e) => {
            error!("{}", e);
            return Ok(e.exit_code());
        }
    };

    if cli.wants_engine_help() {
        Cli::command().print_help()?;
    }

    if outcome.exited_gracefully() {
        follow_engine_log_level(&log, &outcome.ipc);
    }

    if let Some(ref path) = cli.result_json {
        write_result_json(path, &outcome.ipc)?;
    }

    info!(exit_code = outcome.exit_code, "Engine finished");
    Ok(outcome.exit_code)
}

/// Our own name, so engine usage messages mention the command the user typed
fn program_name() -> Option<String> {
    let arg0 = std::env::args_os().next()?;
    Path::new(&arg0)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

/// Adopt the last verbosity the engine reported
fn follow_engine_log_level(log: &LogHandle, ipc: &IpcResult) {
    let reported = ipc.get_strings(LOGLEVEL_KEY).last().copied().unwrap_or("summary");
    match reported.parse::<EngineLogLevel>() {
        Ok(level) => {
            debug!("Following engine log level {}", level);
            if let Err(e) = log.set_level_filter(level.level_filter()) {
                warn!("{:#}", e);
            }
        }
        Err(e) => warn!("{}", e),
    }
}

fn write_result_json(path: &Path, ipc: &IpcResult) -> Result<()> {
    let json = serde_json::to_string_pretty(ipc)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write result to {}", path.display()))?;
    debug!("Wrote {} messages to {}", ipc.len(), path.display());
    Ok(())
}
