//! CLI argument parsing definitions

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use warden_config::{LogFormat, LogLevel, Validatable, WardenConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run the engine in one or more worker processes",
    long_about = None
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Set the log format (text, compact, pretty, json)
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<String>,

    /// Number of engine processes to launch
    #[arg(short = 'P', long, value_name = "N")]
    pub procs: Option<usize>,

    /// Number of threads inside a single engine process
    #[arg(short = 't', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Exit with 0 instead of 2 when the engine only emitted warnings
    #[arg(long)]
    pub ignore_warnings: bool,

    /// Write the collected engine messages to this file as JSON
    #[arg(long, value_name = "PATH")]
    pub result_json: Option<PathBuf>,

    /// Engine executable, overriding discovery
    #[arg(long, value_name = "PATH")]
    pub engine: Option<PathBuf>,

    /// Print a sample configuration file and exit
    #[arg(long)]
    pub sample_config: bool,

    /// Arguments passed through to the engine
    #[arg(last = true, value_name = "ENGINE_ARGS")]
    pub engine_args: Vec<String>,
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration
    pub fn apply_to(&self, config: &mut WardenConfig) -> Result<()> {
        if let Some(ref level) = self.log_level {
            config.logging.level = level.parse::<LogLevel>().map_err(|e| anyhow!(e))?;
        }
        if let Some(ref format) = self.log_format {
            config.logging.format = format.parse::<LogFormat>().map_err(|e| anyhow!(e))?;
        }
        if let Some(procs) = self.procs {
            config.execution.procs = procs;
        }
        if let Some(threads) = self.threads {
            config.execution.threads = threads;
        }
        if self.ignore_warnings {
            config.execution.ignore_warnings = true;
        }
        if let Some(ref engine) = self.engine {
            config.engine.executable = Some(engine.clone());
        }

        config.execution.validate()?;
        Ok(())
    }

    /// The engine was asked for its usage text
    pub fn wants_engine_help(&self) -> bool {
        self.engine_args.iter().any(|a| a == "-h" || a == "--help")
    }
}
