//! Worker fan-out and run outcome configuration

use crate::error::{ConfigError, ConfigResult};
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};

/// Flags warden injects into every worker command line
pub const RESERVED_ARGUMENTS: &[&str] = &["--pipe-fd", "--proc-num-offset"];

/// Execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Number of engine processes to launch
    #[serde(default = "crate::domains::utils::default_one")]
    pub procs: usize,

    /// Number of threads inside a single engine process
    #[serde(default = "crate::domains::utils::default_one")]
    pub threads: usize,

    /// Report exit code 0 instead of 2 when the engine only warned
    #[serde(default = "crate::domains::utils::default_false")]
    pub ignore_warnings: bool,

    /// Fail the run when the engine reports an error
    #[serde(default = "crate::domains::utils::default_true")]
    pub raise_on_error: bool,

    /// Fail the run when the engine reports a warning
    #[serde(default = "crate::domains::utils::default_false")]
    pub raise_on_warning: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            procs: 1,
            threads: 1,
            ignore_warnings: false,
            raise_on_error: true,
            raise_on_warning: false,
        }
    }
}

impl ExecutionConfig {
    /// Thread and process fan-out are mutually exclusive
    pub fn validate_fan_out(&self) -> ConfigResult<()> {
        check_fan_out(self.threads, self.procs)
    }
}

impl Validatable for ExecutionConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.procs, "procs", self.domain_name())?;
        validate_positive(self.threads, "threads", self.domain_name())?;
        self.validate_fan_out()
    }

    fn domain_name(&self) -> &'static str {
        "execution"
    }
}

/// Reject a request for both thread and process fan-out
pub fn check_fan_out(threads: usize, procs: usize) -> ConfigResult<()> {
    if threads > 1 && procs > 1 {
        return Err(ConfigError::ConflictingFanOut { threads, procs });
    }
    Ok(())
}

/// Reject caller arguments that collide with the injected worker arguments
pub fn check_reserved_arguments<S: AsRef<str>>(args: &[S]) -> ConfigResult<()> {
    for arg in args {
        let arg = arg.as_ref();
        if let Some(reserved) = RESERVED_ARGUMENTS.iter().find(|r| arg.contains(*r)) {
            return Err(ConfigError::ReservedArgument(reserved.to_string()));
        }
    }
    Ok(())
}
