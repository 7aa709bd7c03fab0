//! Running the engine with the command line outcome policy applied

use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, warn};
use warden_config::ExecutionConfig;
use warden_ipc::IpcResult;

use crate::error::RunError;
use crate::launcher::{launch, LaunchRequest};
use crate::outcome::LaunchOutcome;

/// IPC key under which the engine reports files to delete after the run
pub const TMPFILE_KEY: &str = "tmpfile";

/// How exit codes are turned into errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Report 0 instead of 2 when the engine only warned
    pub ignore_warnings: bool,
    /// Any code other than 0 or 2 becomes an error
    pub raise_on_error: bool,
    /// Code 2 becomes an error as well
    pub raise_on_warning: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            ignore_warnings: false,
            raise_on_error: true,
            raise_on_warning: false,
        }
    }
}

impl From<&ExecutionConfig> for RunOptions {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            ignore_warnings: config.ignore_warnings,
            raise_on_error: config.raise_on_error,
            raise_on_warning: config.raise_on_warning,
        }
    }
}

/// Launch the engine, clean up after it and apply `options` to its exit code
pub async fn run(request: LaunchRequest, options: RunOptions) -> Result<LaunchOutcome, RunError> {
    let mut outcome = match launch(request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(collected) = e.collected() {
                cleanup_tmp_files(collected);
            }
            return Err(e.into());
        }
    };

    outcome.log_abnormal_terminations();
    cleanup_tmp_files(&outcome.ipc);

    outcome.exit_code = apply_exit_policy(outcome.exit_code, options)?;
    Ok(outcome)
}

/// 0 is success, 2 a warning, everything else an engine error
pub fn apply_exit_policy(exit_code: i32, options: RunOptions) -> Result<i32, RunError> {
    match exit_code {
        0 => Ok(0),
        2 if options.raise_on_warning => Err(RunError::EngineWarning),
        2 if options.ignore_warnings => Ok(0),
        2 => Ok(2),
        code if options.raise_on_error || options.raise_on_warning => {
            Err(RunError::EngineFailed { exit_code: code })
        }
        code => Ok(code),
    }
}

/// Delete files the engine listed under [`TMPFILE_KEY`]; returns how many were removed
pub fn cleanup_tmp_files(ipc: &IpcResult) -> usize {
    let mut removed = 0;
    for file in ipc.get_strings(TMPFILE_KEY) {
        match std::fs::remove_file(Path::new(file)) {
            Ok(()) => {
                debug!("Removed temporary file {}", file);
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temporary file {}: {}", file, e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_ipc::{Message, Record};

    const LENIENT: RunOptions = RunOptions {
        ignore_warnings: false,
        raise_on_error: false,
        raise_on_warning: false,
    };

    #[test]
    fn test_exit_policy_defaults() {
        let options = RunOptions::default();
        assert_eq!(apply_exit_policy(0, options).unwrap(), 0);
        assert_eq!(apply_exit_policy(2, options).unwrap(), 2);
        assert!(matches!(
            apply_exit_policy(134, options),
            Err(RunError::EngineFailed { exit_code: 134 })
        ));
    }

    #[test]
    fn test_exit_policy_lenient() {
        assert_eq!(apply_exit_policy(1, LENIENT).unwrap(), 1);
        assert_eq!(apply_exit_policy(143, LENIENT).unwrap(), 143);
    }

    #[test]
    fn test_exit_policy_warnings() {
        let ignore = RunOptions {
            ignore_warnings: true,
            ..LENIENT
        };
        assert_eq!(apply_exit_policy(2, ignore).unwrap(), 0);

        let strict = RunOptions {
            raise_on_warning: true,
            ..LENIENT
        };
        assert!(matches!(
            apply_exit_policy(2, strict),
            Err(RunError::EngineWarning)
        ));
        // raising on warnings implies raising on errors
        assert!(matches!(
            apply_exit_policy(1, strict),
            Err(RunError::EngineFailed { exit_code: 1 })
        ));
    }

    #[test]
    fn test_options_from_config() {
        let config = ExecutionConfig {
            ignore_warnings: true,
            raise_on_error: false,
            ..Default::default()
        };
        let options = RunOptions::from(&config);
        assert!(options.ignore_warnings);
        assert!(!options.raise_on_error);
        assert!(!options.raise_on_warning);
    }

    #[test]
    fn test_cleanup_tmp_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("engine-1.tmp");
        std::fs::write(&present, "x").unwrap();
        let missing = dir.path().join("engine-2.tmp");

        let ipc = IpcResult::new(vec![
            Message::new(vec![
                Record::from(TMPFILE_KEY),
                Record::from(present.to_str().unwrap()),
            ]),
            Message::new(vec![
                Record::from(TMPFILE_KEY),
                Record::from(missing.to_str().unwrap()),
            ]),
            Message::new(vec![Record::from("output"), Record::from("keep.lh5")]),
        ]);

        assert_eq!(cleanup_tmp_files(&ipc), 1);
        assert!(!present.exists());
    }
}
