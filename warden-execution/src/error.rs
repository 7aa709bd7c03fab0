//! Error types for launching and running the engine

use std::path::PathBuf;
use thiserror::Error;
use warden_config::ConfigError;
use warden_ipc::{IpcError, IpcResult};

use crate::engine::EngineOrigin;

/// Errors raised while launching engine workers
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Invalid launch request: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine executable '{name}' not found. Set up your PATH or configure the engine path")]
    EngineNotFound { name: String },

    #[error("Engine at {} was found via {actual}, expected {expected}", .path.display())]
    EngineOriginMismatch {
        path: PathBuf,
        expected: String,
        actual: EngineOrigin,
    },

    #[error("Failed to create control channel: {0}")]
    Pipe(#[source] std::io::Error),

    #[error("Failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to set up signal relay: {0}")]
    Signal(#[source] std::io::Error),

    #[error("Failed to wait for worker {worker}: {source}")]
    Wait {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Control channel of worker {worker} failed: {source}")]
    Protocol {
        worker: usize,
        #[source]
        source: IpcError,
        /// Messages received from all workers before the launch ended
        collected: IpcResult,
    },

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl LaunchError {
    /// Messages gathered before the failure, when workers got to send any
    pub fn collected(&self) -> Option<&IpcResult> {
        match self {
            LaunchError::Protocol { collected, .. } => Some(collected),
            _ => None,
        }
    }
}

/// Errors raised by [`crate::run`] after applying the outcome policy
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("error while running the engine (exit code {exit_code})")]
    EngineFailed { exit_code: i32 },

    #[error("warning while running the engine")]
    EngineWarning,
}

impl RunError {
    /// Exit code a command line wrapper should report for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Launch(_) => 1,
            RunError::EngineFailed { exit_code } => *exit_code,
            RunError::EngineWarning => 2,
        }
    }
}
