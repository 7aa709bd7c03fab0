//! Engine worker execution for warden
//!
//! This crate launches one or more engine processes, each with a private
//! control channel, relays signals to them while they run, answers their
//! control messages and aggregates their exit codes into a single outcome.

pub mod collector;
pub mod engine;
pub mod error;
pub mod launcher;
pub mod outcome;
pub mod pipes;
pub mod relay;
pub mod run;

// Re-export commonly used types
pub use collector::{Collector, CollectorReport, ProcessSignaller, ReaderEvent, WorkerSignaller};
pub use engine::{locate_engine, EngineLocation, EngineOrigin};
pub use error::{LaunchError, RunError};
pub use launcher::{launch, LaunchRequest, Launcher, RunningLaunch};
pub use outcome::{aggregate_exit_code, normalize_exit, LaunchOutcome, WorkerOutcome};
pub use relay::{RelayHandle, SignalRelay, SignalRelayGuard, RELAYED_SIGNALS};
pub use run::{apply_exit_policy, cleanup_tmp_files, run, RunOptions, TMPFILE_KEY};
