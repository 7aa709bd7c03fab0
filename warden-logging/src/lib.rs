//! Logging infrastructure for warden
//!
//! Installs the global `tracing` subscriber from [`LoggingConfig`] and keeps
//! a handle on its filter, so the verbosity can follow the level the engine
//! reports once a run is over.

pub mod engine_level;
pub mod init;

pub use engine_level::EngineLogLevel;
pub use init::{filter_directives, init_logging, LogHandle};
pub use warden_config::{LogFormat, LogLevel, LoggingConfig};
