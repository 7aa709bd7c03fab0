//! Domain-driven configuration management for Warden
//!
//! This crate provides modular configuration split by functional domains,
//! with validation, defaults, and environment variable support.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    engine::{EngineConfig, DEFAULT_ENGINE_NAME},
    execution::{check_fan_out, check_reserved_arguments, ExecutionConfig, RESERVED_ARGUMENTS},
    logging::{LogFormat, LogLevel, LoggingConfig},
    WardenConfig,
};
