//! Engine discovery and protocol configuration

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Executable name looked up on `PATH` when no explicit path is configured
pub const DEFAULT_ENGINE_NAME: &str = "warden-engine";

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit path to the engine executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,

    /// Name searched on `PATH` when `executable` is unset
    #[serde(default = "default_search_name")]
    pub search_name: String,

    /// Protocol version the engine must announce; defaults to warden's own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: None,
            search_name: default_search_name(),
            protocol_version: None,
        }
    }
}

impl Validatable for EngineConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.search_name, "search_name", self.domain_name())?;

        if let Some(ref executable) = self.executable {
            if executable.as_os_str().is_empty() {
                return Err(self.validation_error("executable cannot be empty"));
            }
        }

        if let Some(ref version) = self.protocol_version {
            validate_required_string(version, "protocol_version", self.domain_name())?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "engine"
    }
}

fn default_search_name() -> String {
    DEFAULT_ENGINE_NAME.to_string()
}
