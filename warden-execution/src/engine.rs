//! Locating the engine executable

use std::ffi::OsStr;
use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;
use warden_config::EngineConfig;

use crate::error::LaunchError;

/// Environment variable asserting how the engine must have been found
pub const ASSERT_ORIGIN_ENV: &str = "WARDEN_ASSERT_ENGINE_ORIGIN";

/// How the engine executable was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOrigin {
    /// Explicit path from the configuration
    Config,
    /// Search on `PATH`
    Path,
}

impl EngineOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineOrigin::Config => "config",
            EngineOrigin::Path => "path",
        }
    }
}

impl fmt::Display for EngineOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLocation {
    pub executable: PathBuf,
    pub origin: EngineOrigin,
}

/// Find the engine: the configured path if any, otherwise the search name on `PATH`
pub fn locate_engine(config: &EngineConfig) -> Result<EngineLocation, LaunchError> {
    let location = match config.executable {
        Some(ref executable) => EngineLocation {
            executable: executable.clone(),
            origin: EngineOrigin::Config,
        },
        None => find_on_path(&config.search_name)
            .map(|executable| EngineLocation {
                executable,
                origin: EngineOrigin::Path,
            })
            .ok_or_else(|| LaunchError::EngineNotFound {
                name: config.search_name.clone(),
            })?,
    };

    if !location.executable.exists() {
        return Err(LaunchError::EngineNotFound {
            name: location.executable.display().to_string(),
        });
    }

    // test hook: make sure discovery went the expected way
    if let Ok(expected) = std::env::var(ASSERT_ORIGIN_ENV) {
        if !expected.is_empty() && expected != location.origin.as_str() {
            return Err(LaunchError::EngineOriginMismatch {
                path: location.executable,
                expected,
                actual: location.origin,
            });
        }
    }

    debug!(
        "Using engine {} (found via {})",
        location.executable.display(),
        location.origin
    );
    Ok(location)
}

/// First executable file called `name` on `PATH`
pub fn find_on_path(name: impl AsRef<OsStr>) -> Option<PathBuf> {
    let name = name.as_ref();
    if Path::new(name).components().count() != 1 {
        return None;
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
