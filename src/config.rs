use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::locator::DEFAULT_LEGACY_SUBPATH;
use crate::{AppError, AppResult};

/// Compiled-in control server used when neither disk nor policy names one.
pub const DEFAULT_CONTROL_URL: &str = "https://controlplane.tailscale.com";

/// Overrides the state directory used by the command line tool.
pub const STATE_DIR_ENV: &str = "LEGACY_PREFS_STATE_DIR";
const STATE_DIR_NAME: &str = "legacy-prefs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct MigrationConfig {
    pub default_control_url: String,
    /// Legacy directory relative to the user's home on file-backed platforms.
    pub legacy_subpath: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            default_control_url: DEFAULT_CONTROL_URL.to_string(),
            legacy_subpath: DEFAULT_LEGACY_SUBPATH.to_string(),
        }
    }
}

impl MigrationConfig {
    /// Read a JSON config file; missing fields keep their defaults.
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = fs::read(path).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "config_read")
                .with_context("path", path.display().to_string())
        })?;
        let config: MigrationConfig = serde_json::from_slice(&raw).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "config_decode")
                .with_context("path", path.display().to_string())
        })?;
        if config.default_control_url.trim().is_empty() {
            return Err(AppError::new(
                "CONFIG/INVALID",
                "default_control_url must not be empty.",
            )
            .with_context("path", path.display().to_string()));
        }
        Ok(config)
    }
}

/// State directory: explicit value, then `LEGACY_PREFS_STATE_DIR`, then the
/// platform data directory.
pub fn resolve_state_dir(explicit: Option<PathBuf>) -> AppResult<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    if let Some(dir) = std::env::var_os(STATE_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|base| base.join(STATE_DIR_NAME))
        .ok_or_else(|| {
            AppError::new(
                "CONFIG/NO_DATA_DIR",
                "Failed to resolve application data directory.",
            )
        })
}
