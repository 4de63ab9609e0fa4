//! Resolution of where a platform kept its single legacy profile.
//!
//! Key-value platforms kept the profile under one of a handful of well-known
//! state keys. File-backed platforms kept it in a per-user directory below the
//! user's home. Both shapes collapse into [`LegacyLocator`], from which the
//! completion marker location is derived.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::logging::hash_path;
use crate::platform::{Platform, UserId};
use crate::AppResult;

mod home;
mod os_user;

pub use home::{HomeDirLocator, UserLookup, DEFAULT_LEGACY_SUBPATH};
pub use os_user::OsUserLookup;

/// Generic daemon key used when no platform-specific key applies.
pub const LEGACY_GLOBAL_DAEMON_STATE_KEY: &str = "_daemon";
/// Key shared by the iOS network extension and the sandboxed macOS app.
pub const LEGACY_BRIDGE_STATE_KEY: &str = "ipn-go-bridge";
pub const LEGACY_ANDROID_STATE_KEY: &str = "ipn-android";

pub const LEGACY_PREFS_FILE: &str = "prefs.conf";
pub const MIGRATION_MARKER_FILE: &str = "_migrated-to-profiles.conf";
const MIGRATION_MARKER_KEY_SUFFIX: &str = "/_migrated-to-profiles";

/// Logical key into the generic state store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where legacy state lives for one platform/user pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyLocator {
    StateKey(StateKey),
    Directory(PathBuf),
}

/// Where the completion marker for a [`LegacyLocator`] lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerLocation {
    StateKey(StateKey),
    File(PathBuf),
}

impl LegacyLocator {
    pub fn marker_location(&self) -> MarkerLocation {
        match self {
            LegacyLocator::StateKey(key) => MarkerLocation::StateKey(StateKey(format!(
                "{}{MIGRATION_MARKER_KEY_SUFFIX}",
                key.as_str()
            ))),
            LegacyLocator::Directory(dir) => MarkerLocation::File(dir.join(MIGRATION_MARKER_FILE)),
        }
    }

    /// Path of the legacy prefs file for directory locators.
    pub fn prefs_path(&self) -> Option<PathBuf> {
        match self {
            LegacyLocator::StateKey(_) => None,
            LegacyLocator::Directory(dir) => Some(dir.join(LEGACY_PREFS_FILE)),
        }
    }

    /// Log-safe description: state keys verbatim, directories hashed.
    pub fn log_label(&self) -> String {
        match self {
            LegacyLocator::StateKey(key) => key.to_string(),
            LegacyLocator::Directory(dir) => format!("dir:{}", short_hash(dir)),
        }
    }
}

impl MarkerLocation {
    pub fn log_label(&self) -> String {
        match self {
            MarkerLocation::StateKey(key) => key.to_string(),
            MarkerLocation::File(path) => format!("file:{}", short_hash(path)),
        }
    }
}

pub(crate) fn short_hash(path: &Path) -> String {
    let mut full = hash_path(path);
    full.truncate(12);
    full
}

/// Resolves the legacy location for the platform it was built for.
pub trait PlatformLocator: Send + Sync {
    fn platform(&self) -> Platform;

    fn resolve(&self, user: Option<&UserId>) -> AppResult<LegacyLocator>;
}

/// Locator for platforms that kept legacy state in the key-value store.
#[derive(Debug, Clone, Copy)]
pub struct StateKeyLocator {
    platform: Platform,
}

impl StateKeyLocator {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn legacy_key(&self) -> StateKey {
        StateKey::from(legacy_state_key(self.platform))
    }
}

impl PlatformLocator for StateKeyLocator {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn resolve(&self, _user: Option<&UserId>) -> AppResult<LegacyLocator> {
        Ok(LegacyLocator::StateKey(self.legacy_key()))
    }
}

pub fn legacy_state_key(platform: Platform) -> &'static str {
    match platform {
        Platform::Ios | Platform::SandboxedMacos => LEGACY_BRIDGE_STATE_KEY,
        Platform::Android => LEGACY_ANDROID_STATE_KEY,
        Platform::Windows | Platform::Other => LEGACY_GLOBAL_DAEMON_STATE_KEY,
    }
}
