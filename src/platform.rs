use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AppError;

/// Environment variable macOS sets inside an App Sandbox container.
pub const SANDBOX_CONTAINER_ENV: &str = "APP_SANDBOX_CONTAINER_ID";

/// Host platform identity as far as legacy preference storage is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    Ios,
    Android,
    SandboxedMacos,
    Windows,
    /// Linux, unsandboxed macOS, the BSDs and anything else keeping legacy
    /// state under the generic daemon key.
    Other,
}

/// How a platform persisted its single legacy profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyBackend {
    StateStore,
    UserDirectory,
}

impl Platform {
    /// Detect the platform this binary is running on.
    pub fn current() -> Self {
        if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") && std::env::var_os(SANDBOX_CONTAINER_ENV).is_some() {
            Platform::SandboxedMacos
        } else {
            Platform::Other
        }
    }

    pub const fn backend(self) -> LegacyBackend {
        match self {
            Platform::Windows => LegacyBackend::UserDirectory,
            Platform::Ios | Platform::Android | Platform::SandboxedMacos | Platform::Other => {
                LegacyBackend::StateStore
            }
        }
    }

    /// Platforms whose preferences may be overridden by centrally managed policy.
    pub const fn is_managed(self) -> bool {
        matches!(self, Platform::Windows)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::SandboxedMacos => "sandboxed-macos",
            Platform::Windows => "windows",
            Platform::Other => "other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            "sandboxed-macos" | "macsys-sandboxed" => Ok(Platform::SandboxedMacos),
            "windows" => Ok(Platform::Windows),
            "other" | "linux" | "macos" | "freebsd" => Ok(Platform::Other),
            _ => Err(AppError::new("PLATFORM/UNKNOWN", "Unknown platform identifier.")
                .with_context("platform", s.to_string())),
        }
    }
}

/// Opaque OS user identifier: a numeric uid on Unix, a SID string on Windows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
