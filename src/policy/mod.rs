//! Read-only view of centrally administered policy.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::{AppError, AppResult};

mod overrides;

pub use overrides::{select_control_url, ManagedPolicyOverride, PolicyOverride, LEGACY_INSTALLER_CONTROL_URL};

/// Tri-state: forbid inbound connections unless the user allows them.
pub const ALLOW_INCOMING_CONNECTIONS: &str = "AllowIncomingConnections";
/// Tri-state: keep the background service running without a signed-in user.
pub const UNATTENDED_MODE: &str = "UnattendedMode";
/// String: administrator-selected control server.
pub const LOGIN_URL: &str = "LoginURL";
/// String: administrator-selected exit node address.
pub const EXIT_NODE_IP: &str = "ExitNodeIP";

/// Tri-state preference policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PreferenceOption {
    /// No policy; the user's own choice applies.
    #[default]
    UserDecides,
    Always,
    Never,
}

impl PreferenceOption {
    /// Parse a policy value. Anything unrecognised leaves the choice to the user.
    pub fn from_policy_value(value: &str) -> Self {
        match value.trim() {
            "always" => PreferenceOption::Always,
            "never" => PreferenceOption::Never,
            _ => PreferenceOption::UserDecides,
        }
    }

    pub const fn is_forced(self) -> bool {
        !matches!(self, PreferenceOption::UserDecides)
    }
}

/// The policy engine, as consumed by migration.
pub trait PolicySource: Send + Sync {
    /// Raw string policy, `None` when unset.
    fn string(&self, name: &str) -> AppResult<Option<String>>;

    /// Tri-state policy. Read failures are logged and treated as unset.
    fn preference_option(&self, name: &str) -> PreferenceOption {
        match self.string(name) {
            Ok(Some(value)) => PreferenceOption::from_policy_value(&value),
            Ok(None) => PreferenceOption::UserDecides,
            Err(err) => {
                warn!(
                    target: "legacy_prefs",
                    event = "legacy_prefs_policy_read_failed",
                    policy = name,
                    code = err.code()
                );
                PreferenceOption::UserDecides
            }
        }
    }
}

impl<T: PolicySource + ?Sized> PolicySource for Box<T> {
    fn string(&self, name: &str) -> AppResult<Option<String>> {
        (**self).string(name)
    }
}

/// Fixed policy values, for tests and hosts that resolve policy up front.
#[derive(Debug, Clone, Default)]
pub struct MemoryPolicySource {
    values: HashMap<String, String>,
}

impl MemoryPolicySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl PolicySource for MemoryPolicySource {
    fn string(&self, name: &str) -> AppResult<Option<String>> {
        Ok(self.values.get(name).cloned())
    }
}

/// Policy exported to a flat JSON object of string values.
#[derive(Debug, Clone, Default)]
pub struct JsonPolicySource {
    inner: MemoryPolicySource,
}

impl JsonPolicySource {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = fs::read(path).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "policy_read")
                .with_context("path", path.display().to_string())
        })?;
        Self::from_slice(&raw).map_err(|err| err.with_context("path", path.display().to_string()))
    }

    pub fn from_slice(raw: &[u8]) -> AppResult<Self> {
        let object: serde_json::Map<String, Value> = serde_json::from_slice(raw)
            .map_err(|err| AppError::from(err).with_context("operation", "policy_decode"))?;
        let mut inner = MemoryPolicySource::new();
        for (name, value) in object {
            let value = match value {
                Value::String(text) => text,
                Value::Null => continue,
                other => {
                    return Err(AppError::new(
                        "POLICY/INVALID_VALUE",
                        "Policy values must be strings.",
                    )
                    .with_context("policy", name)
                    .with_context("value", other.to_string()))
                }
            };
            inner = inner.with(name, value);
        }
        Ok(Self { inner })
    }
}

impl PolicySource for JsonPolicySource {
    fn string(&self, name: &str) -> AppResult<Option<String>> {
        self.inner.string(name)
    }
}
