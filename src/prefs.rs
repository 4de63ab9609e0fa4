use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{AppError, AppResult};

/// Escaped NUL as it appears inside JSON strings. Some early clients
/// corrupted their prefs files with these.
const JSON_ESCAPED_NUL: &[u8] = br"\u0000";

/// Flat record of the preferences that take part in migration.
///
/// Field names on the wire follow the legacy prefs document. Keys this
/// record does not model are carried in `passthrough` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPrefs {
    #[serde(rename = "ControlURL", default)]
    pub control_url: String,
    #[serde(rename = "ExitNodeIP", default, with = "exit_node_ip")]
    pub exit_node_ip: Option<IpAddr>,
    #[serde(rename = "ShieldsUp", default)]
    pub shields_up: bool,
    /// Keep the background service running without a signed-in UI.
    #[serde(rename = "ForceDaemon", default)]
    pub force_daemon: bool,
    #[serde(flatten)]
    pub passthrough: Map<String, Value>,
}

impl NormalizedPrefs {
    /// Parse a legacy prefs document. Empty input yields default prefs.
    pub fn from_legacy_bytes(bytes: &[u8]) -> AppResult<Self> {
        if bytes
            .windows(JSON_ESCAPED_NUL.len())
            .any(|window| window == JSON_ESCAPED_NUL)
        {
            return Err(AppError::new(
                "PREFS/NUL_BYTES",
                "Legacy preferences contain invalid NUL bytes.",
            ));
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let prefs: NormalizedPrefs = serde_json::from_slice(bytes).map_err(|err| {
            AppError::from(err).with_context("operation", "legacy_prefs_decode")
        })?;
        Ok(prefs)
    }

    pub fn to_json_pretty(&self) -> AppResult<String> {
        serde_json::to_string_pretty(self).map_err(AppError::from)
    }
}

/// Legacy documents store the exit node as a string where `""` means unset.
mod exit_node_ip {
    use std::net::IpAddr;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<IpAddr>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(ip) => serializer.collect_str(ip),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<IpAddr>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => text
                .parse()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("invalid ExitNodeIP {text:?}"))),
        }
    }
}
