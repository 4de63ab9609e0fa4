use std::path::Path;

use sha2::{Digest, Sha256};

/// Environment variable holding the `EnvFilter` directive for log output.
pub const LOG_FILTER_ENV: &str = "LEGACY_PREFS_LOG";
pub const DEFAULT_LOG_FILTER: &str = "legacy_prefs=info";

/// Install the JSON tracing subscriber and the `log` bridge.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging() {
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var(LOG_FILTER_ENV).unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .json()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .try_init();
}

/// Hex SHA-256 of a path, logged in place of the raw path.
pub fn hash_path(p: &Path) -> String {
    let mut h = Sha256::new();
    h.update(p.as_os_str().to_string_lossy().as_bytes());
    format!("{:x}", h.finalize())
}
