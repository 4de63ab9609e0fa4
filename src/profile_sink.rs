use std::path::{Path, PathBuf};

use crate::atomic::write_atomic;
use crate::prefs::NormalizedPrefs;
use crate::AppResult;

/// The new multi-profile store, as far as migration needs it.
pub trait ProfileSink {
    /// Durably take ownership of the migrated prefs.
    fn adopt(&self, prefs: &NormalizedPrefs) -> AppResult<()>;
}

/// Writes adopted prefs to a single JSON document.
#[derive(Debug, Clone)]
pub struct JsonProfileSink {
    path: PathBuf,
}

impl JsonProfileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProfileSink for JsonProfileSink {
    fn adopt(&self, prefs: &NormalizedPrefs) -> AppResult<()> {
        let payload = prefs.to_json_pretty()?;
        write_atomic(&self.path, payload.as_bytes())
            .map_err(|err| err.with_context("operation", "profile_sink_write"))
    }
}
