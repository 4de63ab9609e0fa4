use std::fs;
use std::sync::Arc;

use tracing::{debug, info};

use crate::locator::LegacyLocator;
use crate::marker::{marker_exists, CommitToken};
use crate::prefs::NormalizedPrefs;
use crate::state_store::StateStore;
use crate::{AppError, MigrationError};

/// Reads and parses legacy prefs behind the completion-marker gate.
///
/// Values are returned as stored; an empty control URL stays empty so that
/// policy can tell "nothing on disk" apart from the default.
/// Never writes to, truncates, or removes the legacy source.
#[derive(Clone)]
pub struct LegacyLoader {
    store: Arc<dyn StateStore>,
}

impl LegacyLoader {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn load(
        &self,
        locator: &LegacyLocator,
    ) -> Result<(NormalizedPrefs, CommitToken), MigrationError> {
        let marker = locator.marker_location();
        let migrated = marker_exists(&marker, self.store.as_ref()).map_err(MigrationError::Read)?;
        if migrated {
            info!(
                target: "legacy_prefs",
                event = "legacy_prefs_already_migrated",
                locator = %locator.log_label()
            );
            return Err(MigrationError::AlreadyMigrated);
        }

        let prefs = self.read_legacy(locator).map_err(MigrationError::Read)?;

        info!(
            target: "legacy_prefs",
            event = "legacy_prefs_migrating",
            locator = %locator.log_label()
        );
        Ok((prefs, CommitToken::new(marker)))
    }

    fn read_legacy(&self, locator: &LegacyLocator) -> Result<NormalizedPrefs, AppError> {
        match locator {
            LegacyLocator::StateKey(key) => {
                let raw = self
                    .store
                    .read_state(key)
                    .map_err(|err| err.with_context("operation", "legacy_prefs_read"))?;
                match raw {
                    Some(bytes) => NormalizedPrefs::from_legacy_bytes(&bytes)
                        .map_err(|err| err.with_context("key", key.to_string())),
                    None => {
                        debug!(
                            target: "legacy_prefs",
                            event = "legacy_prefs_state_missing",
                            key = %key
                        );
                        Ok(NormalizedPrefs::default())
                    }
                }
            }
            LegacyLocator::Directory(_) => {
                let path = locator.prefs_path().ok_or_else(|| {
                    AppError::new("PREFS/NO_PATH", "Legacy locator has no prefs path.")
                })?;
                let bytes = fs::read(&path).map_err(|err| {
                    AppError::from(err)
                        .with_context("operation", "legacy_prefs_read")
                        .with_context("path", path.display().to_string())
                })?;
                NormalizedPrefs::from_legacy_bytes(&bytes)
                    .map_err(|err| err.with_context("path", path.display().to_string()))
            }
        }
    }
}
