//! The completion marker and the token that authorises writing it.
//!
//! Marker existence is the only state that separates "not yet migrated" from
//! "migrated". Its contents are never interpreted.

use std::fs;
use std::io;

use tracing::info;

use crate::atomic::write_atomic;
use crate::locator::MarkerLocation;
use crate::state_store::StateStore;
use crate::{AppError, AppResult};

/// Proof that a legacy load succeeded; the only way to reach [`write_marker`].
///
/// Produced by the loader, consumed by commit. It cannot be constructed or
/// cloned outside this crate.
#[derive(Debug, PartialEq, Eq)]
pub struct CommitToken {
    marker: MarkerLocation,
}

impl CommitToken {
    pub(crate) fn new(marker: MarkerLocation) -> Self {
        Self { marker }
    }

    pub fn marker_location(&self) -> &MarkerLocation {
        &self.marker
    }
}

/// Whether the marker exists. Failures other than "not found" are errors:
/// the gate cannot be evaluated safely.
pub(crate) fn marker_exists(marker: &MarkerLocation, store: &dyn StateStore) -> AppResult<bool> {
    match marker {
        MarkerLocation::File(path) => match fs::metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(AppError::from(err)
                .with_context("operation", "migration_marker_stat")
                .with_context("path", path.display().to_string())),
        },
        MarkerLocation::StateKey(key) => store
            .read_state(key)
            .map(|value| value.is_some())
            .map_err(|err| err.with_context("operation", "migration_marker_read")),
    }
}

/// Write a zero-length marker. Rewriting an existing marker is harmless.
pub(crate) fn write_marker(token: CommitToken, store: &dyn StateStore) -> AppResult<()> {
    let label = token.marker.log_label();
    match token.marker {
        MarkerLocation::File(path) => write_atomic(&path, &[])
            .map_err(|err| err.with_context("operation", "migration_marker_write"))?,
        MarkerLocation::StateKey(key) => store
            .write_state(&key, &[])
            .map_err(|err| err.with_context("operation", "migration_marker_write"))?,
    }
    info!(
        target: "legacy_prefs",
        event = "legacy_prefs_marker_written",
        marker = %label
    );
    Ok(())
}
