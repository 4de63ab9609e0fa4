#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use legacy_prefs_lib::locator::{HomeDirLocator, UserLookup};
use legacy_prefs_lib::state_store::{MemoryStateStore, StateStore};
use legacy_prefs_lib::{AppError, AppResult, Platform, StateKey, UserId};

pub const ALICE: &str = "S-1-5-21-1000";
pub const LEGACY_SUBPATH: &str = "app-legacy";

/// User lookup backed by a fixed table; unknown users fail.
#[derive(Clone, Default)]
pub struct FixedHomes(pub HashMap<String, PathBuf>);

impl FixedHomes {
    pub fn with(mut self, user: &str, home: impl Into<PathBuf>) -> Self {
        self.0.insert(user.to_string(), home.into());
        self
    }
}

impl UserLookup for FixedHomes {
    fn home_dir(&self, user: &UserId) -> AppResult<PathBuf> {
        self.0
            .get(user.as_str())
            .cloned()
            .ok_or_else(|| AppError::new("USER/UNKNOWN", "unknown user"))
    }
}

/// Home-directory locator rooted under `home` for [`ALICE`].
pub fn windows_locator(home: &Path) -> HomeDirLocator<FixedHomes> {
    HomeDirLocator::with_subpath(
        Platform::Windows,
        FixedHomes::default().with(ALICE, home),
        LEGACY_SUBPATH,
    )
}

/// Create `<home>/app-legacy/prefs.conf` and return the legacy directory.
pub fn seed_legacy_dir(home: &Path, prefs: &[u8]) -> PathBuf {
    let dir = home.join(LEGACY_SUBPATH);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("prefs.conf"), prefs).unwrap();
    dir
}

/// State store that counts every access.
#[derive(Clone, Default)]
pub struct CountingStore {
    pub inner: Arc<MemoryStateStore>,
    pub reads: Arc<AtomicUsize>,
    pub writes: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn accesses(&self) -> usize {
        self.reads.load(Ordering::SeqCst) + self.writes.load(Ordering::SeqCst)
    }
}

impl StateStore for CountingStore {
    fn read_state(&self, key: &StateKey) -> AppResult<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_state(key)
    }

    fn write_state(&self, key: &StateKey, value: &[u8]) -> AppResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_state(key, value)
    }
}
