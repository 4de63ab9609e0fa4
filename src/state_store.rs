//! Generic key-value state store used by the key-value-backed platforms.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::atomic::write_atomic;
use crate::locator::StateKey;
use crate::{AppError, AppResult};

pub trait StateStore: Send + Sync {
    /// Bytes stored under `key`, or `None` when the key was never written.
    fn read_state(&self, key: &StateKey) -> AppResult<Option<Vec<u8>>>;

    /// Replace the value stored under `key`. Each write is all-or-nothing.
    fn write_state(&self, key: &StateKey, value: &[u8]) -> AppResult<()>;
}

impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    fn read_state(&self, key: &StateKey) -> AppResult<Option<Vec<u8>>> {
        (**self).read_state(key)
    }

    fn write_state(&self, key: &StateKey, value: &[u8]) -> AppResult<()> {
        (**self).write_state(key, value)
    }
}

/// One file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &StateKey) -> PathBuf {
        self.root.join(escape_key(key.as_str()))
    }
}

impl StateStore for FileStateStore {
    fn read_state(&self, key: &StateKey) -> AppResult<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AppError::from(err)
                .with_context("operation", "state_store_read")
                .with_context("key", key.to_string())),
        }
    }

    fn write_state(&self, key: &StateKey, value: &[u8]) -> AppResult<()> {
        fs::create_dir_all(&self.root).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "state_store_create_root")
                .with_context("path", self.root.display().to_string())
        })?;
        write_atomic(&self.path_for(key), value)
            .map_err(|err| err.with_context("key", key.to_string()))
    }
}

/// Keys become file names: ASCII alphanumerics and `._-` are kept, every
/// other byte is percent-encoded so distinct keys never collide.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    if out.is_empty() {
        out.push('%');
    } else if out.chars().all(|c| c == '.') {
        out = out.replace('.', "%2E");
    }
    out
}

/// In-process store for tests and embedders without persistent state.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<BTreeMap<StateKey, Vec<u8>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: impl Into<StateKey>, value: impl Into<Vec<u8>>) -> Self {
        self.lock().insert(key.into(), value.into());
        self
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<StateKey> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<StateKey, Vec<u8>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateStore for MemoryStateStore {
    fn read_state(&self, key: &StateKey) -> AppResult<Option<Vec<u8>>> {
        Ok(self.lock().get(key).cloned())
    }

    fn write_state(&self, key: &StateKey, value: &[u8]) -> AppResult<()> {
        self.lock().insert(key.clone(), value.to_vec());
        Ok(())
    }
}
