use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::{AppError, AppResult};

/// Write `contents` to `path` so that readers observe either the previous
/// file or the complete new one, never a partial write.
///
/// The parent directory must already exist; it is not created.
pub fn write_atomic(path: &Path, contents: &[u8]) -> AppResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "atomic_write_create_tmp")
            .with_context("path", parent.display().to_string())
    })?;
    tmp.write_all(contents).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "atomic_write_tmp")
            .with_context("path", tmp.path().display().to_string())
    })?;
    tmp.as_file().sync_all().map_err(|err| {
        AppError::from(err)
            .with_context("operation", "atomic_write_sync_tmp")
            .with_context("path", tmp.path().display().to_string())
    })?;
    tmp.persist(path).map_err(|err| {
        AppError::from(err.error)
            .with_context("operation", "atomic_write_rename")
            .with_context("path", path.display().to_string())
    })?;
    sync_dir(parent).map_err(|err| {
        AppError::from(err)
            .with_context("operation", "atomic_write_sync_dir")
            .with_context("path", parent.display().to_string())
    })?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> std::io::Result<()> {
    std::fs::File::open(path)?.sync_all()
}

// Directory handles cannot be fsynced through std on Windows; the rename
// itself goes through MoveFileEx with write-through semantics.
#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
