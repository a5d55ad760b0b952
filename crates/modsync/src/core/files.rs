//! File operation utilities
//!
//! Centralized file handling shared by the cache store and the reconciliation tasks.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::core::error::{FileOperation, Result, SyncError};
use crate::hash::{Digest, Hasher};

const BUFFER_SIZE: usize = 64 * 1024;

/// Delete a file, treating an already-missing file as success.
///
/// Returns whether something was removed.
pub async fn delete_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!("Deleted {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncError::file_system(path, FileOperation::Delete, e)),
    }
}

/// Create the parent directory of a file if it does not exist yet
pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::file_system(parent, FileOperation::CreateDir, e))?;
        }
    }
    Ok(())
}

/// Digest an on-disk file in fixed-size chunks
pub async fn digest_file(path: &Path, hasher: &dyn Hasher) -> Result<Digest> {
    let mut file = fs::File::open(path)
        .await
        .map_err(|e| SyncError::file_system(path, FileOperation::Read, e))?;
    let mut state = hasher.start();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| SyncError::file_system(path, FileOperation::Read, e))?;
        if read == 0 {
            break;
        }
        state.update(&buffer[..read]);
    }

    Ok(state.finish())
}

/// Replace `dest` with `contents` so readers see either the old or the new file, never a mix
pub async fn write_atomically(dest: &Path, contents: &[u8]) -> Result<()> {
    ensure_parent_dir(dest).await?;
    let temp = temp_path_beside(dest)?;
    fs::write(&temp, contents)
        .await
        .map_err(|e| SyncError::file_system(&*temp, FileOperation::Write, e))?;
    persist(temp, dest)
}

/// Reserve a hidden temp file next to `dest`, removed on drop unless persisted
pub fn temp_path_beside(dest: &Path) -> Result<tempfile::TempPath> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tempfile::Builder::new()
        .prefix(".modsync-")
        .suffix(".part")
        .tempfile_in(dir)
        .map(|file| file.into_temp_path())
        .map_err(|e| SyncError::file_system(dir, FileOperation::Create, e))
}

/// Atomically rename a temp file to its final destination
pub fn persist(temp: tempfile::TempPath, dest: &Path) -> Result<()> {
    temp.persist(dest)
        .map_err(|e| SyncError::file_system(dest, FileOperation::Move, e.error))?;
    debug!("Atomically replaced {}", dest.display());
    Ok(())
}
