//! File system helpers for installs and backups.
//!
//! Every write that replaces a file another process might read (installed bundles, backup
//! ledgers, state records) goes through a temporary file created in the *destination directory*
//! followed by a rename, so readers observe either the old or the new content and never a
//! partial write. Creating the temporary file next to the target keeps the rename on one
//! filesystem.
//!
//! These functions are synchronous; async callers run them through
//! [`tokio::task::spawn_blocking`].

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Create `path` and all missing parents.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or `path` exists as a file.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if path.exists() && !path.is_dir() {
        anyhow::bail!("Path exists but is not a directory: {}", path.display());
    }
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))
}

/// Atomically write `content` to `path`.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be written, synced or renamed.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = parent_dir(path)?;
    ensure_dir(parent)?;

    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    temp.write_all(content)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    temp.as_file().sync_all().context("Failed to sync file to disk")?;

    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;
    Ok(())
}

/// Atomically copy `source` to `destination`, returning the number of bytes copied.
///
/// The source permissions are carried over on Unix so a copied bundle stays executable.
///
/// # Errors
///
/// Returns an error if the source cannot be read or the destination cannot be written.
pub fn atomic_copy(source: &Path, destination: &Path) -> Result<u64> {
    let parent = parent_dir(destination)?;
    ensure_dir(parent)?;

    let mut input = fs::File::open(source)
        .with_context(|| format!("Failed to open {}", source.display()))?;
    let mut temp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    let copied = std::io::copy(&mut input, temp.as_file_mut()).with_context(|| {
        format!("Failed to copy {} to {}", source.display(), destination.display())
    })?;
    temp.as_file().sync_all().context("Failed to sync file to disk")?;

    let permissions = fs::metadata(source)
        .with_context(|| format!("Failed to read metadata for {}", source.display()))?
        .permissions();
    fs::set_permissions(temp.path(), permissions)
        .with_context(|| format!("Failed to copy permissions to {}", destination.display()))?;

    temp.persist(destination)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to rename temp file to: {}", destination.display()))?;
    Ok(copied)
}

/// Move `source` to `destination`, replacing any existing file.
///
/// Falls back to an atomic copy plus delete when the paths are on different filesystems.
///
/// # Errors
///
/// Returns an error if neither the rename nor the copy succeeds.
pub fn move_file(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        ensure_dir(parent)?;
    }
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            atomic_copy(source, destination)?;
            fs::remove_file(source)
                .with_context(|| format!("Failed to remove {}", source.display()))
        }
        Err(e) => Err(e).with_context(|| {
            format!("Failed to move {} to {}", source.display(), destination.display())
        }),
    }
}

/// Set mode `0o755` on `path`. No-op on non-Unix platforms.
///
/// # Errors
///
/// Returns an error if the permissions cannot be changed.
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to make {} executable", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Remove a file, treating "already gone" as success.
///
/// # Errors
///
/// Returns an error for any failure other than the file not existing.
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

fn parent_dir(path: &Path) -> Result<&Path> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(parent),
        Some(_) => Ok(Path::new(".")),
        None => anyhow::bail!("Path has no parent directory: {}", path.display()),
    }
}
