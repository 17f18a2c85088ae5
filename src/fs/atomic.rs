//! Atomic file writes.
//!
//! Content is written to a temporary sibling of the target, synced, and then
//! renamed over the target, so readers only ever observe the old or the new
//! content. The rename is atomic when both live on the same filesystem, which
//! holds because the temporary file is created next to the target.
//!
//! On a crash a temporary file named `.{filename}.{suffix}.tmp` may remain.

use crate::error::{PgitError, Result};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically write bytes to a file, creating parent directories as needed.
///
/// ```no_run
/// use pgit::fs::atomic_write;
/// use std::path::Path;
///
/// atomic_write(Path::new(".private-config.json"), b"{}\n")?;
/// # Ok::<(), pgit::error::PgitError>(())
/// ```
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    write_via_temp(path.as_ref(), content, false)
}

/// Like [`atomic_write`], but the file ends up readable and writable by the
/// owner only (mode 0600) on unix.
pub fn atomic_write_owner_only<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    write_via_temp(path.as_ref(), content, true)
}

fn write_via_temp(path: &Path, content: &[u8], owner_only: bool) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            PgitError::from_io(
                e,
                format!("failed to create parent directory '{}'", parent.display()),
            )
        })?;
    }

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;

    if owner_only {
        restrict_to_owner(&temp_path)?;
    }

    replace(&temp_path, path)
}

fn generate_temp_path(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PgitError::InvalidPath {
            path: target.display().to_string(),
            reason: "path has no file name".to_string(),
        })?;

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();

    Ok(parent.join(format!(".{}.{}.tmp", filename, suffix)))
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        PgitError::from_io(
            e,
            format!("failed to create temporary file '{}'", path.display()),
        )
    })?;

    if let Err(e) = file.write_all(content).and_then(|_| file.sync_all()) {
        let _ = fs::remove_file(path);
        return Err(PgitError::from_io(
            e,
            format!("failed to write temporary file '{}'", path.display()),
        ));
    }

    Ok(())
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
        let _ = fs::remove_file(path);
        PgitError::from_io(
            e,
            format!("failed to restrict permissions on '{}'", path.display()),
        )
    })
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}

/// Rename `source` over `target`. `rename` replaces an existing destination
/// on both POSIX and Windows.
fn replace(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        PgitError::from_io(
            e,
            format!("failed to atomically replace '{}'", target.display()),
        )
    })?;

    #[cfg(unix)]
    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}
