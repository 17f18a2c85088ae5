//! Move, copy and remove helpers for files, directories and links.
//!
//! A move is normally an atomic `rename(2)`. Some environments (bind mounts,
//! containers, a storage directory on another volume) surface `EXDEV`
//! ("Invalid cross-device link") even when paths look local; for those we
//! fall back to a recursive copy followed by removal of the source.

use crate::error::{PgitError, Result};
use std::fs;
use std::io;
use std::path::Path;

/// Move a file, directory or symlink from `source` to `destination`,
/// creating the destination's parent directories.
pub fn move_path<P: AsRef<Path>, Q: AsRef<Path>>(source: P, destination: Q) -> Result<()> {
    let source = source.as_ref();
    let destination = destination.as_ref();

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            PgitError::from_io(
                e,
                format!(
                    "failed to create destination directory '{}'",
                    parent.display()
                ),
            )
        })?;
    }

    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_rename(&e) => move_cross_device(source, destination, e),
        Err(e) => Err(PgitError::from_io(
            e,
            format!(
                "failed to move '{}' to '{}'",
                source.display(),
                destination.display()
            ),
        )),
    }
}

fn move_cross_device(source: &Path, destination: &Path, original_error: io::Error) -> Result<()> {
    if let Err(e) = copy_path(source, destination) {
        let _ = remove_path(destination);
        return Err(PgitError::Filesystem(format!(
            "failed to copy '{}' for cross-device move: {} (original rename error: {})",
            source.display(),
            e,
            original_error
        )));
    }

    remove_path(source).map_err(|e| {
        PgitError::Filesystem(format!(
            "moved '{}' across devices but failed to delete the source: {}",
            source.display(),
            e
        ))
    })
}

fn is_cross_device_rename(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices || err.raw_os_error() == Some(18)
}

/// Recursively copy `source` to `destination`. Symlinks are recreated, not
/// followed.
pub fn copy_path<P: AsRef<Path>, Q: AsRef<Path>>(source: P, destination: Q) -> Result<()> {
    let source = source.as_ref();
    let destination = destination.as_ref();
    let io_err = |e: io::Error| {
        PgitError::from_io(
            e,
            format!(
                "failed to copy '{}' to '{}'",
                source.display(),
                destination.display()
            ),
        )
    };

    let meta = fs::symlink_metadata(source).map_err(io_err)?;

    if meta.file_type().is_symlink() {
        let target = fs::read_link(source).map_err(io_err)?;
        copy_link(&target, destination).map_err(io_err)?;
    } else if meta.is_dir() {
        fs::create_dir_all(destination).map_err(io_err)?;
        for entry in fs::read_dir(source).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            copy_path(entry.path(), destination.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::copy(source, destination).map_err(io_err)?;
    }

    Ok(())
}

#[cfg(unix)]
fn copy_link(target: &Path, destination: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, destination)
}

#[cfg(windows)]
fn copy_link(target: &Path, destination: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, destination)
}

/// Remove a file, symlink or directory tree. Missing paths are not an error.
pub fn remove_path<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(PgitError::from_io(
                e,
                format!("failed to inspect '{}'", path.display()),
            ));
        }
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|e| PgitError::from_io(e, format!("failed to remove '{}'", path.display())))
}

/// Remove each directory in `dirs` that is empty, innermost first.
///
/// `dirs` is expected in creation order (outermost first). Directories that
/// are no longer empty are left in place.
pub fn prune_empty_dirs(dirs: &[std::path::PathBuf]) {
    for dir in dirs.iter().rev() {
        let _ = fs::remove_dir(dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn move_path_moves_file_and_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("file.txt");
        std::fs::write(&source, b"hello").unwrap();

        let destination = temp.path().join("dest/nested/file.txt");
        move_path(&source, &destination).unwrap();

        assert!(!source.exists());
        assert_eq!(std::fs::read(&destination).unwrap(), b"hello");
    }

    #[test]
    fn move_path_moves_directories() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("secrets");
        std::fs::create_dir_all(source.join("inner")).unwrap();
        std::fs::write(source.join("inner/key.pem"), b"key").unwrap();

        let destination = temp.path().join("storage/secrets");
        move_path(&source, &destination).unwrap();

        assert!(!source.exists());
        assert_eq!(std::fs::read(destination.join("inner/key.pem")).unwrap(), b"key");
    }

    #[test]
    fn copy_path_copies_tree() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("tree");
        std::fs::create_dir_all(source.join("a/b")).unwrap();
        std::fs::write(source.join("a/b/c.txt"), b"c").unwrap();
        std::fs::write(source.join("top.txt"), b"top").unwrap();

        let destination = temp.path().join("copy");
        copy_path(&source, &destination).unwrap();

        assert!(source.join("a/b/c.txt").exists());
        assert_eq!(std::fs::read(destination.join("a/b/c.txt")).unwrap(), b"c");
        assert_eq!(std::fs::read(destination.join("top.txt")).unwrap(), b"top");
    }

    #[cfg(unix)]
    #[test]
    fn copy_path_recreates_symlinks() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target.txt");
        std::fs::write(&target, b"t").unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink("target.txt", &link).unwrap();

        let copy = temp.path().join("link-copy");
        copy_path(&link, &copy).unwrap();

        assert!(std::fs::symlink_metadata(&copy).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&copy).unwrap(), Path::new("target.txt"));
    }

    #[test]
    fn remove_path_ignores_missing() {
        let temp = TempDir::new().unwrap();
        remove_path(temp.path().join("nothing")).unwrap();

        let dir = temp.path().join("dir");
        std::fs::create_dir_all(dir.join("x")).unwrap();
        remove_path(&dir).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn prune_empty_dirs_stops_at_non_empty() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = a.join("b");
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("keep.txt"), b"k").unwrap();

        prune_empty_dirs(&[a.clone(), b.clone()]);

        assert!(!b.exists());
        assert!(a.exists());
    }
}
