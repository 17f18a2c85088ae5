//! Path-string validation applied before any filesystem mutation.

use crate::error::{PgitError, Result};
use std::path::{Component, Path, PathBuf};

/// Longest path string accepted, in bytes.
pub const MAX_PATH_LENGTH: usize = 4096;

/// Path segments that never take part in a pgit operation outside of the
/// allowed root.
pub const BLOCKED_SEGMENTS: &[&str] = &[".git", "node_modules", ".svn", ".hg"];

const SYSTEM_DIRECTORIES: &[&str] = &[
    "/etc", "/usr", "/bin", "/sbin", "/boot", "/dev", "/proc", "/sys", "/System",
];

/// Limits applied by [`validate_path_string`].
#[derive(Debug, Clone)]
pub struct PathPolicy {
    pub max_length: usize,
    /// Paths under this directory are judged only by the part below it, so
    /// where the project itself lives never matters.
    pub base: Option<PathBuf>,
    /// Paths inside this root skip the blocked-segment check.
    pub allowed_root: Option<PathBuf>,
}

impl Default for PathPolicy {
    fn default() -> Self {
        Self {
            max_length: MAX_PATH_LENGTH,
            base: None,
            allowed_root: None,
        }
    }
}

impl PathPolicy {
    /// Default limits for paths below `base`.
    pub fn within<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base: Some(base.into()),
            ..Self::default()
        }
    }

    /// Exempt paths under `root` from the segment blocklist.
    pub fn allowing<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.allowed_root = Some(root.into());
        self
    }
}

/// Reject path strings that are empty, oversized, traverse upward, touch a
/// blocked segment or point into a system directory.
///
/// Emptiness, NUL bytes, length and `..` are checked on the whole string.
/// Segments and system directories are checked on the part below
/// `policy.base` when the path lies under it.
pub fn validate_path_string(path: &str, policy: &PathPolicy) -> Result<()> {
    let invalid = |reason: &str| {
        Err(PgitError::InvalidPath {
            path: path.replace('\0', "\\0"),
            reason: reason.to_string(),
        })
    };

    if path.trim().is_empty() {
        return invalid("path is empty");
    }
    if path.contains('\0') {
        return invalid("path contains a NUL byte");
    }
    if path.len() > policy.max_length {
        return invalid(&format!(
            "path is longer than {} bytes",
            policy.max_length
        ));
    }

    let as_path = Path::new(path);
    if as_path.components().any(|c| c == Component::ParentDir) {
        return invalid("path traverses to a parent directory");
    }

    let below_base = policy
        .base
        .as_deref()
        .and_then(|base| as_path.strip_prefix(base).ok());

    if below_base.is_none() && is_system_path(path) {
        return invalid("path lies inside a system directory");
    }

    let exempt = policy
        .allowed_root
        .as_deref()
        .is_some_and(|root| as_path.starts_with(root));

    let checked = below_base.unwrap_or(as_path);
    if !exempt
        && let Some(segment) = checked.components().find_map(|c| match c {
            Component::Normal(name) => BLOCKED_SEGMENTS
                .iter()
                .find(|blocked| name == **blocked)
                .copied(),
            _ => None,
        })
    {
        return invalid(&format!("path touches blocked segment '{}'", segment));
    }

    Ok(())
}

fn is_system_path(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase().replace('/', "\\");
    if lowered == "c:\\windows" || lowered.starts_with("c:\\windows\\") {
        return true;
    }

    let as_path = Path::new(path);
    SYSTEM_DIRECTORIES.iter().any(|dir| as_path.starts_with(dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(path: &str) -> Result<()> {
        validate_path_string(path, &PathPolicy::default())
    }

    #[test]
    fn accepts_ordinary_paths() {
        assert!(check("config/.env").is_ok());
        assert!(check("/home/user/project/secrets.json").is_ok());
        assert!(check("/etcetera/file").is_ok());
    }

    #[test]
    fn rejects_empty_nul_and_oversized() {
        assert!(check("").is_err());
        assert!(check("   ").is_err());
        assert!(check("a\0b").is_err());

        let long = "a/".repeat(MAX_PATH_LENGTH);
        let err = check(&long).unwrap_err();
        assert!(err.to_string().contains("longer than"));
    }

    #[test]
    fn rejects_traversal() {
        let err = check("config/../../etc/passwd").unwrap_err();
        assert!(matches!(err, PgitError::InvalidPath { .. }));
        assert!(check("..").is_err());
    }

    #[test]
    fn rejects_blocked_segments() {
        assert!(check(".git/config").is_err());
        assert!(check("web/node_modules/pkg").is_err());
        assert!(check("a/.hg").is_err());
        assert!(check("a/.gitignore").is_ok());
    }

    #[test]
    fn allowed_root_skips_blocklist() {
        let policy = PathPolicy::within("/work/project").allowing("/work/project/.private-storage");
        assert!(validate_path_string("/work/project/.private-storage/.git/index", &policy).is_ok());
        assert!(validate_path_string("/work/project/.git/index", &policy).is_err());
    }

    #[test]
    fn base_location_is_not_judged() {
        let policy = PathPolicy::within("/usr/local/src/node_modules/proj");

        assert!(validate_path_string("/usr/local/src/node_modules/proj/.private-config.json", &policy).is_ok());
        assert!(validate_path_string("/usr/local/src/node_modules/proj/web/node_modules/x", &policy).is_err());
        assert!(validate_path_string("/usr/local/src/node_modules/proj/a/../../b", &policy).is_err());
        assert!(validate_path_string("/etc/passwd", &policy).is_err());
        assert!(validate_path_string("/srv/node_modules/x", &policy).is_err());
    }

    #[test]
    fn rejects_system_directories() {
        assert!(check("/etc/passwd").is_err());
        assert!(check("/usr").is_err());
        assert!(check("/proc/self/mem").is_err());
        assert!(check("C:\\Windows\\System32").is_err());
        assert!(check("c:/windows/notepad.exe").is_err());
    }
}
