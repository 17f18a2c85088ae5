//! Platform capability detection.

use serde::Serialize;

/// What the host platform can do, resolved once at startup and passed to
/// every component that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_symlinks: bool,
    pub platform_name: String,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            supports_symlinks: detect_symlink_support(),
            platform_name: std::env::consts::OS.to_string(),
        }
    }

    /// Capabilities of a platform without symbolic links.
    pub fn without_symlinks() -> Self {
        Self {
            supports_symlinks: false,
            ..Self::detect()
        }
    }
}

#[cfg(unix)]
fn detect_symlink_support() -> bool {
    true
}

/// Windows only allows symlinks with developer mode or elevated rights, so
/// probe by creating one in the temp directory.
#[cfg(windows)]
fn detect_symlink_support() -> bool {
    let dir = std::env::temp_dir();
    let stamp = std::process::id();
    let target = dir.join(format!("pgit-probe-{}.txt", stamp));
    let link = dir.join(format!("pgit-probe-{}.lnk", stamp));

    if std::fs::write(&target, b"probe").is_err() {
        return false;
    }
    let supported = std::os::windows::fs::symlink_file(&target, &link).is_ok();
    let _ = std::fs::remove_file(&link);
    let _ = std::fs::remove_file(&target);
    supported
}

#[cfg(not(any(unix, windows)))]
fn detect_symlink_support() -> bool {
    false
}
