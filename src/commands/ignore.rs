//! Line-based edits of `.gitignore` and `info/exclude` files.

use crate::error::Result;
use crate::fs::atomic_write;
use std::fs;
use std::path::Path;

/// Header written above entries pgit adds to an ignore file.
pub(crate) const IGNORE_HEADER: &str = "# pgit private tracking";

/// Anchored exclude pattern for a tracked path, e.g. `/config/.env`.
pub(crate) fn exclude_entry(relative: &str) -> String {
    format!("/{}", relative.trim_start_matches('/'))
}

/// Append each entry of `entries` not already present as a line of `path`.
///
/// Returns the entries that were added. The file and its parent directory
/// are created when missing.
pub(crate) fn append_missing_lines<S: AsRef<str>>(path: &Path, entries: &[S]) -> Result<Vec<String>> {
    let existing = fs::read_to_string(path).unwrap_or_default();

    let mut missing: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry.as_ref();
        if !has_line(&existing, entry) && !missing.iter().any(|m| m == entry) {
            missing.push(entry.to_string());
        }
    }

    if missing.is_empty() {
        return Ok(missing);
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    if !content.contains(IGNORE_HEADER) {
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(IGNORE_HEADER);
        content.push('\n');
    }
    for entry in &missing {
        content.push_str(entry);
        content.push('\n');
    }

    atomic_write(path, content.as_bytes())?;
    Ok(missing)
}

/// Remove every line equal to `entry` from `path`. Returns whether anything
/// was removed.
#[cfg(test)]
pub(crate) fn remove_line(path: &Path, entry: &str) -> Result<bool> {
    let Ok(existing) = fs::read_to_string(path) else {
        return Ok(false);
    };
    if !has_line(&existing, entry) {
        return Ok(false);
    }

    let mut content: String = existing
        .lines()
        .filter(|line| line.trim() != entry)
        .collect::<Vec<_>>()
        .join("\n");
    if !content.is_empty() {
        content.push('\n');
    }

    atomic_write(path, content.as_bytes())?;
    Ok(true)
}

fn has_line(content: &str, entry: &str) -> bool {
    content.lines().any(|line| line.trim() == entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_adds_header_once_and_skips_present_entries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".gitignore");
        std::fs::write(&path, "target/").unwrap();

        let added = append_missing_lines(&path, &["target/", ".private-storage/"]).unwrap();
        assert_eq!(added, vec![".private-storage/"]);

        let added = append_missing_lines(&path, &[".private-config.json"]).unwrap();
        assert_eq!(added, vec![".private-config.json"]);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "target/\n\n# pgit private tracking\n.private-storage/\n.private-config.json\n"
        );
        assert!(append_missing_lines(&path, &["target/"]).unwrap().is_empty());
    }

    #[test]
    fn append_creates_missing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("info/exclude");

        append_missing_lines(&path, &["a", "a"]).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# pgit private tracking\na\n"
        );
    }

    #[test]
    fn remove_line_drops_exact_matches_only() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("exclude");
        std::fs::write(&path, "config/.env\nconfig/.env.example\n").unwrap();

        assert!(remove_line(&path, "config/.env").unwrap());
        assert!(!remove_line(&path, "config/.env").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "config/.env.example\n");
        assert!(!remove_line(&temp.path().join("missing"), "x").unwrap());
    }

    #[test]
    fn exclude_entries_are_anchored_at_the_root() {
        assert_eq!(exclude_entry("config/.env"), "/config/.env");
        assert_eq!(exclude_entry("/secrets"), "/secrets");
    }
}
