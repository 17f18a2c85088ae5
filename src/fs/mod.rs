//! Filesystem layer for pgit.
//!
//! Everything that relocates or rewrites user content goes through here:
//! atomic writes, moves that survive cross-device boundaries, path-string
//! validation, and [`FsTransaction`], which records undo entries so a failed
//! multi-step mutation can be reversed.

pub mod atomic;
mod move_file;
mod transaction;
mod validation;

pub use atomic::{atomic_write, atomic_write_owner_only};
pub use move_file::{copy_path, move_path, prune_empty_dirs, remove_path};
pub use transaction::{BACKUP_MARKER, FsTransaction, MoveRecord, is_backup_artifact};
pub use validation::{BLOCKED_SEGMENTS, MAX_PATH_LENGTH, PathPolicy, validate_path_string};
