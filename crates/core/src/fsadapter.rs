//! Filesystem adapter contract consumed by C5 (rename queue processor) and
//! C12 (branch-link stager). Kept behind a trait so the pure scheduling and
//! planning logic can be exercised with an in-memory fake in tests, and so
//! the daemon binary's real implementation can be swapped without touching
//! `crates/core`.

use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Missing,
    Directory,
    File,
    DirectorySymlink,
    FileSymlink,
    Other,
}

pub trait FilesystemAdapter: Send + Sync {
    /// Kind of filesystem entry at `path`, without following a terminal
    /// symlink (so a symlink-to-directory reports `DirectorySymlink`, not
    /// `Directory`).
    fn entry_kind(&self, path: &Path) -> EntryKind;

    /// Last-write (mtime) timestamp in Unix seconds, or `None` if it cannot
    /// be determined (entry missing, platform limitation, ...).
    fn last_write_unix(&self, path: &Path) -> Option<u64>;

    /// Direct children of `path`. Empty (not an error) if `path` is missing
    /// or not a directory, unless the underlying call fails for a reason
    /// other than "not found", in which case an error is returned so the
    /// caller can decide whether to surface a warning.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    fn ensure_dir(&self, path: &Path) -> Result<()>;

    /// Atomically renames `from` to `to`. Both must be within the same
    /// filesystem for atomicity to hold; the core never relies on
    /// cross-filesystem rename.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn create_dir_symlink(&self, link: &Path, target: &Path) -> Result<()>;

    fn read_link(&self, link: &Path) -> Result<PathBuf>;

    fn remove_entry(&self, path: &Path) -> Result<()>;
}
