//! Real [`sourcemerge_core::fsadapter::FilesystemAdapter`]: thin synchronous wrapper
//! over `std::fs` and `std::os::unix::fs::symlink`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sourcemerge_core::error::{CoreError, Result};
use sourcemerge_core::fsadapter::{EntryKind, FilesystemAdapter};

#[derive(Debug, Default)]
pub struct StdFilesystemAdapter;

impl FilesystemAdapter for StdFilesystemAdapter {
    fn entry_kind(&self, path: &Path) -> EntryKind {
        match fs::symlink_metadata(path) {
            Ok(meta) => {
                if meta.file_type().is_symlink() {
                    match fs::metadata(path) {
                        Ok(target_meta) if target_meta.is_dir() => EntryKind::DirectorySymlink,
                        Ok(_) => EntryKind::FileSymlink,
                        Err(_) => EntryKind::FileSymlink,
                    }
                } else if meta.is_dir() {
                    EntryKind::Directory
                } else if meta.is_file() {
                    EntryKind::File
                } else {
                    EntryKind::Other
                }
            }
            Err(_) => EntryKind::Missing,
        }
    }

    fn last_write_unix(&self, path: &Path) -> Option<u64> {
        let meta = fs::metadata(path).ok()?;
        let modified = meta.modified().ok()?;
        modified.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to)?;
        Ok(())
    }

    fn create_dir_symlink(&self, link: &Path, target: &Path) -> Result<()> {
        std::os::unix::fs::symlink(target, link)?;
        Ok(())
    }

    fn read_link(&self, link: &Path) -> Result<PathBuf> {
        fs::read_link(link).map_err(CoreError::from)
    }

    fn remove_entry(&self, path: &Path) -> Result<()> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() && !meta.file_type().is_symlink() => {
                fs::remove_dir_all(path)?
            }
            Ok(_) => fs::remove_file(path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CoreError::from(e)),
        }
        Ok(())
    }
}
