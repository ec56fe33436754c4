//! C12: creates / repairs / prunes branch-link directories on disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::branch_plan::BranchPlan;
use crate::error::{CoreError, Result};
use crate::fsadapter::{EntryKind, FilesystemAdapter};
use crate::path::PathComparison;

/// Rejects any link path that escapes `branch_directory_path`.
fn assert_contained(branch_directory_path: &Path, link_path: &Path) -> Result<()> {
    if crate::path::try_relativize(branch_directory_path, link_path).is_none() {
        return Err(CoreError::LinkEscapesBranchDirectory {
            link: link_path.display().to_string(),
            branch_dir: branch_directory_path.display().to_string(),
        });
    }
    Ok(())
}

pub fn stage_branch_links<FS: FilesystemAdapter>(fs: &FS, plan: &BranchPlan) -> Result<()> {
    fs.ensure_dir(&plan.branch_directory_path)?;

    let mut desired_link_paths = HashSet::new();
    let cmp = PathComparison;

    for link in &plan.links {
        assert_contained(&plan.branch_directory_path, &link.link_path)?;
        desired_link_paths.insert(cmp.key(&link.link_path));

        match fs.entry_kind(&link.link_path) {
            EntryKind::DirectorySymlink => {
                let existing_target = fs.read_link(&link.link_path)?;
                if existing_target == link.target_path {
                    continue;
                }
                fs.remove_entry(&link.link_path)?;
                fs.create_dir_symlink(&link.link_path, &link.target_path)?;
            }
            EntryKind::Missing => {
                fs.create_dir_symlink(&link.link_path, &link.target_path)?;
            }
            EntryKind::FileSymlink => {
                fs.remove_entry(&link.link_path)?;
                fs.create_dir_symlink(&link.link_path, &link.target_path)?;
            }
            EntryKind::Directory | EntryKind::File | EntryKind::Other => {
                return Err(CoreError::UnexpectedEntryKind(link.link_path.display().to_string()));
            }
        }
    }

    for entry in fs.read_dir(&plan.branch_directory_path)? {
        if desired_link_paths.contains(&cmp.key(&entry)) {
            continue;
        }
        match fs.entry_kind(&entry) {
            EntryKind::DirectorySymlink | EntryKind::FileSymlink => {
                fs.remove_entry(&entry)?;
            }
            _ => {
                // Non-symlink stale entries are preserved; the caller is
                // expected to log a diagnostic using the returned path.
            }
        }
    }

    Ok(())
}

/// Enumerates direct children of `branch_links_root` and removes those
/// whose paths are not in `active_set`.
pub fn cleanup_stale_branch_directories<FS: FilesystemAdapter>(
    fs: &FS,
    branch_links_root: &Path,
    active_set: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    let cmp = PathComparison;
    let active_keys: HashSet<String> = active_set.iter().map(|p| cmp.key(p)).collect();

    let mut removed = Vec::new();
    for child in fs.read_dir(branch_links_root)? {
        if active_keys.contains(&cmp.key(&child)) {
            continue;
        }
        fs.remove_entry(&child)?;
        removed.push(child);
    }
    Ok(removed)
}
