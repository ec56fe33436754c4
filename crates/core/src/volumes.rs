//! C10: enumerates direct-child source and override volume directories
//! under the two roots.

use std::path::{Path, PathBuf};

use crate::fsadapter::{EntryKind, FilesystemAdapter};

#[derive(Debug, Clone, Default)]
pub struct VolumeDiscovery {
    pub source_volume_paths: Vec<PathBuf>,
    pub override_volume_paths: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

fn list_volumes<FS: FilesystemAdapter>(
    fs: &FS,
    root: &Path,
    warnings: &mut Vec<String>,
) -> Vec<PathBuf> {
    if fs.entry_kind(root) == EntryKind::Missing {
        warnings.push(format!("VOL-DISC-001: volume root does not exist: {}", root.display()));
        return Vec::new();
    }
    let mut children = fs.read_dir(root).unwrap_or_default();
    children.sort();
    children
}

pub fn discover<FS: FilesystemAdapter>(
    fs: &FS,
    sources_root: &Path,
    override_root: &Path,
) -> VolumeDiscovery {
    let mut warnings = Vec::new();
    let source_volume_paths = list_volumes(fs, sources_root, &mut warnings);
    let override_volume_paths = list_volumes(fs, override_root, &mut warnings);
    VolumeDiscovery {
        source_volume_paths,
        override_volume_paths,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    #[derive(Default)]
    struct FakeFs {
        dirs: RwLock<HashMap<PathBuf, Vec<PathBuf>>>,
        kinds: RwLock<HashMap<PathBuf, EntryKind>>,
    }

    impl FakeFs {
        fn add_dir(&self, dir: &Path, children: Vec<PathBuf>) {
            self.kinds.write().unwrap().insert(dir.to_path_buf(), EntryKind::Directory);
            self.dirs.write().unwrap().insert(dir.to_path_buf(), children);
        }
    }

    impl FilesystemAdapter for FakeFs {
        fn entry_kind(&self, path: &Path) -> EntryKind {
            self.kinds.read().unwrap().get(path).copied().unwrap_or(EntryKind::Missing)
        }
        fn last_write_unix(&self, _path: &Path) -> Option<u64> {
            None
        }
        fn read_dir(&self, path: &Path) -> crate::error::Result<Vec<PathBuf>> {
            Ok(self.dirs.read().unwrap().get(path).cloned().unwrap_or_default())
        }
        fn ensure_dir(&self, _path: &Path) -> crate::error::Result<()> {
            Ok(())
        }
        fn rename(&self, _from: &Path, _to: &Path) -> crate::error::Result<()> {
            Ok(())
        }
        fn create_dir_symlink(&self, _link: &Path, _target: &Path) -> crate::error::Result<()> {
            Ok(())
        }
        fn read_link(&self, _link: &Path) -> crate::error::Result<PathBuf> {
            Ok(PathBuf::new())
        }
        fn remove_entry(&self, _path: &Path) -> crate::error::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn missing_root_produces_warning_not_error() {
        let fs = FakeFs::default();
        let result = discover(&fs, Path::new("/missing"), Path::new("/also-missing"));
        assert!(result.source_volume_paths.is_empty());
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings[0].starts_with("VOL-DISC-001"));
    }

    #[test]
    fn present_roots_return_sorted_children() {
        let fs = FakeFs::default();
        fs.add_dir(
            Path::new("/s"),
            vec![PathBuf::from("/s/SourceB"), PathBuf::from("/s/SourceA")],
        );
        fs.add_dir(Path::new("/o"), vec![]);
        let result = discover(&fs, Path::new("/s"), Path::new("/o"));
        assert_eq!(
            result.source_volume_paths,
            vec![PathBuf::from("/s/SourceA"), PathBuf::from("/s/SourceB")]
        );
        assert!(result.warnings.is_empty());
    }
}
