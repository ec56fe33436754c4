//! C11: computes per-title branch-link set, branch specification string,
//! and mergerfs identity token. A pure function of its inputs modulo the
//! existence checks it performs against the filesystem adapter, and the
//! override title directory it creates when the preferred override volume
//! has none yet for this title (so the `00_override` link it plans never
//! points at a directory that doesn't exist).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::fsadapter::{EntryKind, FilesystemAdapter};
use crate::path::PathComparison;
use crate::priority::{PriorityService, DEFAULT_PRIORITY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBranchCandidate {
    pub source_name: String,
    pub source_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAccess {
    ReadOnly,
    ReadWrite,
}

impl LinkAccess {
    fn code(self) -> &'static str {
        match self {
            LinkAccess::ReadOnly => "RO",
            LinkAccess::ReadWrite => "RW",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchLinkDefinition {
    pub link_name: String,
    pub link_path: PathBuf,
    pub target_path: PathBuf,
    pub access: LinkAccess,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPlan {
    pub override_title_path: Option<PathBuf>,
    pub branch_directory_path: PathBuf,
    pub branch_specification: String,
    pub desired_identity: String,
    pub group_key: String,
    pub links: Vec<BranchLinkDefinition>,
}

pub struct BranchPlannerInput<'a> {
    pub canonical_title: &'a str,
    pub equivalent_titles: &'a [String],
    pub source_volume_paths: &'a [PathBuf],
    pub override_volume_paths: &'a [PathBuf],
    pub branch_links_root: &'a Path,
}

/// Filesystem-safe derivation of a canonical title, used as the branch
/// directory name. Lowercases, folds whitespace/punctuation to `_`, strips
/// repeats.
pub fn group_key_for(canonical_title: &str) -> String {
    let mut out = String::with_capacity(canonical_title.len());
    let mut last_was_underscore = false;
    for c in canonical_title.chars() {
        let mapped = if c.is_ascii_alphanumeric() {
            c.to_ascii_lowercase()
        } else {
            '_'
        };
        if mapped == '_' {
            if last_was_underscore {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        out.push(mapped);
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Short stable hash of `group_key`, used as the mergerfs `fsname` token.
pub fn desired_identity_for(group_key: &str) -> String {
    let digest = Sha256::digest(group_key.as_bytes());
    hex_prefix(&digest, 12)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut s = String::with_capacity(chars);
    for b in bytes {
        use std::fmt::Write;
        write!(s, "{b:02x}").unwrap();
        if s.len() >= chars {
            break;
        }
    }
    s.truncate(chars);
    s
}

pub fn plan<FS: FilesystemAdapter>(
    fs: &FS,
    priority: &PriorityService,
    input: BranchPlannerInput<'_>,
) -> BranchPlan {
    let cmp = PathComparison;

    let mut candidates: Vec<SourceBranchCandidate> = Vec::new();
    for volume in input.source_volume_paths {
        let source_name = leaf_name(volume);
        for title in input.equivalent_titles {
            let candidate_path = volume.join(title);
            if fs.entry_kind(&candidate_path) == EntryKind::Directory {
                candidates.push(SourceBranchCandidate {
                    source_name: source_name.clone(),
                    source_path: candidate_path,
                });
            }
        }
    }

    candidates.sort_by(|a, b| {
        let rank_a = priority.get_priority_or_default(&a.source_name, DEFAULT_PRIORITY);
        let rank_b = priority.get_priority_or_default(&b.source_name, DEFAULT_PRIORITY);
        rank_a
            .cmp(&rank_b)
            .then_with(|| a.source_name.cmp(&b.source_name))
            .then_with(|| a.source_path.cmp(&b.source_path))
    });
    let mut seen_paths = std::collections::HashSet::new();
    candidates.retain(|c| seen_paths.insert(cmp.key(&c.source_path)));

    let mut override_title_path: Option<PathBuf> = None;
    for volume in input.override_volume_paths {
        let candidate_path = volume.join(input.canonical_title);
        if fs.entry_kind(&candidate_path) == EntryKind::Directory {
            override_title_path = Some(candidate_path);
            break;
        }
    }
    if override_title_path.is_none() {
        if let Some(first_volume) = input.override_volume_paths.first() {
            let candidate_path = first_volume.join(input.canonical_title);
            match fs.ensure_dir(&candidate_path) {
                Ok(()) => override_title_path = Some(candidate_path),
                Err(_) => override_title_path = None,
            }
        }
    }

    let group_key = group_key_for(input.canonical_title);
    let desired_identity = desired_identity_for(&group_key);
    let branch_directory_path = input.branch_links_root.join(&group_key);

    let mut links = Vec::new();
    if let Some(override_path) = &override_title_path {
        links.push(BranchLinkDefinition {
            link_name: "00_override".to_string(),
            link_path: branch_directory_path.join("00_override"),
            target_path: override_path.clone(),
            access: LinkAccess::ReadWrite,
        });
    }
    for (idx, candidate) in candidates.iter().enumerate() {
        let link_name = format!("10_source_{idx:02}");
        links.push(BranchLinkDefinition {
            link_path: branch_directory_path.join(&link_name),
            link_name,
            target_path: candidate.source_path.clone(),
            access: LinkAccess::ReadOnly,
        });
    }

    let branch_specification = links
        .iter()
        .map(|l| format!("{}={}", l.link_path.display(), l.access.code()))
        .collect::<Vec<_>>()
        .join(":");

    BranchPlan {
        override_title_path,
        branch_directory_path,
        branch_specification,
        desired_identity,
        group_key,
        links,
    }
}

fn leaf_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    #[derive(Default)]
    struct FakeFs {
        kinds: RwLock<HashMap<PathBuf, EntryKind>>,
        deny_ensure_dir: RwLock<std::collections::HashSet<PathBuf>>,
    }

    impl FakeFs {
        fn mark_dir(&self, p: &Path) {
            self.kinds.write().unwrap().insert(p.to_path_buf(), EntryKind::Directory);
        }

        fn deny_ensure_dir(&self, p: &Path) {
            self.deny_ensure_dir.write().unwrap().insert(p.to_path_buf());
        }
    }

    impl FilesystemAdapter for FakeFs {
        fn entry_kind(&self, path: &Path) -> EntryKind {
            self.kinds.read().unwrap().get(path).copied().unwrap_or(EntryKind::Missing)
        }
        fn last_write_unix(&self, _path: &Path) -> Option<u64> {
            None
        }
        fn read_dir(&self, _path: &Path) -> crate::error::Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }
        fn ensure_dir(&self, path: &Path) -> crate::error::Result<()> {
            if self.deny_ensure_dir.read().unwrap().contains(path) {
                return Err(crate::error::CoreError::UnexpectedEntryKind(
                    path.display().to_string(),
                ));
            }
            self.mark_dir(path);
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
    fn link_order_puts_override_first_then_priority_ordered_sources() {
        let fs = FakeFs::default();
        fs.mark_dir(Path::new("/s/SourceB/MangaA"));
        fs.mark_dir(Path::new("/s/SourceA/MangaA"));
        fs.mark_dir(Path::new("/o/VolA/MangaA"));

        let priority = PriorityService::from_ordered_names(&[
            "SourceA".to_string(),
            "SourceB".to_string(),
        ]);

        let input = BranchPlannerInput {
            canonical_title: "MangaA",
            equivalent_titles: &["MangaA".to_string()],
            source_volume_paths: &[PathBuf::from("/s/SourceB"), PathBuf::from("/s/SourceA")],
            override_volume_paths: &[PathBuf::from("/o/VolA")],
            branch_links_root: Path::new("/links"),
        };

        let result = plan(&fs, &priority, input);
        assert_eq!(result.links.len(), 3);
        assert_eq!(result.links[0].link_name, "00_override");
        assert_eq!(result.links[1].link_name, "10_source_00");
        assert_eq!(result.links[1].target_path, PathBuf::from("/s/SourceA/MangaA"));
        assert_eq!(result.links[2].link_name, "10_source_01");
        assert_eq!(result.links[2].target_path, PathBuf::from("/s/SourceB/MangaA"));
    }

    #[test]
    fn missing_override_falls_back_to_first_override_volume() {
        let fs = FakeFs::default();
        let priority = PriorityService::default();
        let input = BranchPlannerInput {
            canonical_title: "MangaA",
            equivalent_titles: &["MangaA".to_string()],
            source_volume_paths: &[],
            override_volume_paths: &[PathBuf::from("/o/VolA")],
            branch_links_root: Path::new("/links"),
        };
        let result = plan(&fs, &priority, input);
        assert_eq!(result.override_title_path, Some(PathBuf::from("/o/VolA/MangaA")));
        assert_eq!(fs.entry_kind(Path::new("/o/VolA/MangaA")), EntryKind::Directory);
    }

    #[test]
    fn override_link_is_omitted_when_directory_cannot_be_created() {
        let fs = FakeFs::default();
        fs.deny_ensure_dir(Path::new("/o/VolA/MangaA"));
        let priority = PriorityService::default();
        let input = BranchPlannerInput {
            canonical_title: "MangaA",
            equivalent_titles: &["MangaA".to_string()],
            source_volume_paths: &[],
            override_volume_paths: &[PathBuf::from("/o/VolA")],
            branch_links_root: Path::new("/links"),
        };
        let result = plan(&fs, &priority, input);
        assert_eq!(result.override_title_path, None);
        assert!(result.links.iter().all(|l| l.link_name != "00_override"));
    }

    #[test]
    fn group_key_and_identity_are_stable() {
        assert_eq!(group_key_for("Manga: A Title!"), group_key_for("Manga A Title"));
        assert_eq!(desired_identity_for("manga_a_title").len(), 12);
    }
}
