//! C5: delayed, quiet-window, collision-aware chapter directory renamer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::fsadapter::{EntryKind, FilesystemAdapter};
use crate::logger::{LogLevel, Logger};
use crate::path;
use crate::rename_queue::{RenameQueueEntry, RenameQueueStore, UnixSeconds};
use crate::sanitize::sanitize;

#[derive(Debug, Clone)]
pub struct ChapterRenameOptions {
    pub sources_root: PathBuf,
    pub excluded_sources: Vec<String>,
    pub rename_delay: Duration,
    pub rename_rescan_grace: Duration,
    pub rename_quiet_window: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessResult {
    pub processed: u64,
    pub renamed: u64,
    pub unchanged: u64,
    pub deferred_missing: u64,
    pub dropped_missing: u64,
    pub deferred_not_ready: u64,
    pub deferred_not_quiet: u64,
    pub collision_skipped: u64,
    pub move_failed: u64,
    pub remaining_queued: u64,
}

impl ProcessResult {
    /// Sum of every per-item outcome bucket, which the spec requires to
    /// equal `processed` for any pass.
    pub fn accounted_for(&self) -> u64 {
        self.renamed
            + self.unchanged
            + self.deferred_missing
            + self.dropped_missing
            + self.deferred_not_ready
            + self.deferred_not_quiet
            + self.collision_skipped
            + self.move_failed
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RescanResult {
    pub enumerated: u64,
    pub enqueued: u64,
    pub had_enumeration_warning: bool,
}

enum Outcome {
    Keep,
    Drop,
}

const COLLISION_SUFFIXES: &[&str] = &[
    "_alt-a", "_alt-b", "_alt-c", "_alt-d", "_alt-e", "_alt-f", "_alt-g", "_alt-h", "_alt-i",
    "_alt-j", "_alt-k", "_alt-l", "_alt-m", "_alt-n", "_alt-o", "_alt-p", "_alt-q", "_alt-r",
    "_alt-s", "_alt-t", "_alt-u", "_alt-v", "_alt-w", "_alt-x", "_alt-y", "_alt-z",
];

pub struct RenameQueueProcessor<FS: FilesystemAdapter> {
    options: ChapterRenameOptions,
    store: Arc<RenameQueueStore>,
    fs: Arc<FS>,
    logger: Arc<dyn Logger>,
    process_lock: Mutex<()>,
}

impl<FS: FilesystemAdapter> RenameQueueProcessor<FS> {
    pub fn new(
        options: ChapterRenameOptions,
        store: Arc<RenameQueueStore>,
        fs: Arc<FS>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            options,
            store,
            fs,
            logger,
            process_lock: Mutex::new(()),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.store.count()
    }

    fn source_excluded(&self, source: &str) -> bool {
        let trimmed = source.trim();
        self.options
            .excluded_sources
            .iter()
            .any(|ex| ex.trim().eq_ignore_ascii_case(trimmed))
    }

    /// Accepts only paths at depth 3 under the sources root
    /// (`<source>/<manga>/<chapter>`) whose source segment is not excluded.
    pub fn enqueue_chapter_path(&self, p: &Path, now: UnixSeconds) -> bool {
        let Some(rel) = path::try_relativize(&self.options.sources_root, p) else {
            return false;
        };
        let segments = path::split_segments(&rel);
        if segments.len() != 3 {
            return false;
        }
        if self.source_excluded(&segments[0]) {
            return false;
        }
        let allow_at = self.allow_at_for(p, now);
        self.store.try_enqueue(RenameQueueEntry {
            path: p.to_path_buf(),
            allow_at,
        })
    }

    fn allow_at_for(&self, p: &Path, now: UnixSeconds) -> UnixSeconds {
        let delay = self.options.rename_delay.as_secs();
        match self.fs.last_write_unix(p) {
            Some(last_write) => last_write.saturating_add(delay),
            None => now.saturating_add(delay),
        }
    }

    pub fn enqueue_chapters_under_source_path(&self, source_path: &Path, now: UnixSeconds) {
        let Ok(manga_dirs) = self.fs.read_dir(source_path) else {
            return;
        };
        for manga_dir in manga_dirs {
            self.enqueue_chapters_under_manga_path(&manga_dir, now);
        }
    }

    pub fn enqueue_chapters_under_manga_path(&self, manga_path: &Path, now: UnixSeconds) {
        let Ok(chapter_dirs) = self.fs.read_dir(manga_path) else {
            return;
        };
        for chapter_dir in chapter_dirs {
            self.enqueue_chapter_path(&chapter_dir, now);
        }
    }

    /// Enumerates every depth-3 directory under the sources root (skipping
    /// excluded sources) and enqueues any candidate whose basename requires
    /// sanitizing.
    pub fn rescan_and_enqueue(&self, now: UnixSeconds) -> RescanResult {
        let mut result = RescanResult::default();

        let sources = match self.fs.read_dir(&self.options.sources_root) {
            Ok(s) => s,
            Err(_) => {
                self.warn_enumeration();
                result.had_enumeration_warning = true;
                return result;
            }
        };

        for source_dir in sources {
            let source_name = source_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if self.source_excluded(&source_name) {
                continue;
            }
            let manga_dirs = match self.fs.read_dir(&source_dir) {
                Ok(m) => m,
                Err(_) => {
                    if !result.had_enumeration_warning {
                        self.warn_enumeration();
                        result.had_enumeration_warning = true;
                    }
                    continue;
                }
            };
            for manga_dir in manga_dirs {
                let chapter_dirs = match self.fs.read_dir(&manga_dir) {
                    Ok(c) => c,
                    Err(_) => {
                        if !result.had_enumeration_warning {
                            self.warn_enumeration();
                            result.had_enumeration_warning = true;
                        }
                        continue;
                    }
                };
                for chapter_dir in chapter_dirs {
                    result.enumerated += 1;
                    let basename = chapter_dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    if sanitize(&basename) == basename {
                        continue;
                    }
                    let allow_at = self.allow_at_for(&chapter_dir, now);
                    if self.store.try_enqueue(RenameQueueEntry {
                        path: chapter_dir,
                        allow_at,
                    }) {
                        result.enqueued += 1;
                    }
                }
            }
        }

        result
    }

    fn warn_enumeration(&self) {
        self.logger.log(
            LogLevel::Warning,
            "rename.enumeration_warning",
            "failed to enumerate a directory while rescanning the sources root",
            &[],
        );
    }

    /// Processes each queued entry in order under a lock so that passes are
    /// serialized.
    pub fn process_once(&self, now: UnixSeconds) -> ProcessResult {
        let _guard = self.process_lock.lock();

        let snapshot = self.store.read_all();
        let snapshot_paths: HashSet<PathBuf> =
            snapshot.iter().map(|e| e.path.clone()).collect();

        let mut result = ProcessResult::default();
        let mut kept: Vec<RenameQueueEntry> = Vec::new();

        for entry in snapshot {
            result.processed += 1;
            match self.process_entry(&entry, now, &mut result) {
                Outcome::Keep => kept.push(entry),
                Outcome::Drop => {}
            }
        }

        self.store.transform(|current| {
            let mut out = kept;
            for e in current {
                if !snapshot_paths.contains(&e.path) {
                    out.push(e);
                }
            }
            out
        });

        result.remaining_queued = self.store.count() as u64;

        if result.processed > 0 {
            self.logger.log(
                LogLevel::Normal,
                "rename.queue.processed",
                "processed the chapter rename queue",
                &[],
            );
        }

        result
    }

    fn process_entry(
        &self,
        entry: &RenameQueueEntry,
        now: UnixSeconds,
        result: &mut ProcessResult,
    ) -> Outcome {
        if now < entry.allow_at {
            result.deferred_not_ready += 1;
            return Outcome::Keep;
        }

        if self.fs.entry_kind(&entry.path) == EntryKind::Missing {
            if now.saturating_sub(entry.allow_at) <= self.options.rename_rescan_grace.as_secs() {
                result.deferred_missing += 1;
                return Outcome::Keep;
            }
            result.dropped_missing += 1;
            return Outcome::Drop;
        }

        if self.is_recently_touched(&entry.path, now) {
            result.deferred_not_quiet += 1;
            return Outcome::Keep;
        }

        let Some(parent) = entry.path.parent() else {
            result.unchanged += 1;
            return Outcome::Drop;
        };
        let basename = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sanitized = sanitize(&basename);
        if sanitized == basename {
            result.unchanged += 1;
            return Outcome::Drop;
        }

        let mut target = parent.join(&sanitized);
        if self.fs.entry_kind(&target) != EntryKind::Missing {
            match self.resolve_collision(parent, &sanitized) {
                Some(resolved) => target = resolved,
                None => {
                    result.collision_skipped += 1;
                    return Outcome::Drop;
                }
            }
        }

        match self.fs.rename(&entry.path, &target) {
            Ok(()) => {
                result.renamed += 1;
                Outcome::Drop
            }
            Err(_) => {
                result.move_failed += 1;
                Outcome::Drop
            }
        }
    }

    fn resolve_collision(&self, parent: &Path, sanitized: &str) -> Option<PathBuf> {
        for suffix in COLLISION_SUFFIXES {
            let candidate = parent.join(format!("{sanitized}{suffix}"));
            if self.fs.entry_kind(&candidate) == EntryKind::Missing {
                return Some(candidate);
            }
        }
        None
    }

    /// True if the chapter directory or any entry nested under it has a
    /// last-write timestamp newer than `now - rename_quiet_window`.
    fn is_recently_touched(&self, chapter_path: &Path, now: UnixSeconds) -> bool {
        let threshold = now.saturating_sub(self.options.rename_quiet_window.as_secs());
        if self.newer_than(chapter_path, threshold) {
            return true;
        }
        self.any_descendant_newer_than(chapter_path, threshold)
    }

    fn newer_than(&self, path: &Path, threshold: UnixSeconds) -> bool {
        match self.fs.last_write_unix(path) {
            Some(last_write) => last_write > threshold,
            None => false,
        }
    }

    fn any_descendant_newer_than(&self, dir: &Path, threshold: UnixSeconds) -> bool {
        let Ok(children) = self.fs.read_dir(dir) else {
            return false;
        };
        for child in children {
            if self.newer_than(&child, threshold) {
                return true;
            }
            if self.fs.entry_kind(&child) == EntryKind::Directory
                && self.any_descendant_newer_than(&child, threshold)
            {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoopLogger;
    use std::collections::HashMap;
    use std::sync::RwLock;

    #[derive(Default)]
    struct FakeFs {
        dirs: RwLock<HashMap<PathBuf, Vec<PathBuf>>>,
        mtimes: RwLock<HashMap<PathBuf, u64>>,
        kinds: RwLock<HashMap<PathBuf, EntryKind>>,
    }

    impl FakeFs {
        fn add_dir(&self, dir: &Path, children: Vec<PathBuf>) {
            self.kinds
                .write()
                .unwrap()
                .insert(dir.to_path_buf(), EntryKind::Directory);
            self.dirs.write().unwrap().insert(dir.to_path_buf(), children);
        }

        fn set_mtime(&self, path: &Path, t: u64) {
            self.mtimes.write().unwrap().insert(path.to_path_buf(), t);
        }

        fn set_kind(&self, path: &Path, kind: EntryKind) {
            self.kinds.write().unwrap().insert(path.to_path_buf(), kind);
        }
    }

    impl FilesystemAdapter for FakeFs {
        fn entry_kind(&self, path: &Path) -> EntryKind {
            self.kinds
                .read()
                .unwrap()
                .get(path)
                .copied()
                .unwrap_or(EntryKind::Missing)
        }

        fn last_write_unix(&self, path: &Path) -> Option<u64> {
            self.mtimes.read().unwrap().get(path).copied()
        }

        fn read_dir(&self, path: &Path) -> crate::error::Result<Vec<PathBuf>> {
            Ok(self.dirs.read().unwrap().get(path).cloned().unwrap_or_default())
        }

        fn ensure_dir(&self, _path: &Path) -> crate::error::Result<()> {
            Ok(())
        }

        fn rename(&self, from: &Path, to: &Path) -> crate::error::Result<()> {
            let mut kinds = self.kinds.write().unwrap();
            kinds.insert(to.to_path_buf(), EntryKind::Directory);
            kinds.remove(from);
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

    fn processor(
        fs: Arc<FakeFs>,
        excluded: Vec<&str>,
    ) -> RenameQueueProcessor<FakeFs> {
        RenameQueueProcessor::new(
            ChapterRenameOptions {
                sources_root: PathBuf::from("/s"),
                excluded_sources: excluded.into_iter().map(String::from).collect(),
                rename_delay: Duration::from_secs(30),
                rename_rescan_grace: Duration::from_secs(60),
                rename_quiet_window: Duration::from_secs(10),
            },
            Arc::new(RenameQueueStore::new()),
            fs,
            Arc::new(NoopLogger),
        )
    }

    #[test]
    fn enqueue_rejects_wrong_depth() {
        let fs = Arc::new(FakeFs::default());
        let p = processor(fs, vec![]);
        assert!(!p.enqueue_chapter_path(Path::new("/s/SourceA/MangaA"), 0));
        assert!(!p.enqueue_chapter_path(Path::new("/s/SourceA/MangaA/Ch1/extra"), 0));
    }

    #[test]
    fn enqueue_rejects_excluded_source_case_insensitively() {
        let fs = Arc::new(FakeFs::default());
        let p = processor(fs, vec!["sourcea"]);
        assert!(!p.enqueue_chapter_path(Path::new("/s/SourceA/MangaA/Chapter 1"), 0));
    }

    #[test]
    fn depth_three_rename_enqueue_sets_allow_at_to_now_plus_delay() {
        let fs = Arc::new(FakeFs::default());
        let p = processor(fs, vec![]);
        let accepted = p.enqueue_chapter_path(
            Path::new("/s/SourceA/MangaA/Team9_Chapter 1"),
            1_000,
        );
        assert!(accepted);
        let all = p.store.read_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].allow_at, 1_030);
    }

    #[test]
    fn process_once_sums_match_processed() {
        let fs = Arc::new(FakeFs::default());
        let chapter = PathBuf::from("/s/SourceA/MangaA/Team9_Chapter 1");
        fs.add_dir(&chapter, vec![]);
        fs.set_mtime(&chapter, 0);

        let p = processor(fs, vec![]);
        p.enqueue_chapter_path(&chapter, 0);

        let result = p.process_once(1_000);
        assert_eq!(result.processed, 1);
        assert_eq!(result.accounted_for(), result.processed);
        assert_eq!(result.renamed, 1);
        assert_eq!(result.remaining_queued, 0);
    }

    #[test]
    fn process_once_defers_when_not_ready() {
        let fs = Arc::new(FakeFs::default());
        let chapter = PathBuf::from("/s/SourceA/MangaA/Team9_Chapter 1");
        fs.add_dir(&chapter, vec![]);

        let p = processor(fs, vec![]);
        p.enqueue_chapter_path(&chapter, 1_000); // allow_at = 1030

        let result = p.process_once(1_000);
        assert_eq!(result.deferred_not_ready, 1);
        assert_eq!(result.remaining_queued, 1);
    }

    #[test]
    fn process_once_defers_when_not_quiet() {
        let fs = Arc::new(FakeFs::default());
        let chapter = PathBuf::from("/s/SourceA/MangaA/Team9_Chapter 1");
        fs.add_dir(&chapter, vec![]);
        fs.set_mtime(&chapter, 995); // within quiet window of now=1000

        let p = processor(fs, vec![]);
        p.enqueue_chapter_path(&chapter, 0);

        let result = p.process_once(1_000);
        assert_eq!(result.deferred_not_quiet, 1);
    }

    #[test]
    fn process_once_drops_unchanged_names() {
        let fs = Arc::new(FakeFs::default());
        let chapter = PathBuf::from("/s/SourceA/MangaA/Chapter 1");
        fs.add_dir(&chapter, vec![]);
        fs.set_mtime(&chapter, 0);

        let p = processor(fs, vec![]);
        p.enqueue_chapter_path(&chapter, 0);

        let result = p.process_once(1_000);
        assert_eq!(result.unchanged, 1);
        assert_eq!(result.renamed, 0);
    }

    #[test]
    fn process_once_resolves_collision_with_alt_suffix() {
        let fs = Arc::new(FakeFs::default());
        let chapter = PathBuf::from("/s/SourceA/MangaA/Team9_Chapter 1");
        let existing_target = PathBuf::from("/s/SourceA/MangaA/Chapter 1");
        fs.add_dir(&chapter, vec![]);
        fs.set_mtime(&chapter, 0);
        fs.set_kind(&existing_target, EntryKind::Directory);

        let p = processor(fs, vec![]);
        p.enqueue_chapter_path(&chapter, 0);

        let result = p.process_once(1_000);
        assert_eq!(result.renamed, 1);
    }

    #[test]
    fn process_once_drops_after_missing_grace_elapses() {
        let fs = Arc::new(FakeFs::default());
        let chapter = PathBuf::from("/s/SourceA/MangaA/Team9_Chapter 1");
        // never added to fake fs => Missing

        let p = processor(fs, vec![]);
        p.enqueue_chapter_path(&chapter, 0);

        let deferred = p.process_once(1_000);
        assert_eq!(deferred.deferred_missing, 1);

        let dropped = p.process_once(2_000_000);
        assert_eq!(dropped.dropped_missing, 1);
    }
}
