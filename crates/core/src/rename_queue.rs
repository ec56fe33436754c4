//! C4: in-memory ordered set of pending rename entries, deduplicated by
//! path, with a transactional replace-all operation.

use std::path::PathBuf;

use parking_lot::Mutex;

pub type UnixSeconds = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameQueueEntry {
    pub path: PathBuf,
    pub allow_at: UnixSeconds,
}

#[derive(Debug, Default)]
pub struct RenameQueueStore {
    entries: Mutex<Vec<RenameQueueEntry>>,
}

impl RenameQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Inserts `entry` unless `entry.path` is already queued. Returns
    /// whether the insert happened.
    pub fn try_enqueue(&self, entry: RenameQueueEntry) -> bool {
        let mut guard = self.entries.lock();
        if guard.iter().any(|e| e.path == entry.path) {
            return false;
        }
        guard.push(entry);
        true
    }

    pub fn read_all(&self) -> Vec<RenameQueueEntry> {
        self.entries.lock().clone()
    }

    /// Atomically replaces the queue contents with `f(snapshot)`, deduping
    /// the replacement by first-seen path and preserving the order `f`
    /// returned. If `f` panics the lock is released (poisoned state is not
    /// specially handled, matching `parking_lot`'s no-poisoning semantics)
    /// and the store is left as it was before the call, since the write
    /// only happens after `f` returns successfully.
    pub fn transform<F>(&self, f: F)
    where
        F: FnOnce(Vec<RenameQueueEntry>) -> Vec<RenameQueueEntry>,
    {
        let mut guard = self.entries.lock();
        let snapshot = guard.clone();
        let replacement = f(snapshot);

        let mut seen = std::collections::HashSet::new();
        let deduped: Vec<RenameQueueEntry> = replacement
            .into_iter()
            .filter(|e| seen.insert(e.path.clone()))
            .collect();
        *guard = deduped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, allow_at: u64) -> RenameQueueEntry {
        RenameQueueEntry {
            path: PathBuf::from(path),
            allow_at,
        }
    }

    #[test]
    fn try_enqueue_rejects_duplicate_path() {
        let store = RenameQueueStore::new();
        assert!(store.try_enqueue(entry("/a", 1)));
        assert!(!store.try_enqueue(entry("/a", 2)));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn transform_dedupes_by_first_seen_path_preserving_order() {
        let store = RenameQueueStore::new();
        store.try_enqueue(entry("/a", 1));
        store.transform(|snapshot| {
            let mut next = snapshot;
            next.push(entry("/b", 2));
            next.push(entry("/a", 99));
            next
        });
        let all = store.read_all();
        assert_eq!(all, vec![entry("/a", 1), entry("/b", 2)]);
    }

    #[test]
    fn transform_identity_is_a_no_op() {
        let store = RenameQueueStore::new();
        store.try_enqueue(entry("/a", 1));
        store.try_enqueue(entry("/b", 2));
        let before = store.read_all();
        store.transform(|snapshot| snapshot);
        assert_eq!(store.read_all(), before);
    }
}
