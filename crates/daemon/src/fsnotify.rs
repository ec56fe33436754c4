//! Real [`sourcemerge_core::events::InotifyReader`] backed by the `notify` crate.
//!
//! Watches are established lazily and cached per root; `poll` drains
//! whatever the background watcher thread has queued since the last call,
//! blocking up to `timeout` for at least one event.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex};

use sourcemerge_core::events::{EventMask, FsEvent, InotifyReader, PollOutcome, PollResult};

struct RootWatch {
    _watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

/// `notify`-backed reader. One OS watch per watched root, recursive; events
/// from all roots are pulled into per-root channels and merged on `poll`.
pub struct NotifyInotifyReader {
    watches: Mutex<HashMap<PathBuf, RootWatch>>,
}

impl Default for NotifyInotifyReader {
    fn default() -> Self {
        Self {
            watches: Mutex::new(HashMap::new()),
        }
    }
}

impl NotifyInotifyReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn start_watch(root: &Path) -> notify::Result<RootWatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // The channel only disconnects if the reader was dropped; a send
            // failure here means there is nothing left to deliver events to.
            let _ = tx.send(res);
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(RootWatch {
            _watcher: watcher,
            receiver: rx,
        })
    }

    async fn ensure_watches(&self, roots: &[PathBuf], warnings: &mut Vec<String>) {
        let mut watches = self.watches.lock().await;
        for root in roots {
            if watches.contains_key(root) {
                continue;
            }
            match Self::start_watch(root) {
                Ok(watch) => {
                    watches.insert(root.clone(), watch);
                }
                Err(e) => {
                    warnings.push(format!("failed to watch {}: {e}", root.display()));
                }
            }
        }
    }
}

fn convert_event(event: Event) -> Option<FsEvent> {
    let path = event.paths.first()?.clone();
    let is_directory = path.is_dir();

    let mut mask = EventMask::NONE;
    match event.kind {
        EventKind::Create(_) => mask |= EventMask::CREATE,
        EventKind::Modify(notify::event::ModifyKind::Data(_)) => mask |= EventMask::CLOSE_WRITE,
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => mask |= EventMask::ATTRIB,
        EventKind::Modify(notify::event::ModifyKind::Name(notify::event::RenameMode::To)) => {
            mask |= EventMask::MOVED_TO
        }
        EventKind::Modify(notify::event::ModifyKind::Name(notify::event::RenameMode::From)) => {
            mask |= EventMask::MOVED_FROM
        }
        EventKind::Modify(_) => mask |= EventMask::CLOSE_WRITE,
        EventKind::Remove(_) => mask |= EventMask::DELETE,
        EventKind::Access(_) | EventKind::Other | EventKind::Any => return None,
    }
    if is_directory {
        mask |= EventMask::IS_DIRECTORY;
    }

    Some(FsEvent {
        path,
        mask,
        is_directory,
    })
}

#[async_trait]
impl InotifyReader for NotifyInotifyReader {
    async fn poll(&self, roots: &[PathBuf], timeout: Duration) -> PollResult {
        let mut warnings = Vec::new();
        self.ensure_watches(roots, &mut warnings).await;

        let mut watches = self.watches.lock().await;
        if watches.is_empty() {
            return PollResult {
                outcome: PollOutcome::CommandFailed,
                events: Vec::new(),
                warnings,
            };
        }

        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut saw_any = false;

        loop {
            let mut progressed = false;
            for watch in watches.values_mut() {
                while let Ok(item) = watch.receiver.try_recv() {
                    progressed = true;
                    saw_any = true;
                    match item {
                        Ok(event) => {
                            if let Some(fs_event) = convert_event(event) {
                                events.push(fs_event);
                            }
                        }
                        Err(e) => warnings.push(format!("notify error: {e}")),
                    }
                }
            }
            if progressed {
                continue;
            }
            if saw_any || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25).min(timeout)).await;
            if tokio::time::Instant::now() >= deadline {
                break;
            }
        }

        PollResult {
            outcome: if saw_any {
                PollOutcome::Success
            } else {
                PollOutcome::TimedOut
            },
            events,
            warnings,
        }
    }
}
