//! End-to-end exercise of C8–C16 against a real temp-directory filesystem,
//! with only the external command executor faked (no real `mergerfs`/
//! `findmnt`/`fusermount3` binaries are available in a test environment).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use tempfile::tempdir;

use sourcemerge_core::equivalence::EquivalenceCatalog;
use sourcemerge_core::error::{CoreError, Result as CoreResult};
use sourcemerge_core::executor::{CommandExecutor, CommandOutcome, CommandRequest, CommandResult, FailureKind};
use sourcemerge_core::fsadapter::{EntryKind, FilesystemAdapter};
use sourcemerge_core::logger::NoopLogger;
use sourcemerge_core::merge_workflow::{MergeWorkflow, MergeWorkflowOptions, PassOutcome};
use sourcemerge_core::mount_command::{MountCommandOptions, MountCommandService};
use sourcemerge_core::mount_snapshot::{MountSnapshotOptions, MountSnapshotService};
use sourcemerge_core::priority::PriorityService;
use tokio_util::sync::CancellationToken;

/// Thin real-filesystem adapter, duplicated here (rather than depending on
/// the daemon crate, which would invert the workspace dependency graph).
#[derive(Default)]
struct RealFs;

impl FilesystemAdapter for RealFs {
    fn entry_kind(&self, path: &Path) -> EntryKind {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => match fs::metadata(path) {
                Ok(target) if target.is_dir() => EntryKind::DirectorySymlink,
                _ => EntryKind::FileSymlink,
            },
            Ok(meta) if meta.is_dir() => EntryKind::Directory,
            Ok(meta) if meta.is_file() => EntryKind::File,
            Ok(_) => EntryKind::Other,
            Err(_) => EntryKind::Missing,
        }
    }

    fn last_write_unix(&self, path: &Path) -> Option<u64> {
        let meta = fs::metadata(path).ok()?;
        meta.modified().ok()?.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
    }

    fn read_dir(&self, path: &Path) -> CoreResult<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn ensure_dir(&self, path: &Path) -> CoreResult<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> CoreResult<()> {
        fs::rename(from, to)?;
        Ok(())
    }

    fn create_dir_symlink(&self, link: &Path, target: &Path) -> CoreResult<()> {
        std::os::unix::fs::symlink(target, link)?;
        Ok(())
    }

    fn read_link(&self, link: &Path) -> CoreResult<PathBuf> {
        fs::read_link(link).map_err(CoreError::from)
    }

    fn remove_entry(&self, path: &Path) -> CoreResult<()> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() && !meta.file_type().is_symlink() => fs::remove_dir_all(path)?,
            Ok(_) => fs::remove_file(path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CoreError::from(e)),
        }
        Ok(())
    }
}

/// Scripts the two `findmnt` calls a single mount action triggers (one
/// before planning, reporting no mounts; one inside `do_mount`'s
/// post-mount confirmation, reporting the title now mounted) plus
/// success for every `mergerfs`/`ls` invocation.
struct ScriptedExecutor {
    findmnt_calls: AtomicUsize,
    mount_point: PathBuf,
}

fn ok(stdout: &str) -> CommandResult {
    CommandResult {
        outcome: CommandOutcome::Success,
        failure_kind: FailureKind::None,
        exit_code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
        stdout_truncated: false,
        stderr_truncated: false,
        elapsed: Duration::from_millis(1),
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, request: CommandRequest) -> CommandResult {
        match request.file_name.as_str() {
            "findmnt" => {
                let call = self.findmnt_calls.fetch_add(1, Ordering::SeqCst);
                if call == 0 {
                    ok("")
                } else {
                    ok(&format!(
                        "TARGET={} FSTYPE=fuse.mergerfs SOURCE=sourcemerge OPTIONS=ro,threads=1\n",
                        self.mount_point.display()
                    ))
                }
            }
            "mergerfs" | "ls" => ok(""),
            other => panic!("unexpected command in test: {other}"),
        }
    }
}

#[tokio::test]
async fn full_pass_mounts_a_single_discovered_title() {
    let dir = tempdir().unwrap();
    let sources_root = dir.path().join("sources");
    let override_root = dir.path().join("override");
    let merged_root = dir.path().join("merged");
    let branch_links_root = dir.path().join("branch-links");

    fs::create_dir_all(sources_root.join("SourceA/MangaA/Chapter 1")).unwrap();
    fs::create_dir_all(&override_root).unwrap();

    let fs_adapter = Arc::new(RealFs);
    let equivalence = Arc::new(EquivalenceCatalog::from_groups(Vec::new()));
    let priority = Arc::new(PriorityService::from_ordered_names(&["SourceA".to_string()]));

    let executor = Arc::new(ScriptedExecutor {
        findmnt_calls: AtomicUsize::new(0),
        mount_point: merged_root.join("MangaA"),
    });

    let mount_snapshot = Arc::new(MountSnapshotService::new(
        MountSnapshotOptions {
            command: "findmnt".to_string(),
            arguments: vec![],
            timeout: Duration::from_secs(5),
        },
        executor.clone(),
    ));
    let mount_command = Arc::new(MountCommandService::new(
        MountCommandOptions {
            mergerfs_binary: "mergerfs".to_string(),
            mergerfs_options_base: "cache.files=partial".to_string(),
            fusermount_binary: "fusermount3".to_string(),
            command_timeout: Duration::from_secs(5),
            readiness_timeout: Duration::from_secs(5),
            high_priority_wrapper: Vec::new(),
            high_priority_kinds: vec![],
        },
        executor,
        mount_snapshot.clone(),
    ));

    let workflow = MergeWorkflow::new(
        MergeWorkflowOptions {
            sources_root,
            override_root,
            merged_root: merged_root.clone(),
            branch_links_root: branch_links_root.clone(),
            max_consecutive_mount_failures: 3,
        },
        fs_adapter,
        equivalence,
        priority,
        mount_snapshot,
        mount_command,
        Arc::new(NoopLogger),
    );

    let cancel = CancellationToken::new();
    let summary = workflow.run(&cancel).await;

    assert_eq!(summary.outcome, PassOutcome::Success);
    assert_eq!(summary.titles_considered, 1);
    assert_eq!(summary.apply_results.len(), 1);
    assert!(branch_links_root.join("mangaa").is_dir());
}
