//! C15: executes mount / remount / unmount actions with readiness probing.

use std::sync::Arc;
use std::time::Duration;

use crate::executor::{CommandExecutor, CommandRequest};
use crate::mount_snapshot::MountSnapshotService;
use crate::reconcile::{ActionKind, ReconciliationAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Success,
    Busy,
    Failure,
}

#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub action: ReconciliationAction,
    pub outcome: ApplyOutcome,
    pub diagnostic: String,
}

#[derive(Debug, Clone)]
pub struct MountCommandOptions {
    pub mergerfs_binary: String,
    pub mergerfs_options_base: String,
    pub fusermount_binary: String,
    pub command_timeout: Duration,
    pub readiness_timeout: Duration,
    /// Prepended verbatim before the real binary for high-priority actions,
    /// e.g. `["ionice", "-c2", "nice", "-n10"]`.
    pub high_priority_wrapper: Vec<String>,
    pub high_priority_kinds: Vec<ActionKind>,
}

fn mergerfs_options_with_threads(base: &str) -> String {
    if base.split(',').any(|part| part.trim_start().starts_with("threads")) {
        base.to_string()
    } else if base.is_empty() {
        "threads=1".to_string()
    } else {
        format!("{base},threads=1")
    }
}

pub struct MountCommandService<E: CommandExecutor> {
    options: MountCommandOptions,
    executor: Arc<E>,
    snapshot_service: Arc<MountSnapshotService<E>>,
}

impl<E: CommandExecutor> MountCommandService<E> {
    pub fn new(
        options: MountCommandOptions,
        executor: Arc<E>,
        snapshot_service: Arc<MountSnapshotService<E>>,
    ) -> Self {
        Self {
            options,
            executor,
            snapshot_service,
        }
    }

    fn command_for(&self, binary: &str, args: Vec<String>, kind: ActionKind) -> CommandRequest {
        if self.options.high_priority_kinds.contains(&kind)
            && !self.options.high_priority_wrapper.is_empty()
        {
            let mut full = self.options.high_priority_wrapper.clone();
            full.push(binary.to_string());
            full.extend(args);
            let file_name = full.remove(0);
            CommandRequest::new(file_name, full, self.options.command_timeout)
        } else {
            CommandRequest::new(binary.to_string(), args, self.options.command_timeout)
        }
    }

    pub async fn apply(&self, action: &ReconciliationAction) -> ApplyResult {
        match action.kind {
            ActionKind::Mount => self.do_mount(action).await,
            ActionKind::Remount => {
                let _ = self.do_lazy_unmount(action).await;
                self.do_mount(action).await
            }
            ActionKind::Unmount => self.do_unmount(action).await,
        }
    }

    fn mount_args(&self, action: &ReconciliationAction) -> Vec<String> {
        let options = mergerfs_options_with_threads(&self.options.mergerfs_options_base);
        let identity = action.desired_identity.clone().unwrap_or_default();
        let payload = action.mount_payload.clone().unwrap_or_default();
        vec![
            "-o".to_string(),
            format!("fsname={identity},{options}"),
            payload,
            action.mount_point.display().to_string(),
        ]
    }

    async fn do_mount(&self, action: &ReconciliationAction) -> ApplyResult {
        let request = self.command_for(
            &self.options.mergerfs_binary,
            self.mount_args(action),
            action.kind,
        );
        let result = self.executor.run(request).await;
        if !result.is_success() {
            return ApplyResult {
                action: action.clone(),
                outcome: ApplyOutcome::Failure,
                diagnostic: format!("mergerfs mount failed: {}", result.stderr),
            };
        }

        let snapshot = self.snapshot_service.capture().await;
        let mounted = snapshot
            .entries
            .iter()
            .any(|e| e.mount_point == action.mount_point && e.fs_type.contains("mergerfs"));
        if !mounted {
            return ApplyResult {
                action: action.clone(),
                outcome: ApplyOutcome::Failure,
                diagnostic: "mount point absent from fresh snapshot after mount".to_string(),
            };
        }

        let listing = self
            .executor
            .run(CommandRequest::new(
                "ls",
                vec!["-A".to_string(), action.mount_point.display().to_string()],
                self.options.readiness_timeout,
            ))
            .await;
        if !listing.is_success() || listing.stderr.contains("Transport endpoint is not connected")
        {
            return ApplyResult {
                action: action.clone(),
                outcome: ApplyOutcome::Failure,
                diagnostic: "mount point failed readiness listing".to_string(),
            };
        }

        ApplyResult {
            action: action.clone(),
            outcome: ApplyOutcome::Success,
            diagnostic: String::new(),
        }
    }

    async fn do_lazy_unmount(&self, action: &ReconciliationAction) -> ApplyResult {
        let request = self.command_for(
            &self.options.fusermount_binary,
            vec![
                "-u".to_string(),
                "-z".to_string(),
                action.mount_point.display().to_string(),
            ],
            action.kind,
        );
        let result = self.executor.run(request).await;
        ApplyResult {
            action: action.clone(),
            outcome: if result.is_success() {
                ApplyOutcome::Success
            } else {
                ApplyOutcome::Failure
            },
            diagnostic: result.stderr,
        }
    }

    async fn do_unmount(&self, action: &ReconciliationAction) -> ApplyResult {
        let request = self.command_for(
            &self.options.fusermount_binary,
            vec!["-u".to_string(), action.mount_point.display().to_string()],
            action.kind,
        );
        let result = self.executor.run(request).await;
        if result.is_success() {
            return ApplyResult {
                action: action.clone(),
                outcome: ApplyOutcome::Success,
                diagnostic: String::new(),
            };
        }
        let lower = result.stderr.to_ascii_lowercase();
        let busy = lower.contains("busy") || lower.contains("ebusy");
        ApplyResult {
            action: action.clone(),
            outcome: if busy {
                ApplyOutcome::Busy
            } else {
                ApplyOutcome::Failure
            },
            diagnostic: result.stderr,
        }
    }
}
