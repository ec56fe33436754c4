//! C16: top-level merge pass binding C8–C15 together per tick.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::branch_plan::{self, BranchPlan, BranchPlannerInput};
use crate::branch_stage::{cleanup_stale_branch_directories, stage_branch_links};
use crate::equivalence::{normalized_title_key, EquivalenceCatalog};
use crate::executor::CommandExecutor;
use crate::fsadapter::{EntryKind, FilesystemAdapter};
use crate::logger::{LogLevel, Logger};
use crate::mount_command::{ApplyOutcome, ApplyResult, MountCommandService};
use crate::mount_snapshot::MountSnapshotService;
use crate::priority::PriorityService;
use crate::reconcile::{self, ActionKind, DesiredMount};
use crate::volumes;

#[derive(Debug, Clone)]
pub struct MergeWorkflowOptions {
    pub sources_root: PathBuf,
    pub override_root: PathBuf,
    pub merged_root: PathBuf,
    pub branch_links_root: PathBuf,
    pub max_consecutive_mount_failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Success,
    Busy,
    Mixed,
    Failure,
}

#[derive(Debug, Clone)]
pub struct PassSummary {
    pub outcome: PassOutcome,
    pub titles_considered: usize,
    pub apply_results: Vec<ApplyResult>,
    pub warnings: Vec<String>,
    pub aborted_due_to_failures: bool,
}

pub struct MergeWorkflow<FS: FilesystemAdapter, E: CommandExecutor> {
    options: MergeWorkflowOptions,
    fs: Arc<FS>,
    equivalence: Arc<EquivalenceCatalog>,
    priority: Arc<PriorityService>,
    mount_snapshot: Arc<MountSnapshotService<E>>,
    mount_command: Arc<MountCommandService<E>>,
    logger: Arc<dyn Logger>,
}

impl<FS: FilesystemAdapter, E: CommandExecutor> MergeWorkflow<FS, E> {
    pub fn new(
        options: MergeWorkflowOptions,
        fs: Arc<FS>,
        equivalence: Arc<EquivalenceCatalog>,
        priority: Arc<PriorityService>,
        mount_snapshot: Arc<MountSnapshotService<E>>,
        mount_command: Arc<MountCommandService<E>>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            options,
            fs,
            equivalence,
            priority,
            mount_snapshot,
            mount_command,
            logger,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> PassSummary {
        let discovery = volumes::discover(&*self.fs, &self.options.sources_root, &self.options.override_root);
        let mut warnings = discovery.warnings.clone();

        if discovery.source_volume_paths.is_empty() && discovery.override_volume_paths.is_empty() {
            warnings.push("merge pass skipped: no source or override volumes found".to_string());
            return PassSummary {
                outcome: PassOutcome::Success,
                titles_considered: 0,
                apply_results: Vec::new(),
                warnings,
                aborted_due_to_failures: false,
            };
        }

        let canonical_titles = self.discover_canonical_titles(&discovery);

        if cancel.is_cancelled() {
            return PassSummary {
                outcome: PassOutcome::Success,
                titles_considered: 0,
                apply_results: Vec::new(),
                warnings,
                aborted_due_to_failures: false,
            };
        }

        let mut plans: Vec<(String, BranchPlan)> = Vec::new();
        for canonical_title in &canonical_titles {
            let equivalent_titles = self
                .equivalence
                .try_get_equivalent_titles(canonical_title)
                .unwrap_or_else(|| vec![canonical_title.clone()]);
            let plan = branch_plan::plan(
                &*self.fs,
                &self.priority,
                BranchPlannerInput {
                    canonical_title,
                    equivalent_titles: &equivalent_titles,
                    source_volume_paths: &discovery.source_volume_paths,
                    override_volume_paths: &discovery.override_volume_paths,
                    branch_links_root: &self.options.branch_links_root,
                },
            );
            plans.push((canonical_title.clone(), plan));
        }

        let mut active_branch_dirs = Vec::with_capacity(plans.len());
        for (title, plan) in &plans {
            if let Err(e) = stage_branch_links(&*self.fs, plan) {
                warnings.push(format!("failed to stage branch links for {title}: {e}"));
                continue;
            }
            active_branch_dirs.push(plan.branch_directory_path.clone());
        }
        if let Err(e) = cleanup_stale_branch_directories(
            &*self.fs,
            &self.options.branch_links_root,
            &active_branch_dirs,
        ) {
            warnings.push(format!("failed to clean up stale branch directories: {e}"));
        }

        if cancel.is_cancelled() {
            return PassSummary {
                outcome: PassOutcome::Success,
                titles_considered: plans.len(),
                apply_results: Vec::new(),
                warnings,
                aborted_due_to_failures: false,
            };
        }

        let snapshot = self.mount_snapshot.capture().await;
        let desired: Vec<DesiredMount> = plans
            .iter()
            .map(|(title, plan)| DesiredMount {
                mount_point: self.options.merged_root.join(title),
                desired_identity: plan.desired_identity.clone(),
                mount_payload: plan.branch_specification.clone(),
            })
            .collect();
        let actions = reconcile::reconcile(&desired, &snapshot, &self.options.merged_root);

        let mut apply_results = Vec::new();
        let mut consecutive_mount_failures = 0u32;
        let mut aborted_due_to_failures = false;

        for action in &actions {
            if cancel.is_cancelled() {
                break;
            }
            let result = self.mount_command.apply(action).await;
            let is_mount_like = matches!(action.kind, ActionKind::Mount | ActionKind::Remount);
            match result.outcome {
                ApplyOutcome::Failure if is_mount_like => {
                    consecutive_mount_failures += 1;
                }
                _ => consecutive_mount_failures = 0,
            }
            apply_results.push(result);
            if consecutive_mount_failures >= self.options.max_consecutive_mount_failures
                && self.options.max_consecutive_mount_failures > 0
            {
                aborted_due_to_failures = true;
                break;
            }
        }

        let outcome = classify_outcome(&apply_results);

        for warning in &warnings {
            self.logger.log(LogLevel::Warning, "merge.workflow.warning", warning, &[]);
        }

        PassSummary {
            outcome,
            titles_considered: plans.len(),
            apply_results,
            warnings,
            aborted_due_to_failures,
        }
    }

    fn discover_canonical_titles(&self, discovery: &volumes::VolumeDiscovery) -> Vec<String> {
        let mut by_key: HashMap<String, String> = HashMap::new();

        for volume in &discovery.source_volume_paths {
            let Ok(children) = self.fs.read_dir(volume) else {
                continue;
            };
            for child in children {
                if self.fs.entry_kind(&child) != EntryKind::Directory {
                    continue;
                }
                let leaf = child
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let canonical = self.equivalence.resolve_canonical_or_input(&leaf);
                by_key
                    .entry(normalized_title_key(&canonical))
                    .or_insert(canonical);
            }
        }

        for volume in &discovery.override_volume_paths {
            let Ok(children) = self.fs.read_dir(volume) else {
                continue;
            };
            for child in children {
                if self.fs.entry_kind(&child) != EntryKind::Directory {
                    continue;
                }
                let leaf = child
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                by_key.entry(normalized_title_key(&leaf)).or_insert(leaf);
            }
        }

        let mut titles: Vec<String> = by_key.into_values().collect();
        titles.sort();
        titles
    }
}

fn classify_outcome(results: &[ApplyResult]) -> PassOutcome {
    if results.is_empty() {
        return PassOutcome::Success;
    }
    let has_failure = results.iter().any(|r| r.outcome == ApplyOutcome::Failure);
    let has_busy = results.iter().any(|r| r.outcome == ApplyOutcome::Busy);
    let all_success = results.iter().all(|r| r.outcome == ApplyOutcome::Success);
    let all_failure = results.iter().all(|r| r.outcome == ApplyOutcome::Failure);

    if all_success {
        PassOutcome::Success
    } else if all_failure {
        PassOutcome::Failure
    } else if has_busy && !has_failure {
        PassOutcome::Busy
    } else {
        PassOutcome::Mixed
    }
}
