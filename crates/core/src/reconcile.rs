//! C14: diffs desired vs. observed mounts into an ordered action plan.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::mount_snapshot::MountSnapshot;
use crate::path::PathComparison;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredMount {
    pub mount_point: PathBuf,
    pub desired_identity: String,
    pub mount_payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Mount,
    Remount,
    Unmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionReason {
    MissingMount,
    IdentityMismatch,
    UnhealthyMount,
    StaleMount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationAction {
    pub kind: ActionKind,
    pub mount_point: PathBuf,
    pub desired_identity: Option<String>,
    pub mount_payload: Option<String>,
    pub reason: ActionReason,
}

fn action_order(kind: ActionKind) -> u8 {
    match kind {
        ActionKind::Unmount => 0,
        ActionKind::Remount => 1,
        ActionKind::Mount => 2,
    }
}

/// `merged_root` scopes which observed mounts are eligible for `Unmount`:
/// only mergerfs mounts under the merged root that the daemon manages are
/// ever torn down, never arbitrary host mounts `findmnt` happens to report.
pub fn reconcile(
    desired: &[DesiredMount],
    observed: &MountSnapshot,
    merged_root: &std::path::Path,
) -> Vec<ReconciliationAction> {
    let cmp = PathComparison;
    let observed_by_point: HashMap<String, &crate::mount_snapshot::MountSnapshotEntry> = observed
        .entries
        .iter()
        .map(|e| (cmp.key(&e.mount_point), e))
        .collect();
    let desired_points: std::collections::HashSet<String> =
        desired.iter().map(|d| cmp.key(&d.mount_point)).collect();

    let mut actions = Vec::new();

    for d in desired {
        let key = cmp.key(&d.mount_point);
        match observed_by_point.get(&key) {
            None => actions.push(ReconciliationAction {
                kind: ActionKind::Mount,
                mount_point: d.mount_point.clone(),
                desired_identity: Some(d.desired_identity.clone()),
                mount_payload: Some(d.mount_payload.clone()),
                reason: ActionReason::MissingMount,
            }),
            Some(entry) => {
                if entry.source != d.desired_identity {
                    actions.push(ReconciliationAction {
                        kind: ActionKind::Remount,
                        mount_point: d.mount_point.clone(),
                        desired_identity: Some(d.desired_identity.clone()),
                        mount_payload: Some(d.mount_payload.clone()),
                        reason: ActionReason::IdentityMismatch,
                    });
                } else if entry.is_healthy == Some(false) {
                    actions.push(ReconciliationAction {
                        kind: ActionKind::Remount,
                        mount_point: d.mount_point.clone(),
                        desired_identity: Some(d.desired_identity.clone()),
                        mount_payload: Some(d.mount_payload.clone()),
                        reason: ActionReason::UnhealthyMount,
                    });
                }
            }
        }
    }

    if !observed.has_degraded_visibility() {
        for entry in &observed.entries {
            if crate::path::try_relativize(merged_root, &entry.mount_point).is_none() {
                continue;
            }
            let key = cmp.key(&entry.mount_point);
            if !desired_points.contains(&key) {
                actions.push(ReconciliationAction {
                    kind: ActionKind::Unmount,
                    mount_point: entry.mount_point.clone(),
                    desired_identity: None,
                    mount_payload: None,
                    reason: ActionReason::StaleMount,
                });
            }
        }
    }

    actions.sort_by(|a, b| {
        action_order(a.kind)
            .cmp(&action_order(b.kind))
            .then_with(|| a.mount_point.cmp(&b.mount_point))
    });

    actions
}
