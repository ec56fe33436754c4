//! C13: captures the live set of mergerfs mounts by invoking an external
//! `findmnt`-equivalent and parsing its key-value output.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::executor::{CommandExecutor, CommandRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSnapshotEntry {
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub source: String,
    pub options: String,
    /// Health is not determined during snapshot capture — only [`crate::mount_command`]'s
    /// readiness probe asserts it during `apply`. A real snapshot therefore
    /// always reports `None` here; reconciliation treats `None` as healthy.
    pub is_healthy: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    NonFatal,
    DegradedVisibility,
}

#[derive(Debug, Clone)]
pub struct MountWarning {
    pub message: String,
    pub severity: WarningSeverity,
}

#[derive(Debug, Clone, Default)]
pub struct MountSnapshot {
    pub entries: Vec<MountSnapshotEntry>,
    pub warnings: Vec<MountWarning>,
}

impl MountSnapshot {
    pub fn has_degraded_visibility(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| w.severity == WarningSeverity::DegradedVisibility)
    }
}

#[derive(Debug, Clone)]
pub struct MountSnapshotOptions {
    pub command: String,
    pub arguments: Vec<String>,
    pub timeout: Duration,
}

pub struct MountSnapshotService<E: CommandExecutor> {
    options: MountSnapshotOptions,
    executor: Arc<E>,
}

impl<E: CommandExecutor> MountSnapshotService<E> {
    pub fn new(options: MountSnapshotOptions, executor: Arc<E>) -> Self {
        Self { options, executor }
    }

    pub async fn capture(&self) -> MountSnapshot {
        let request = CommandRequest::new(
            self.options.command.clone(),
            self.options.arguments.clone(),
            self.options.timeout,
        );
        let result = self.executor.run(request).await;

        if !result.is_success() {
            return MountSnapshot {
                entries: Vec::new(),
                warnings: vec![MountWarning {
                    message: format!(
                        "failed to capture mount snapshot: outcome={:?}",
                        result.outcome
                    ),
                    severity: WarningSeverity::DegradedVisibility,
                }],
            };
        }

        let mut entries = Vec::new();
        let mut warnings = Vec::new();
        for line in result.stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Some(entry) => entries.push(entry),
                None => warnings.push(MountWarning {
                    message: format!("could not parse mount snapshot line: {line}"),
                    severity: WarningSeverity::NonFatal,
                }),
            }
        }
        entries.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));

        MountSnapshot { entries, warnings }
    }
}

/// Parses a `TARGET=.. FSTYPE=.. SOURCE=.. OPTIONS=..` line. `OPTIONS` may
/// itself contain `=` (e.g. `threads=4`), so it consumes the remainder of
/// the line once encountered.
fn parse_line(line: &str) -> Option<MountSnapshotEntry> {
    let mut target = None;
    let mut fs_type = None;
    let mut source = None;
    let mut options = None;

    let mut rest = line;
    loop {
        let rest_trimmed = rest.trim_start();
        if rest_trimmed.is_empty() {
            break;
        }
        let (key, after_key) = rest_trimmed.split_once('=')?;
        if key.eq_ignore_ascii_case("OPTIONS") {
            options = Some(after_key.trim().to_string());
            break;
        }
        let (value, remainder) = match after_key.find(char::is_whitespace) {
            Some(idx) => (&after_key[..idx], &after_key[idx..]),
            None => (after_key, ""),
        };
        match key.to_ascii_uppercase().as_str() {
            "TARGET" => target = Some(PathBuf::from(value)),
            "FSTYPE" => fs_type = Some(value.to_string()),
            "SOURCE" => source = Some(value.to_string()),
            _ => {}
        }
        rest = remainder;
    }

    Some(MountSnapshotEntry {
        mount_point: target?,
        fs_type: fs_type.unwrap_or_default(),
        source: source.unwrap_or_default(),
        options: options.unwrap_or_default(),
        is_healthy: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandOutcome, CommandResult, FailureKind};
    use async_trait::async_trait;

    struct FakeExecutor {
        result: CommandResult,
    }

    #[async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn run(&self, _request: CommandRequest) -> CommandResult {
            self.result.clone()
        }
    }

    fn success_result(stdout: &str) -> CommandResult {
        CommandResult {
            outcome: CommandOutcome::Success,
            failure_kind: FailureKind::None,
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            elapsed: Duration::from_millis(5),
        }
    }

    fn options() -> MountSnapshotOptions {
        MountSnapshotOptions {
            command: "findmnt".to_string(),
            arguments: vec![],
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn command_failure_yields_empty_entries_and_degraded_warning() {
        let executor = Arc::new(FakeExecutor {
            result: CommandResult {
                outcome: CommandOutcome::NonZeroExit,
                failure_kind: FailureKind::None,
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "boom".to_string(),
                stdout_truncated: false,
                stderr_truncated: false,
                elapsed: Duration::from_millis(1),
            },
        });
        let service = MountSnapshotService::new(options(), executor);
        let snapshot = service.capture().await;
        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.warnings.len(), 1);
        assert!(snapshot.has_degraded_visibility());
    }

    #[tokio::test]
    async fn parses_well_formed_lines_sorted_by_mount_point() {
        let stdout = "TARGET=/m/TitleB FSTYPE=fuse.mergerfs SOURCE=id-b OPTIONS=ro,threads=1\n\
                       TARGET=/m/TitleA FSTYPE=fuse.mergerfs SOURCE=id-a OPTIONS=ro,threads=1\n";
        let executor = Arc::new(FakeExecutor {
            result: success_result(stdout),
        });
        let service = MountSnapshotService::new(options(), executor);
        let snapshot = service.capture().await;
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.entries[0].mount_point, PathBuf::from("/m/TitleA"));
        assert_eq!(snapshot.entries[1].mount_point, PathBuf::from("/m/TitleB"));
        assert!(snapshot.warnings.is_empty());
    }

    #[tokio::test]
    async fn malformed_line_yields_non_fatal_warning_and_is_skipped() {
        let stdout = "garbage line with no keys\nTARGET=/m/TitleA FSTYPE=fuse.mergerfs SOURCE=id-a OPTIONS=ro\n";
        let executor = Arc::new(FakeExecutor {
            result: success_result(stdout),
        });
        let service = MountSnapshotService::new(options(), executor);
        let snapshot = service.capture().await;
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.warnings.len(), 1);
        assert_eq!(snapshot.warnings[0].severity, WarningSeverity::NonFatal);
    }
}
