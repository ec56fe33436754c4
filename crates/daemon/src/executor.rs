//! Real [`sourcemerge_core::executor::CommandExecutor`]: spawns child processes with
//! bounded stdout/stderr capture and a timeout, exactly the plumbing
//! spec.md §1 calls out as "deliberately out of scope" for the core.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::Command;

use sourcemerge_core::executor::{CommandExecutor, CommandOutcome, CommandRequest, CommandResult, FailureKind};

#[derive(Debug, Default)]
pub struct ProcessCommandExecutor;

async fn read_bounded<R: tokio::io::AsyncRead + Unpin>(
    reader: R,
    max_characters: usize,
) -> (String, bool) {
    let mut reader = BufReader::new(reader);
    let mut buf = String::new();
    let mut truncated = false;
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&chunk[..n]);
                if buf.chars().count() + text.chars().count() > max_characters {
                    let remaining = max_characters.saturating_sub(buf.chars().count());
                    buf.extend(text.chars().take(remaining));
                    truncated = true;
                    break;
                }
                buf.push_str(&text);
            }
            Err(_) => break,
        }
    }
    // Drain whatever's left so the child isn't blocked writing to a full pipe.
    if truncated {
        let mut sink = Vec::new();
        let _ = reader.read_to_end(&mut sink).await;
    }
    (buf, truncated)
}

#[async_trait]
impl CommandExecutor for ProcessCommandExecutor {
    async fn run(&self, request: CommandRequest) -> CommandResult {
        let started = Instant::now();

        let mut command = Command::new(&request.file_name);
        command
            .args(&request.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CommandResult {
                    outcome: CommandOutcome::StartFailed,
                    failure_kind: FailureKind::ToolNotFound,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    stdout_truncated: false,
                    stderr_truncated: false,
                    elapsed: started.elapsed(),
                };
            }
            Err(e) => {
                return CommandResult {
                    outcome: CommandOutcome::StartFailed,
                    failure_kind: FailureKind::StartFailure,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    stdout_truncated: false,
                    stderr_truncated: false,
                    elapsed: started.elapsed(),
                };
            }
        };

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let output = tokio::time::timeout(request.timeout, async {
            let (stdout_result, stderr_result, status) = tokio::join!(
                read_bounded(stdout, request.max_output_characters),
                read_bounded(stderr, request.max_output_characters),
                child.wait(),
            );
            (stdout_result, stderr_result, status)
        })
        .await;

        let elapsed = started.elapsed();

        match output {
            Ok((stdout_result, stderr_result, status_result)) => {
                let (stdout, stdout_truncated) = stdout_result;
                let (stderr, stderr_truncated) = stderr_result;
                match status_result {
                    Ok(status) => CommandResult {
                        outcome: if status.success() {
                            CommandOutcome::Success
                        } else {
                            CommandOutcome::NonZeroExit
                        },
                        failure_kind: FailureKind::None,
                        exit_code: status.code(),
                        stdout,
                        stderr,
                        stdout_truncated,
                        stderr_truncated,
                        elapsed,
                    },
                    Err(e) => CommandResult {
                        outcome: CommandOutcome::StartFailed,
                        failure_kind: FailureKind::StartFailure,
                        exit_code: None,
                        stdout,
                        stderr: e.to_string(),
                        stdout_truncated,
                        stderr_truncated,
                        elapsed,
                    },
                }
            }
            Err(_timed_out) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                CommandResult {
                    outcome: CommandOutcome::TimedOut,
                    failure_kind: FailureKind::None,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    stdout_truncated: false,
                    stderr_truncated: false,
                    elapsed,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_true_successfully() {
        let executor = ProcessCommandExecutor;
        let result = executor
            .run(CommandRequest::new("true", vec![], Duration::from_secs(5)))
            .await;
        assert_eq!(result.outcome, CommandOutcome::Success);
    }

    #[tokio::test]
    async fn nonexistent_binary_is_tool_not_found() {
        let executor = ProcessCommandExecutor;
        let result = executor
            .run(CommandRequest::new(
                "sourcemerge-does-not-exist",
                vec![],
                Duration::from_secs(5),
            ))
            .await;
        assert_eq!(result.outcome, CommandOutcome::StartFailed);
        assert_eq!(result.failure_kind, FailureKind::ToolNotFound);
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let executor = ProcessCommandExecutor;
        let result = executor
            .run(CommandRequest::new(
                "sleep",
                vec!["5".to_string()],
                Duration::from_millis(50),
            ))
            .await;
        assert_eq!(result.outcome, CommandOutcome::TimedOut);
    }
}
