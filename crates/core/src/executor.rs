//! Contract for the external command executor (§6). The core never spawns
//! processes itself; `mergerfs`, `findmnt`, and `fusermount` invocations are
//! all routed through this trait so the daemon binary owns the actual
//! process-spawn/bounded-output/timeout plumbing.

use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub file_name: String,
    pub arguments: Vec<String>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub max_output_characters: usize,
}

impl CommandRequest {
    pub fn new(file_name: impl Into<String>, arguments: Vec<String>, timeout: Duration) -> Self {
        Self {
            file_name: file_name.into(),
            arguments,
            timeout,
            poll_interval: Duration::from_millis(50),
            max_output_characters: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    NonZeroExit,
    TimedOut,
    Cancelled,
    StartFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    None,
    ToolNotFound,
    StartFailure,
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub outcome: CommandOutcome,
    pub failure_kind: FailureKind,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub elapsed: Duration,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        self.outcome == CommandOutcome::Success
    }
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, request: CommandRequest) -> CommandResult;
}
