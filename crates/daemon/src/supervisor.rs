//! Single-instance lockfile, signal-driven shutdown, and the tick loop that
//! drives [`sourcemerge_core::pipeline::TriggerPipeline`] and [`sourcemerge_core::merge_workflow::MergeWorkflow`]
//! across the daemon's lifetime. Grounded in the teacher's `spawn_service`
//! composition pattern (`app/src/ops/daemon.rs`, `app/src/daemon/state.rs`):
//! load config, assemble state, hand off to a long-running async loop.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use nix::fcntl::{flock, FlockArg};
use tokio_util::sync::CancellationToken;

use sourcemerge_core::coalescer::{HandlerOutcome, MergeScanHandler};
use sourcemerge_core::fsadapter::FilesystemAdapter;
use sourcemerge_core::logger::{LogLevel, Logger};
use sourcemerge_core::pipeline::{TickClock, TriggerPipeline};

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub lockfile_path: PathBuf,
    pub stop_timeout: Duration,
    pub tick_interval: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("another instance is already running (lockfile {0} is held)")]
    AlreadyRunning(PathBuf),
    #[error("failed to acquire lockfile {path}: {source}")]
    Lockfile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("shutdown did not complete within the configured stop timeout")]
    StopTimeout,
}

/// Holds the single-instance lockfile for the process lifetime; released on
/// drop.
pub struct InstanceLock {
    path: PathBuf,
    _file: std::fs::File,
}

impl InstanceLock {
    pub fn acquire(path: &std::path::Path) -> Result<Self, SupervisorError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| SupervisorError::Lockfile {
                path: path.to_path_buf(),
                source,
            })?;

        flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock)
            .map_err(|_| SupervisorError::AlreadyRunning(path.to_path_buf()))?;

        file.set_len(0).ok();
        let _ = write!(file, "{}", std::process::id());

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Waits for SIGINT or SIGTERM and cancels `token` once either arrives.
async fn wait_for_shutdown_signal(token: CancellationToken, logger: Arc<dyn Logger>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                logger.log(
                    LogLevel::Error,
                    "supervisor.signal.install_failed",
                    &format!("failed to install SIGTERM handler: {e}"),
                    &[],
                );
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    logger.log(
        LogLevel::Normal,
        "supervisor.shutdown.requested",
        "shutdown signal received",
        &[],
    );
    token.cancel();
}

/// Drives [`TriggerPipeline::tick`] on `options.tick_interval` until the
/// cancellation token fires, then waits up to `stop_timeout` for the
/// in-flight tick to finish before returning.
pub async fn run<FS, IR, H>(
    options: SupervisorOptions,
    mut pipeline: TriggerPipeline<FS>,
    reader: IR,
    handler: H,
    logger: Arc<dyn Logger>,
) -> Result<(), SupervisorError>
where
    FS: FilesystemAdapter,
    IR: sourcemerge_core::events::InotifyReader,
    H: MergeScanHandler,
{
    let _lock = InstanceLock::acquire(&options.lockfile_path)?;

    let cancel = CancellationToken::new();
    let signal_task = tokio::spawn(wait_for_shutdown_signal(cancel.clone(), logger.clone()));

    let mut interval = tokio::time::interval(options.tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let clock = TickClock {
                    now: Instant::now(),
                    now_unix: unix_now(),
                };
                let _summary = pipeline.tick(clock, &cancel, &reader, &handler).await;
            }
        }
    }

    let shutdown = tokio::time::timeout(options.stop_timeout, async {
        // The loop above already stopped issuing new ticks; this just gives
        // any cooperative in-flight work one more beat to observe `cancel`.
        tokio::task::yield_now().await;
    })
    .await;

    signal_task.abort();

    logger.log(
        LogLevel::Normal,
        "supervisor.shutdown.complete",
        "daemon stopped",
        &[],
    );

    shutdown.map_err(|_| SupervisorError::StopTimeout)
}

/// A [`MergeScanHandler`] that runs one [`sourcemerge_core::merge_workflow::MergeWorkflow`]
/// pass per dispatch, translating [`sourcemerge_core::merge_workflow::PassOutcome`] into
/// the coalescer's [`HandlerOutcome`] vocabulary.
pub struct MergeWorkflowHandler<FS, E>
where
    FS: FilesystemAdapter,
    E: sourcemerge_core::executor::CommandExecutor,
{
    workflow: Arc<sourcemerge_core::merge_workflow::MergeWorkflow<FS, E>>,
}

impl<FS, E> MergeWorkflowHandler<FS, E>
where
    FS: FilesystemAdapter,
    E: sourcemerge_core::executor::CommandExecutor,
{
    pub fn new(workflow: Arc<sourcemerge_core::merge_workflow::MergeWorkflow<FS, E>>) -> Self {
        Self { workflow }
    }
}

#[async_trait::async_trait]
impl<FS, E> MergeScanHandler for MergeWorkflowHandler<FS, E>
where
    FS: FilesystemAdapter,
    E: sourcemerge_core::executor::CommandExecutor,
{
    async fn run(
        &self,
        _reason: &str,
        _force: bool,
    ) -> Result<HandlerOutcome, sourcemerge_core::coalescer::Cancelled> {
        let cancel = CancellationToken::new();
        let summary = self.workflow.run(&cancel).await;
        Ok(match summary.outcome {
            sourcemerge_core::merge_workflow::PassOutcome::Success => HandlerOutcome::Success,
            sourcemerge_core::merge_workflow::PassOutcome::Busy => HandlerOutcome::Busy,
            sourcemerge_core::merge_workflow::PassOutcome::Mixed => HandlerOutcome::Mixed,
            sourcemerge_core::merge_workflow::PassOutcome::Failure => HandlerOutcome::Failure,
        })
    }
}
