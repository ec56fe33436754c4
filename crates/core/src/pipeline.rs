//! C7: tick-driven orchestrator. Pulls C2, routes events into C5 and C6,
//! runs scheduled rename process/rescan passes, and dispatches C6. The sole
//! owner of the mutable `seen_sources` / `seen_source_manga` sets.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::coalescer::{DispatchOutcome, MergeScanCoalescer, MergeScanHandler};
use crate::events::{EventMask, InotifyReader, PollOutcome};
use crate::fsadapter::FilesystemAdapter;
use crate::logger::{LogLevel, Logger};
use crate::path;
use crate::rename_processor::RenameQueueProcessor;
use crate::rename_queue::UnixSeconds;

#[derive(Debug, Clone)]
pub struct TriggerPipelineOptions {
    pub sources_root: PathBuf,
    pub override_root: PathBuf,
    pub inotify_poll_timeout: Duration,
    pub rename_poll_interval: Duration,
    pub rename_rescan_interval: Duration,
    pub merge_interval: Duration,
    pub startup_rescan_enabled: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    pub poll_outcome: Option<PollOutcome>,
    pub events_routed: usize,
    pub rename_process_runs: u32,
    pub rename_rescan_runs: u32,
    pub merge_dispatch_outcome: Option<DispatchOutcome>,
}

/// A single point in wall-clock time, expressed both as a monotonic
/// [`Instant`] (for the pipeline's own gating) and a Unix timestamp (for
/// rename-queue `allow_at` bookkeeping, which must survive process
/// restarts). The two must advance together; callers own a single clock.
#[derive(Debug, Clone, Copy)]
pub struct TickClock {
    pub now: Instant,
    pub now_unix: UnixSeconds,
}

pub struct TriggerPipeline<FS: FilesystemAdapter> {
    options: TriggerPipelineOptions,
    rename_processor: Arc<RenameQueueProcessor<FS>>,
    coalescer: Arc<MergeScanCoalescer>,
    logger: Arc<dyn Logger>,
    seen_sources: HashSet<String>,
    seen_source_manga: HashSet<(String, String)>,
    next_rename_process: Option<Instant>,
    next_rename_rescan: Option<Instant>,
    next_merge_interval_request: Option<Instant>,
    startup_rescan_done: bool,
}

impl<FS: FilesystemAdapter> TriggerPipeline<FS> {
    pub fn new(
        options: TriggerPipelineOptions,
        rename_processor: Arc<RenameQueueProcessor<FS>>,
        coalescer: Arc<MergeScanCoalescer>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            options,
            rename_processor,
            coalescer,
            logger,
            seen_sources: HashSet::new(),
            seen_source_manga: HashSet::new(),
            next_rename_process: None,
            next_rename_rescan: None,
            next_merge_interval_request: None,
            startup_rescan_done: false,
        }
    }

    fn ensure_schedule_initialized(&mut self, clock: TickClock) {
        if self.next_rename_process.is_none() {
            self.next_rename_process = Some(clock.now);
            self.next_rename_rescan = Some(clock.now + self.options.rename_rescan_interval);
            self.next_merge_interval_request = Some(clock.now + self.options.merge_interval);
        }
    }

    pub async fn tick<IR, H>(
        &mut self,
        clock: TickClock,
        cancel: &CancellationToken,
        reader: &IR,
        handler: &H,
    ) -> TickSummary
    where
        IR: InotifyReader,
        H: MergeScanHandler,
    {
        let mut summary = TickSummary::default();
        self.ensure_schedule_initialized(clock);

        if cancel.is_cancelled() {
            return summary;
        }

        let poll = reader
            .poll(
                &[self.options.sources_root.clone(), self.options.override_root.clone()],
                self.options.inotify_poll_timeout,
            )
            .await;
        summary.poll_outcome = Some(poll.outcome);
        for warning in &poll.warnings {
            self.logger.log(
                LogLevel::Warning,
                "watcher.inotify.warning",
                warning,
                &[],
            );
        }

        for event in &poll.events {
            if self.route_event(event, clock.now_unix) {
                summary.events_routed += 1;
            }
        }

        if self.options.startup_rescan_enabled && !self.startup_rescan_done {
            self.rename_processor.rescan_and_enqueue(clock.now_unix);
            self.startup_rescan_done = true;
        }

        while clock.now >= self.next_rename_process.unwrap() {
            self.rename_processor.process_once(clock.now_unix);
            summary.rename_process_runs += 1;
            self.next_rename_process = Some(
                self.next_rename_process.unwrap() + self.options.rename_poll_interval,
            );
            if self.options.rename_poll_interval.is_zero() {
                break;
            }
        }

        while clock.now >= self.next_rename_rescan.unwrap() {
            self.rename_processor.rescan_and_enqueue(clock.now_unix);
            summary.rename_rescan_runs += 1;
            self.next_rename_rescan = Some(
                self.next_rename_rescan.unwrap() + self.options.rename_rescan_interval,
            );
            if self.options.rename_rescan_interval.is_zero() {
                break;
            }
        }

        if clock.now >= self.next_merge_interval_request.unwrap() {
            self.coalescer.request_scan("interval elapsed", false);
            self.next_merge_interval_request = Some(
                self.next_merge_interval_request.unwrap() + self.options.merge_interval,
            );
        }

        if cancel.is_cancelled() {
            return summary;
        }
        let dispatch_outcome = self.coalescer.dispatch_pending(clock.now, handler).await;
        summary.merge_dispatch_outcome = Some(dispatch_outcome);

        let events_routed = summary.events_routed.to_string();
        let rename_process_runs = summary.rename_process_runs.to_string();
        let rename_rescan_runs = summary.rename_rescan_runs.to_string();
        self.logger.log(
            LogLevel::Debug,
            "watcher.tick.summary",
            "tick completed",
            &[
                ("poll_outcome", poll_outcome_label(summary.poll_outcome)),
                ("events_routed", &events_routed),
                ("rename_process_runs", &rename_process_runs),
                ("rename_rescan_runs", &rename_rescan_runs),
                ("merge_dispatch_outcome", dispatch_outcome_label(summary.merge_dispatch_outcome)),
            ],
        );

        summary
    }

    /// Routes one filesystem event into the rename queue and/or the merge
    /// coalescer per the table in §4.7. Returns whether the event matched
    /// any routing rule (used only for summary counts).
    fn route_event(&mut self, event: &crate::events::FsEvent, now_unix: UnixSeconds) -> bool {
        if let Some(rel) = path::try_relativize(&self.options.override_root, &event.path) {
            let segments = path::split_segments(&rel);
            let Some(title) = segments.first() else {
                return false;
            };
            let force_mask = EventMask::CLOSE_WRITE
                | EventMask::ATTRIB
                | EventMask::CREATE
                | EventMask::MOVED_TO;
            if event.mask.intersects(force_mask) {
                self.coalescer
                    .request_scan(format!("override-force:{title}"), true);
            } else {
                self.coalescer.request_scan(format!("override:{title}"), false);
            }
            return true;
        }

        let Some(rel) = path::try_relativize(&self.options.sources_root, &event.path) else {
            return false;
        };
        if !event.is_directory {
            return false;
        }
        let delete_mask = EventMask::DELETE | EventMask::MOVED_FROM;
        if event.mask.intersects(delete_mask) {
            return false;
        }
        let segments = path::split_segments(&rel);
        match segments.len() {
            1 => {
                let source = segments[0].clone();
                self.seen_sources.insert(source.clone());
                self.rename_processor
                    .enqueue_chapters_under_source_path(&event.path, now_unix);
                self.coalescer
                    .request_scan(format!("new-source:{source}"), false);
                true
            }
            2 => {
                let source = segments[0].clone();
                let manga = segments[1].clone();
                self.seen_source_manga.insert((source.clone(), manga.clone()));
                self.rename_processor
                    .enqueue_chapters_under_manga_path(&event.path, now_unix);
                self.coalescer
                    .request_scan(format!("new-manga:{source}/{manga}"), false);
                true
            }
            3 => {
                let source = segments[0].clone();
                let manga = segments[1].clone();
                self.rename_processor.enqueue_chapter_path(&event.path, now_unix);
                let newly_seen = !self.seen_sources.contains(&source)
                    || !self
                        .seen_source_manga
                        .contains(&(source.clone(), manga.clone()));
                if newly_seen {
                    self.coalescer.request_scan(
                        format!("chapter-implied-new:{source}/{manga}"),
                        false,
                    );
                } else if event.mask.intersects(EventMask::CREATE | EventMask::MOVED_TO) {
                    self.coalescer
                        .request_scan(format!("chapter-newdir:{source}/{manga}"), false);
                }
                true
            }
            _ => false,
        }
    }
}

fn poll_outcome_label(outcome: Option<PollOutcome>) -> &'static str {
    match outcome {
        None => "none",
        Some(PollOutcome::Success) => "success",
        Some(PollOutcome::TimedOut) => "timed_out",
        Some(PollOutcome::ToolNotFound) => "tool_not_found",
        Some(PollOutcome::CommandFailed) => "command_failed",
    }
}

fn dispatch_outcome_label(outcome: Option<DispatchOutcome>) -> &'static str {
    match outcome {
        None => "none",
        Some(DispatchOutcome::NoPendingRequest) => "no_pending_request",
        Some(DispatchOutcome::SkippedDueToMinInterval) => "skipped_due_to_min_interval",
        Some(DispatchOutcome::SkippedDueToRetryDelay) => "skipped_due_to_retry_delay",
        Some(DispatchOutcome::Success) => "success",
        Some(DispatchOutcome::Busy) => "busy",
        Some(DispatchOutcome::Mixed) => "mixed",
        Some(DispatchOutcome::Failure) => "failure",
        Some(DispatchOutcome::Cancelled) => "cancelled",
    }
}
