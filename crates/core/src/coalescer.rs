//! C6: keeps a single latest-wins pending merge-scan request and gates
//! dispatch by min-interval and retry-delay.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct PendingRequest {
    reason: String,
    force: bool,
    version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Success,
    Busy,
    Mixed,
    Failure,
}

/// Marker returned by a handler that observed cooperative cancellation.
/// Distinct from `HandlerOutcome::Failure`: cancellation must never mark the
/// pending request consumed or touch the retry/min-interval timers.
#[derive(Debug, Clone, Copy)]
pub struct Cancelled;

#[async_trait]
pub trait MergeScanHandler: Send + Sync {
    async fn run(&self, reason: &str, force: bool) -> Result<HandlerOutcome, Cancelled>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    NoPendingRequest,
    SkippedDueToMinInterval,
    SkippedDueToRetryDelay,
    Success,
    Busy,
    Mixed,
    Failure,
    Cancelled,
}

struct CoalescerState {
    pending: Option<PendingRequest>,
    dispatch_in_progress: bool,
    last_success: Option<Instant>,
    next_retry: Option<Instant>,
    version_counter: u64,
}

pub struct MergeScanCoalescer {
    state: Mutex<CoalescerState>,
    min_interval: Duration,
    retry_delay: Duration,
}

impl MergeScanCoalescer {
    pub fn new(min_interval: Duration, retry_delay: Duration) -> Self {
        Self {
            state: Mutex::new(CoalescerState {
                pending: None,
                dispatch_in_progress: false,
                last_success: None,
                next_retry: None,
                version_counter: 0,
            }),
            min_interval,
            retry_delay,
        }
    }

    /// Overwrites the pending request's reason and force, bumping its
    /// version. Latest write wins: earlier reasons/forces are discarded the
    /// moment a newer call lands, even before any dispatch consumes them.
    pub fn request_scan(&self, reason: impl Into<String>, force: bool) {
        let mut s = self.state.lock();
        s.version_counter += 1;
        let version = s.version_counter;
        let reason = reason.into();
        s.pending = Some(PendingRequest {
            reason,
            force,
            version,
        });
    }

    pub fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    pub async fn dispatch_pending<H: MergeScanHandler>(
        &self,
        now: Instant,
        handler: &H,
    ) -> DispatchOutcome {
        let captured = {
            let mut s = self.state.lock();
            let Some(pending) = s.pending.clone() else {
                return DispatchOutcome::NoPendingRequest;
            };
            if s.dispatch_in_progress {
                return DispatchOutcome::Busy;
            }
            if let Some(next_retry) = s.next_retry {
                if now < next_retry {
                    return DispatchOutcome::SkippedDueToRetryDelay;
                }
            }
            if let Some(last_success) = s.last_success {
                if now.duration_since(last_success) < self.min_interval {
                    return DispatchOutcome::SkippedDueToMinInterval;
                }
            }
            s.dispatch_in_progress = true;
            pending
        };

        let handler_result = handler.run(&captured.reason, captured.force).await;

        let mut s = self.state.lock();
        s.dispatch_in_progress = false;

        match handler_result {
            Ok(HandlerOutcome::Success) => {
                if let Some(p) = &s.pending {
                    if p.version == captured.version {
                        s.pending = None;
                    }
                }
                s.last_success = Some(now);
                s.next_retry = None;
                DispatchOutcome::Success
            }
            Ok(outcome @ (HandlerOutcome::Busy | HandlerOutcome::Mixed | HandlerOutcome::Failure)) => {
                s.next_retry = Some(now + self.retry_delay);
                match outcome {
                    HandlerOutcome::Busy => DispatchOutcome::Busy,
                    HandlerOutcome::Mixed => DispatchOutcome::Mixed,
                    HandlerOutcome::Failure => DispatchOutcome::Failure,
                    HandlerOutcome::Success => unreachable!(),
                }
            }
            Err(Cancelled) => DispatchOutcome::Cancelled,
        }
    }
}
