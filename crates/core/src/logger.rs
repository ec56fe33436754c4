//! Narrow logging capability consumed by every component that needs to
//! surface a diagnostic. Kept dyn-compatible so the composition root can pick
//! a concrete backend (tracing, in the daemon binary) without the core crate
//! depending on it, matching the "narrow capability interface" guidance for
//! external collaborators.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Normal,
    Warning,
    Error,
}

/// A single ordinal-keyed context entry. Context is optional; its absence
/// never degrades the log payload.
pub type LogContext<'a> = &'a [(&'a str, &'a str)];

pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, event_id: &str, message: &str, context: LogContext<'_>);
}

impl fmt::Debug for dyn Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Logger")
    }
}

/// Logger that discards everything. Used in tests and as a safe default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: LogLevel, _event_id: &str, _message: &str, _context: LogContext<'_>) {}
}
