//! `tracing`-backed implementation of [`sourcemerge_core::logger::Logger`] plus
//! subscriber initialization (env-filter + fmt layer).

use sourcemerge_core::logger::{LogContext, LogLevel, Logger};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initializes the global `tracing` subscriber. `default_filter` is used
/// when `RUST_LOG` is unset, matching the teacher's `ferrex_server=debug`
/// style fallback.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter.to_string()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Bridges the core's narrow [`Logger`] trait onto `tracing`'s macros, so
/// `crates/core` never links against `tracing` directly.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, event_id: &str, message: &str, context: LogContext<'_>) {
        let fields: String = context
            .iter()
            .map(|(k, v)| format!(" {k}={v}"))
            .collect();
        match level {
            LogLevel::Trace => tracing::trace!(event_id, "{message}{fields}"),
            LogLevel::Debug => tracing::debug!(event_id, "{message}{fields}"),
            LogLevel::Normal => tracing::info!(event_id, "{message}{fields}"),
            LogLevel::Warning => tracing::warn!(event_id, "{message}{fields}"),
            LogLevel::Error => tracing::error!(event_id, "{message}{fields}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_does_not_panic_without_context() {
        let logger = TracingLogger;
        logger.log(LogLevel::Normal, "test.event", "hello", &[]);
    }
}
