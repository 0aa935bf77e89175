//! Run-scoped telemetry handle passed to every bridge component.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::Span;

#[derive(Debug, Default)]
struct RunCounters {
    requests_sent: AtomicU64,
    retry_attempts: AtomicU64,
    rate_limit_waits: AtomicU64,
    empty_threads_skipped: AtomicU64,
    processed_threads_skipped: AtomicU64,
    issues_created: AtomicU64,
    dry_run_previews: AtomicU64,
}

/// Point-in-time copy of the run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTelemetrySnapshot {
    pub requests_sent: u64,
    pub retry_attempts: u64,
    pub rate_limit_waits: u64,
    pub empty_threads_skipped: u64,
    pub processed_threads_skipped: u64,
    pub issues_created: u64,
    pub dry_run_previews: u64,
}

/// Tracing span plus counters for one bridge run.
///
/// Clones share the same span and counters; events are emitted with
/// `parent: telemetry.span()` so they stay attached to the run that caused
/// them, whatever subscriber is installed.
#[derive(Debug, Clone)]
pub struct RunTelemetry {
    span: Span,
    counters: Arc<RunCounters>,
}

impl RunTelemetry {
    pub fn new(run_id: &str) -> Self {
        Self {
            span: tracing::info_span!("bridge_run", run_id = %run_id),
            counters: Arc::new(RunCounters::default()),
        }
    }

    /// Telemetry with counters but no span, for tests and embedding callers.
    pub fn disabled() -> Self {
        Self {
            span: Span::none(),
            counters: Arc::new(RunCounters::default()),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn record_request(&self) {
        bump(&self.counters.requests_sent);
    }

    pub fn record_retry_attempt(&self) {
        bump(&self.counters.retry_attempts);
    }

    pub fn record_rate_limit_wait(&self) {
        bump(&self.counters.rate_limit_waits);
    }

    pub fn record_empty_thread_skipped(&self) {
        bump(&self.counters.empty_threads_skipped);
    }

    pub fn record_processed_thread_skipped(&self) {
        bump(&self.counters.processed_threads_skipped);
    }

    pub fn record_issue_created(&self) {
        bump(&self.counters.issues_created);
    }

    pub fn record_dry_run_preview(&self) {
        bump(&self.counters.dry_run_previews);
    }

    pub fn snapshot(&self) -> RunTelemetrySnapshot {
        let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        RunTelemetrySnapshot {
            requests_sent: read(&self.counters.requests_sent),
            retry_attempts: read(&self.counters.retry_attempts),
            rate_limit_waits: read(&self.counters.rate_limit_waits),
            empty_threads_skipped: read(&self.counters.empty_threads_skipped),
            processed_threads_skipped: read(&self.counters.processed_threads_skipped),
            issues_created: read(&self.counters.issues_created),
            dry_run_previews: read(&self.counters.dry_run_previews),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}
