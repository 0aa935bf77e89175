//! Foundational utilities shared across the issue bridge crates.
//!
//! Provides atomic file writes, UTC time helpers, HTTP transport helpers, the
//! injectable retry policy used by both REST clients, and the run-scoped
//! telemetry handle every component receives at construction.

pub mod atomic_io;
pub mod retry;
pub mod telemetry;
pub mod time_utils;
pub mod transport_helpers;

pub use atomic_io::{write_text_atomic, AtomicWriteOptions};
pub use retry::{AttemptFailure, RecordingSleeper, RetryPolicy, Sleeper, ThreadSleeper};
pub use telemetry::{RunTelemetry, RunTelemetrySnapshot};
pub use time_utils::{current_unix_timestamp_ms, format_iso8601_utc, parse_iso8601_utc};
