//! Forum-thread to issue synchronization.
//!
//! [`IssueSyncer`] runs one bounded batch: fetch threads newer than a cutoff,
//! skip those already recorded in the [`SyncLedger`], derive labels and render
//! the issue body, submit, then record and persist each thread in order.

pub mod bridge_config;
pub mod labels;
pub mod ledger;
pub mod syncer;
pub mod template;

pub use bridge_config::{BridgeConfig, ConfigError, DEFAULT_FALLBACK_LABEL_PREFIX};
pub use labels::{sanitize_label, LabelPolicy};
pub use ledger::{LedgerError, SyncLedger};
pub use syncer::{IssueSink, IssueSyncer, SyncRunReport, SyncSettings, ThreadSource};
pub use template::{render_template, TemplateError};
