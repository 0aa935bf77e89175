use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use issue_bridge_core::{format_iso8601_utc, write_text_atomic, AtomicWriteOptions};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read ledger {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse ledger {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to write ledger {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },
}

/// Thread id -> processed-at entries, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct OrderedEntries(Vec<(String, String)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of thread ids to processed timestamps")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    entries.push((key, scalar_text(value)));
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl Serialize for OrderedEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (thread_id, processed_at) in &self.0 {
            map.serialize_entry(thread_id, processed_at)?;
        }
        map.end()
    }
}

/// On-disk `processed_thread_ids`: the current map form, or the legacy bare
/// id list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredProcessed {
    Entries(OrderedEntries),
    Legacy(Vec<Value>),
}

#[derive(Debug, Deserialize)]
struct StoredLedger {
    #[serde(default)]
    processed_thread_ids: Option<StoredProcessed>,
    #[serde(default)]
    last_synced_at: Option<String>,
}

#[derive(Serialize)]
struct LedgerDocument<'a> {
    processed_thread_ids: &'a OrderedEntries,
    last_synced_at: Option<&'a str>,
}

fn scalar_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Persisted record of the threads that already produced an issue.
///
/// Single writer only: concurrent runs against one ledger path are not
/// detected.
#[derive(Debug, Clone)]
pub struct SyncLedger {
    path: PathBuf,
    backup_enabled: bool,
    backup_settled: bool,
    read_only: bool,
    entries: OrderedEntries,
    index: HashMap<String, usize>,
    last_synced_at: Option<String>,
}

impl SyncLedger {
    /// Loads `path`, or starts empty when the file does not exist.
    ///
    /// A legacy id list is migrated here: every listed id is stamped with the
    /// stored `last_synced_at` (or an empty string when that is unset).
    pub fn load(path: impl Into<PathBuf>, backup_enabled: bool) -> Result<Self, LedgerError> {
        let path = path.into();
        let (entries, last_synced_at) = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| LedgerError::Read {
                path: path.clone(),
                source,
            })?;
            let stored: StoredLedger =
                serde_json::from_str(&raw).map_err(|source| LedgerError::Parse {
                    path: path.clone(),
                    source,
                })?;
            let entries = match stored.processed_thread_ids {
                None => OrderedEntries::default(),
                Some(StoredProcessed::Entries(entries)) => entries,
                Some(StoredProcessed::Legacy(ids)) => {
                    let stamp = stored.last_synced_at.clone().unwrap_or_default();
                    tracing::info!(
                        path = %path.display(),
                        entries = ids.len(),
                        "migrating legacy ledger id list"
                    );
                    OrderedEntries(
                        ids.into_iter()
                            .map(|id| (scalar_text(id), stamp.clone()))
                            .collect(),
                    )
                }
            };
            (entries, stored.last_synced_at)
        } else {
            (OrderedEntries::default(), None)
        };

        let mut ledger = Self {
            path,
            backup_enabled,
            backup_settled: false,
            read_only: false,
            entries: OrderedEntries::default(),
            index: HashMap::new(),
            last_synced_at,
        };
        for (thread_id, processed_at) in entries.0 {
            ledger.upsert(thread_id, processed_at);
        }
        Ok(ledger)
    }

    /// Turns [`SyncLedger::save`] into a no-op; dry runs use this so the
    /// persisted ledger is never rewritten.
    #[must_use]
    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    pub fn has_processed(&self, thread_id: &str) -> bool {
        self.index.contains_key(thread_id)
    }

    pub fn processed_at(&self, thread_id: &str) -> Option<&str> {
        self.index
            .get(thread_id)
            .map(|position| self.entries.0[*position].1.as_str())
    }

    pub fn last_synced_at(&self) -> Option<&str> {
        self.last_synced_at.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.0.is_empty()
    }

    /// Thread ids in the order they were first recorded.
    pub fn thread_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.0.iter().map(|(thread_id, _)| thread_id.as_str())
    }

    /// Records `thread_id` and advances `last_synced_at` to now. Re-marking an
    /// id overwrites its timestamp but keeps its position.
    pub fn mark_processed(&mut self, thread_id: &str, processed_at: DateTime<Utc>) {
        self.upsert(thread_id.to_string(), format_iso8601_utc(processed_at));
        self.touch(Utc::now());
    }

    /// Advances `last_synced_at` without recording a thread.
    pub fn touch(&mut self, synced_at: DateTime<Utc>) {
        self.last_synced_at = Some(format_iso8601_utc(synced_at));
    }

    /// Writes the whole ledger atomically.
    ///
    /// With backups enabled, the first save of this instance copies the file
    /// found on disk to its `.bak` sibling; later saves in the same run leave
    /// that copy alone so it keeps the pre-run state.
    pub fn save(&mut self) -> Result<(), LedgerError> {
        if self.read_only {
            tracing::debug!(path = %self.path.display(), "read-only ledger, save skipped");
            return Ok(());
        }
        let document = LedgerDocument {
            processed_thread_ids: &self.entries,
            last_synced_at: self.last_synced_at.as_deref(),
        };
        let mut payload = serde_json::to_string_pretty(&document).map_err(LedgerError::Serialize)?;
        payload.push('\n');

        let options = if self.backup_enabled && !self.backup_settled {
            AtomicWriteOptions::with_backup(self.backup_path())
        } else {
            AtomicWriteOptions::default()
        };
        let backed_up =
            write_text_atomic(&self.path, &payload, &options).map_err(|error| LedgerError::Write {
                path: self.path.clone(),
                reason: format!("{error:#}"),
            })?;
        self.backup_settled = true;
        tracing::debug!(
            path = %self.path.display(),
            entries = self.entries.0.len(),
            backed_up,
            "saved ledger"
        );
        Ok(())
    }

    fn upsert(&mut self, thread_id: String, processed_at: String) {
        match self.index.get(&thread_id) {
            Some(position) => self.entries.0[*position].1 = processed_at,
            None => {
                self.index.insert(thread_id.clone(), self.entries.0.len());
                self.entries.0.push((thread_id, processed_at));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use issue_bridge_core::parse_iso8601_utc;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    use super::{LedgerError, SyncLedger};

    fn read_json(path: &std::path::Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("json")
    }

    #[test]
    fn unit_missing_file_loads_empty_ledger() {
        let temp = tempdir().expect("tempdir");
        let ledger = SyncLedger::load(temp.path().join("state.json"), true).expect("load");
        assert!(ledger.is_empty());
        assert_eq!(ledger.last_synced_at(), None);
        assert!(!ledger.has_processed("1"));
    }

    #[test]
    fn functional_mark_and_save_round_trips_in_insertion_order() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("state.json");
        let mut ledger = SyncLedger::load(&path, false).expect("load");
        ledger.mark_processed("300", parse_iso8601_utc("2025-01-03T00:00:00Z").expect("ts"));
        ledger.mark_processed("20", parse_iso8601_utc("2025-01-01T00:00:00Z").expect("ts"));
        ledger.save().expect("save");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.find("\"300\"").expect("300") < raw.find("\"20\"").expect("20"));
        let reloaded = SyncLedger::load(&path, false).expect("reload");
        assert_eq!(reloaded.thread_ids().collect::<Vec<_>>(), vec!["300", "20"]);
        assert_eq!(reloaded.processed_at("300"), Some("2025-01-03T00:00:00+00:00"));
        assert!(reloaded.last_synced_at().is_some());
        assert!(!reloaded.backup_path().exists());
    }

    #[test]
    fn functional_legacy_id_list_is_migrated_on_load() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        std::fs::write(
            &path,
            json!({
                "processed_thread_ids": ["11", 12],
                "last_synced_at": "2024-12-31T00:00:00+00:00"
            })
            .to_string(),
        )
        .expect("write legacy");

        let mut ledger = SyncLedger::load(&path, false).expect("load");

        assert!(ledger.has_processed("11"));
        assert!(ledger.has_processed("12"));
        assert_eq!(ledger.processed_at("12"), Some("2024-12-31T00:00:00+00:00"));
        ledger.save().expect("save");
        assert_eq!(
            read_json(&path)["processed_thread_ids"],
            json!({"11": "2024-12-31T00:00:00+00:00", "12": "2024-12-31T00:00:00+00:00"})
        );
    }

    #[test]
    fn regression_legacy_list_without_last_synced_uses_empty_stamp() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        std::fs::write(&path, r#"{"processed_thread_ids": ["5"], "last_synced_at": null}"#)
            .expect("write");
        let ledger = SyncLedger::load(&path, false).expect("load");
        assert_eq!(ledger.processed_at("5"), Some(""));
        assert_eq!(ledger.last_synced_at(), None);
    }

    #[test]
    fn functional_save_copies_previous_file_to_backup() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        let mut seed = SyncLedger::load(&path, true).expect("load");
        seed.mark_processed("1", parse_iso8601_utc("2025-01-01T00:00:00Z").expect("ts"));
        seed.save().expect("seed save");
        assert!(!seed.backup_path().exists());

        let mut ledger = SyncLedger::load(&path, true).expect("reload");
        ledger.mark_processed("2", parse_iso8601_utc("2025-01-02T00:00:00Z").expect("ts"));
        ledger.save().expect("save");

        let backup = read_json(&ledger.backup_path());
        assert_eq!(
            backup["processed_thread_ids"],
            json!({"1": "2025-01-01T00:00:00+00:00"})
        );
        assert_eq!(
            read_json(&path)["processed_thread_ids"]
                .as_object()
                .expect("map")
                .len(),
            2
        );
        assert_eq!(
            ledger.backup_path().file_name().and_then(|name| name.to_str()),
            Some("state.json.bak")
        );
    }

    #[test]
    fn regression_repeated_saves_keep_the_first_backup() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        std::fs::write(
            &path,
            json!({
                "processed_thread_ids": {"1": "2025-01-01T00:00:00+00:00"},
                "last_synced_at": "2025-01-01T00:00:00+00:00"
            })
            .to_string(),
        )
        .expect("seed");

        let mut ledger = SyncLedger::load(&path, true).expect("load");
        ledger.mark_processed("2", parse_iso8601_utc("2025-01-02T00:00:00Z").expect("ts"));
        ledger.save().expect("first save");
        ledger.mark_processed("3", parse_iso8601_utc("2025-01-03T00:00:00Z").expect("ts"));
        ledger.save().expect("second save");
        ledger.save().expect("third save");

        assert_eq!(
            read_json(&ledger.backup_path())["processed_thread_ids"],
            json!({"1": "2025-01-01T00:00:00+00:00"})
        );
        assert_eq!(
            read_json(&path)["processed_thread_ids"]
                .as_object()
                .expect("map")
                .len(),
            3
        );
    }

    #[test]
    fn unit_disabled_backup_never_creates_bak_file() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        std::fs::write(&path, r#"{"processed_thread_ids": {}}"#).expect("seed");
        let mut ledger = SyncLedger::load(&path, false).expect("load");
        ledger.mark_processed("9", parse_iso8601_utc("2025-01-09T00:00:00Z").expect("ts"));
        ledger.save().expect("save");
        assert!(!ledger.backup_path().exists());
    }

    #[test]
    fn unit_remarking_keeps_position_and_overwrites_timestamp() {
        let temp = tempdir().expect("tempdir");
        let mut ledger = SyncLedger::load(temp.path().join("state.json"), false).expect("load");
        ledger.mark_processed("a", parse_iso8601_utc("2025-01-01T00:00:00Z").expect("ts"));
        ledger.mark_processed("b", parse_iso8601_utc("2025-01-02T00:00:00Z").expect("ts"));
        ledger.mark_processed("a", parse_iso8601_utc("2025-01-05T00:00:00Z").expect("ts"));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.thread_ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(ledger.processed_at("a"), Some("2025-01-05T00:00:00+00:00"));
    }

    #[test]
    fn functional_read_only_ledger_never_writes() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        let mut ledger = SyncLedger::load(&path, true).expect("load").into_read_only();
        ledger.mark_processed("1", parse_iso8601_utc("2025-01-01T00:00:00Z").expect("ts"));
        ledger.save().expect("save");
        assert!(ledger.is_read_only());
        assert!(!path.exists());
    }

    #[test]
    fn regression_corrupt_ledger_reports_path() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        std::fs::write(&path, "{\"processed_thread_ids\": 5}").expect("write");
        let error = SyncLedger::load(&path, false).expect_err("corrupt");
        assert!(matches!(error, LedgerError::Parse { .. }));
        assert!(error.to_string().contains("state.json"));
    }
}
