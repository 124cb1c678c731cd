//! Append-only CSV failure ledger with columns `Timestamp,WorkKey,Reason`.
//!
//! The key set is read from disk once, on first use, and kept in memory
//! afterwards. Appends and `clear` update the cached set.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use gleaner_core::models::LEDGER_TIMESTAMP_FORMAT;
use gleaner_core::traits::FailureLedger;
use gleaner_core::{AppError, FailureEntry, FailureReason, KeyKind, WorkKey};

pub const LEDGER_COLUMNS: [&str; 3] = ["Timestamp", "WorkKey", "Reason"];

pub struct CsvFailureLedger {
    path: PathBuf,
    kind: KeyKind,
    keys: RefCell<Option<HashSet<WorkKey>>>,
}

impl CsvFailureLedger {
    pub fn new(path: impl Into<PathBuf>, kind: KeyKind) -> Self {
        Self {
            path: path.into(),
            kind,
            keys: RefCell::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads raw `(timestamp, key, reason)` rows, skipping short rows.
    fn read_rows(&self) -> Result<Vec<(String, String, String)>, AppError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in reader.records() {
            let row = row?;
            match (row.get(0), row.get(1)) {
                (Some(timestamp), Some(key)) => rows.push((
                    timestamp.to_string(),
                    key.to_string(),
                    row.get(2).unwrap_or_default().to_string(),
                )),
                _ => tracing::warn!(path = %self.path.display(), "Skipping short ledger row"),
            }
        }
        Ok(rows)
    }

    fn read_keys(&self) -> Result<HashSet<WorkKey>, AppError> {
        let mut keys = HashSet::new();
        for (_, key, _) in self.read_rows()? {
            match self.kind.parse(&key) {
                Ok(key) => {
                    keys.insert(key);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping ledger row with unusable key"),
            }
        }
        Ok(keys)
    }

    fn known_keys(&mut self) -> Result<&mut HashSet<WorkKey>, AppError> {
        if self.keys.get_mut().is_none() {
            let loaded = self.read_keys()?;
            *self.keys.get_mut() = Some(loaded);
        }
        Ok(self.keys.get_mut().get_or_insert_with(HashSet::new))
    }
}

impl FailureLedger for CsvFailureLedger {
    fn load_keys(&self) -> Result<HashSet<WorkKey>, AppError> {
        if let Some(keys) = self.keys.borrow().as_ref() {
            return Ok(keys.clone());
        }
        let keys = self.read_keys()?;
        *self.keys.borrow_mut() = Some(keys.clone());
        Ok(keys)
    }

    fn contains(&self, key: &WorkKey) -> Result<bool, AppError> {
        if let Some(keys) = self.keys.borrow().as_ref() {
            return Ok(keys.contains(key));
        }
        Ok(self.load_keys()?.contains(key))
    }

    fn append(&mut self, entry: &FailureEntry) -> Result<bool, AppError> {
        if self.known_keys()?.contains(&entry.key) {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        if needs_header {
            writer.write_record(LEDGER_COLUMNS)?;
        }
        writer.write_record([
            entry.formatted_timestamp(),
            entry.key.to_string(),
            entry.reason.to_string(),
        ])?;
        writer.flush()?;
        self.known_keys()?.insert(entry.key.clone());
        Ok(true)
    }

    fn entries(&self) -> Result<Vec<FailureEntry>, AppError> {
        let mut entries = Vec::new();
        for (timestamp, key, reason) in self.read_rows()? {
            let timestamp = match NaiveDateTime::parse_from_str(&timestamp, LEDGER_TIMESTAMP_FORMAT)
            {
                Ok(ts) => ts,
                Err(e) => {
                    tracing::warn!(timestamp = %timestamp, error = %e, "Skipping ledger row with bad timestamp");
                    continue;
                }
            };
            let key = match self.kind.parse(&key) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping ledger row with unusable key");
                    continue;
                }
            };
            entries.push(FailureEntry {
                timestamp,
                key,
                reason: FailureReason::parse(&reason),
            });
        }
        Ok(entries)
    }

    fn clear(&mut self) -> Result<usize, AppError> {
        let count = self.read_rows()?.len();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        *self.keys.get_mut() = Some(HashSet::new());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_core::{FailureKind, FetchError};
    use tempfile::TempDir;

    fn ledger(dir: &TempDir) -> CsvFailureLedger {
        CsvFailureLedger::new(dir.path().join("failed.csv"), KeyKind::Index)
    }

    #[test]
    fn test_append_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir);
        let entry = FailureEntry::now(
            WorkKey::Index(2),
            FailureReason::no_data("All fields empty after parsing"),
        );
        assert!(ledger.append(&entry).unwrap());

        let text = fs::read_to_string(ledger.path()).unwrap();
        assert!(text.starts_with("Timestamp,WorkKey,Reason\n"));
        assert!(text.contains(",2,[no_data] All fields empty after parsing"));

        let keys = ledger.load_keys().unwrap();
        assert_eq!(keys, [WorkKey::Index(2)].into_iter().collect());
        assert!(ledger.contains(&WorkKey::Index(2)).unwrap());
    }

    #[test]
    fn test_duplicate_key_not_appended() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir);
        let first = FailureEntry::now(WorkKey::Index(9), FetchError::timeout(30).into());
        let second = FailureEntry::now(WorkKey::Index(9), FailureReason::no_data("x"));
        assert!(ledger.append(&first).unwrap());
        assert!(!ledger.append(&second).unwrap());
        assert_eq!(ledger.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_key_set_read_from_disk_once() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir);
        assert!(ledger.load_keys().unwrap().is_empty());

        // Rows written behind the ledger's back after the first load are not seen.
        fs::write(
            ledger.path(),
            "Timestamp,WorkKey,Reason\n2024-05-01 10:00:00,5,[no_data] x\n",
        )
        .unwrap();
        assert!(!ledger.contains(&WorkKey::Index(5)).unwrap());

        let entry = FailureEntry::now(WorkKey::Index(5), FailureReason::no_data("y"));
        assert!(ledger.append(&entry).unwrap());
        assert!(ledger.contains(&WorkKey::Index(5)).unwrap());
        assert!(!ledger.append(&entry).unwrap());
    }

    #[test]
    fn test_existing_file_loaded_on_first_append() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("failed.csv"),
            "Timestamp,WorkKey,Reason\n2024-05-01 10:00:00,3,[no_data] x\n",
        )
        .unwrap();
        let mut ledger = ledger(&dir);
        let entry = FailureEntry::now(WorkKey::Index(3), FailureReason::no_data("y"));
        assert!(!ledger.append(&entry).unwrap());
        assert_eq!(ledger.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_entries_round_trip_reason_kind() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir);
        ledger
            .append(&FailureEntry::now(
                WorkKey::Index(4),
                FetchError::status(404, "Page not found").into(),
            ))
            .unwrap();

        let entries = ledger.entries().unwrap();
        assert_eq!(entries[0].reason.kind, FailureKind::HttpStatus(404));
        assert!(!entries[0].reason.kind.is_transient());
    }

    #[test]
    fn test_legacy_rows_are_unclassified() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("failed.csv"),
            "Timestamp,WorkKey,Reason\n2024-05-01 10:00:00,17,No bushing found by that style number\n",
        )
        .unwrap();
        let ledger = ledger(&dir);
        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason.kind, FailureKind::Unclassified);
        assert_eq!(entries[0].key, WorkKey::Index(17));
    }

    #[test]
    fn test_clear_counts_entries() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger(&dir);
        for i in 1..=5 {
            ledger
                .append(&FailureEntry::now(WorkKey::Index(i), FailureReason::no_data("x")))
                .unwrap();
        }
        assert_eq!(ledger.clear().unwrap(), 5);
        assert!(ledger.load_keys().unwrap().is_empty());
        assert_eq!(ledger.clear().unwrap(), 0);

        let entry = FailureEntry::now(WorkKey::Index(1), FailureReason::no_data("again"));
        assert!(ledger.append(&entry).unwrap());
    }
}
