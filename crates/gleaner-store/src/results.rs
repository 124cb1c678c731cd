//! CSV-backed result table.
//!
//! The header row is the catalog's fixed column set. Appends add one row
//! (writing the header when the file is created); replace rewrites the file
//! through a temporary sibling and a rename.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use gleaner_core::traits::ResultStore;
use gleaner_core::{AppError, KeyKind, Record, WorkKey};

pub struct CsvResultStore {
    path: PathBuf,
    columns: Vec<String>,
    key_index: usize,
    kind: KeyKind,
    keys: HashSet<WorkKey>,
    rows: usize,
}

impl CsvResultStore {
    /// Opens (without creating) the table at `path`.
    ///
    /// An existing file must carry exactly `columns` as its header.
    pub fn open(
        path: impl Into<PathBuf>,
        columns: &[&str],
        key_column: &str,
        kind: KeyKind,
    ) -> Result<Self, AppError> {
        let path = path.into();
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let key_index = columns
            .iter()
            .position(|c| c == key_column)
            .ok_or_else(|| {
                AppError::ConfigError(format!("Key column '{}' is not a result column", key_column))
            })?;

        let mut store = Self {
            path,
            columns,
            key_index,
            kind,
            keys: HashSet::new(),
            rows: 0,
        };
        store.reload()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn reload(&mut self) -> Result<(), AppError> {
        self.keys.clear();
        self.rows = 0;
        if !self.path.exists() {
            return Ok(());
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if header != self.columns {
            return Err(AppError::StoreError(format!(
                "'{}' has {} columns that do not match the expected {}",
                self.path.display(),
                header.len(),
                self.columns.len()
            )));
        }

        for row in reader.records() {
            let row = row?;
            self.rows += 1;
            let raw_key = row.get(self.key_index).unwrap_or_default();
            match self.kind.parse(raw_key) {
                Ok(key) => {
                    self.keys.insert(key);
                }
                Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "Row with unusable key"),
            }
        }
        Ok(())
    }

    fn to_row(&self, key: &WorkKey, record: &Record) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                if i == self.key_index {
                    key.to_string()
                } else {
                    record.get(column).unwrap_or_default().to_string()
                }
            })
            .collect()
    }

    /// Reads every row back as a record.
    pub fn rows(&self) -> Result<Vec<Record>, AppError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let record = self
                .columns
                .iter()
                .zip(row.iter())
                .fold(Record::new(), |record, (column, value)| record.with(column.as_str(), value));
            records.push(record);
        }
        Ok(records)
    }

    pub fn keys(&self) -> &HashSet<WorkKey> {
        &self.keys
    }
}

impl ResultStore for CsvResultStore {
    fn contains(&self, key: &WorkKey) -> bool {
        self.keys.contains(key)
    }

    fn append(&mut self, key: &WorkKey, record: &Record) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        if needs_header {
            writer.write_record(&self.columns)?;
        }
        writer.write_record(self.to_row(key, record))?;
        writer.flush()?;

        self.keys.insert(key.clone());
        self.rows += 1;
        Ok(())
    }

    fn replace(&mut self, key: &WorkKey, record: &Record) -> Result<(), AppError> {
        if !self.path.exists() {
            return self.append(key, record);
        }

        let tmp_path = self.path.with_extension("csv.tmp");
        let mut kept = 0;
        {
            let mut reader = csv::Reader::from_path(&self.path)?;
            let mut writer = csv::Writer::from_path(&tmp_path)?;
            writer.write_record(&self.columns)?;

            let key_text = key.to_string();
            for row in reader.records() {
                let row = row?;
                if row.get(self.key_index).map(str::trim) == Some(key_text.as_str()) {
                    continue;
                }
                writer.write_record(&row)?;
                kept += 1;
            }
            writer.write_record(self.to_row(key, record))?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        self.keys.insert(key.clone());
        self.rows = kept + 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<usize, AppError> {
        let removed = self.rows;
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        self.keys.clear();
        self.rows = 0;
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.rows
    }
}
