//! Raw page snapshots, one file per key: `<dir>/<prefix>_<stem>.<ext>`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use gleaner_core::traits::SnapshotArchive;
use gleaner_core::{AppError, RawPayload, WorkKey};

pub struct FsSnapshotArchive {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl FsSnapshotArchive {
    pub fn new(dir: impl Into<PathBuf>, prefix: &str, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &WorkKey) -> PathBuf {
        self.dir
            .join(format!("{}_{}.{}", self.prefix, key.file_stem(), self.extension))
    }

    /// Reads a stored snapshot back, if present.
    pub fn read(&self, key: &WorkKey) -> Result<Option<RawPayload>, AppError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(RawPayload(text))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// File stems of every snapshot belonging to this archive.
    pub fn stems(&self) -> Result<Vec<String>, AppError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let head = format!("{}_", self.prefix);
        let tail = format!(".{}", self.extension);
        let mut stems = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = name
                .strip_prefix(head.as_str())
                .and_then(|rest| rest.strip_suffix(tail.as_str()))
            {
                stems.push(stem.to_string());
            }
        }
        stems.sort();
        Ok(stems)
    }
}

impl SnapshotArchive for FsSnapshotArchive {
    fn exists(&self, key: &WorkKey) -> bool {
        self.path_for(key).is_file()
    }

    fn write(&mut self, key: &WorkKey, raw: &RawPayload) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), raw.as_str())?;
        Ok(())
    }

    fn delete(&mut self, key: &WorkKey) -> Result<bool, AppError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&mut self) -> Result<usize, AppError> {
        let stems = self.stems()?;
        for stem in &stems {
            let path = self
                .dir
                .join(format!("{}_{}.{}", self.prefix, stem, self.extension));
            fs::remove_file(path)?;
        }
        if !stems.is_empty() {
            tracing::debug!(dir = %self.dir.display(), removed = stems.len(), "Cleared snapshots");
        }
        Ok(stems.len())
    }
}
