//! Work-key sources: an inclusive index range, an explicit list, or a
//! line-delimited key file.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::AppError;
use crate::models::{KeyKind, WorkKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkKeySource {
    /// Inclusive index range.
    Range { start: u64, end: u64 },
    /// Explicit keys in the given order.
    List(Vec<String>),
    /// One key per line; blank lines and `#` comments are ignored.
    File(PathBuf),
}

impl WorkKeySource {
    /// Builds a list source from comma-separated text.
    pub fn from_list_arg(text: &str) -> Self {
        WorkKeySource::List(
            text.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Materializes the keys in source order, dropping repeats.
    ///
    /// Fails before any store is touched when the source yields nothing or
    /// cannot be read.
    pub fn resolve(&self, kind: KeyKind) -> Result<Vec<WorkKey>, AppError> {
        let keys = match self {
            WorkKeySource::Range { start, end } => {
                if kind != KeyKind::Index {
                    return Err(AppError::InvalidWorkSource(
                        "an index range needs an index-keyed catalog".to_string(),
                    ));
                }
                if start > end {
                    return Err(AppError::InvalidWorkSource(format!(
                        "start {} is after end {}",
                        start, end
                    )));
                }
                (*start..=*end).map(WorkKey::Index).collect()
            }
            WorkKeySource::List(items) => items
                .iter()
                .map(|item| kind.parse(item))
                .collect::<Result<Vec<_>, _>>()?,
            WorkKeySource::File(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    AppError::InvalidWorkSource(format!(
                        "cannot read key file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                parse_key_lines(&content, kind)
            }
        };

        let mut seen = HashSet::with_capacity(keys.len());
        let keys: Vec<WorkKey> = keys.into_iter().filter(|k| seen.insert(k.clone())).collect();

        if keys.is_empty() {
            return Err(AppError::InvalidWorkSource(match self {
                WorkKeySource::File(path) => format!("no keys in '{}'", path.display()),
                _ => "no keys given".to_string(),
            }));
        }
        Ok(keys)
    }
}

fn parse_key_lines(content: &str, kind: KeyKind) -> Vec<WorkKey> {
    content
        .lines()
        .enumerate()
        .filter_map(|(lineno, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            match kind.parse(line) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!("Skipping key file line {}: {}", lineno + 1, e);
                    None
                }
            }
        })
        .collect()
}
