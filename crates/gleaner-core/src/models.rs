//! Domain types shared by every harvesting path.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, FetchError, FetchErrorKind};

/// Timestamp format used by the failure ledger.
pub const LEDGER_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identifies one unit of work: a page index or a catalog/style code.
///
/// The display form is the join key across the result table, the snapshot
/// archive and the failure ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkKey {
    Index(u64),
    Code(String),
}

impl WorkKey {
    /// Returns the key as a filesystem-safe stem for snapshot file names.
    ///
    /// Path separators are replaced with underscores; two codes differing only
    /// in `/` versus `_` share a stem.
    pub fn file_stem(&self) -> String {
        match self {
            WorkKey::Index(i) => i.to_string(),
            WorkKey::Code(code) => code.replace(['/', '\\'], "_"),
        }
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            WorkKey::Index(_) => KeyKind::Index,
            WorkKey::Code(_) => KeyKind::Code,
        }
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkKey::Index(i) => write!(f, "{}", i),
            WorkKey::Code(code) => write!(f, "{}", code),
        }
    }
}

impl From<u64> for WorkKey {
    fn from(value: u64) -> Self {
        WorkKey::Index(value)
    }
}

impl From<&str> for WorkKey {
    fn from(value: &str) -> Self {
        WorkKey::Code(value.to_string())
    }
}

/// Which flavour of [`WorkKey`] a catalog uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    #[default]
    Index,
    Code,
}

impl KeyKind {
    /// Parses text into a key of this kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use gleaner_core::models::{KeyKind, WorkKey};
    ///
    /// assert_eq!(KeyKind::Index.parse(" 42131 ").unwrap(), WorkKey::Index(42131));
    /// assert_eq!(KeyKind::Code.parse("138W0800XA").unwrap(), WorkKey::Code("138W0800XA".into()));
    /// assert!(KeyKind::Index.parse("138W0800XA").is_err());
    /// ```
    pub fn parse(&self, text: &str) -> Result<WorkKey, AppError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidWorkKey("empty key".to_string()));
        }
        match self {
            KeyKind::Index => trimmed
                .parse::<u64>()
                .map(WorkKey::Index)
                .map_err(|_| AppError::InvalidWorkKey(format!("'{}' is not an index", trimmed))),
            KeyKind::Code => Ok(WorkKey::Code(trimmed.to_string())),
        }
    }
}

/// A structured record produced by a parser: ordered named string fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field, replacing any previous value while keeping its position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when every value is blank. A blank record counts as "no data".
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.trim().is_empty())
    }
}

/// Raw fetched content (HTML page or JSON hit) kept in the snapshot archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload(pub String);

impl RawPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for RawPayload {
    fn from(value: String) -> Self {
        RawPayload(value)
    }
}

/// Category of a ledger entry, encoded as a `[tag]` prefix of the reason text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    NoData,
    Timeout,
    Connection,
    HttpStatus(u16),
    EmptyResponse,
    Malformed,
    Parser,
    /// Entries written without a tag, e.g. by older tooling.
    Unclassified,
}

impl FailureKind {
    pub fn tag(&self) -> String {
        match self {
            FailureKind::NoData => "no_data".to_string(),
            FailureKind::Timeout => "timeout".to_string(),
            FailureKind::Connection => "connection".to_string(),
            FailureKind::HttpStatus(code) => format!("http_{}", code),
            FailureKind::EmptyResponse => "empty_response".to_string(),
            FailureKind::Malformed => "malformed".to_string(),
            FailureKind::Parser => "parser".to_string(),
            FailureKind::Unclassified => "unclassified".to_string(),
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "no_data" => FailureKind::NoData,
            "timeout" => FailureKind::Timeout,
            "connection" => FailureKind::Connection,
            "empty_response" => FailureKind::EmptyResponse,
            "malformed" => FailureKind::Malformed,
            "parser" => FailureKind::Parser,
            "unclassified" => FailureKind::Unclassified,
            other => {
                let code = other.strip_prefix("http_")?.parse().ok()?;
                FailureKind::HttpStatus(code)
            }
        };
        Some(kind)
    }

    /// Whether a later retry pass could reasonably succeed.
    ///
    /// Both kinds are skipped the same way by the harvester; this only feeds
    /// reporting.
    pub fn is_transient(&self) -> bool {
        match self {
            FailureKind::Timeout | FailureKind::Connection | FailureKind::EmptyResponse => true,
            FailureKind::HttpStatus(code) => *code == 408 || *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

impl From<FetchErrorKind> for FailureKind {
    fn from(kind: FetchErrorKind) -> Self {
        match kind {
            FetchErrorKind::Timeout => FailureKind::Timeout,
            FetchErrorKind::Connection => FailureKind::Connection,
            FetchErrorKind::HttpStatus(code) => FailureKind::HttpStatus(code),
            FetchErrorKind::EmptyResponse => FailureKind::EmptyResponse,
            FetchErrorKind::Malformed => FailureKind::Malformed,
        }
    }
}

/// Why a key ended up in the failure ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub detail: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn no_data(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::NoData, detail)
    }

    pub fn parser(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Parser, detail)
    }

    /// Parses the persisted reason text.
    ///
    /// # Examples
    ///
    /// ```
    /// use gleaner_core::models::{FailureKind, FailureReason};
    ///
    /// let reason = FailureReason::parse("[http_404] Page not found (HTTP 404)");
    /// assert_eq!(reason.kind, FailureKind::HttpStatus(404));
    /// assert_eq!(reason.detail, "Page not found (HTTP 404)");
    ///
    /// let legacy = FailureReason::parse("No bushing found by that style number");
    /// assert_eq!(legacy.kind, FailureKind::Unclassified);
    /// ```
    pub fn parse(text: &str) -> Self {
        if let Some(rest) = text.strip_prefix('[') {
            if let Some((tag, detail)) = rest.split_once(']') {
                if let Some(kind) = FailureKind::from_tag(tag) {
                    return Self::new(kind, detail.trim_start());
                }
            }
        }
        Self::new(FailureKind::Unclassified, text)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.tag(), self.detail)
    }
}

impl From<FetchError> for FailureReason {
    fn from(err: FetchError) -> Self {
        Self::new(err.kind.into(), err.detail)
    }
}

/// One row of the failure ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEntry {
    pub timestamp: NaiveDateTime,
    pub key: WorkKey,
    pub reason: FailureReason,
}

impl FailureEntry {
    /// Creates an entry stamped with the current local time.
    pub fn now(key: WorkKey, reason: FailureReason) -> Self {
        Self {
            timestamp: chrono::Local::now().naive_local(),
            key,
            reason,
        }
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(LEDGER_TIMESTAMP_FORMAT).to_string()
    }
}

/// What a parser extracted from a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Record(Record),
    /// The page loaded but carries no record (e.g. an explicit "not found" page).
    NoData(String),
}

/// Result of fetching and parsing one work key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Success { record: Record, raw: RawPayload },
    NoData(String),
    TransientError(FailureReason),
}

impl ParseOutcome {
    /// The ledger reason for a failed outcome, `None` on success.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            ParseOutcome::Success { .. } => None,
            ParseOutcome::NoData(detail) => Some(FailureReason::no_data(detail.clone())),
            ParseOutcome::TransientError(reason) => Some(reason.clone()),
        }
    }
}
