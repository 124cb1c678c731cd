//! Trait definitions for the harvester's collaborators.
//!
//! The network side (`Fetcher`, `Parser`, `SearchIndex`, `FetchParse`) is
//! async; the three persistent stores are synchronous and owned by a single
//! orchestrator.
//!
//! # Example
//!
//! ```
//! use gleaner_core::traits::{FetchParse, ResultStore};
//! use gleaner_core::models::{ParseOutcome, WorkKey};
//! use gleaner_core::AppError;
//!
//! async fn refresh_one<F, R>(fetch_parse: &F, results: &mut R, key: &WorkKey) -> Result<bool, AppError>
//! where
//!     F: FetchParse,
//!     R: ResultStore,
//! {
//!     match fetch_parse.fetch_parse(key).await {
//!         ParseOutcome::Success { record, .. } => {
//!             results.replace(key, &record)?;
//!             Ok(true)
//!         }
//!         _ => Ok(false),
//!     }
//! }
//! ```

use std::collections::HashSet;
use std::future::Future;

use crate::error::{AppError, FetchError};
use crate::facet::{SearchPage, SearchQuery};
use crate::models::{FailureEntry, ParseOutcome, Parsed, RawPayload, Record, WorkKey};

/// Retrieves the raw payload for one work key.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, key: &WorkKey)
        -> impl Future<Output = Result<RawPayload, FetchError>> + Send;
}

/// Extracts a record from a raw payload.
pub trait Parser: Send + Sync {
    /// Returns `Parsed::NoData` when the page loaded but holds no record.
    /// An `Err` means the payload could not be interpreted at all.
    fn parse(&self, key: &WorkKey, raw: &RawPayload) -> Result<Parsed, AppError>;
}

/// Fetch and parse combined, the unit the orchestrator drives.
///
/// Implementations never fail: every error is folded into the outcome.
pub trait FetchParse: Send + Sync {
    fn fetch_parse(&self, key: &WorkKey) -> impl Future<Output = ParseOutcome> + Send;
}

/// Paginated search API with a hard per-query result ceiling.
pub trait SearchIndex: Send + Sync {
    fn search(
        &self,
        query: &SearchQuery,
    ) -> impl Future<Output = Result<SearchPage, FetchError>> + Send;
}

/// Structured result table keyed by work key.
pub trait ResultStore: Send {
    fn contains(&self, key: &WorkKey) -> bool;

    /// Adds a row. Callers ensure the key has no row yet.
    fn append(&mut self, key: &WorkKey, record: &Record) -> Result<(), AppError>;

    /// Removes any rows for the key, then adds the new one.
    fn replace(&mut self, key: &WorkKey, record: &Record) -> Result<(), AppError>;

    /// Removes every row. Returns how many were removed.
    fn clear(&mut self) -> Result<usize, AppError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw payload archive, one entry per successfully harvested key.
pub trait SnapshotArchive: Send {
    fn exists(&self, key: &WorkKey) -> bool;

    fn write(&mut self, key: &WorkKey, raw: &RawPayload) -> Result<(), AppError>;

    /// Returns whether a snapshot was actually removed.
    fn delete(&mut self, key: &WorkKey) -> Result<bool, AppError>;

    fn clear(&mut self) -> Result<usize, AppError>;
}

/// Append-only log of failed keys.
pub trait FailureLedger: Send {
    /// Loads the full key set. Read once per run.
    fn load_keys(&self) -> Result<HashSet<WorkKey>, AppError>;

    fn contains(&self, key: &WorkKey) -> Result<bool, AppError>;

    /// Appends an entry unless the key is already logged.
    ///
    /// Returns `false` when the entry was a duplicate and nothing was written.
    fn append(&mut self, entry: &FailureEntry) -> Result<bool, AppError>;

    fn entries(&self) -> Result<Vec<FailureEntry>, AppError>;

    fn clear(&mut self) -> Result<usize, AppError>;
}
