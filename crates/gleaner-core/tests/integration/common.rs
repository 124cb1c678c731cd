//! Test utilities and mock implementations for integration tests.
//!
//! Every mock keeps its state behind `Arc<Mutex<_>>` so a test can hold a
//! clone and inspect what the orchestrator or planner did.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use gleaner_core::facet::{FilterClause, SearchHit, SearchPage, SearchQuery};
use gleaner_core::traits::{FailureLedger, FetchParse, ResultStore, SearchIndex, SnapshotArchive};
use gleaner_core::{
    AppError, FailureEntry, FailureReason, FetchError, ParseOutcome, RawPayload, Record,
    StoreHandles, WorkKey,
};
use serde_json::Value;

// =============================================================================
// Stores
// =============================================================================

#[derive(Clone, Default)]
pub struct MemoryResults {
    pub rows: Arc<Mutex<Vec<(WorkKey, Record)>>>,
    pub fail_commits: Arc<AtomicBool>,
}

impl MemoryResults {
    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn rows_for(&self, key: &WorkKey) -> Vec<Record> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn seed(&self, key: WorkKey) {
        let record = Record::new().with("Key", key.to_string());
        self.rows.lock().unwrap().push((key, record));
    }

    fn check_commit(&self) -> Result<(), AppError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(AppError::StoreError("disk full".to_string()));
        }
        Ok(())
    }
}

impl ResultStore for MemoryResults {
    fn contains(&self, key: &WorkKey) -> bool {
        self.rows.lock().unwrap().iter().any(|(k, _)| k == key)
    }

    fn append(&mut self, key: &WorkKey, record: &Record) -> Result<(), AppError> {
        self.check_commit()?;
        self.rows.lock().unwrap().push((key.clone(), record.clone()));
        Ok(())
    }

    fn replace(&mut self, key: &WorkKey, record: &Record) -> Result<(), AppError> {
        self.check_commit()?;
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|(k, _)| k != key);
        rows.push((key.clone(), record.clone()));
        Ok(())
    }

    fn clear(&mut self) -> Result<usize, AppError> {
        let mut rows = self.rows.lock().unwrap();
        let n = rows.len();
        rows.clear();
        Ok(n)
    }

    fn len(&self) -> usize {
        self.row_count()
    }
}

#[derive(Clone, Default)]
pub struct MemorySnapshots {
    pub files: Arc<Mutex<HashMap<WorkKey, RawPayload>>>,
}

impl MemorySnapshots {
    pub fn keys(&self) -> HashSet<WorkKey> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn seed(&self, key: WorkKey) {
        self.files
            .lock()
            .unwrap()
            .insert(key, RawPayload("<html>old</html>".to_string()));
    }
}

impl SnapshotArchive for MemorySnapshots {
    fn exists(&self, key: &WorkKey) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }

    fn write(&mut self, key: &WorkKey, raw: &RawPayload) -> Result<(), AppError> {
        self.files.lock().unwrap().insert(key.clone(), raw.clone());
        Ok(())
    }

    fn delete(&mut self, key: &WorkKey) -> Result<bool, AppError> {
        Ok(self.files.lock().unwrap().remove(key).is_some())
    }

    fn clear(&mut self) -> Result<usize, AppError> {
        let mut files = self.files.lock().unwrap();
        let n = files.len();
        files.clear();
        Ok(n)
    }
}

#[derive(Clone, Default)]
pub struct MemoryLedger {
    pub entries: Arc<Mutex<Vec<FailureEntry>>>,
    pub loads: Arc<AtomicUsize>,
}

impl MemoryLedger {
    pub fn keys(&self) -> HashSet<WorkKey> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn seed(&self, key: WorkKey) {
        self.entries
            .lock()
            .unwrap()
            .push(FailureEntry::now(key, FailureReason::no_data("seeded")));
    }
}

impl FailureLedger for MemoryLedger {
    fn load_keys(&self) -> Result<HashSet<WorkKey>, AppError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.keys())
    }

    fn contains(&self, key: &WorkKey) -> Result<bool, AppError> {
        Ok(self.keys().contains(key))
    }

    fn append(&mut self, entry: &FailureEntry) -> Result<bool, AppError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.iter().any(|e| e.key == entry.key) {
            return Ok(false);
        }
        entries.push(entry.clone());
        Ok(true)
    }

    fn entries(&self) -> Result<Vec<FailureEntry>, AppError> {
        Ok(self.entries.lock().unwrap().clone())
    }

    fn clear(&mut self) -> Result<usize, AppError> {
        let mut entries = self.entries.lock().unwrap();
        let n = entries.len();
        entries.clear();
        Ok(n)
    }
}

/// Handles to the three in-memory stores, shared with the orchestrator.
#[derive(Clone, Default)]
pub struct MemoryStores {
    pub results: MemoryResults,
    pub snapshots: MemorySnapshots,
    pub ledger: MemoryLedger,
}

impl MemoryStores {
    pub fn handles(&self) -> StoreHandles {
        StoreHandles::new(
            self.results.clone(),
            self.snapshots.clone(),
            self.ledger.clone(),
        )
    }

    /// Ledger keys and snapshot keys never overlap.
    pub fn assert_exclusive(&self) {
        let ledger = self.ledger.keys();
        let snapshots = self.snapshots.keys();
        assert!(
            ledger.is_disjoint(&snapshots),
            "ledger and snapshots overlap: {:?}",
            ledger.intersection(&snapshots).collect::<Vec<_>>()
        );
    }
}

// =============================================================================
// MockFetchParse
// =============================================================================

/// Succeeds for every key except the configured failures; records calls.
#[derive(Clone, Default)]
pub struct MockFetchParse {
    failures: HashMap<WorkKey, ParseOutcome>,
    pub calls: Arc<Mutex<Vec<WorkKey>>>,
    pub version: String,
}

impl MockFetchParse {
    pub fn new() -> Self {
        Self {
            version: "v1".to_string(),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn no_data(mut self, key: WorkKey) -> Self {
        self.failures
            .insert(key, ParseOutcome::NoData("All fields empty after parsing".into()));
        self
    }

    pub fn transient(mut self, key: WorkKey, error: FetchError) -> Self {
        self.failures
            .insert(key, ParseOutcome::TransientError(error.into()));
        self
    }

    pub fn calls(&self) -> Vec<WorkKey> {
        self.calls.lock().unwrap().clone()
    }
}

impl FetchParse for MockFetchParse {
    async fn fetch_parse(&self, key: &WorkKey) -> ParseOutcome {
        self.calls.lock().unwrap().push(key.clone());
        if let Some(outcome) = self.failures.get(key) {
            return outcome.clone();
        }
        ParseOutcome::Success {
            record: Record::new()
                .with("Key", key.to_string())
                .with("Version", self.version.clone()),
            raw: RawPayload(format!("<html>{} {}</html>", key, self.version)),
        }
    }
}

// =============================================================================
// MockSearchIndex
// =============================================================================

/// Filters an in-memory product list the way the search index would.
///
/// `Raw` clauses select the whole category; `Eq` clauses match when the hit's
/// attribute (scalar or array) contains the value.
#[derive(Clone, Default)]
pub struct MockSearchIndex {
    products: Arc<Vec<SearchHit>>,
    failing: Arc<Vec<String>>,
    pub requests: Arc<Mutex<Vec<SearchQuery>>>,
}

impl MockSearchIndex {
    pub fn new(products: Vec<SearchHit>) -> Self {
        Self {
            products: Arc::new(products),
            ..Self::default()
        }
    }

    /// Requests whose rendered filter contains `fragment` time out.
    pub fn failing_on(mut self, fragment: &str) -> Self {
        let mut failing = (*self.failing).clone();
        failing.push(fragment.to_string());
        self.failing = Arc::new(failing);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn matches(hit: &SearchHit, query: &SearchQuery) -> bool {
        query.filter.clauses().iter().all(|clause| match clause {
            FilterClause::Raw(_) => true,
            FilterClause::Eq { attribute, value } => {
                hit.attribute_values(attribute).contains(value)
            }
        })
    }
}

impl SearchIndex for MockSearchIndex {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, FetchError> {
        self.requests.lock().unwrap().push(query.clone());

        let rendered = query.filter.to_string();
        if self.failing.iter().any(|f| rendered.contains(f.as_str())) {
            return Err(FetchError::timeout(30));
        }

        let matching: Vec<&SearchHit> = self
            .products
            .iter()
            .filter(|hit| Self::matches(hit, query))
            .collect();
        let per_page = query.hits_per_page.max(1);
        let hits = matching
            .iter()
            .skip(query.page * per_page)
            .take(per_page)
            .map(|h| (*h).clone())
            .collect();

        Ok(SearchPage {
            hits,
            nb_hits: matching.len(),
            nb_pages: matching.len().div_ceil(per_page),
        })
    }
}

/// Builds a product hit. `kv`/`bil` may be empty to leave the attribute out.
pub fn product(catalog: &str, brand: &str, kv: &str, bil: &str) -> SearchHit {
    let mut map = serde_json::Map::new();
    map.insert("Catalog Number".into(), Value::String(catalog.into()));
    map.insert("Brand".into(), Value::String(brand.into()));
    map.insert("Brands".into(), Value::String(brand.into()));
    map.insert("objectID".into(), Value::String(format!("obj-{}", catalog)));
    if !kv.is_empty() {
        map.insert("kV Class".into(), Value::String(kv.into()));
    }
    if !bil.is_empty() {
        map.insert("BIL".into(), Value::String(bil.into()));
    }
    SearchHit(map)
}
