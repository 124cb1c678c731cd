//! Gleaner Store - file-backed persistence for harvested catalogs.
//!
//! Each catalog owns one data directory:
//!
//! ```text
//! <data_dir>/
//!     results.csv     result table, one row per key
//!     failed.csv      failure ledger (Timestamp,WorkKey,Reason)
//!     raw/            one snapshot file per harvested key
//! ```
//!
//! - [`results`] - CSV result table
//! - [`snapshots`] - raw payload archive
//! - [`ledger`] - append-only failure ledger
//! - [`audit`] - cross-store consistency report

pub mod audit;
pub mod ledger;
pub mod results;
pub mod snapshots;

use std::path::{Path, PathBuf};

use gleaner_core::traits::ResultStore;
use gleaner_core::{AppError, KeyKind, StoreHandles};

pub use audit::StoreAudit;
pub use ledger::CsvFailureLedger;
pub use results::CsvResultStore;
pub use snapshots::FsSnapshotArchive;

pub const RESULTS_FILE: &str = "results.csv";
pub const LEDGER_FILE: &str = "failed.csv";
pub const SNAPSHOT_DIR: &str = "raw";

/// Column set and naming of one catalog's stores.
#[derive(Debug, Clone, Copy)]
pub struct StoreLayout {
    pub columns: &'static [&'static str],
    pub key_column: &'static str,
    pub key_kind: KeyKind,
    pub snapshot_prefix: &'static str,
    pub snapshot_extension: &'static str,
}

/// The three stores of one catalog, opened from its data directory.
pub struct CatalogStores {
    pub results: CsvResultStore,
    pub snapshots: FsSnapshotArchive,
    pub ledger: CsvFailureLedger,
}

impl CatalogStores {
    pub fn open(data_dir: &Path, layout: &StoreLayout) -> Result<Self, AppError> {
        let results = CsvResultStore::open(
            data_dir.join(RESULTS_FILE),
            layout.columns,
            layout.key_column,
            layout.key_kind,
        )?;
        let snapshots = FsSnapshotArchive::new(
            data_dir.join(SNAPSHOT_DIR),
            layout.snapshot_prefix,
            layout.snapshot_extension,
        );
        let ledger = CsvFailureLedger::new(data_dir.join(LEDGER_FILE), layout.key_kind);

        tracing::debug!(
            data_dir = %data_dir.display(),
            rows = results.len(),
            "Opened catalog stores"
        );

        Ok(Self {
            results,
            snapshots,
            ledger,
        })
    }

    pub fn results_path(&self) -> PathBuf {
        self.results.path().to_path_buf()
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger.path().to_path_buf()
    }

    pub fn audit(&self) -> Result<StoreAudit, AppError> {
        StoreAudit::collect(&self.results, &self.snapshots, &self.ledger)
    }

    pub fn into_handles(self) -> StoreHandles {
        StoreHandles::new(self.results, self.snapshots, self.ledger)
    }
}
