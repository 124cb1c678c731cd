//! Consistency report over one catalog's three stores.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use gleaner_core::traits::{FailureLedger, ResultStore};
use gleaner_core::{AppError, FailureKind};

use crate::ledger::CsvFailureLedger;
use crate::results::CsvResultStore;
use crate::snapshots::FsSnapshotArchive;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreAudit {
    pub result_rows: usize,
    pub snapshot_files: usize,
    pub ledger_entries: usize,
    pub ledger_by_kind: BTreeMap<FailureKind, usize>,
    /// Ledgered keys that still have a snapshot file.
    pub conflicts: Vec<String>,
    /// Snapshots with no result row, typically left by an interrupted commit.
    /// Append runs treat these keys as harvested.
    pub unrecorded_snapshots: Vec<String>,
    /// Distinct keys that map to the same snapshot file name.
    pub stem_collisions: Vec<Vec<String>>,
}

impl StoreAudit {
    pub fn collect(
        results: &CsvResultStore,
        snapshots: &FsSnapshotArchive,
        ledger: &CsvFailureLedger,
    ) -> Result<Self, AppError> {
        let stems = snapshots.stems()?;
        let entries = ledger.entries()?;

        let mut ledger_by_kind = BTreeMap::new();
        for entry in &entries {
            *ledger_by_kind.entry(entry.reason.kind).or_insert(0) += 1;
        }

        let result_keys = results.keys();
        let ledger_stems: HashSet<String> = entries.iter().map(|e| e.key.file_stem()).collect();
        let result_stems: HashSet<String> = result_keys.iter().map(|k| k.file_stem()).collect();

        let mut keys_by_stem: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for key in result_keys.iter().chain(entries.iter().map(|e| &e.key)) {
            keys_by_stem
                .entry(key.file_stem())
                .or_default()
                .insert(key.to_string());
        }
        let stem_collisions = keys_by_stem
            .into_values()
            .filter(|keys| keys.len() > 1)
            .map(|keys| keys.into_iter().collect())
            .collect();

        let conflicts = stems
            .iter()
            .filter(|s| ledger_stems.contains(*s))
            .cloned()
            .collect();
        let unrecorded_snapshots = stems
            .iter()
            .filter(|s| !result_stems.contains(*s))
            .cloned()
            .collect();

        Ok(Self {
            result_rows: results.len(),
            snapshot_files: stems.len(),
            ledger_entries: entries.len(),
            ledger_by_kind,
            conflicts,
            unrecorded_snapshots,
            stem_collisions,
        })
    }

    pub fn transient_failures(&self) -> usize {
        self.ledger_by_kind
            .iter()
            .filter(|(kind, _)| kind.is_transient())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn permanent_failures(&self) -> usize {
        self.ledger_entries - self.transient_failures()
    }

    /// Ledger and snapshot keys are disjoint.
    pub fn is_consistent(&self) -> bool {
        self.conflicts.is_empty()
    }
}
