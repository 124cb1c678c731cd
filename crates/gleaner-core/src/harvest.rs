//! Harvest orchestration: the per-key loop that keeps the result store,
//! snapshot archive and failure ledger consistent across runs.
//!
//! # Commit order
//!
//! For each fetched key:
//! - success: snapshot write, then result commit (the snapshot is removed
//!   again if the commit fails, so the next append run retries the key);
//! - failure: snapshot delete, then ledger append.
//!
//! Store errors are logged and counted; they never abort the batch.
//!
//! # Cancellation
//!
//! [`HarvestOrchestrator::run_cancellable`] checks the token between keys and
//! while waiting out the politeness delay. An in-flight fetch is never
//! interrupted, so every visited key is fully committed or untouched.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::config::HarvestConfig;
use crate::error::AppError;
use crate::mode::{resolve, Action, Mode, StoreState};
use crate::models::{FailureEntry, FailureReason, KeyKind, ParseOutcome, Parsed, WorkKey};
use crate::source::WorkKeySource;
use crate::stats::{HarvestOutcome, HarvestReport, HarvestStats, ResetSummary};
use crate::traits::{FailureLedger, FetchParse, Fetcher, Parser, ResultStore, SnapshotArchive};

/// The three persistent stores of one catalog.
pub struct StoreHandles {
    pub results: Box<dyn ResultStore>,
    pub snapshots: Box<dyn SnapshotArchive>,
    pub ledger: Box<dyn FailureLedger>,
}

impl StoreHandles {
    pub fn new(
        results: impl ResultStore + 'static,
        snapshots: impl SnapshotArchive + 'static,
        ledger: impl FailureLedger + 'static,
    ) -> Self {
        Self {
            results: Box::new(results),
            snapshots: Box::new(snapshots),
            ledger: Box::new(ledger),
        }
    }
}

/// Drives a work-key source through a [`FetchParse`] implementation.
pub struct HarvestOrchestrator {
    stores: StoreHandles,
    config: HarvestConfig,
}

impl HarvestOrchestrator {
    pub fn new(stores: StoreHandles, config: HarvestConfig) -> Self {
        Self { stores, config }
    }

    pub fn stores(&self) -> &StoreHandles {
        &self.stores
    }

    /// Runs the harvest to completion.
    pub async fn run<F: FetchParse>(
        &mut self,
        source: &WorkKeySource,
        kind: KeyKind,
        mode: Mode,
        fetch_parse: &F,
    ) -> Result<HarvestReport, AppError> {
        self.run_cancellable(source, kind, mode, fetch_parse, CancellationToken::new())
            .await
    }

    /// Runs the harvest, stopping cleanly between keys once `cancel_token`
    /// fires.
    ///
    /// Returns `Err` only for setup failures (unusable source, scratch reset or
    /// ledger load failure), all of which happen before the first fetch.
    pub async fn run_cancellable<F: FetchParse>(
        &mut self,
        source: &WorkKeySource,
        kind: KeyKind,
        mode: Mode,
        fetch_parse: &F,
        cancel_token: CancellationToken,
    ) -> Result<HarvestReport, AppError> {
        let keys = source.resolve(kind)?;
        let total = keys.len();

        let reset = if mode == Mode::Scratch {
            Some(self.reset()?)
        } else {
            None
        };

        let mut failed_keys = self.stores.ledger.load_keys()?;
        tracing::info!(
            keys = total,
            mode = %mode,
            ledgered = failed_keys.len(),
            existing_rows = self.stores.results.len(),
            "Starting harvest"
        );

        let mut stats = HarvestStats::new();
        let mut processed = 0;
        let mut cancelled = false;
        let mut fetched_any = false;

        for (i, key) in keys.iter().enumerate() {
            if cancel_token.is_cancelled() {
                cancelled = true;
                break;
            }

            let state = StoreState {
                in_results: self.stores.results.contains(key),
                in_snapshots: self.stores.snapshots.exists(key),
                in_ledger: failed_keys.contains(key),
            };
            let resolution = resolve(mode, &state);

            if resolution.action == Action::Skip {
                if resolution.delete_snapshot {
                    if let Err(e) = self.stores.snapshots.delete(key) {
                        tracing::warn!(key = %key, error = %e, "Failed to delete stale snapshot");
                    }
                }
                tracing::debug!("[{}/{}] Skipping {}: {}", i + 1, total, key, resolution.reason);
                stats.record(HarvestOutcome::Skipped);
                processed += 1;
                continue;
            }

            if fetched_any && !self.config.delay.is_zero() {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.config.delay) => {}
                }
            }
            fetched_any = true;

            tracing::info!("[{}/{}] Fetching {} ({})", i + 1, total, key, resolution.reason);
            let outcome = fetch_parse.fetch_parse(key).await;
            let result = self.commit(key, outcome, resolution.action, &mut failed_keys);
            stats.record(result);
            processed += 1;
        }

        if cancelled {
            tracing::info!(
                processed,
                remaining = total - processed,
                "Harvest cancelled, stopping after last committed key"
            );
        }

        tracing::info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            store_errors = stats.store_errors,
            "Harvest finished"
        );

        Ok(HarvestReport {
            stats,
            cancelled,
            processed,
            total_keys: total,
            reset,
        })
    }

    /// Clears all three stores.
    pub fn reset(&mut self) -> Result<ResetSummary, AppError> {
        let summary = ResetSummary {
            result_rows: self.stores.results.clear()?,
            ledger_entries: self.stores.ledger.clear()?,
            snapshots: self.stores.snapshots.clear()?,
        };
        tracing::info!(
            result_rows = summary.result_rows,
            ledger_entries = summary.ledger_entries,
            snapshots = summary.snapshots,
            "Scratch mode: cleared all stores"
        );
        Ok(summary)
    }

    fn commit(
        &mut self,
        key: &WorkKey,
        outcome: ParseOutcome,
        action: Action,
        failed_keys: &mut HashSet<WorkKey>,
    ) -> HarvestOutcome {
        let (record, raw) = match outcome {
            ParseOutcome::Success { record, raw } => (record, raw),
            ParseOutcome::NoData(detail) => {
                return self.record_failure(key, FailureReason::no_data(detail), failed_keys)
            }
            ParseOutcome::TransientError(reason) => {
                return self.record_failure(key, reason, failed_keys)
            }
        };

        if let Err(e) = self.stores.snapshots.write(key, &raw) {
            tracing::error!(key = %key, error = %e, "Failed to write snapshot");
            return HarvestOutcome::StoreError;
        }

        let committed = match action {
            Action::FetchAndReplace => self.stores.results.replace(key, &record),
            _ => self.stores.results.append(key, &record),
        };

        match committed {
            Ok(()) => {
                tracing::debug!(key = %key, "Record committed");
                HarvestOutcome::Succeeded
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to commit record");
                if let Err(e) = self.stores.snapshots.delete(key) {
                    tracing::warn!(key = %key, error = %e, "Failed to roll back snapshot");
                }
                HarvestOutcome::StoreError
            }
        }
    }

    fn record_failure(
        &mut self,
        key: &WorkKey,
        reason: FailureReason,
        failed_keys: &mut HashSet<WorkKey>,
    ) -> HarvestOutcome {
        tracing::warn!(key = %key, reason = %reason, "Harvest failed for key");

        if let Err(e) = self.stores.snapshots.delete(key) {
            tracing::warn!(key = %key, error = %e, "Failed to delete snapshot of failed key");
        }

        if failed_keys.contains(key) {
            return HarvestOutcome::Failed;
        }

        match self.stores.ledger.append(&FailureEntry::now(key.clone(), reason)) {
            Ok(_) => {
                failed_keys.insert(key.clone());
                HarvestOutcome::Failed
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to append ledger entry");
                HarvestOutcome::StoreError
            }
        }
    }
}

/// Composes a [`Fetcher`] and a [`Parser`] into a [`FetchParse`].
///
/// Fetch errors keep their kind; parser errors are tagged `parser`. A
/// `Parsed::NoData` or an all-blank record becomes `NoData`.
pub struct FetchParsePipeline<F, P> {
    fetcher: F,
    parser: P,
}

impl<F: Fetcher, P: Parser> FetchParsePipeline<F, P> {
    pub fn new(fetcher: F, parser: P) -> Self {
        Self { fetcher, parser }
    }
}

impl<F: Fetcher, P: Parser> FetchParse for FetchParsePipeline<F, P> {
    async fn fetch_parse(&self, key: &WorkKey) -> ParseOutcome {
        let raw = match self.fetcher.fetch(key).await {
            Ok(raw) => raw,
            Err(e) => return ParseOutcome::TransientError(e.into()),
        };

        match self.parser.parse(key, &raw) {
            Ok(Parsed::Record(record)) if record.is_blank() => {
                ParseOutcome::NoData("All fields empty after parsing".to_string())
            }
            Ok(Parsed::Record(record)) => ParseOutcome::Success { record, raw },
            Ok(Parsed::NoData(detail)) => ParseOutcome::NoData(detail),
            Err(e) => ParseOutcome::TransientError(FailureReason::parser(e.to_string())),
        }
    }
}
