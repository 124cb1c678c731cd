//! Harvest statistics.
//!
//! Pure bookkeeping, decoupled from I/O and CLI rendering.

/// Outcome of processing a single work key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestOutcome {
    /// Record committed to the result store.
    Succeeded,
    /// Fetch or parse failed; key added to the failure ledger.
    Failed,
    /// Mode rules said not to fetch.
    Skipped,
    /// A store operation failed; the key will be retried next run.
    StoreError,
}

/// Counters for a harvest run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    pub succeeded: usize,
    /// Includes store errors.
    pub failed: usize,
    pub skipped: usize,
    pub store_errors: usize,
}

impl HarvestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: HarvestOutcome) {
        match outcome {
            HarvestOutcome::Succeeded => self.succeeded += 1,
            HarvestOutcome::Failed => self.failed += 1,
            HarvestOutcome::Skipped => self.skipped += 1,
            HarvestOutcome::StoreError => {
                self.failed += 1;
                self.store_errors += 1;
            }
        }
    }

    /// Keys that went through a fetch (or a failed commit).
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Returns the total number of keys visited.
    pub fn total(&self) -> usize {
        self.attempted() + self.skipped
    }

    /// `succeeded / attempted`, or 0 when nothing was attempted.
    pub fn success_rate(&self) -> f64 {
        match self.attempted() {
            0 => 0.0,
            n => self.succeeded as f64 / n as f64,
        }
    }
}

/// What a scratch reset removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub result_rows: usize,
    pub ledger_entries: usize,
    pub snapshots: usize,
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestReport {
    pub stats: HarvestStats,
    /// The run stopped early on a cancellation request.
    pub cancelled: bool,
    /// Keys visited before the run ended.
    pub processed: usize,
    /// Keys the source resolved to.
    pub total_keys: usize,
    /// Set when the run started with a scratch reset.
    pub reset: Option<ResetSummary>,
}

impl HarvestReport {
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.processed == self.total_keys
    }
}
