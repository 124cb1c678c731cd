//! Orchestrator behaviour across modes and repeated runs.

use std::sync::atomic::Ordering;
use std::time::Duration;

use gleaner_core::{
    AppError, FailureKind, FetchError, HarvestConfig, HarvestOrchestrator, KeyKind, Mode,
    WorkKey, WorkKeySource,
};
use tokio_util::sync::CancellationToken;

use super::common::{MemoryStores, MockFetchParse};

fn no_delay() -> HarvestConfig {
    HarvestConfig::default().with_delay(Duration::ZERO)
}

fn range(start: u64, end: u64) -> WorkKeySource {
    WorkKeySource::Range { start, end }
}

fn idx(i: u64) -> WorkKey {
    WorkKey::Index(i)
}

#[tokio::test]
async fn test_failed_key_goes_to_ledger_only() {
    let stores = MemoryStores::default();
    let fetch = MockFetchParse::new().no_data(idx(2));
    let mut orchestrator = HarvestOrchestrator::new(stores.handles(), no_delay());

    let report = orchestrator
        .run(&range(1, 3), KeyKind::Index, Mode::Append, &fetch)
        .await
        .unwrap();

    assert_eq!(report.stats.succeeded, 2);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.skipped, 0);
    assert_eq!(report.processed, 3);
    assert!(report.is_complete());

    assert!(stores.results.rows_for(&idx(2)).is_empty());
    assert_eq!(stores.results.row_count(), 2);
    assert_eq!(stores.snapshots.keys(), [idx(1), idx(3)].into_iter().collect());
    assert_eq!(stores.ledger.keys(), [idx(2)].into_iter().collect());
    stores.assert_exclusive();
}

#[tokio::test]
async fn test_second_append_run_fetches_nothing() {
    let stores = MemoryStores::default();
    let first = MockFetchParse::new().no_data(idx(2));
    HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(&range(1, 3), KeyKind::Index, Mode::Append, &first)
        .await
        .unwrap();

    let second = MockFetchParse::new();
    let report = HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(&range(1, 3), KeyKind::Index, Mode::Append, &second)
        .await
        .unwrap();

    assert!(second.calls().is_empty());
    assert_eq!(report.stats.skipped, 3);
    assert_eq!(report.stats.attempted(), 0);
    assert_eq!(stores.results.row_count(), 2);
    assert_eq!(stores.ledger.entry_count(), 1);
}

#[tokio::test]
async fn test_overwrite_refetches_but_never_ledgered_keys() {
    let stores = MemoryStores::default();
    HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(
            &range(1, 3),
            KeyKind::Index,
            Mode::Append,
            &MockFetchParse::new().no_data(idx(2)),
        )
        .await
        .unwrap();

    let fetch = MockFetchParse::new().with_version("v2");
    let report = HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(&range(1, 3), KeyKind::Index, Mode::Overwrite, &fetch)
        .await
        .unwrap();

    assert_eq!(fetch.calls(), vec![idx(1), idx(3)]);
    assert_eq!(report.stats.succeeded, 2);
    assert_eq!(report.stats.skipped, 1);

    for key in [idx(1), idx(3)] {
        let rows = stores.results.rows_for(&key);
        assert_eq!(rows.len(), 1, "exactly one row for {}", key);
        assert_eq!(rows[0].get("Version"), Some("v2"));
    }
    assert!(stores.results.rows_for(&idx(2)).is_empty());
    stores.assert_exclusive();
}

#[tokio::test]
async fn test_scratch_clears_everything_before_fetching() {
    let stores = MemoryStores::default();
    for i in 1..=100 {
        stores.results.seed(idx(i));
    }
    for i in 1..=5 {
        stores.ledger.seed(idx(i));
    }
    for i in 6..=100 {
        stores.snapshots.seed(idx(i));
    }

    let fetch = MockFetchParse::new();
    let report = HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(&range(1, 100), KeyKind::Index, Mode::Scratch, &fetch)
        .await
        .unwrap();

    let reset = report.reset.expect("scratch reports its reset");
    assert_eq!(reset.result_rows, 100);
    assert_eq!(reset.ledger_entries, 5);
    assert_eq!(reset.snapshots, 95);

    assert_eq!(fetch.calls().len(), 100);
    assert_eq!(report.stats.succeeded, 100);
    assert_eq!(stores.results.row_count(), 100);
    assert_eq!(stores.ledger.entry_count(), 0);
    assert_eq!(stores.snapshots.keys().len(), 100);
}

#[tokio::test]
async fn test_ledgered_key_loses_stale_snapshot_on_skip() {
    let stores = MemoryStores::default();
    stores.ledger.seed(idx(7));
    stores.snapshots.seed(idx(7));

    let fetch = MockFetchParse::new();
    let report = HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(&range(7, 7), KeyKind::Index, Mode::Append, &fetch)
        .await
        .unwrap();

    assert!(fetch.calls().is_empty());
    assert_eq!(report.stats.skipped, 1);
    assert!(stores.snapshots.keys().is_empty());
    stores.assert_exclusive();
}

#[tokio::test]
async fn test_snapshot_alone_counts_as_harvested_in_append() {
    let stores = MemoryStores::default();
    stores.snapshots.seed(idx(4));

    let fetch = MockFetchParse::new();
    HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(&range(4, 5), KeyKind::Index, Mode::Append, &fetch)
        .await
        .unwrap();

    assert_eq!(fetch.calls(), vec![idx(5)]);
}

#[tokio::test]
async fn test_transient_failure_is_tagged_and_not_retried() {
    let stores = MemoryStores::default();
    let fetch = MockFetchParse::new().transient(idx(1), FetchError::timeout(30));
    HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(&range(1, 1), KeyKind::Index, Mode::Append, &fetch)
        .await
        .unwrap();

    let entries = stores.ledger.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason.kind, FailureKind::Timeout);
    assert!(entries[0].reason.kind.is_transient());

    let retry = MockFetchParse::new();
    HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(&range(1, 1), KeyKind::Index, Mode::Overwrite, &retry)
        .await
        .unwrap();
    assert!(retry.calls().is_empty());
}

#[tokio::test]
async fn test_failed_commit_rolls_back_snapshot() {
    let stores = MemoryStores::default();
    stores.results.fail_commits.store(true, Ordering::SeqCst);

    let report = HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(&range(1, 2), KeyKind::Index, Mode::Append, &MockFetchParse::new())
        .await
        .unwrap();

    assert_eq!(report.stats.store_errors, 2);
    assert_eq!(report.stats.failed, 2);
    assert!(stores.snapshots.keys().is_empty());
    assert_eq!(stores.ledger.entry_count(), 0);

    stores.results.fail_commits.store(false, Ordering::SeqCst);
    let retry = MockFetchParse::new();
    HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(&range(1, 2), KeyKind::Index, Mode::Append, &retry)
        .await
        .unwrap();
    assert_eq!(retry.calls(), vec![idx(1), idx(2)]);
    assert_eq!(stores.results.row_count(), 2);
}

#[tokio::test]
async fn test_ledger_loaded_once_per_run() {
    let stores = MemoryStores::default();
    let fetch = MockFetchParse::new().no_data(idx(1)).no_data(idx(3));
    HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(&range(1, 5), KeyKind::Index, Mode::Append, &fetch)
        .await
        .unwrap();

    assert_eq!(stores.ledger.loads.load(Ordering::SeqCst), 1);
    assert_eq!(stores.ledger.entry_count(), 2);
}

#[tokio::test]
async fn test_duplicate_keys_in_source_fetched_once() {
    let stores = MemoryStores::default();
    let fetch = MockFetchParse::new();
    HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(
            &WorkKeySource::from_list_arg("A1,B2,A1"),
            KeyKind::Code,
            Mode::Overwrite,
            &fetch,
        )
        .await
        .unwrap();

    assert_eq!(fetch.calls(), vec![WorkKey::from("A1"), WorkKey::from("B2")]);
}

#[tokio::test]
async fn test_invalid_source_touches_no_store() {
    let stores = MemoryStores::default();
    stores.results.seed(idx(1));
    stores.ledger.seed(idx(2));

    let result = HarvestOrchestrator::new(stores.handles(), no_delay())
        .run(&range(10, 5), KeyKind::Index, Mode::Scratch, &MockFetchParse::new())
        .await;

    assert!(matches!(result, Err(AppError::InvalidWorkSource(_))));
    assert_eq!(stores.results.row_count(), 1);
    assert_eq!(stores.ledger.entry_count(), 1);
    assert_eq!(stores.ledger.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_no_delay_before_first_fetch() {
    let stores = MemoryStores::default();
    let config = HarvestConfig::default().with_delay(Duration::from_secs(60));

    let fetch = MockFetchParse::new();
    let source = range(1, 1);
    let mut orchestrator = HarvestOrchestrator::new(stores.handles(), config);
    let run = orchestrator.run(&source, KeyKind::Index, Mode::Append, &fetch);
    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("single fetch must not wait out the delay")
        .unwrap();
    assert_eq!(report.stats.succeeded, 1);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let stores = MemoryStores::default();
    let token = CancellationToken::new();
    token.cancel();

    let fetch = MockFetchParse::new();
    let report = HarvestOrchestrator::new(stores.handles(), no_delay())
        .run_cancellable(&range(1, 3), KeyKind::Index, Mode::Append, &fetch, token)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.processed, 0);
    assert!(fetch.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_during_delay_stops_after_committed_key() {
    let stores = MemoryStores::default();
    let token = CancellationToken::new();
    let config = HarvestConfig::default().with_delay(Duration::from_secs(60));

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let fetch = MockFetchParse::new();
    let report = tokio::time::timeout(
        Duration::from_secs(5),
        HarvestOrchestrator::new(stores.handles(), config).run_cancellable(
            &range(1, 3),
            KeyKind::Index,
            Mode::Append,
            &fetch,
            token,
        ),
    )
    .await
    .expect("cancellation interrupts the delay")
    .unwrap();

    assert!(report.cancelled);
    assert!(!report.is_complete());
    assert_eq!(report.processed, 1);
    assert_eq!(fetch.calls(), vec![idx(1)]);
    assert_eq!(stores.results.row_count(), 1);
    assert_eq!(stores.snapshots.keys().len(), 1);
}
