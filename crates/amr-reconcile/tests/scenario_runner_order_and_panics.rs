//! scenario_runner_order_and_panics
//!
//! # Coverage
//! 1. 100 items at concurrency 4 come back in input order, each fetched once,
//!    never more than 4 calls in flight.
//! 2. A panicking item becomes a failed record; its neighbours succeed.
//! 3. A slow item does not hold back the other workers.
//! 4. Both backends behave the same.

use std::sync::Arc;
use std::time::Duration;

use amr_archive::{ArchiveClient, AuthHeaders};
use amr_reconcile::{run_all, Backend, Job, PassOutcome, RunSummary, RunnerOptions};
use amr_state::{Item, ReconciliationState};
use amr_testkit::{CacheDir, FakeArchive};

fn jobs_for(archive: &FakeArchive, cache: &CacheDir, n: usize) -> Vec<Job> {
    (0..n)
        .map(|i| {
            let h = archive.put(format!("payload number {i}").into_bytes());
            let item = Item::new(&h, format!("/remote/file_{i:03}.fits"));
            Job {
                dest: cache.dest(&item),
                prior: ReconciliationState::unseen(&h),
                item,
            }
        })
        .collect()
}

async fn hundred_in_order(backend: Backend) {
    let archive = Arc::new(FakeArchive::new());
    archive.set_latency(Duration::from_millis(2));
    let cache = CacheDir::new().unwrap();
    let jobs = jobs_for(&archive, &cache, 100);
    let expected: Vec<String> = jobs.iter().map(|j| j.item.content_hash.clone()).collect();

    let client: Arc<dyn ArchiveClient> = archive.clone();
    let opts = RunnerOptions { concurrency: 4, backend };
    let reports = run_all(client, Arc::new(AuthHeaders::anonymous()), jobs, &opts).await;

    let got: Vec<String> = reports.iter().map(|r| r.state.content_hash.clone()).collect();
    assert_eq!(got, expected);
    assert!(reports.iter().all(|r| r.outcome() == PassOutcome::Downloaded));
    assert_eq!(archive.fetch_calls(), 100);
    for h in &expected {
        assert_eq!(archive.fetch_calls_for(h), 1);
    }
    assert!(archive.max_concurrent() <= 4, "max in flight {}", archive.max_concurrent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_items_in_order_with_tasks_backend() {
    hundred_in_order(Backend::Tasks).await;
}

#[tokio::test]
async fn hundred_items_in_order_with_local_backend() {
    hundred_in_order(Backend::Local).await;
}

async fn panic_is_contained(backend: Backend) {
    let archive = Arc::new(FakeArchive::new());
    let cache = CacheDir::new().unwrap();
    let jobs = jobs_for(&archive, &cache, 3);
    let bad = jobs[1].item.content_hash.clone();
    let bad_dest = jobs[1].dest.clone();
    archive.panic_on_fetch(&bad);

    let client: Arc<dyn ArchiveClient> = archive.clone();
    let opts = RunnerOptions { concurrency: 2, backend };
    let reports = run_all(client, Arc::new(AuthHeaders::anonymous()), jobs, &opts).await;

    assert_eq!(reports.len(), 3);
    assert!(reports[1].panicked);
    assert_eq!(reports[1].state.content_hash, bad);
    assert_eq!(reports[1].state.path, bad_dest.display().to_string());
    assert_eq!(reports[1].state.downloaded_ok, Some(false));
    assert_eq!(reports[0].outcome(), PassOutcome::Downloaded);
    assert_eq!(reports[2].outcome(), PassOutcome::Downloaded);

    let summary = RunSummary::from_reports(&reports);
    assert_eq!(
        summary,
        RunSummary { total: 3, downloaded: 2, skipped: 0, failed: 1 }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_item_is_contained_with_tasks_backend() {
    panic_is_contained(Backend::Tasks).await;
}

#[tokio::test]
async fn panicking_item_is_contained_with_local_backend() {
    panic_is_contained(Backend::Local).await;
}

#[tokio::test]
async fn zero_concurrency_is_treated_as_one() {
    let archive = Arc::new(FakeArchive::new());
    let cache = CacheDir::new().unwrap();
    let jobs = jobs_for(&archive, &cache, 5);
    let client: Arc<dyn ArchiveClient> = archive.clone();
    let opts = RunnerOptions { concurrency: 0, backend: Backend::Tasks };
    let reports = run_all(client, Arc::new(AuthHeaders::anonymous()), jobs, &opts).await;
    assert_eq!(reports.len(), 5);
    assert_eq!(archive.max_concurrent(), 1);
}

async fn slow_item_does_not_stall_pool(backend: Backend) {
    let archive = Arc::new(FakeArchive::new());
    archive.set_latency(Duration::from_millis(50));
    let cache = CacheDir::new().unwrap();
    let jobs = jobs_for(&archive, &cache, 13);
    let slow = jobs[0].item.content_hash.clone();
    archive.set_latency_for(&slow, Duration::from_millis(1500));
    let expected: Vec<String> = jobs.iter().map(|j| j.item.content_hash.clone()).collect();

    let client: Arc<dyn ArchiveClient> = archive.clone();
    let opts = RunnerOptions { concurrency: 4, backend };
    let run = run_all(client, Arc::new(AuthHeaders::anonymous()), jobs, &opts);
    let observe = async {
        // Three free workers clear the 12 fast items in ~200ms.
        tokio::time::sleep(Duration::from_millis(700)).await;
        archive.fetch_calls()
    };
    let (reports, started_while_slow) = tokio::join!(run, observe);

    assert_eq!(started_while_slow, 13, "fast items queued behind the slow one");
    let got: Vec<String> = reports.iter().map(|r| r.state.content_hash.clone()).collect();
    assert_eq!(got, expected);
    assert!(reports.iter().all(|r| r.outcome() == PassOutcome::Downloaded));
    assert!(archive.max_concurrent() <= 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_item_does_not_stall_tasks_backend() {
    slow_item_does_not_stall_pool(Backend::Tasks).await;
}

#[tokio::test]
async fn slow_item_does_not_stall_local_backend() {
    slow_item_does_not_stall_pool(Backend::Local).await;
}
