//! Bounded, order-preserving dispatch of item passes.
//!
//! Results come back in job order regardless of completion order. A panic
//! inside a pass is contained here and reported as a failed item; it never
//! reaches the caller.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::path::PathBuf;
use std::sync::Arc;

use amr_archive::{ArchiveClient, AuthHeaders};
use amr_state::{Item, ReconciliationState};
use futures_util::{stream, FutureExt, Stream, StreamExt};
use tracing::{debug, error};

use crate::engine::reconcile_item;
use crate::types::{Backend, PassPlan, PassReport, RunnerOptions};

/// One unit of work: an item, its prior ledger record and its destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    pub item: Item,
    pub prior: ReconciliationState,
    pub dest: PathBuf,
}

/// Run every job exactly once with at most `opts.concurrency` in flight.
///
/// Dispatch is unordered: a slot frees as soon as its pass finishes, so one
/// slow item never holds back the others. Reports are put back in job order
/// before returning.
pub async fn run_all(
    archive: Arc<dyn ArchiveClient>,
    headers: Arc<AuthHeaders>,
    jobs: Vec<Job>,
    opts: &RunnerOptions,
) -> Vec<PassReport> {
    let limit = opts.concurrency.max(1);
    let n = jobs.len();
    debug!(jobs = n, limit, backend = %opts.backend, "dispatching");

    match opts.backend {
        Backend::Tasks => {
            let passes = stream::iter(jobs.into_iter().enumerate().map(|(idx, job)| {
                let archive = Arc::clone(&archive);
                let headers = Arc::clone(&headers);
                let fallback = (job.prior.clone(), job.dest.clone());
                async move {
                    let handle = tokio::spawn(async move {
                        reconcile_item(archive.as_ref(), &headers, &job.item, &job.prior, &job.dest)
                            .await
                    });
                    let report = match handle.await {
                        Ok(report) => report,
                        Err(e) => {
                            let why = if e.is_panic() {
                                panic_message(e.into_panic().as_ref())
                            } else {
                                "task cancelled".to_string()
                            };
                            failed_pass(&fallback.0, &fallback.1, &why)
                        }
                    };
                    (idx, report)
                }
            }))
            .buffer_unordered(limit);
            in_job_order(passes, n).await
        }
        Backend::Local => {
            let passes = stream::iter(jobs.into_iter().enumerate().map(|(idx, job)| {
                let archive = Arc::clone(&archive);
                let headers = Arc::clone(&headers);
                async move {
                    let pass =
                        reconcile_item(archive.as_ref(), &headers, &job.item, &job.prior, &job.dest);
                    let report = match AssertUnwindSafe(pass).catch_unwind().await {
                        Ok(report) => report,
                        Err(payload) => {
                            failed_pass(&job.prior, &job.dest, &panic_message(payload.as_ref()))
                        }
                    };
                    (idx, report)
                }
            }))
            .buffer_unordered(limit);
            in_job_order(passes, n).await
        }
    }
}

/// Drain `(job index, report)` pairs as they complete into job order.
async fn in_job_order<S>(passes: S, n: usize) -> Vec<PassReport>
where
    S: Stream<Item = (usize, PassReport)>,
{
    let mut slots: Vec<Option<PassReport>> = (0..n).map(|_| None).collect();
    let mut passes = pin!(passes);
    while let Some((idx, report)) = passes.next().await {
        slots[idx] = Some(report);
    }
    // Every job yields exactly one report, so no slot is left empty.
    slots.into_iter().flatten().collect()
}

/// Prior state with the destination path and a failed download recorded.
fn failed_pass(prior: &ReconciliationState, dest: &std::path::Path, why: &str) -> PassReport {
    error!(hash = %prior.content_hash, dest = %dest.display(), panic = why, "item pass panicked");
    let mut state = prior.clone();
    state.path = dest.display().to_string();
    state.downloaded_ok = Some(false);
    PassReport {
        state,
        plan: PassPlan::default(),
        checked_disk: false,
        checked_archive: false,
        download_attempted: false,
        panicked: true,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
