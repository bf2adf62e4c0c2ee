//! Bounded fan-out scheduler.
//!
//! One primitive serves every concurrent path in the engine: both object
//! discovery and the per-table row audit submit their tasks here. The bound
//! caps how many queries are in flight against the databases at once;
//! completions are delivered in completion order, independent of submission
//! order, and every submitted task yields exactly one outcome.
//!
//! Cancellation is best-effort: dropping the returned future aborts tasks
//! still waiting on a permit, while queries already in flight are not
//! preempted server-side (Postgres offers no safe mid-flight interrupt
//! here).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default maximum number of concurrently in-flight queries.
///
/// Moderate on purpose: each in-flight task holds a connection on one side,
/// and neither database should be overwhelmed by an audit.
pub const DEFAULT_JOBS: usize = 10;

/// Run `tasks` with at most `limit` in flight, invoking `on_complete` for
/// each outcome as it arrives.
///
/// Returns once every task has completed. Outcomes arrive unordered;
/// `on_complete` runs on the caller's task, so consuming the stream is
/// inherently serialized - the single-writer merge point the aggregator
/// relies on.
pub async fn run_bounded<T, F>(limit: usize, tasks: Vec<F>, mut on_complete: impl FnMut(T))
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();

    for task in tasks {
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            // The semaphore is never closed; if acquisition fails anyway we
            // still run the task rather than drop it.
            let _permit = semaphore.acquire_owned().await.ok();
            task.await
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => on_complete(outcome),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            // Aborted during runtime shutdown; nothing to deliver.
            Err(_) => {}
        }
    }
}
