//! Bounded parallel runner (C3): runs a set of async tasks under a
//! concurrency cap, preserving task order and per-task failure.
//!
//! Cooperative concurrency via a [`tokio::sync::Semaphore`] of `limit`
//! permits; cancellation is honored with `tokio::select!` at every await
//! point.

use std::{future::Future, sync::Arc};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Runs `tasks` with at most `limit` running concurrently, returning one
/// result per task in the original order. A task panicking or the run being
/// cancelled surfaces as `Err` for that task only — peers are unaffected.
///
/// If `cancellation` is already triggered, or becomes triggered while tasks
/// are still queued, no further tasks are launched; queued-but-unlaunched
/// tasks resolve to a cancellation error, and already-running tasks are
/// awaited to completion so their own cancellation checks can run.
pub async fn run_bounded<T, Fut>(tasks: Vec<Fut>, limit: usize, cancellation: &CancellationToken) -> Vec<anyhow::Result<T>>
where
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    assert!(limit >= 1, "concurrency limit must be at least 1");
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut handles = Vec::with_capacity(tasks.len());

    for task in tasks {
        if cancellation.is_cancelled() {
            handles.push(None);
            continue;
        }
        let semaphore = Arc::clone(&semaphore);
        let token = cancellation.clone();
        handles.push(Some(tokio::spawn(async move {
            let permit = tokio::select! {
                biased;
                () = token.cancelled() => return Err(anyhow::anyhow!("cancelled")),
                permit = semaphore.acquire_owned() => permit,
            };
            let _permit = permit.map_err(|err| anyhow::anyhow!(err))?;

            tokio::select! {
                biased;
                () = token.cancelled() => Err(anyhow::anyhow!("cancelled")),
                result = task => result,
            }
        })));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle {
            None => Err(anyhow::anyhow!("cancelled before launch")),
            Some(handle) => handle.await.unwrap_or_else(|join_err| Err(anyhow::anyhow!(join_err))),
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn preserves_order_and_succeeds() {
        let tasks = (0..5)
            .map(|i| Box::pin(async move { Ok::<_, anyhow::Error>(i) }) as std::pin::Pin<Box<dyn Future<Output = _> + Send>>)
            .collect();
        let token = CancellationToken::new();
        let results = run_bounded(tasks, 2, &token).await;
        let values: Vec<i32> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_peers() {
        let tasks: Vec<std::pin::Pin<Box<dyn Future<Output = anyhow::Result<i32>> + Send>>> = vec![
            Box::pin(async { Ok(1) }),
            Box::pin(async { Err(anyhow::anyhow!("boom")) }),
            Box::pin(async { Ok(3) }),
        ];
        let token = CancellationToken::new();
        let results = run_bounded(tasks, 3, &token).await;
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                Box::pin(async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(())
                }) as std::pin::Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
            })
            .collect();
        let token = CancellationToken::new();
        let _ = run_bounded(tasks, 3, &token).await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn cancellation_before_launch_short_circuits_queued_tasks() {
        let token = CancellationToken::new();
        token.cancel();
        let tasks: Vec<std::pin::Pin<Box<dyn Future<Output = anyhow::Result<i32>> + Send>>> =
            vec![Box::pin(async { Ok(1) })];
        let results = run_bounded(tasks, 1, &token).await;
        assert!(results[0].is_err());
    }
}
