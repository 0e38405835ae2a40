//! Contains the fetch worker pool.
//!
//! This module turns URLs from the work channel into responses on the result
//! channel. It handles:
//!
//! - Pulling URLs from the shared work channel until it is closed and drained
//! - Gating every fetch through the `AdmissionController`
//! - Counting each URL as it is taken, so the count matches the outcomes
//!   exactly even when the generator is cancelled mid-send
//! - Recording each outcome in the `StatCollector` (single attempt, no retry);
//!   a panicking fetcher counts as a failure
//! - Forwarding successful responses over the bounded result channel, which
//!   throttles workers when the dispatcher falls behind
//!
//! The main entry point is `spawn_worker_pool`. Its task finishes once every
//! worker has exited; at that point the last result sender is gone and the
//! result channel is closed for the dispatcher.

use crate::admission::{AdmissionController, AdmissionPermit};
use crate::builder::WorkerMode;
use crate::fetcher::Fetcher;
use crate::response::Response;
use crate::stats::StatCollector;
use futures_util::FutureExt;
use kanal::{AsyncReceiver, AsyncSender};
use log::{error, trace};
use reqwest::header::HeaderMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Everything a worker needs to process one URL.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) headers: Arc<HeaderMap>,
    pub(crate) admission: Arc<AdmissionController>,
    pub(crate) stats: Arc<StatCollector>,
    pub(crate) res_tx: AsyncSender<Response>,
}

pub(crate) fn spawn_worker_pool(
    work_rx: AsyncReceiver<String>,
    context: WorkerContext,
    mode: WorkerMode,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let concurrency = context.admission.capacity();
        let mut tasks = JoinSet::new();

        match mode {
            WorkerMode::Pool => {
                trace!("Starting fixed worker pool with {} workers", concurrency);
                for worker_id in 0..concurrency {
                    let work_rx = work_rx.clone();
                    let context = context.clone();
                    tasks.spawn(async move {
                        while let Ok(url) = work_rx.recv().await {
                            context.stats.increment_urls_emitted();
                            let permit = context.admission.acquire().await;
                            fetch_one(url, permit, &context).await;
                        }
                        trace!("Worker {} exiting, work channel drained", worker_id);
                    });
                }
                drop(work_rx);
            }
            WorkerMode::PerItem => {
                trace!(
                    "Starting gated per-item workers with {} slots",
                    concurrency
                );
                while let Ok(url) = work_rx.recv().await {
                    context.stats.increment_urls_emitted();
                    // The slot is taken before the task exists, so at most
                    // `concurrency` fetch tasks are alive at any time.
                    let permit = context.admission.acquire().await;
                    let context = context.clone();
                    tasks.spawn(async move {
                        fetch_one(url, permit, &context).await;
                    });
                    // Reap finished tasks so the set does not grow with the run.
                    while let Some(res) = tasks.try_join_next() {
                        if let Err(e) = res {
                            error!("A fetch task failed: {:?}", e);
                        }
                    }
                }
                trace!("Work channel drained, no more fetch tasks will start");
            }
        }

        // Only the workers may keep the result channel open.
        drop(context);

        trace!("Waiting for active fetch tasks to complete");
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("A fetch worker failed: {:?}", e);
            }
        }
        trace!("Worker pool finished, result channel closed");
    })
}

/// Fetches one URL under an admission slot and records its outcome.
/// Failures end here.
async fn fetch_one(url: String, permit: AdmissionPermit, context: &WorkerContext) {
    trace!("Fetching URL: {}", url);
    let start_time = Instant::now();
    let outcome = AssertUnwindSafe(context.fetcher.fetch(&url, &context.headers))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(response)) => {
            trace!(
                "Fetch successful for URL: {}, took {:?}",
                url,
                start_time.elapsed()
            );
            context.stats.increment_requests_succeeded();
            context
                .stats
                .record_response_status(response.meta.status.as_u16());

            if context.res_tx.send(response).await.is_err() {
                error!("Result channel closed, cannot forward response for URL: {}", url);
            }
        }
        Ok(Err(e)) => {
            error!("Fetch error for URL {}: {}", url, e);
            context.stats.increment_requests_failed();
        }
        Err(_) => {
            error!("Fetcher panicked for URL {}", url);
            context.stats.increment_requests_failed();
        }
    }

    // Held until the response is queued, so a full result channel also
    // holds back new fetches.
    drop(permit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::response::{Body, ResponseMeta};
    use async_trait::async_trait;
    use kanal::bounded_async;
    use reqwest::StatusCode;
    use std::time::Duration;
    use url::Url;

    /// Succeeds for URLs containing "ok", panics for URLs containing "panic"
    /// and fails for everything else.
    struct ScriptedFetcher;

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<Response, ProbeError> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            let parsed = Url::parse(url)?;
            if url.contains("panic") {
                panic!("fetcher bug for {url}");
            }
            if !url.contains("ok") {
                return Err(ProbeError::Body(format!("refused {url}")));
            }
            let meta = ResponseMeta {
                url: parsed,
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                request_headers: headers.clone(),
            };
            Ok(Response::new(meta, Body::from_bytes("ok")))
        }
    }

    async fn run_pool(
        urls: Vec<&str>,
        concurrency: usize,
        mode: WorkerMode,
    ) -> (Arc<StatCollector>, Vec<Response>, usize) {
        let (work_tx, work_rx) = bounded_async(4);
        let (res_tx, res_rx) = bounded_async(2);
        let stats = Arc::new(StatCollector::new());
        let admission = AdmissionController::new(concurrency);

        let context = WorkerContext {
            fetcher: Arc::new(ScriptedFetcher),
            headers: Arc::new(HeaderMap::new()),
            admission: Arc::clone(&admission),
            stats: Arc::clone(&stats),
            res_tx,
        };
        let pool = spawn_worker_pool(work_rx, context, mode);

        let urls: Vec<String> = urls.into_iter().map(String::from).collect();
        let feeder = tokio::spawn(async move {
            for url in urls {
                work_tx.send(url).await.unwrap();
            }
        });

        let mut responses = Vec::new();
        while let Ok(response) = res_rx.recv().await {
            responses.push(response);
        }
        feeder.await.unwrap();
        pool.await.unwrap();
        (stats, responses, admission.peak_in_flight())
    }

    #[tokio::test]
    async fn test_pool_counts_every_outcome_once() {
        let urls = vec![
            "http://localhost/ok/1",
            "http://localhost/fail/2",
            "not a url",
            "http://localhost/ok/3",
        ];
        let (stats, responses, peak) = run_pool(urls, 2, WorkerMode::Pool).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.urls_emitted, 4);
        assert_eq!(snapshot.requests_succeeded, 2);
        assert_eq!(snapshot.requests_failed, 2);
        assert_eq!(responses.len(), 2);
        assert_eq!(snapshot.response_status_counts.get(&200), Some(&2));
        assert!(peak <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_item_mode_respects_admission() {
        let urls: Vec<&str> = std::iter::repeat_n("http://localhost/ok", 40).collect();
        let (stats, responses, peak) = run_pool(urls, 3, WorkerMode::PerItem).await;

        assert_eq!(stats.snapshot().requests_succeeded, 40);
        assert_eq!(responses.len(), 40);
        assert!(peak <= 3);
    }

    #[tokio::test]
    async fn test_panicking_fetch_counts_as_failure() {
        for mode in [WorkerMode::Pool, WorkerMode::PerItem] {
            let urls = vec!["http://localhost/panic", "http://localhost/ok"];
            let (stats, responses, _) = run_pool(urls, 1, mode).await;

            let snapshot = stats.snapshot();
            assert_eq!(snapshot.urls_emitted, 2);
            assert_eq!(snapshot.requests_failed, 1);
            assert_eq!(snapshot.requests_succeeded, 1);
            assert_eq!(responses.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_result_channel_closes_with_no_work() {
        let (stats, responses, peak) = run_pool(Vec::new(), 4, WorkerMode::Pool).await;
        assert!(responses.is_empty());
        assert_eq!(stats.snapshot().requests_completed(), 0);
        assert_eq!(peak, 0);
    }
}
