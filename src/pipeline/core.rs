//! The core `Probe` implementation.
//!
//! This module defines the `Probe` struct, the orchestrator of one pipeline
//! run. It wires the producer, the worker pool and the dispatcher together
//! with two bounded channels, starts each as its own task, and drives the
//! monitor on the caller's task until every stage has been joined.
//!
//! Completion is close-based. The producer closes the work channel when the
//! generator returns; the worker pool closes the result channel when its last
//! worker exits; the dispatcher returns once the result channel is drained.
//! Nothing polls channel lengths.

use crate::admission::AdmissionController;
use crate::builder::ProbeConfig;
use crate::error::ProbeError;
use crate::fetcher::Fetcher;
use crate::handler::Handler;
use crate::stats::StatCollector;
use kanal::bounded_async;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use super::dispatcher::spawn_dispatcher_task;
use super::monitor::{self, ProbeSummary};
use super::producer::spawn_producer_task;
use super::worker::{WorkerContext, spawn_worker_pool};

/// A configured fetch pipeline, ready to run.
pub struct Probe<H: Handler> {
    handler: Arc<H>,
    fetcher: Arc<dyn Fetcher>,
    config: ProbeConfig,
    stats: Arc<StatCollector>,
    handle_ctrl_c: bool,
}

impl<H: Handler> Probe<H> {
    pub(crate) fn new(
        handler: H,
        fetcher: Arc<dyn Fetcher>,
        config: ProbeConfig,
        handle_ctrl_c: bool,
    ) -> Self {
        Probe {
            handler: Arc::new(handler),
            fetcher,
            config,
            stats: Arc::new(StatCollector::new()),
            handle_ctrl_c,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Returns a cloned Arc to the `StatCollector` this probe reports into.
    ///
    /// Useful for reading live counters from another task during a run.
    pub fn get_stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.stats)
    }

    /// Runs the pipeline to natural completion.
    ///
    /// When the probe was built with `handle_ctrl_c(true)`, Ctrl-C triggers
    /// the same graceful shutdown as `run_until`.
    pub async fn run(self) -> Result<ProbeSummary, ProbeError> {
        if self.handle_ctrl_c {
            self.run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            })
            .await
        } else {
            self.run_until(std::future::pending()).await
        }
    }

    /// Runs the pipeline until it completes or `shutdown` resolves.
    ///
    /// On shutdown the generator is stopped. URLs already queued and fetches
    /// already in flight still finish and are dispatched, and both channels
    /// are drained and closed in order before this returns.
    pub async fn run_until<F>(self, shutdown: F) -> Result<ProbeSummary, ProbeError>
    where
        F: Future<Output = ()>,
    {
        let Probe {
            handler,
            fetcher,
            config,
            stats,
            handle_ctrl_c: _,
        } = self;

        info!(
            "Probe starting with configuration: concurrency={}, worker_mode={:?}, channel_capacity={}, poll_interval={:?}",
            config.concurrency, config.worker_mode, config.channel_capacity, config.poll_interval
        );

        trace!(
            "Creating pipeline channels with capacity: {}",
            config.channel_capacity
        );
        let (work_tx, work_rx) = bounded_async::<String>(config.channel_capacity);
        let (res_tx, res_rx) = bounded_async(config.channel_capacity);
        let (stop_tx, stop_rx) = watch::channel(false);
        let admission = AdmissionController::new(config.concurrency);
        stats.mark_started();

        trace!("Spawning producer task");
        let producer = spawn_producer_task(Arc::clone(&handler), work_tx, stop_rx);

        trace!("Spawning worker pool");
        let workers = spawn_worker_pool(
            work_rx,
            WorkerContext {
                fetcher,
                headers: Arc::new(config.request_headers.clone()),
                admission: Arc::clone(&admission),
                stats: Arc::clone(&stats),
                res_tx,
            },
            config.worker_mode,
        );

        trace!("Spawning dispatcher task");
        let dispatcher = spawn_dispatcher_task(handler, res_rx, Arc::clone(&stats));

        let stages = join_stages(producer, workers, dispatcher);
        let completion = async move {
            tokio::pin!(stages);
            tokio::pin!(shutdown);
            tokio::select! {
                result = &mut stages => result,
                _ = &mut shutdown => {
                    info!("Shutdown requested, draining queued and in-flight work");
                    if stop_tx.send(true).is_err() {
                        debug!("Producer already finished before shutdown");
                    }
                    stages.await
                }
            }
        };

        let (summary, stages_result) = monitor::watch(
            Arc::clone(&stats),
            admission,
            config.poll_interval,
            completion,
        )
        .await;

        info!(
            "Probe finished. Stats: urls_emitted={}, requests_succeeded={}, requests_failed={}",
            summary.stats.urls_emitted,
            summary.stats.requests_succeeded,
            summary.stats.requests_failed
        );
        stages_result?;
        Ok(summary)
    }
}

/// Waits for every stage in pipeline order. Every stage is joined even when
/// an earlier one failed; the first failure is returned.
async fn join_stages(
    producer: JoinHandle<()>,
    workers: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
) -> Result<(), ProbeError> {
    let mut first_failure = None;
    for (name, task) in [
        ("producer", producer),
        ("worker pool", workers),
        ("dispatcher", dispatcher),
    ] {
        match task.await {
            Ok(()) => trace!("{} task completed", name),
            Err(e) => {
                error!("{} task failed: {}", name, e);
                first_failure.get_or_insert(ProbeError::StageFailed(name, e.to_string()));
            }
        }
    }
    first_failure.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_stages_reports_dead_stage() {
        let producer = tokio::spawn(async {});
        let workers: JoinHandle<()> = tokio::spawn(async { panic!("worker pool bug") });
        let dispatcher = tokio::spawn(async {});

        let result = join_stages(producer, workers, dispatcher).await;
        assert!(matches!(
            result,
            Err(ProbeError::StageFailed("worker pool", _))
        ));
    }

    #[tokio::test]
    async fn test_join_stages_ok_when_all_finish() {
        let result = join_stages(
            tokio::spawn(async {}),
            tokio::spawn(async {}),
            tokio::spawn(async {}),
        )
        .await;
        assert!(result.is_ok());
    }
}
