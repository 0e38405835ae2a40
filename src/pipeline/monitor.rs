//! Live reporting while the pipeline runs.
//!
//! The monitor is driven on the orchestrator's own task. While the stages are
//! running it logs one counters line per poll interval; when the completion
//! future resolves (every stage joined) it stops the clock and logs exactly
//! one final summary. It never stops because things went quiet: a slow
//! generator keeps it in the running state as long as the stages are alive.

use crate::admission::AdmissionController;
use crate::stats::{StatCollector, StatsSnapshot};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Final report of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeSummary {
    pub stats: StatsSnapshot,
    /// Highest number of fetches that were in flight at the same time.
    pub peak_in_flight: usize,
}

impl ProbeSummary {
    pub fn rate(&self) -> f64 {
        self.stats.rate()
    }

    pub fn throughput_per_minute(&self) -> f64 {
        self.stats.throughput_per_minute()
    }
}

impl std::fmt::Display for ProbeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.stats)?;
        write!(
            f,
            "Speed: {:.2} req/min, URL: {}",
            self.stats.throughput_per_minute(),
            self.stats.requests_completed()
        )
    }
}

/// Reports every `poll_interval` until `completion` resolves, then returns
/// the final summary along with the completion's output.
pub(crate) async fn watch<F>(
    stats: Arc<StatCollector>,
    admission: Arc<AdmissionController>,
    poll_interval: Duration,
    completion: F,
) -> (ProbeSummary, F::Output)
where
    F: Future,
{
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so the first line reflects
    // a full interval of work.
    ticker.tick().await;

    tokio::pin!(completion);
    let output = loop {
        tokio::select! {
            biased;
            output = &mut completion => break output,
            _ = ticker.tick() => {
                info!(
                    "{} (in flight: {})",
                    stats.snapshot(),
                    admission.in_flight()
                );
            }
        }
    };

    stats.mark_finished();
    let summary = ProbeSummary {
        stats: stats.snapshot(),
        peak_in_flight: admission.peak_in_flight(),
    };
    info!("{}", summary);
    (summary, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_completion_not_inactivity() {
        let stats = Arc::new(StatCollector::new());
        let admission = AdmissionController::new(4);
        let started = tokio::time::Instant::now();

        let (summary, ()) = watch(
            Arc::clone(&stats),
            admission,
            Duration::from_millis(100),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(summary.rate(), 0.0);
        assert_eq!(summary.peak_in_flight, 0);
    }

    #[tokio::test]
    async fn test_summary_lines() {
        let stats = Arc::new(StatCollector::new());
        for _ in 0..3 {
            stats.increment_requests_succeeded();
        }
        stats.increment_requests_failed();

        let (summary, ()) = watch(
            Arc::clone(&stats),
            AdmissionController::new(1),
            Duration::from_secs(1),
            async {},
        )
        .await;

        assert_eq!(summary.rate(), 75.0);
        let text = summary.to_string();
        assert!(text.starts_with("Fetched URL: 3, Failed: 1 [ 75.00% ]"));
        assert!(text.contains("URL: 4"));
    }
}
