//! # Statistics Module
//!
//! Collects the counters the pipeline reports while it runs.
//!
//! ## Overview
//!
//! The `StatCollector` is shared by `Arc` between every stage. Workers record
//! the URLs they take off the work queue and every fetch outcome, the
//! dispatcher records what it delivered, and the monitor reads all of it
//! concurrently to print live lines and the final summary.
//!
//! ## Key Metrics Tracked
//!
//! - **Fetch Metrics**: Succeeded and failed fetches, URLs emitted
//! - **Dispatch Metrics**: Responses dispatched, JSON and markup documents
//!   delivered, decode failures, handler panics
//! - **Transfer Metrics**: Bytes downloaded and status code distribution
//! - **Timing Metrics**: Elapsed time, success rate and throughput
//!
//! Every counter is an atomic that only ever increases, so concurrent workers
//! never lose updates and readers never observe a sum going backwards.
//!
//! ## Example
//!
//! ```rust,ignore
//! use probe_core::stats::StatCollector;
//!
//! let stats = probe.get_stats();
//! println!("{}", stats.snapshot());
//! println!("{}", stats.to_json_string_pretty()?);
//! ```

use crate::error::ProbeError;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

/// A point-in-time copy of the statistics, used for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// URLs handed from the generator to a worker.
    pub urls_emitted: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub responses_dispatched: usize,
    pub json_documents: usize,
    pub markup_documents: usize,
    pub decode_failures: usize,
    pub handler_panics: usize,
    pub total_bytes_downloaded: usize,
    pub response_status_counts: BTreeMap<u16, usize>,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    /// Number of fetches that reached a terminal outcome.
    pub fn requests_completed(&self) -> usize {
        self.requests_succeeded + self.requests_failed
    }

    /// Percentage of completed fetches that succeeded, 0 before any completed.
    pub fn rate(&self) -> f64 {
        let completed = self.requests_completed();
        if completed == 0 {
            0.0
        } else {
            self.requests_succeeded as f64 / completed as f64 * 100.0
        }
    }

    /// Successful fetches per minute since the run started.
    pub fn throughput_per_minute(&self) -> f64 {
        let minutes = self.elapsed.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            self.requests_succeeded as f64 / minutes
        } else {
            0.0
        }
    }

    pub fn formatted_bytes(&self) -> String {
        const KB: usize = 1024;
        const MB: usize = 1024 * KB;
        const GB: usize = 1024 * MB;

        if self.total_bytes_downloaded >= GB {
            format!("{:.2} GB", self.total_bytes_downloaded as f64 / GB as f64)
        } else if self.total_bytes_downloaded >= MB {
            format!("{:.2} MB", self.total_bytes_downloaded as f64 / MB as f64)
        } else if self.total_bytes_downloaded >= KB {
            format!("{:.2} KB", self.total_bytes_downloaded as f64 / KB as f64)
        } else {
            format!("{} B", self.total_bytes_downloaded)
        }
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Fetched URL: {}, Failed: {} [ {:.2}% ]",
            self.requests_succeeded,
            self.requests_failed,
            self.rate()
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct RunClock {
    started_at: Instant,
    finished_at: Option<Instant>,
}

/// Collects and stores statistics about one pipeline run.
///
/// Counters are only written by the pipeline. Callers read them through
/// `snapshot`:
///
/// ```compile_fail
/// use std::sync::atomic::Ordering;
///
/// let stats = probe_core::StatCollector::new();
/// stats.requests_succeeded.store(0, Ordering::SeqCst);
/// ```
#[derive(Debug)]
pub struct StatCollector {
    clock: Mutex<RunClock>,

    urls_emitted: AtomicUsize,
    requests_succeeded: AtomicUsize,
    requests_failed: AtomicUsize,

    responses_dispatched: AtomicUsize,
    json_documents: AtomicUsize,
    markup_documents: AtomicUsize,
    decode_failures: AtomicUsize,
    handler_panics: AtomicUsize,

    total_bytes_downloaded: AtomicUsize,
    response_status_counts: Arc<dashmap::DashMap<u16, usize>>,
}

impl StatCollector {
    /// Creates a new `StatCollector` with all counters at zero and the clock started.
    pub fn new() -> Self {
        StatCollector {
            clock: Mutex::new(RunClock {
                started_at: Instant::now(),
                finished_at: None,
            }),
            urls_emitted: AtomicUsize::new(0),
            requests_succeeded: AtomicUsize::new(0),
            requests_failed: AtomicUsize::new(0),
            responses_dispatched: AtomicUsize::new(0),
            json_documents: AtomicUsize::new(0),
            markup_documents: AtomicUsize::new(0),
            decode_failures: AtomicUsize::new(0),
            handler_panics: AtomicUsize::new(0),
            total_bytes_downloaded: AtomicUsize::new(0),
            response_status_counts: Arc::new(dashmap::DashMap::new()),
        }
    }

    /// Creates a snapshot of the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        let response_status_counts = self
            .response_status_counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        StatsSnapshot {
            urls_emitted: self.urls_emitted.load(Ordering::SeqCst),
            requests_succeeded: self.requests_succeeded.load(Ordering::SeqCst),
            requests_failed: self.requests_failed.load(Ordering::SeqCst),
            responses_dispatched: self.responses_dispatched.load(Ordering::SeqCst),
            json_documents: self.json_documents.load(Ordering::SeqCst),
            markup_documents: self.markup_documents.load(Ordering::SeqCst),
            decode_failures: self.decode_failures.load(Ordering::SeqCst),
            handler_panics: self.handler_panics.load(Ordering::SeqCst),
            total_bytes_downloaded: self.total_bytes_downloaded.load(Ordering::SeqCst),
            response_status_counts,
            elapsed: self.elapsed(),
        }
    }

    /// Time since the run started, frozen once the run has finished.
    pub fn elapsed(&self) -> Duration {
        let clock = self.clock.lock();
        match clock.finished_at {
            Some(end) => end.duration_since(clock.started_at),
            None => clock.started_at.elapsed(),
        }
    }

    /// Restarts the clock at the beginning of a run.
    pub(crate) fn mark_started(&self) {
        let mut clock = self.clock.lock();
        clock.started_at = Instant::now();
        clock.finished_at = None;
    }

    /// Stops the clock. Later calls keep the first end time.
    pub(crate) fn mark_finished(&self) {
        let mut clock = self.clock.lock();
        if clock.finished_at.is_none() {
            clock.finished_at = Some(Instant::now());
        }
    }

    pub(crate) fn increment_urls_emitted(&self) {
        self.urls_emitted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_succeeded(&self) {
        self.requests_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_responses_dispatched(&self) {
        self.responses_dispatched.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_json_documents(&self) {
        self.json_documents.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_markup_documents(&self) {
        self.markup_documents.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_decode_failures(&self) {
        self.decode_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_handler_panics(&self) {
        self.handler_panics.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn add_bytes_downloaded(&self, bytes: usize) {
        self.total_bytes_downloaded
            .fetch_add(bytes, Ordering::SeqCst);
    }

    /// Records a response status code.
    pub(crate) fn record_response_status(&self, status_code: u16) {
        *self.response_status_counts.entry(status_code).or_insert(0) += 1;
    }

    /// Converts the current statistics into a JSON string.
    pub fn to_json_string(&self) -> Result<String, ProbeError> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    /// Converts the current statistics into a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String, ProbeError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StatCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nProbe Statistics")?;
        writeln!(f, "----------------")?;
        writeln!(f, "  duration : {:?}", snapshot.elapsed)?;
        writeln!(
            f,
            "  fetches  : emitted: {}, ok: {}, fail: {}, rate: {:.2}%",
            snapshot.urls_emitted,
            snapshot.requests_succeeded,
            snapshot.requests_failed,
            snapshot.rate()
        )?;
        writeln!(
            f,
            "  dispatch : responses: {}, json: {}, markup: {}, decode errors: {}, handler panics: {}",
            snapshot.responses_dispatched,
            snapshot.json_documents,
            snapshot.markup_documents,
            snapshot.decode_failures,
            snapshot.handler_panics
        )?;
        writeln!(
            f,
            "  speed    : {:.2} req/min, downloaded: {}",
            snapshot.throughput_per_minute(),
            snapshot.formatted_bytes()
        )?;

        let status_string = if snapshot.response_status_counts.is_empty() {
            "none".to_string()
        } else {
            snapshot
                .response_status_counts
                .iter()
                .map(|(code, count)| format!("{}: {}", code, count))
                .collect::<Vec<String>>()
                .join(", ")
        };

        writeln!(f, "  status   : {}", status_string)
    }
}
