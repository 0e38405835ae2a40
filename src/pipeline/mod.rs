//! # Pipeline Module
//!
//! Implements the stages of a probe run and the orchestrator that wires them.
//!
//! ## Overview
//!
//! A run is four concurrent activities connected by two bounded channels:
//!
//! ```text
//! producer --work channel--> worker pool --result channel--> dispatcher --> handler
//!                                  |
//!                             StatCollector <-- monitor (on the caller's task)
//! ```
//!
//! ## Key Components
//!
//! - **Probe**: The orchestrator that starts every stage and waits for all of them
//! - **Producer**: Runs the handler's generator and closes the work channel after it
//! - **Worker Pool**: Fetches URLs under admission control and forwards responses
//! - **Dispatcher**: Classifies responses and calls the handler hooks
//! - **Monitor**: Periodic counters line and the final summary
//!
//! ## Internal Components
//!
//! These are implementation details and are not typically used directly:
//! - `spawn_producer_task`: Creates the task that feeds the work channel
//! - `spawn_worker_pool`: Creates the task that owns every fetch worker
//! - `spawn_dispatcher_task`: Creates the task that drains the result channel

mod core;
mod dispatcher;
mod monitor;
mod producer;
mod worker;

pub use self::core::Probe;
pub use monitor::ProbeSummary;
pub use producer::{SinkHandle, UrlSink};
