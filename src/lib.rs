//! # probe-core
//!
//! A bounded-concurrency URL fetch pipeline.
//!
//! A handler emits URLs, a pool of workers fetches them over HTTP with at
//! most `concurrency` requests in flight, and a dispatcher hands every
//! response to the handler, decoded as JSON or parsed as HTML according to
//! its content type. A monitor logs live counters while the run is going and
//! a final summary when it ends.
//!
//! ## Example
//!
//! ```rust,ignore
//! use probe_core::{HandlerSet, ProbeBuilder};
//!
//! async fn run_probe() -> Result<(), probe_core::ProbeError> {
//!     let handlers = HandlerSet::builder()
//!         .generate_urls(|sink| async move {
//!             sink.emit("https://httpbin.org/json").await?;
//!             anyhow::Ok(())
//!         })
//!         .on_json(|meta, document| println!("{}: {}", meta.url, document))
//!         .build()?;
//!
//!     let summary = ProbeBuilder::new(handlers).concurrency(16).build()?.run().await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod builder;
pub mod error;
pub mod fetcher;
pub mod handler;
pub mod pipeline;
pub mod prelude;
pub mod response;
pub mod stats;

pub use builder::{ProbeBuilder, ProbeConfig, WorkerMode};
pub use error::ProbeError;
pub use fetcher::{Fetcher, ReqwestFetcher};
pub use handler::{Handler, HandlerSet, HandlerSetBuilder};
pub use pipeline::{Probe, ProbeSummary, SinkHandle, UrlSink};
pub use response::{Body, BodyReader, ContentKind, Response, ResponseMeta};
pub use stats::{StatCollector, StatsSnapshot};

pub use async_trait::async_trait;
pub use scraper;
pub use serde_json;
pub use tokio;
