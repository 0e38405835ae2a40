//! # Builder Module
//!
//! Provides the `ProbeBuilder`, a fluent API for constructing and configuring
//! `Probe` instances.
//!
//! ## Overview
//!
//! The builder collects the pipeline configuration, the handler and the
//! fetcher, validates them together, and only then produces a `Probe`. A
//! built probe's configuration can no longer change.
//!
//! ## Key Features
//!
//! - **Concurrency Configuration**: Admission limit, worker strategy and
//!   channel capacity
//! - **Request Headers**: Defaults to a `User-Agent` naming this crate and its
//!   version; any header can be added or replaced
//! - **Transport**: Default reqwest client, a caller-built client, or any
//!   `Fetcher` implementation
//! - **Reporting**: Poll interval of the live counters line
//!
//! ## Example
//!
//! ```rust,ignore
//! use probe_core::ProbeBuilder;
//!
//! async fn run_probe() -> Result<(), ProbeError> {
//!     let probe = ProbeBuilder::new(MyHandler)
//!         .concurrency(32)
//!         .user_agent("my-prober/1.0")
//!         .poll_interval(Duration::from_secs(5))
//!         .build()?;
//!
//!     let summary = probe.run().await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

use crate::error::ProbeError;
use crate::fetcher::{Fetcher, ReqwestFetcher};
use crate::handler::Handler;
use crate::pipeline::Probe;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;

/// Default number of concurrent fetches.
pub const DEFAULT_CONCURRENCY: usize = 128;

/// Default capacity of the work and result channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default interval between live counters lines.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// `User-Agent` sent when the caller does not set one.
pub fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// How fetch work is scheduled onto tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerMode {
    /// Exactly `concurrency` long-lived workers share the work channel.
    #[default]
    Pool,
    /// One short-lived task per URL, started only after it has been admitted.
    PerItem,
}

/// Configuration of the pipeline.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// The maximum number of fetches in flight at once.
    pub concurrency: usize,
    /// Headers sent with every request.
    pub request_headers: HeaderMap,
    /// Interval between live counters lines.
    pub poll_interval: Duration,
    /// The capacity of the work and result channels.
    pub channel_capacity: usize,
    pub worker_mode: WorkerMode,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        let mut request_headers = HeaderMap::new();
        if let Ok(user_agent) = HeaderValue::from_str(&default_user_agent()) {
            request_headers.insert(USER_AGENT, user_agent);
        }
        ProbeConfig {
            concurrency: DEFAULT_CONCURRENCY,
            request_headers,
            poll_interval: DEFAULT_POLL_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            worker_mode: WorkerMode::default(),
        }
    }
}

impl ProbeConfig {
    fn validate(&self) -> Result<(), ProbeError> {
        if self.concurrency == 0 {
            return Err(ProbeError::configuration(
                "concurrency must be greater than 0.",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ProbeError::configuration(
                "channel_capacity must be greater than 0.",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ProbeError::configuration(
                "poll_interval must be greater than 0.",
            ));
        }
        Ok(())
    }
}

pub struct ProbeBuilder<H: Handler> {
    config: ProbeConfig,
    handler: H,
    headers: Vec<(String, String)>,
    fetcher: Option<Arc<dyn Fetcher>>,
    handle_ctrl_c: bool,
}

impl<H: Handler> ProbeBuilder<H> {
    /// Creates a new `ProbeBuilder` for a handler with the default configuration.
    pub fn new(handler: H) -> Self {
        ProbeBuilder {
            config: ProbeConfig::default(),
            handler,
            headers: Vec::new(),
            fetcher: None,
            handle_ctrl_c: false,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ProbeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the maximum number of concurrent fetches.
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.config.concurrency = limit;
        self
    }

    /// Sets the capacity of the work and result channels.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Sets the interval between live counters lines.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn worker_mode(mut self, mode: WorkerMode) -> Self {
        self.config.worker_mode = mode;
        self
    }

    /// Adds or replaces a request header. Validated by `build`.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the default `User-Agent`.
    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        self.header(USER_AGENT.as_str(), user_agent)
    }

    /// Uses a preconfigured reqwest client for fetching.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.fetcher = Some(Arc::new(ReqwestFetcher::with_client(client)));
        self
    }

    /// Uses a custom fetcher.
    pub fn fetcher<F: Fetcher>(mut self, fetcher: F) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Makes `Probe::run` stop the generator gracefully on Ctrl-C.
    pub fn handle_ctrl_c(mut self, enabled: bool) -> Self {
        self.handle_ctrl_c = enabled;
        self
    }

    /// Validates the configuration and builds the `Probe`.
    pub fn build(self) -> Result<Probe<H>, ProbeError> {
        let ProbeBuilder {
            mut config,
            handler,
            headers,
            fetcher,
            handle_ctrl_c,
        } = self;

        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())?;
            let value = HeaderValue::from_str(&value)?;
            config.request_headers.insert(name, value);
        }
        config.validate()?;

        let fetcher = match fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ReqwestFetcher::new()?),
        };

        Ok(Probe::new(handler, fetcher, config, handle_ctrl_c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::UrlSink;
    use async_trait::async_trait;

    struct NoUrls;

    #[async_trait]
    impl Handler for NoUrls {
        async fn generate_urls(&self, _sink: &UrlSink) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.concurrency, 128);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.worker_mode, WorkerMode::Pool);

        let user_agent = config.request_headers.get(USER_AGENT).unwrap();
        assert_eq!(user_agent.to_str().unwrap(), default_user_agent());
        assert!(default_user_agent().starts_with("probe-core/"));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let result = ProbeBuilder::new(NoUrls).concurrency(0).build();
        assert!(matches!(result, Err(ProbeError::Configuration(_))));
    }

    #[test]
    fn test_zero_capacity_and_interval_are_rejected() {
        assert!(matches!(
            ProbeBuilder::new(NoUrls).channel_capacity(0).build(),
            Err(ProbeError::Configuration(_))
        ));
        assert!(matches!(
            ProbeBuilder::new(NoUrls)
                .poll_interval(Duration::ZERO)
                .build(),
            Err(ProbeError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let result = ProbeBuilder::new(NoUrls).header("bad header", "x").build();
        assert!(matches!(result, Err(ProbeError::HeaderName(_))));

        let result = ProbeBuilder::new(NoUrls).header("X-Probe", "line\nbreak").build();
        assert!(matches!(result, Err(ProbeError::HeaderValue(_))));
    }

    #[test]
    fn test_headers_override_defaults() {
        let probe = ProbeBuilder::new(NoUrls)
            .user_agent("test")
            .header("X-Trace", "1")
            .concurrency(4)
            .build()
            .unwrap();

        let headers = &probe.config().request_headers;
        assert_eq!(headers.get(USER_AGENT).unwrap(), "test");
        assert_eq!(headers.get("x-trace").unwrap(), "1");
        assert_eq!(probe.config().concurrency, 4);
    }
}
