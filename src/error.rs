//! Error types for the fetch pipeline.
//!
//! Per-item failures (bad URLs, transport errors, undecodable bodies) are
//! contained inside the pipeline and only show up in the statistics and the
//! logs. `ProbeError` values escape to the caller only from construction
//! (`ProbeBuilder::build`, `HandlerSetBuilder::build`), from `UrlSink::emit`,
//! and from `Probe::run` when a stage task itself dies.

use thiserror::Error;

/// Main error type for the probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Invalid builder settings or a missing URL generator.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The work item could not be turned into a request URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Network or protocol failure while fetching or reading a body.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A body advertised as JSON did not decode.
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid header name: {0}")]
    HeaderName(#[from] reqwest::header::InvalidHeaderName),

    #[error("Invalid header value: {0}")]
    HeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    /// A response body could not be read to the end.
    #[error("Body read error: {0}")]
    Body(String),

    /// A pipeline channel was closed while a stage still wanted to use it.
    #[error("{0} channel closed")]
    ChannelClosed(&'static str),

    /// A pipeline stage task ended abnormally.
    #[error("{0} task failed: {1}")]
    StageFailed(&'static str, String),
}

impl ProbeError {
    /// Create a Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        ProbeError::Configuration(message.into())
    }

    /// Whether this error came from the network rather than from the input.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProbeError::Transport(_))
    }
}
