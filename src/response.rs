//! # Response Module
//!
//! The successful half of a fetch outcome, as it travels from a worker to the
//! dispatcher.
//!
//! A `Response` is split into `ResponseMeta` (URL, status, headers) and a
//! `Body`. The body is an owned handle over whatever produces the bytes
//! (a live `reqwest::Response` by default). It is released exactly once:
//! either `Body::read` consumes it, or it is dropped unread. Nothing else can
//! touch it, so there is no way to close it twice or leak it past the
//! dispatcher.

use crate::error::ProbeError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use url::Url;

/// Source of a response body.
///
/// Implementations release their underlying resource when dropped.
#[async_trait]
pub trait BodyReader: Send {
    /// Reads the whole body, consuming the reader.
    async fn read_to_end(self: Box<Self>) -> Result<Bytes, ProbeError>;
}

#[async_trait]
impl BodyReader for reqwest::Response {
    async fn read_to_end(self: Box<Self>) -> Result<Bytes, ProbeError> {
        Ok((*self).bytes().await?)
    }
}

#[async_trait]
impl BodyReader for Bytes {
    async fn read_to_end(self: Box<Self>) -> Result<Bytes, ProbeError> {
        Ok(*self)
    }
}

/// Owned, single-use response body.
pub struct Body {
    reader: Box<dyn BodyReader>,
}

impl Body {
    pub fn new<R: BodyReader + 'static>(reader: R) -> Self {
        Body {
            reader: Box::new(reader),
        }
    }

    /// A body backed by bytes already in memory.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Body::new(bytes.into())
    }

    /// Reads the body to the end. The body is released whether or not the
    /// read succeeds.
    pub async fn read(self) -> Result<Bytes, ProbeError> {
        self.reader.read_to_end().await
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Body { .. }")
    }
}

/// How the dispatcher treats a response, decided from its `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Markup,
    Other,
}

impl ContentKind {
    /// Classifies a `Content-Type` value, ignoring parameters and case.
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == "application/json" || essence.ends_with("+json") {
            ContentKind::Json
        } else if essence == "text/html" || essence == "application/xhtml+xml" {
            ContentKind::Markup
        } else {
            ContentKind::Other
        }
    }
}

/// Everything about a fetched response except its body.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    /// Final URL, after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Headers that were sent with the request.
    pub request_headers: HeaderMap,
}

impl ResponseMeta {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn content_kind(&self) -> ContentKind {
        self.content_type()
            .map(ContentKind::from_content_type)
            .unwrap_or(ContentKind::Other)
    }
}

/// A successfully fetched response on its way to the dispatcher.
#[derive(Debug)]
pub struct Response {
    pub meta: ResponseMeta,
    body: Body,
}

impl Response {
    pub fn new(meta: ResponseMeta, body: Body) -> Self {
        Response { meta, body }
    }

    pub fn into_parts(self) -> (ResponseMeta, Body) {
        (self.meta, self.body)
    }
}
