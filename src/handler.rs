//! # Handler Module
//!
//! Defines the `Handler` trait, the caller's side of the pipeline.
//!
//! ## Overview
//!
//! A handler supplies the URL source and reacts to fetched responses:
//!
//! - `generate_urls`: pushes work items into the pipeline (required)
//! - `on_response`: sees every fetched response's metadata before classification
//! - `on_json`: receives bodies served with a JSON media type, decoded
//! - `on_markup`: receives bodies served as HTML, parsed into a document
//!
//! The three response hooks default to no-ops. They are synchronous and take
//! `&self`; handlers that accumulate results use interior mutability. All
//! hooks run on the dispatcher task, one response at a time.
//!
//! For quick wiring without a dedicated type, `HandlerSet::builder()` accepts
//! closures and refuses to build without a generator.
//!
//! ## Example
//!
//! ```rust,ignore
//! use probe_core::{Handler, UrlSink, async_trait};
//!
//! struct StatusProbe;
//!
//! #[async_trait]
//! impl Handler for StatusProbe {
//!     async fn generate_urls(&self, sink: &UrlSink) -> anyhow::Result<()> {
//!         for id in 0..100 {
//!             sink.emit(format!("https://api.example.com/items/{id}")).await?;
//!         }
//!         Ok(())
//!     }
//!
//!     fn on_json(&self, meta: &ResponseMeta, document: serde_json::Value) {
//!         println!("{} -> {}", meta.url, document);
//!     }
//! }
//! ```

use crate::error::ProbeError;
use crate::pipeline::{SinkHandle, UrlSink};
use crate::response::ResponseMeta;
use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use scraper::Html;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Caller-supplied URL source and response hooks.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Emits the URLs to fetch. The work queue closes when this returns.
    async fn generate_urls(&self, sink: &UrlSink) -> anyhow::Result<()>;

    /// Called for every fetched response, before content-type dispatch.
    fn on_response(&self, _meta: &ResponseMeta) {}

    /// Called with the decoded body of a JSON response.
    fn on_json(&self, _meta: &ResponseMeta, _document: Value) {}

    /// Called with the parsed body of an HTML response.
    fn on_markup(&self, _meta: &ResponseMeta, _document: Html) {}
}

type GenerateFn = dyn Fn(SinkHandle) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;
type ResponseFn = dyn Fn(&ResponseMeta) + Send + Sync;
type JsonFn = dyn Fn(&ResponseMeta, Value) + Send + Sync;
type MarkupFn = dyn Fn(&ResponseMeta, Html) + Send + Sync;

/// A `Handler` assembled from closures.
pub struct HandlerSet {
    generate: Arc<GenerateFn>,
    on_response: Option<Arc<ResponseFn>>,
    on_json: Option<Arc<JsonFn>>,
    on_markup: Option<Arc<MarkupFn>>,
}

impl HandlerSet {
    pub fn builder() -> HandlerSetBuilder {
        HandlerSetBuilder::default()
    }
}

#[async_trait]
impl Handler for HandlerSet {
    async fn generate_urls(&self, sink: &UrlSink) -> anyhow::Result<()> {
        (self.generate)(sink.handle()).await
    }

    fn on_response(&self, meta: &ResponseMeta) {
        if let Some(f) = &self.on_response {
            f(meta);
        }
    }

    fn on_json(&self, meta: &ResponseMeta, document: Value) {
        if let Some(f) = &self.on_json {
            f(meta, document);
        }
    }

    fn on_markup(&self, meta: &ResponseMeta, document: Html) {
        if let Some(f) = &self.on_markup {
            f(meta, document);
        }
    }
}

/// Builder for `HandlerSet`.
#[derive(Default)]
pub struct HandlerSetBuilder {
    generate: Option<Arc<GenerateFn>>,
    on_response: Option<Arc<ResponseFn>>,
    on_json: Option<Arc<JsonFn>>,
    on_markup: Option<Arc<MarkupFn>>,
}

impl HandlerSetBuilder {
    /// Sets the URL generator.
    pub fn generate_urls<F, Fut>(mut self, generate: F) -> Self
    where
        F: Fn(SinkHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.generate = Some(Arc::new(move |sink| generate(sink).boxed()));
        self
    }

    pub fn on_response<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResponseMeta) + Send + Sync + 'static,
    {
        self.on_response = Some(Arc::new(f));
        self
    }

    pub fn on_json<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResponseMeta, Value) + Send + Sync + 'static,
    {
        self.on_json = Some(Arc::new(f));
        self
    }

    pub fn on_markup<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResponseMeta, Html) + Send + Sync + 'static,
    {
        self.on_markup = Some(Arc::new(f));
        self
    }

    /// Builds the handler set. Fails when no URL generator was supplied.
    pub fn build(self) -> Result<HandlerSet, ProbeError> {
        let generate = self.generate.ok_or_else(|| {
            ProbeError::configuration("a URL generator must be supplied with generate_urls")
        })?;
        Ok(HandlerSet {
            generate,
            on_response: self.on_response,
            on_json: self.on_json,
            on_markup: self.on_markup,
        })
    }
}
