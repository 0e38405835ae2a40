//! # Result Dispatcher Module
//!
//! Routes fetched responses to the handler.
//!
//! ## Overview
//!
//! The dispatcher is a single task that reads the result channel in arrival
//! order (not request order) until the channel is closed and drained. For
//! every response it:
//!
//! 1. calls `Handler::on_response` with the metadata
//! 2. classifies the `Content-Type` header
//! 3. for JSON, reads and decodes the body and calls `Handler::on_json`
//! 4. for HTML, reads and parses the body and calls `Handler::on_markup`
//! 5. otherwise releases the body unread
//!
//! The body is owned by this task from the moment it is received, and every
//! branch either consumes it with `Body::read` or drops it, so it is released
//! exactly once. Decode failures are logged and counted, the handler for that
//! response is skipped, and the loop carries on with the next response. A
//! hook that panics is contained to its own call: the panic is logged and
//! counted, and the remaining hooks and responses are still dispatched.
//!
//! When the task returns, no further handler calls will happen; the
//! orchestrator treats that as the end of the pipeline.

use crate::handler::Handler;
use crate::response::{ContentKind, Response, ResponseMeta};
use crate::stats::StatCollector;
use bytes::Bytes;
use kanal::AsyncReceiver;
use log::{debug, error, trace, warn};
use scraper::Html;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub(crate) fn spawn_dispatcher_task<H>(
    handler: Arc<H>,
    res_rx: AsyncReceiver<Response>,
    stats: Arc<StatCollector>,
) -> tokio::task::JoinHandle<()>
where
    H: Handler,
{
    tokio::spawn(async move {
        trace!("Result dispatcher started");
        while let Ok(response) = res_rx.recv().await {
            dispatch_response(handler.as_ref(), response, &stats).await;
        }
        trace!("Result channel drained, dispatcher finished");
    })
}

pub(crate) async fn dispatch_response<H>(handler: &H, response: Response, stats: &StatCollector)
where
    H: Handler + ?Sized,
{
    let (meta, body) = response.into_parts();
    debug!("Dispatching response from {} ({})", meta.url, meta.status);

    call_hook("on_response", &meta, stats, || handler.on_response(&meta));

    let kind = meta.content_kind();
    if kind == ContentKind::Other {
        trace!("No typed handler for content type {:?}", meta.content_type());
        drop(body);
    } else {
        match body.read().await {
            Ok(bytes) => {
                stats.add_bytes_downloaded(bytes.len());
                match kind {
                    ContentKind::Json => deliver_json(handler, &meta, &bytes, stats),
                    ContentKind::Markup => deliver_markup(handler, &meta, &bytes, stats),
                    ContentKind::Other => {}
                }
            }
            Err(e) => {
                warn!("Failed to read body from {}: {}", meta.url, e);
                stats.increment_decode_failures();
            }
        }
    }

    stats.increment_responses_dispatched();
}

fn deliver_json<H>(handler: &H, meta: &ResponseMeta, bytes: &Bytes, stats: &StatCollector)
where
    H: Handler + ?Sized,
{
    match serde_json::from_slice(bytes) {
        Ok(document) => {
            stats.increment_json_documents();
            call_hook("on_json", meta, stats, || handler.on_json(meta, document));
        }
        Err(e) => {
            warn!("Malformed JSON from {}: {}", meta.url, e);
            stats.increment_decode_failures();
        }
    }
}

// Kept synchronous: `Html` is not `Send` and must never live across an await.
fn deliver_markup<H>(handler: &H, meta: &ResponseMeta, bytes: &Bytes, stats: &StatCollector)
where
    H: Handler + ?Sized,
{
    let text = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&text);
    stats.increment_markup_documents();
    call_hook("on_markup", meta, stats, || handler.on_markup(meta, document));
}

/// Runs one handler hook, containing a panic to this response.
fn call_hook<F>(hook: &str, meta: &ResponseMeta, stats: &StatCollector, f: F)
where
    F: FnOnce(),
{
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!("Handler {} panicked for {}: {}", hook, meta.url, message);
        stats.increment_handler_panics();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::pipeline::UrlSink;
    use crate::response::{Body, BodyReader};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
    use scraper::Selector;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    #[derive(Default)]
    struct Recorder {
        responses: AtomicUsize,
        json: Mutex<Vec<Value>>,
        titles: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Handler for Recorder {
        async fn generate_urls(&self, _sink: &UrlSink) -> anyhow::Result<()> {
            Ok(())
        }

        fn on_response(&self, _meta: &ResponseMeta) {
            self.responses.fetch_add(1, Ordering::SeqCst);
        }

        fn on_json(&self, _meta: &ResponseMeta, document: Value) {
            self.json.lock().unwrap().push(document);
        }

        fn on_markup(&self, _meta: &ResponseMeta, document: Html) {
            let selector = Selector::parse("title").unwrap();
            if let Some(title) = document.select(&selector).next() {
                self.titles
                    .lock()
                    .unwrap()
                    .push(title.text().collect::<String>());
            }
        }
    }

    struct TrackedBody {
        payload: Option<&'static str>,
        released: Arc<AtomicUsize>,
    }

    impl Drop for TrackedBody {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl BodyReader for TrackedBody {
        async fn read_to_end(self: Box<Self>) -> Result<Bytes, ProbeError> {
            match self.payload {
                Some(payload) => Ok(Bytes::from_static(payload.as_bytes())),
                None => Err(ProbeError::Body("connection reset".into())),
            }
        }
    }

    fn response(
        content_type: &str,
        payload: Option<&'static str>,
        released: &Arc<AtomicUsize>,
    ) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        let meta = ResponseMeta {
            url: Url::parse("http://localhost/doc").unwrap(),
            status: StatusCode::OK,
            headers,
            request_headers: HeaderMap::new(),
        };
        Response::new(
            meta,
            Body::new(TrackedBody {
                payload,
                released: Arc::clone(released),
            }),
        )
    }

    #[tokio::test]
    async fn test_json_and_markup_routing() {
        let handler = Recorder::default();
        let stats = StatCollector::new();
        let released = Arc::new(AtomicUsize::new(0));

        let json = response("application/json", Some(r#"{"mid":1850091}"#), &released);
        let html = response(
            "text/html; charset=utf-8",
            Some("<html><head><title>Probe</title></head><body></body></html>"),
            &released,
        );
        let plain = response("text/plain", Some("ignored"), &released);

        for r in [json, html, plain] {
            dispatch_response(&handler, r, &stats).await;
        }

        assert_eq!(handler.responses.load(Ordering::SeqCst), 3);
        assert_eq!(handler.json.lock().unwrap()[0]["mid"], 1850091);
        assert_eq!(handler.titles.lock().unwrap().as_slice(), ["Probe"]);
        assert_eq!(released.load(Ordering::SeqCst), 3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.responses_dispatched, 3);
        assert_eq!(snapshot.json_documents, 1);
        assert_eq!(snapshot.markup_documents, 1);
        assert_eq!(snapshot.decode_failures, 0);
    }

    #[tokio::test]
    async fn test_decode_failures_release_body_and_continue() {
        let handler = Arc::new(Recorder::default());
        let stats = Arc::new(StatCollector::new());
        let released = Arc::new(AtomicUsize::new(0));
        let (res_tx, res_rx) = kanal::bounded_async(4);

        let task = spawn_dispatcher_task(Arc::clone(&handler), res_rx, Arc::clone(&stats));
        res_tx
            .send(response("application/json", Some("{not json"), &released))
            .await
            .unwrap();
        res_tx
            .send(response("application/json", None, &released))
            .await
            .unwrap();
        res_tx
            .send(response("application/json", Some("[1, 2, 3]"), &released))
            .await
            .unwrap();
        drop(res_tx);
        task.await.unwrap();

        assert_eq!(released.load(Ordering::SeqCst), 3);
        assert_eq!(handler.responses.load(Ordering::SeqCst), 3);
        assert_eq!(handler.json.lock().unwrap().len(), 1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.decode_failures, 2);
        assert_eq!(snapshot.responses_dispatched, 3);
        assert_eq!(snapshot.requests_failed, 0);
    }

    /// Panics on the first document it sees.
    #[derive(Default)]
    struct PanicsOnce {
        seen: AtomicUsize,
        delivered: AtomicUsize,
    }

    #[async_trait]
    impl Handler for PanicsOnce {
        async fn generate_urls(&self, _sink: &UrlSink) -> anyhow::Result<()> {
            Ok(())
        }

        fn on_json(&self, _meta: &ResponseMeta, _document: Value) {
            if self.seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("hook failure on the first document");
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_panicking_hook_does_not_stop_dispatch() {
        let handler = Arc::new(PanicsOnce::default());
        let stats = Arc::new(StatCollector::new());
        let released = Arc::new(AtomicUsize::new(0));
        let (res_tx, res_rx) = kanal::bounded_async(8);

        let task = spawn_dispatcher_task(Arc::clone(&handler), res_rx, Arc::clone(&stats));
        for _ in 0..5 {
            res_tx
                .send(response("application/json", Some(r#"{"ok":true}"#), &released))
                .await
                .unwrap();
        }
        drop(res_tx);
        task.await.unwrap();

        assert_eq!(handler.delivered.load(Ordering::SeqCst), 4);
        assert_eq!(released.load(Ordering::SeqCst), 5);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.handler_panics, 1);
        assert_eq!(snapshot.responses_dispatched, 5);
        assert_eq!(snapshot.json_documents, 5);
    }
}
