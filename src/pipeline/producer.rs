//! The URL producer adapter.
//!
//! Runs the handler's generator against a `UrlSink` that feeds the bounded
//! work channel. When the generator returns, fails, panics or is stopped by a
//! shutdown request, the sink is closed. Closing drops the pipeline's sender
//! so the work channel ends once every queued URL has been taken; no sentinel
//! value is ever sent.

use crate::error::ProbeError;
use crate::handler::Handler;
use futures_util::FutureExt;
use kanal::AsyncSender;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, trace};

struct SinkInner {
    tx: RwLock<Option<AsyncSender<String>>>,
}

/// Entry point of the work channel, handed to `Handler::generate_urls`.
pub struct UrlSink {
    inner: Arc<SinkInner>,
}

/// Owned, cloneable handle to a `UrlSink`.
///
/// Used by closure-based generators that need a `'static` future. A handle
/// stops accepting URLs as soon as the generator that received it returns.
#[derive(Clone)]
pub struct SinkHandle {
    inner: Arc<SinkInner>,
}

impl SinkInner {
    async fn emit(&self, url: String) -> Result<(), ProbeError> {
        let tx = self
            .tx
            .read()
            .clone()
            .ok_or(ProbeError::ChannelClosed("work"))?;
        trace!("Emitting URL: {}", url);
        tx.send(url)
            .await
            .map_err(|_| ProbeError::ChannelClosed("work"))
    }
}

impl UrlSink {
    pub(crate) fn new(tx: AsyncSender<String>) -> Self {
        UrlSink {
            inner: Arc::new(SinkInner {
                tx: RwLock::new(Some(tx)),
            }),
        }
    }

    /// Queues one URL for fetching, waiting while the work channel is full.
    pub async fn emit(&self, url: impl Into<String>) -> Result<(), ProbeError> {
        self.inner.emit(url.into()).await
    }

    /// Returns an owned handle for use inside `'static` futures.
    pub fn handle(&self) -> SinkHandle {
        SinkHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Stops accepting URLs and releases the pipeline's work sender.
    pub(crate) fn close(&self) {
        self.inner.tx.write().take();
    }
}

impl SinkHandle {
    pub async fn emit(&self, url: impl Into<String>) -> Result<(), ProbeError> {
        self.inner.emit(url.into()).await
    }
}

/// Resolves once a shutdown has been requested. Never resolves if the
/// requesting side went away without asking.
pub(crate) async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

pub(crate) fn spawn_producer_task<H>(
    handler: Arc<H>,
    work_tx: AsyncSender<String>,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()>
where
    H: Handler,
{
    tokio::spawn(async move {
        trace!("URL producer started");
        let sink = UrlSink::new(work_tx);

        tokio::select! {
            result = AssertUnwindSafe(handler.generate_urls(&sink)).catch_unwind() => match result {
                Ok(Ok(())) => debug!("URL generator finished"),
                Ok(Err(e)) => error!("URL generator failed: {:#}", e),
                Err(_) => error!("URL generator panicked"),
            },
            _ = shutdown_requested(shutdown) => {
                info!("Shutdown requested, URL generator stopped");
            }
        }

        sink.close();
        trace!("Work channel closed by producer");
    })
}
