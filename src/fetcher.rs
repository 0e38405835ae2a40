//! HTTP fetching.
//!
//! Workers talk to the network only through the `Fetcher` trait. The default
//! implementation, `ReqwestFetcher`, issues a single GET per URL with the
//! configured request headers and hands the live response back without
//! reading the body, so bodies are streamed by the dispatcher rather than
//! buffered inside the worker pool.

use crate::error::ProbeError;
use crate::response::{Body, Response, ResponseMeta};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use url::Url;

/// Performs one fetch attempt for a work item.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// Fetches `url`, sending `headers` with the request.
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<Response, ProbeError>;
}

/// `Fetcher` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Builds a fetcher around a client with reqwest's default settings.
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        ReqwestFetcher { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<Response, ProbeError> {
        let url = Url::parse(url)?;
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .send()
            .await?;

        let meta = ResponseMeta {
            url: response.url().clone(),
            status: response.status(),
            headers: response.headers().clone(),
            request_headers: headers.clone(),
        };
        Ok(Response::new(meta, Body::new(response)))
    }
}
