//! Network access for the router.
//!
//! `Fetcher` is the transport seam: the router never talks to reqwest
//! directly, so tests can script responses and gate their timing.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{header, Client};
use thiserror::Error;
use tracing::debug;

use crate::http::{Request, Response};

/// How the network leg treats intermediate HTTP caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Default,
    /// Neither read nor populate HTTP caches.
    NoStore,
    /// Skip HTTP caches on the way in, refresh them on the way out.
    Reload,
}

impl CacheMode {
    /// `Cache-Control` value sent for this mode, if any.
    pub fn cache_control(&self) -> Option<&'static str> {
        match self {
            CacheMode::Default => None,
            CacheMode::NoStore => Some("no-store"),
            CacheMode::Reload => Some("no-cache"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected status {0}")]
    BadStatus(u16),

    #[error("Request aborted")]
    Aborted,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::BadStatus(status.as_u16())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

pub trait Fetcher: Send + Sync {
    /// Perform `request` on the network. Any HTTP status is an `Ok` response.
    fn fetch<'a>(
        &'a self,
        request: &'a Request,
        mode: CacheMode,
    ) -> BoxFuture<'a, Result<Response, FetchError>>;
}

impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    fn fetch<'a>(
        &'a self,
        request: &'a Request,
        mode: CacheMode,
    ) -> BoxFuture<'a, Result<Response, FetchError>> {
        (**self).fetch(request, mode)
    }
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn build(&self, request: &Request, mode: CacheMode) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(directive) = mode.cache_control() {
            builder = builder.header(header::CACHE_CONTROL, directive);
            if mode == CacheMode::Reload {
                builder = builder.header(header::PRAGMA, "no-cache");
            }
        }
        builder
    }
}

impl Fetcher for ReqwestFetcher {
    fn fetch<'a>(
        &'a self,
        request: &'a Request,
        mode: CacheMode,
    ) -> BoxFuture<'a, Result<Response, FetchError>> {
        async move {
            let response = self.build(request, mode).send().await?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                .collect();
            let body = response.bytes().await?.to_vec();
            debug!(url = %request.url, status = status, ?mode, "Fetched");
            Ok(Response {
                status,
                headers,
                body,
            })
        }
        .boxed()
    }
}
