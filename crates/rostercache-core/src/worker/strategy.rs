//! Strategy selection and the strategies themselves.
//!
//! `decide` is pure so routing can be tested by enumerating requests. The
//! strategies operate on one named cache and one fetcher:
//!
//! - cache-first: serve the cached copy, otherwise fetch and store; never
//!   refresh an entry once stored
//! - stale-while-revalidate: start the network leg immediately, serve the
//!   cached copy when there is one, otherwise wait for the network
//! - network-only: no cache involvement
//!
//! Only 2xx responses are stored.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::fetch::{CacheMode, FetchError, Fetcher};
use crate::http::{Request, Response};
use crate::storage::NamedCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst,
    StaleWhileRevalidate,
    NetworkOnly,
}

/// Which of the generation's caches a request is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    Runtime,
    InitData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub strategy: Strategy,
    /// `None` for network-only.
    pub namespace: Option<CacheNamespace>,
    pub cache_mode: CacheMode,
}

impl Decision {
    pub fn network_only() -> Self {
        Self {
            strategy: Strategy::NetworkOnly,
            namespace: None,
            cache_mode: CacheMode::Default,
        }
    }

    fn cached(strategy: Strategy, namespace: CacheNamespace) -> Self {
        Self {
            strategy,
            namespace: Some(namespace),
            cache_mode: CacheMode::Default,
        }
    }
}

/// Recognizes requests for the aggregate init data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitEndpointMatcher {
    pub host: String,
    /// Substring the path must contain.
    pub path_marker: String,
    /// Substring the query string must contain.
    pub query_marker: String,
}

impl Default for InitEndpointMatcher {
    fn default() -> Self {
        Self {
            host: "script.google.com".to_string(),
            path_marker: "/macros/".to_string(),
            query_marker: "action=getInitData".to_string(),
        }
    }
}

impl InitEndpointMatcher {
    pub fn matches(&self, request: &Request) -> bool {
        let url = &request.url;
        url.host_str() == Some(self.host.as_str())
            && url.path().contains(&self.path_marker)
            && url.query().is_some_and(|q| q.contains(&self.query_marker))
    }
}

/// Strategy, namespace and network cache mode for `request`.
pub fn decide(request: &Request, init_endpoint: &InitEndpointMatcher) -> Decision {
    if request.method != Method::GET || !matches!(request.url.scheme(), "http" | "https") {
        return Decision::network_only();
    }

    if init_endpoint.matches(request) {
        return Decision {
            cache_mode: CacheMode::NoStore,
            ..Decision::cached(Strategy::StaleWhileRevalidate, CacheNamespace::InitData)
        };
    }

    let accepts_html = request
        .header("accept")
        .is_some_and(|accept| accept.contains("text/html"));
    if request.destination == crate::http::Destination::Document || accepts_html {
        return Decision::cached(Strategy::StaleWhileRevalidate, CacheNamespace::Runtime);
    }

    if request.destination.is_static_asset() {
        return Decision::cached(Strategy::CacheFirst, CacheNamespace::Runtime);
    }

    Decision::cached(Strategy::StaleWhileRevalidate, CacheNamespace::Runtime)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

/// The background network leg of a stale-while-revalidate hit.
///
/// Dropping the handle detaches the task; it still updates the cache.
#[derive(Debug)]
pub struct Revalidation {
    handle: JoinHandle<NetworkLeg>,
}

impl Revalidation {
    /// Wait for the network leg. Returns whether the cache was refreshed.
    pub async fn settled(self) -> bool {
        matches!(self.handle.await, Ok(NetworkLeg { stored: true, .. }))
    }
}

/// Result of a spawned network leg and whether its response reached the cache.
#[derive(Debug)]
struct NetworkLeg {
    outcome: Result<Response, FetchError>,
    stored: bool,
}

#[derive(Debug)]
pub struct Served {
    pub response: Response,
    pub source: ResponseSource,
    pub revalidation: Option<Revalidation>,
}

impl Served {
    fn from_network(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
            revalidation: None,
        }
    }
}

/// Cached lookup where a storage failure counts as a miss.
async fn lookup(cache: &dyn NamedCache, request: &Request) -> Option<Response> {
    match cache.lookup(request).await {
        Ok(hit) => hit,
        Err(e) => {
            debug!(cache = cache.name(), url = %request.url, error = %e, "Cache lookup failed, treating as miss");
            None
        }
    }
}

/// Store a network response when it is cacheable. Failures are logged only.
///
/// Returns whether the response was stored.
async fn store(cache: &dyn NamedCache, request: &Request, response: &Response) -> bool {
    if !response.is_success() {
        trace!(url = %request.url, status = response.status, "Not caching non-2xx response");
        return false;
    }
    match cache.put(request, response.clone()).await {
        Ok(()) => true,
        Err(e) => {
            warn!(cache = cache.name(), url = %request.url, error = %e, "Cache write failed");
            false
        }
    }
}

pub async fn network_only(
    fetcher: &dyn Fetcher,
    request: &Request,
    mode: CacheMode,
) -> Result<Served, FetchError> {
    let response = fetcher.fetch(request, mode).await?;
    Ok(Served::from_network(response))
}

pub async fn cache_first(
    cache: &dyn NamedCache,
    fetcher: &dyn Fetcher,
    request: &Request,
    mode: CacheMode,
) -> Result<Served, FetchError> {
    if let Some(hit) = lookup(cache, request).await {
        debug!(cache = cache.name(), url = %request.url, "Cache hit");
        return Ok(Served {
            response: hit,
            source: ResponseSource::Cache,
            revalidation: None,
        });
    }

    let response = fetcher.fetch(request, mode).await?;
    store(cache, request, &response).await;
    Ok(Served::from_network(response))
}

pub async fn stale_while_revalidate(
    cache: Arc<dyn NamedCache>,
    fetcher: Arc<dyn Fetcher>,
    request: &Request,
    mode: CacheMode,
) -> Result<Served, FetchError> {
    let handle = {
        let cache = Arc::clone(&cache);
        let request = request.clone();
        tokio::spawn(async move {
            let outcome = fetcher.fetch(&request, mode).await;
            let stored = match &outcome {
                Ok(response) => store(cache.as_ref(), &request, response).await,
                Err(e) => {
                    debug!(url = %request.url, error = %e, "Revalidation failed");
                    false
                }
            };
            NetworkLeg { outcome, stored }
        })
    };

    if let Some(hit) = lookup(cache.as_ref(), request).await {
        debug!(cache = cache.name(), url = %request.url, "Serving cached response, revalidating");
        return Ok(Served {
            response: hit,
            source: ResponseSource::Cache,
            revalidation: Some(Revalidation { handle }),
        });
    }

    let response = handle.await.map_err(|_| FetchError::Aborted)?.outcome?;
    Ok(Served::from_network(response))
}
