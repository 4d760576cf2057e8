use std::sync::Arc;

use futures::future::join_all;
use reqwest::Url;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::fetch::{CacheMode, FetchError, Fetcher};
use super::generation::Generation;
use super::strategy::{
    cache_first, decide, network_only, stale_while_revalidate, CacheNamespace, InitEndpointMatcher,
    Served, Strategy,
};
use crate::config::Config;
use crate::http::{Request, Response};
use crate::storage::{CacheStorage, StorageError};

/// Lifecycle of one worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Failed to install or superseded by a newer instance.
    Redundant,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to precache {url}: {source}")]
    Precache { url: Url, source: FetchError },

    #[error("Cache storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cannot {action} a worker that is {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: WorkerState,
    },
}

/// What the host should do with an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Let the request go to the network untouched.
    Passthrough,
    Respond(Served),
}

pub struct Router {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    generation: Generation,
    precache: Vec<Url>,
    init_endpoint: InitEndpointMatcher,
    state: WorkerState,
}

impl Router {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        generation: Generation,
    ) -> Self {
        Self {
            storage,
            fetcher,
            generation,
            precache: Vec::new(),
            init_endpoint: InitEndpointMatcher::default(),
            state: WorkerState::Parsed,
        }
    }

    pub fn from_config(
        config: &Config,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(storage, fetcher, Generation::new(config.build_version.clone()))
            .with_precache(config.precache_urls()?)
            .with_init_endpoint(config.init_endpoint.clone()))
    }

    pub fn with_precache(mut self, urls: Vec<Url>) -> Self {
        self.precache = urls;
        self
    }

    pub fn with_init_endpoint(mut self, matcher: InitEndpointMatcher) -> Self {
        self.init_endpoint = matcher;
        self
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    fn expect_state(&self, expected: WorkerState, action: &'static str) -> Result<(), WorkerError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(WorkerError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Fetch every precache URL into the runtime cache.
    ///
    /// All fetches must succeed with a 2xx status before anything is stored.
    /// On failure the worker becomes redundant.
    pub async fn install(&mut self) -> Result<(), WorkerError> {
        self.expect_state(WorkerState::Parsed, "install")?;
        self.state = WorkerState::Installing;
        info!(version = self.generation.version(), urls = self.precache.len(), "Installing");

        match self.precache_all().await {
            Ok(()) => {
                self.state = WorkerState::Installed;
                info!(version = self.generation.version(), "Installed");
                Ok(())
            }
            Err(e) => {
                warn!(version = self.generation.version(), error = %e, "Install failed");
                self.state = WorkerState::Redundant;
                Err(e)
            }
        }
    }

    async fn precache_all(&self) -> Result<(), WorkerError> {
        let requests: Vec<Request> = self.precache.iter().cloned().map(Request::get).collect();
        let fetches = requests
            .iter()
            .map(|request| self.fetcher.fetch(request, CacheMode::Reload));
        let results = join_all(fetches).await;

        let mut fetched: Vec<(&Request, Response)> = Vec::with_capacity(results.len());
        for (request, result) in requests.iter().zip(results) {
            let response = result.map_err(|source| WorkerError::Precache {
                url: request.url.clone(),
                source,
            })?;
            if !response.is_success() {
                return Err(WorkerError::Precache {
                    url: request.url.clone(),
                    source: FetchError::BadStatus(response.status),
                });
            }
            fetched.push((request, response));
        }

        if fetched.is_empty() {
            return Ok(());
        }

        let runtime_name = self.generation.runtime_name();
        let cache = self.storage.open(&runtime_name).await?;
        for (request, response) in fetched {
            if let Err(e) = cache.put(request, response).await {
                if let Err(cleanup) = self.storage.delete(&runtime_name).await {
                    debug!(cache = %runtime_name, error = %cleanup, "Failed to drop partial precache");
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Delete every named cache outside the current generation.
    ///
    /// Returns the names of the deleted caches. If any stale cache cannot be
    /// deleted, activation fails and the worker stays installed.
    pub async fn activate(&mut self) -> Result<Vec<String>, WorkerError> {
        self.expect_state(WorkerState::Installed, "activate")?;
        self.state = WorkerState::Activating;

        let stale: Vec<String> = match self.storage.keys().await {
            Ok(keys) => keys.into_iter().filter(|k| !self.generation.owns(k)).collect(),
            Err(e) => {
                self.state = WorkerState::Installed;
                return Err(e.into());
            }
        };

        let deletions = join_all(stale.iter().map(|name| self.storage.delete(name))).await;
        let mut deleted = Vec::with_capacity(stale.len());
        let mut failure = None;
        for (name, result) in stale.into_iter().zip(deletions) {
            match result {
                Ok(true) => deleted.push(name),
                Ok(false) => {}
                Err(e) => {
                    warn!(cache = %name, error = %e, "Failed to delete stale cache");
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
            }
        }

        if let Some(e) = failure {
            self.state = WorkerState::Installed;
            return Err(e.into());
        }

        self.state = WorkerState::Activated;
        info!(version = self.generation.version(), deleted = ?deleted, "Activated");
        Ok(deleted)
    }

    /// Take this instance out of service.
    pub fn retire(&mut self) {
        if self.state != WorkerState::Redundant {
            info!(version = self.generation.version(), previous = ?self.state, "Retired");
            self.state = WorkerState::Redundant;
        }
    }

    // =========================================================================
    // Fetch handling
    // =========================================================================

    /// Route an intercepted request to its strategy.
    ///
    /// Only an activated worker responds; in every other state requests pass
    /// through to the network.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, FetchError> {
        if self.state != WorkerState::Activated {
            return Ok(FetchOutcome::Passthrough);
        }

        let decision = decide(request, &self.init_endpoint);
        let namespace = match (decision.strategy, decision.namespace) {
            (Strategy::NetworkOnly, _) | (_, None) => return Ok(FetchOutcome::Passthrough),
            (_, Some(namespace)) => namespace,
        };

        let cache_name = match namespace {
            CacheNamespace::Runtime => self.generation.runtime_name(),
            CacheNamespace::InitData => self.generation.init_name(),
        };
        let cache = match self.storage.open(&cache_name).await {
            Ok(cache) => cache,
            Err(e) => {
                debug!(cache = %cache_name, error = %e, "Cache unavailable, using network");
                let served = network_only(self.fetcher.as_ref(), request, decision.cache_mode).await?;
                return Ok(FetchOutcome::Respond(served));
            }
        };

        let served = match decision.strategy {
            Strategy::CacheFirst => {
                cache_first(cache.as_ref(), self.fetcher.as_ref(), request, decision.cache_mode).await?
            }
            _ => {
                stale_while_revalidate(cache, Arc::clone(&self.fetcher), request, decision.cache_mode)
                    .await?
            }
        };
        Ok(FetchOutcome::Respond(served))
    }
}
