//! Request interception for the offline-capable web client.
//!
//! This module provides:
//! - `decide`: the pure per-request strategy selection
//! - the cache-first, stale-while-revalidate and network-only strategies
//! - `Router`: the worker lifecycle (install, activate, retire) and fetch dispatch
//! - `Fetcher`: the network seam, with `ReqwestFetcher` for real use
//!
//! Each deployed build version owns two named caches, `runtime-<version>` and
//! `init-<version>`. Activation deletes every other cache.

pub mod fetch;
pub mod generation;
pub mod router;
pub mod strategy;

pub use fetch::{CacheMode, FetchError, Fetcher, ReqwestFetcher};
pub use generation::Generation;
pub use router::{FetchOutcome, Router, WorkerError, WorkerState};
pub use strategy::{
    cache_first, decide, network_only, stale_while_revalidate, CacheNamespace, Decision,
    InitEndpointMatcher, ResponseSource, Revalidation, Served, Strategy,
};
