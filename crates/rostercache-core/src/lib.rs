//! Offline cache and invalidation engine for the roster web app.
//!
//! Two independent layers:
//!
//! - [`worker`]: request interception with per-resource caching strategies
//!   over named response caches, plus the install/activate lifecycle that
//!   keeps exactly one cache generation alive.
//! - [`facade`]: the application-facing surface. It serves the aggregate
//!   init data from a role-partitioned cache with a 120 second TTL and
//!   invalidates every role on each successful mutation.
//!
//! Storage, the remote endpoint and the network are traits so both layers
//! can run against in-memory fakes.

pub mod api;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod facade;
pub mod http;
pub mod models;
pub mod storage;
pub mod utils;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{Action, ApiClient, ApiError, RemoteEndpoint};
pub use auth::{Role, SessionContext};
pub use cache::{CacheEntry, RolePartitionedCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use facade::{DataError, InitDataFacade};
pub use http::{Destination, Request, Response};
pub use storage::{
    CacheStorage, FileKeyValueStore, KeyValueStore, MemoryCacheStorage, MemoryKeyValueStore,
    NamedCache, StorageError,
};
pub use worker::{
    CacheMode, FetchError, FetchOutcome, Fetcher, Generation, ReqwestFetcher, Router,
    WorkerError, WorkerState,
};
