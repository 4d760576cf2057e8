//! Storage primitives underneath the caches.
//!
//! This module provides:
//! - `KeyValueStore`: durable string→string store (in-memory or a JSON file)
//! - `CacheStorage` / `NamedCache`: asynchronous request-keyed response caches
//!
//! Every operation returns `Result<_, StorageError>`. Callers in the caching
//! layer decide what an error means; for them it always means "no cache".

pub mod error;
pub mod kv;
pub mod named;

pub use error::StorageError;
pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use named::{CacheStorage, MemoryCacheStorage, MemoryNamedCache, NamedCache};
