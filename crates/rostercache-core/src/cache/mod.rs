//! Role-partitioned, time-bounded cache for the aggregate init data.
//!
//! This module provides the `RolePartitionedCache` which stores one JSON
//! payload per role in a `KeyValueStore`. Entries are fresh for 120 seconds
//! by default and are always invalidated for every role at once.

pub mod manager;

pub use manager::{CacheEntry, RolePartitionedCache, DEFAULT_CACHE_VERSION, DEFAULT_TTL_SECS};
