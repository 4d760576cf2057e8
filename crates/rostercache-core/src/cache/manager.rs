use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::Role;
use crate::clock::{Clock, SystemClock};
use crate::storage::{KeyValueStore, StorageError};

/// Init data older than this is treated as missing.
pub const DEFAULT_TTL_SECS: i64 = 120;

/// Cache-format version baked into every partition key. Bump it whenever the
/// shape of the stored payload changes so old entries are never read back.
pub const DEFAULT_CACHE_VERSION: &str = "v4";

const KEY_PREFIX: &str = "initDataCache";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    #[serde(rename = "writtenAt", with = "chrono::serde::ts_milliseconds")]
    pub written_at: DateTime<Utc>,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T, written_at: DateTime<Utc>) -> Self {
        Self {
            written_at,
            payload,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.written_at
    }

    /// Expired once strictly older than `ttl`. Entries from the future
    /// (clock skew) count as fresh.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) > ttl
    }
}

/// One cached init payload per role.
///
/// Storage failures and unparseable entries are never surfaced: they are
/// logged and read back as "no cache".
pub struct RolePartitionedCache<S> {
    store: S,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    version: String,
}

impl<S: KeyValueStore> RolePartitionedCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
            version: DEFAULT_CACHE_VERSION.to_string(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn partition_key(&self, role: Role) -> String {
        format!("{}_{}_role_{}", KEY_PREFIX, self.version, role.as_str())
    }

    fn load(&self, role: Role) -> Result<Option<CacheEntry<Value>>, StorageError> {
        let raw = match self.store.get(&self.partition_key(role))? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let entry: CacheEntry<Value> = serde_json::from_str(&raw)?;
        if entry.payload.is_null() {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn load_or_absent(&self, role: Role) -> Option<CacheEntry<Value>> {
        match self.load(role) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(role = %role, error = %e, "Init cache unreadable, treating as absent");
                None
            }
        }
    }

    /// Fresh payload for `role`, if any.
    pub fn read(&self, role: Role) -> Option<Value> {
        let entry = self.load_or_absent(role)?;
        let now = self.clock.now();
        if entry.is_expired(now, self.ttl) {
            debug!(
                role = %role,
                age_secs = entry.age(now).num_seconds(),
                "Init cache expired"
            );
            return None;
        }
        debug!(role = %role, "Init cache hit");
        Some(entry.payload)
    }

    /// Payload for `role` regardless of age.
    pub fn read_stale(&self, role: Role) -> Option<Value> {
        self.load_or_absent(role).map(|entry| entry.payload)
    }

    /// Replace the entry for `role` with `payload`, stamped with the current time.
    pub fn write(&self, role: Role, payload: &Value) {
        let entry = CacheEntry::new(payload, self.clock.now());
        let result = serde_json::to_string(&entry)
            .map_err(StorageError::from)
            .and_then(|raw| self.store.set(&self.partition_key(role), &raw));

        match result {
            Ok(()) => debug!(role = %role, "Init cache written"),
            Err(e) => debug!(role = %role, error = %e, "Init cache write failed, continuing uncached"),
        }
    }

    /// Drop the entries of every role, whichever role is active.
    pub fn invalidate_all(&self) {
        for role in Role::ALL {
            if let Err(e) = self.store.remove(&self.partition_key(role)) {
                debug!(role = %role, error = %e, "Failed to remove init cache entry");
            }
        }
        info!("Init cache invalidated for all roles");
    }
}

// ============================================================================
// Tests
// ============================================================================
