use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use reqwest::Method;
use tokio::sync::RwLock;

use super::StorageError;
use crate::http::{Request, Response};

/// One named, request-keyed store of responses.
pub trait NamedCache: Send + Sync {
    fn name(&self) -> &str;

    /// Stored response for `request`, if any.
    fn lookup<'a>(
        &'a self,
        request: &'a Request,
    ) -> BoxFuture<'a, Result<Option<Response>, StorageError>>;

    /// Store `response` for `request`, replacing any previous entry.
    fn put<'a>(
        &'a self,
        request: &'a Request,
        response: Response,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Returns whether an entry was removed.
    fn delete<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<bool, StorageError>>;

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>>;
}

/// The set of named caches for one origin.
pub trait CacheStorage: Send + Sync {
    /// Open a cache by name, creating it when missing.
    fn open<'a>(&'a self, name: &'a str)
        -> BoxFuture<'a, Result<Arc<dyn NamedCache>, StorageError>>;

    fn has<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool, StorageError>>;

    /// Returns whether a cache with that name existed.
    fn delete<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool, StorageError>>;

    /// Names of every existing cache.
    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>>;
}

#[derive(Debug)]
pub struct MemoryNamedCache {
    name: String,
    entries: RwLock<HashMap<String, Response>>,
}

impl MemoryNamedCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl NamedCache for MemoryNamedCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup<'a>(
        &'a self,
        request: &'a Request,
    ) -> BoxFuture<'a, Result<Option<Response>, StorageError>> {
        async move {
            let entries = self.entries.read().await;
            Ok(entries.get(&request.cache_key()).cloned())
        }
        .boxed()
    }

    fn put<'a>(
        &'a self,
        request: &'a Request,
        response: Response,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            if request.method != Method::GET {
                return Err(StorageError::Rejected(format!(
                    "{} requests cannot be cached",
                    request.method
                )));
            }
            let mut entries = self.entries.write().await;
            entries.insert(request.cache_key(), response);
            Ok(())
        }
        .boxed()
    }

    fn delete<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<bool, StorageError>> {
        async move {
            let mut entries = self.entries.write().await;
            Ok(entries.remove(&request.cache_key()).is_some())
        }
        .boxed()
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        async move {
            let entries = self.entries.read().await;
            let mut keys: Vec<String> = entries.keys().cloned().collect();
            keys.sort();
            Ok(keys)
        }
        .boxed()
    }
}

/// In-memory cache storage. Clone shares the same caches.
#[derive(Debug, Default, Clone)]
pub struct MemoryCacheStorage {
    caches: Arc<RwLock<BTreeMap<String, Arc<MemoryNamedCache>>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn open<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn NamedCache>, StorageError>> {
        async move {
            if let Some(existing) = self.caches.read().await.get(name) {
                return Ok(Arc::clone(existing) as Arc<dyn NamedCache>);
            }
            let mut caches = self.caches.write().await;
            let cache = caches
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryNamedCache::new(name)));
            Ok(Arc::clone(cache) as Arc<dyn NamedCache>)
        }
        .boxed()
    }

    fn has<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        async move { Ok(self.caches.read().await.contains_key(name)) }.boxed()
    }

    fn delete<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        async move { Ok(self.caches.write().await.remove(name).is_some()) }.boxed()
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        async move { Ok(self.caches.read().await.keys().cloned().collect()) }.boxed()
    }
}
