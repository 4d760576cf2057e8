//! In-crate fakes shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex, Once};

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use crate::api::{Action, ApiError, RemoteEndpoint};
use crate::http::{Request, Response};
use crate::storage::{
    CacheStorage, KeyValueStore, MemoryCacheStorage, MemoryNamedCache, NamedCache, StorageError,
};
use crate::worker::{CacheMode, FetchError, Fetcher};

/// Route test logs through the test harness. `RUST_LOG` controls the level.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

fn disabled() -> StorageError {
    StorageError::Unavailable("storage disabled".to_string())
}

/// A key/value store that rejects every operation.
pub struct FailingKeyValueStore;

impl KeyValueStore for FailingKeyValueStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(disabled())
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::QuotaExceeded)
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(disabled())
    }
}

/// A named cache whose every operation fails.
pub struct FailingNamedCache;

impl NamedCache for FailingNamedCache {
    fn name(&self) -> &str {
        "broken"
    }

    fn lookup<'a>(
        &'a self,
        _request: &'a Request,
    ) -> BoxFuture<'a, Result<Option<Response>, StorageError>> {
        async { Err(disabled()) }.boxed()
    }

    fn put<'a>(
        &'a self,
        _request: &'a Request,
        _response: Response,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        async { Err(StorageError::QuotaExceeded) }.boxed()
    }

    fn delete<'a>(&'a self, _request: &'a Request) -> BoxFuture<'a, Result<bool, StorageError>> {
        async { Err(disabled()) }.boxed()
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        async { Err(disabled()) }.boxed()
    }
}

/// Serves lookups from an inner cache but rejects every write.
pub struct ReadOnlyNamedCache {
    inner: MemoryNamedCache,
}

impl ReadOnlyNamedCache {
    pub fn new(inner: MemoryNamedCache) -> Self {
        Self { inner }
    }
}

impl NamedCache for ReadOnlyNamedCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn lookup<'a>(
        &'a self,
        request: &'a Request,
    ) -> BoxFuture<'a, Result<Option<Response>, StorageError>> {
        self.inner.lookup(request)
    }

    fn put<'a>(
        &'a self,
        _request: &'a Request,
        _response: Response,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        async { Err(StorageError::QuotaExceeded) }.boxed()
    }

    fn delete<'a>(&'a self, _request: &'a Request) -> BoxFuture<'a, Result<bool, StorageError>> {
        async { Err(disabled()) }.boxed()
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        self.inner.keys()
    }
}

/// Memory cache storage whose caches cannot be deleted.
#[derive(Default, Clone)]
pub struct UndeletableCacheStorage {
    inner: MemoryCacheStorage,
}

impl UndeletableCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for UndeletableCacheStorage {
    fn open<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn NamedCache>, StorageError>> {
        self.inner.open(name)
    }

    fn has<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        self.inner.has(name)
    }

    fn delete<'a>(&'a self, _name: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        async { Err(disabled()) }.boxed()
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        self.inner.keys()
    }
}

/// Cache storage that lists no caches and cannot open one.
pub struct FailingCacheStorage;

impl CacheStorage for FailingCacheStorage {
    fn open<'a>(
        &'a self,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn NamedCache>, StorageError>> {
        async { Err(disabled()) }.boxed()
    }

    fn has<'a>(&'a self, _name: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        async { Ok(false) }.boxed()
    }

    fn delete<'a>(&'a self, _name: &'a str) -> BoxFuture<'a, Result<bool, StorageError>> {
        async { Err(disabled()) }.boxed()
    }

    fn keys(&self) -> BoxFuture<'_, Result<Vec<String>, StorageError>> {
        async { Ok(Vec::new()) }.boxed()
    }
}

// ============================================================================
// Remote endpoint
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub action: Action,
    pub body: Value,
    pub credential: Option<String>,
}

/// Answers calls from a queue of scripted replies, recording each call.
#[derive(Default)]
pub struct ScriptedEndpoint {
    replies: Mutex<VecDeque<Result<Value, ApiError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: Value) {
        self.replies.lock().unwrap().push_back(Ok(reply));
    }

    pub fn push_error(&self, error: ApiError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl RemoteEndpoint for ScriptedEndpoint {
    fn call<'a>(
        &'a self,
        action: Action,
        body: Value,
        credential: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Value, ApiError>> {
        self.calls.lock().unwrap().push(RecordedCall {
            action,
            body,
            credential: credential.map(str::to_string),
        });
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network(format!("no scripted reply for {}", action))));
        async move { reply }.boxed()
    }
}

/// Answer one HTTP request on a local port with `status` and a JSON body.
/// Returns an API base URL pointing at it.
pub fn serve_once(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&request).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
        }
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).unwrap();
    });
    format!("http://{}/api", addr)
}

// ============================================================================
// Fetchers
// ============================================================================

/// Serves canned responses by URL. Unknown URLs fail as unreachable.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Response>>,
    fetches: Mutex<Vec<(String, CacheMode)>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, url: &str, status: u16, body: &str) -> Self {
        self.set_reply(url, status, body);
        self
    }

    pub fn set_reply(&self, url: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Response::new(status, body));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn fetch_count_for(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }

    pub fn modes(&self) -> Vec<CacheMode> {
        self.fetches.lock().unwrap().iter().map(|(_, m)| *m).collect()
    }

    pub fn last_mode(&self, url: &str) -> Option<CacheMode> {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(u, _)| u == url)
            .map(|(_, m)| *m)
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch<'a>(
        &'a self,
        request: &'a Request,
        mode: CacheMode,
    ) -> BoxFuture<'a, Result<Response, FetchError>> {
        let url = request.url.to_string();
        self.fetches.lock().unwrap().push((url.clone(), mode));
        let outcome = self
            .responses
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .ok_or_else(|| FetchError::Network(format!("{} unreachable", url)));
        async move { outcome }.boxed()
    }
}

/// Holds every fetch until `open` is called, then answers with one response.
pub struct GatedFetcher {
    gate: Semaphore,
    response: Response,
}

impl GatedFetcher {
    pub fn new(response: Response) -> Self {
        Self {
            gate: Semaphore::new(0),
            response,
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(1);
    }
}

impl Fetcher for GatedFetcher {
    fn fetch<'a>(
        &'a self,
        _request: &'a Request,
        _mode: CacheMode,
    ) -> BoxFuture<'a, Result<Response, FetchError>> {
        async move {
            let _permit = self.gate.acquire().await.map_err(|_| FetchError::Aborted)?;
            Ok(self.response.clone())
        }
        .boxed()
    }
}
