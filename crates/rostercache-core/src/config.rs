//! Runtime configuration.
//!
//! Loaded from `~/.config/rostercache/config.json` when present, otherwise
//! defaults. A `.env` file and `ROSTERCACHE_*` environment variables override
//! the endpoint locations.

use std::path::PathBuf;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::client::REQUEST_TIMEOUT_SECS;
use crate::cache::{DEFAULT_CACHE_VERSION, DEFAULT_TTL_SECS};
use crate::worker::InitEndpointMatcher;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "rostercache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const API_BASE_ENV: &str = "ROSTERCACHE_API_BASE";
const ORIGIN_ENV: &str = "ROSTERCACHE_ORIGIN";
const BUILD_VERSION_ENV: &str = "ROSTERCACHE_BUILD_VERSION";

/// Pages and assets fetched into the runtime cache at install time.
const DEFAULT_PRECACHE_PATHS: [&str; 8] = [
    "/",
    "/index.html",
    "/home.html",
    "/respond.html",
    "/admin.html",
    "/add-task.html",
    "/assets/css/styles.css",
    "/assets/js/api.js",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the remote data endpoint; actions are appended as path segments.
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub init_cache_ttl_secs: i64,
    /// Version tag of the init cache key format.
    pub cache_version: String,
    /// Deployment version naming the current cache generation.
    pub build_version: String,
    /// Origin the precache paths are resolved against.
    pub origin: String,
    pub precache_paths: Vec<String>,
    pub init_endpoint: InitEndpointMatcher,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            init_cache_ttl_secs: DEFAULT_TTL_SECS,
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            build_version: concat!("v", env!("CARGO_PKG_VERSION")).to_string(),
            origin: "http://localhost:3000".to_string(),
            precache_paths: DEFAULT_PRECACHE_PATHS.iter().map(|p| p.to_string()).collect(),
            init_endpoint: InitEndpointMatcher::default(),
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        // Load .env file if present (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(base) = non_empty(API_BASE_ENV) {
            self.api_base_url = base;
        }
        if let Some(origin) = non_empty(ORIGIN_ENV) {
            self.origin = origin;
        }
        if let Some(version) = non_empty(BUILD_VERSION_ENV) {
            self.build_version = version;
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the persisted key/value store.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Lifetime of a cached init payload.
    pub fn init_cache_ttl(&self) -> Result<chrono::Duration> {
        chrono::Duration::try_seconds(self.init_cache_ttl_secs)
            .with_context(|| format!("init_cache_ttl_secs out of range: {}", self.init_cache_ttl_secs))
    }

    /// Precache paths resolved against the origin.
    pub fn precache_urls(&self) -> Result<Vec<Url>> {
        let origin = Url::parse(&self.origin)
            .with_context(|| format!("Invalid origin {}", self.origin))?;
        self.precache_paths
            .iter()
            .map(|path| {
                origin
                    .join(path)
                    .with_context(|| format!("Invalid precache path {}", path))
            })
            .collect()
    }
}
