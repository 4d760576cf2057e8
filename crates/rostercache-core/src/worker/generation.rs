/// The named caches owned by one deployed build version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    version: String,
}

impl Generation {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Pages, assets and everything not otherwise routed.
    pub fn runtime_name(&self) -> String {
        format!("runtime-{}", self.version)
    }

    /// Responses of the init data endpoint.
    pub fn init_name(&self) -> String {
        format!("init-{}", self.version)
    }

    /// Whether a cache name belongs to this generation.
    pub fn owns(&self, cache_name: &str) -> bool {
        cache_name == self.runtime_name() || cache_name == self.init_name()
    }
}
