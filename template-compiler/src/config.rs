use std::collections::HashMap;
use std::time::Duration;

use override_client::ClientConfig;
use serde::{Deserialize, Serialize};

use crate::bundler::BundleOptions;
use crate::types::OverrideFailurePolicy;

pub const DEFAULT_MAX_CONCURRENT_COMPILES: usize = 10;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Editing service that serves override sets
    pub override_api: ClientConfig,

    pub override_failure_policy: OverrideFailurePolicy,

    /// Upper bound on compiles running at once
    pub max_concurrent_compiles: usize,

    /// Deadline shared by bundling and execution
    pub timeout: Duration,

    /// Reuse unchanged file contents across compiles without overrides
    pub cache_enabled: bool,

    pub bundle: BundleOptions,

    /// Variables visible to template code as `process.env`
    pub process_env: HashMap<String, String>,
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override_api(mut self, override_api: ClientConfig) -> Self {
        self.override_api = override_api;
        self
    }

    pub fn with_override_failure_policy(mut self, policy: OverrideFailurePolicy) -> Self {
        self.override_failure_policy = policy;
        self
    }

    pub fn with_max_concurrent_compiles(mut self, max: usize) -> Self {
        self.max_concurrent_compiles = max.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_bundle_options(mut self, bundle: BundleOptions) -> Self {
        self.bundle = bundle;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.process_env.insert(key.into(), value.into());
        self
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            override_api: ClientConfig::default(),
            override_failure_policy: OverrideFailurePolicy::default(),
            max_concurrent_compiles: DEFAULT_MAX_CONCURRENT_COMPILES,
            timeout: DEFAULT_TIMEOUT,
            cache_enabled: true,
            bundle: BundleOptions::default(),
            process_env: HashMap::from([("NODE_ENV".to_string(), "development".to_string())]),
        }
    }
}
