//! Process configuration
//!
//! Read from TOML. Every field has a default, so an empty file is a valid
//! configuration for a process with no links.
//!
//! ```toml
//! scenario_id = "S000000"
//! enable_prefetching = true
//! poll_interval_ms = 1000
//! poll_ceiling_ms = 20000
//!
//! [time_horizon]
//! start = 51544.0
//! end = 51545.0
//!
//! [[services]]
//! id = "ws-gw"
//! type = "wps"
//! quantities = ["head", "flux"]
//!
//! [[links]]
//! id = "l1"
//! quantity_id = "head"
//! element_set = { id = "wells", element_ids = ["w1", "w2"] }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::RetryPolicy;
use crate::entry::ServiceDescriptorEntry;
use crate::error::{Error, Result};
use crate::prefetch::PrefetchConfig;
use crate::types::{OutputLink, TimeHorizon};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "VALUESET_CACHE_CONFIG";

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "valueset-cache.toml";

/// Configuration of one coordinator process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Scenario id appended to every key
    #[serde(default = "default_scenario_id")]
    pub scenario_id: String,

    /// Id this process registers in the client map
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Component label used in statistics reports
    #[serde(default = "default_component_id")]
    pub component_id: String,

    /// Run label used in statistics reports
    #[serde(default = "default_run_id")]
    pub run_id: String,

    /// Issue speculative requests
    #[serde(default = "default_true")]
    pub enable_prefetching: bool,

    /// Delay between store checks while waiting (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Polling before a request is issued again (ms)
    #[serde(default = "default_poll_ceiling_ms")]
    pub poll_ceiling_ms: u64,

    /// Request rounds before giving up (None = forever)
    #[serde(default)]
    pub max_request_attempts: Option<u32>,

    /// Total wait before giving up (ms, None = forever)
    #[serde(default)]
    pub request_deadline_ms: Option<u64>,

    /// Delay between connection attempts (ms)
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,

    /// Connection attempts before giving up (None = forever)
    #[serde(default)]
    pub max_connect_attempts: Option<u32>,

    /// Upper bound on extrapolation steps per prefetch pass
    #[serde(default = "default_max_prefetch_steps")]
    pub max_prefetch_steps: usize,

    /// Simulation start and end
    #[serde(default)]
    pub time_horizon: TimeHorizon,

    /// Services able to fulfill requests
    #[serde(default)]
    pub services: Vec<ServiceDescriptorEntry>,

    /// Output links this process consumes
    #[serde(default)]
    pub links: Vec<OutputLink>,

    /// Capacity of the in-memory request queue
    #[serde(default = "default_queue_capacity")]
    pub request_queue_capacity: usize,

    /// Capacity of the in-memory write-behind queue
    #[serde(default = "default_queue_capacity")]
    pub value_queue_capacity: usize,
}

fn default_scenario_id() -> String {
    "S000000".to_string()
}

fn default_client_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_component_id() -> String {
    "component".to_string()
}

fn default_run_id() -> String {
    "run".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_ceiling_ms() -> u64 {
    20_000
}

fn default_connect_retry_ms() -> u64 {
    5000
}

fn default_max_prefetch_steps() -> usize {
    4096
}

fn default_queue_capacity() -> usize {
    16
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            scenario_id: default_scenario_id(),
            client_id: default_client_id(),
            component_id: default_component_id(),
            run_id: default_run_id(),
            enable_prefetching: true,
            poll_interval_ms: default_poll_interval_ms(),
            poll_ceiling_ms: default_poll_ceiling_ms(),
            max_request_attempts: None,
            request_deadline_ms: None,
            connect_retry_ms: default_connect_retry_ms(),
            max_connect_attempts: None,
            max_prefetch_steps: default_max_prefetch_steps(),
            time_horizon: TimeHorizon::default(),
            services: Vec::new(),
            links: Vec::new(),
            request_queue_capacity: default_queue_capacity(),
            value_queue_capacity: default_queue_capacity(),
        }
    }
}

impl CacheConfig {
    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject settings the cache cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Configuration(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.poll_ceiling_ms == 0 {
            return Err(Error::Configuration(
                "poll_ceiling_ms must be positive".to_string(),
            ));
        }
        if self.request_queue_capacity == 0 || self.value_queue_capacity == 0 {
            return Err(Error::Configuration(
                "queue capacities must be positive".to_string(),
            ));
        }
        if self.time_horizon.end < self.time_horizon.start {
            return Err(Error::Configuration(format!(
                "time horizon ends ({}) before it starts ({})",
                self.time_horizon.end.mjd(),
                self.time_horizon.start.mjd()
            )));
        }

        for service in &self.services {
            if let Some(q) = service.quantities.iter().find(|q| q.contains(',')) {
                return Err(Error::Configuration(format!(
                    "service {} quantity {:?} contains a comma",
                    service.id, q
                )));
            }
        }

        let mut seen = HashSet::new();
        for link in &self.links {
            if link.quantity_id.contains(',') {
                return Err(Error::Configuration(format!(
                    "link {} quantity {:?} contains a comma",
                    link.id, link.quantity_id
                )));
            }
            if !seen.insert(link.id.as_str()) {
                return Err(Error::Configuration(format!(
                    "link {} is listed twice",
                    link.id
                )));
            }
            if !self.services.iter().any(|s| s.produces(&link.quantity_id)) {
                warn!(
                    link = %link.id,
                    quantity = %link.quantity_id,
                    "No configured service produces this quantity"
                );
            }
        }
        Ok(())
    }

    /// Wait/retry policy for on-demand requests
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_ceiling: Duration::from_millis(self.poll_ceiling_ms),
            max_attempts: self.max_request_attempts,
            deadline: self.request_deadline_ms.map(Duration::from_millis),
        }
    }

    /// Prefetch policy
    pub fn prefetch_config(&self) -> PrefetchConfig {
        PrefetchConfig {
            enabled: self.enable_prefetching,
            max_steps: self.max_prefetch_steps,
        }
    }

    /// Delay between connection attempts
    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }
}

/// Load configuration from file or environment
///
/// Tries the file named by `VALUESET_CACHE_CONFIG`, then
/// `./valueset-cache.toml`, then falls back to defaults.
pub fn load_config() -> CacheConfig {
    load_layered(CONFIG_ENV, DEFAULT_CONFIG_FILE, |path| {
        CacheConfig::from_file(path)
    })
}

/// Load `T` from the file named by `env_var`, then from `default_file`,
/// then fall back to `T::default()`
///
/// Unreadable or invalid files are logged and skipped.
pub fn load_layered<T, F>(env_var: &str, default_file: impl AsRef<Path>, load: F) -> T
where
    T: Default,
    F: Fn(&Path) -> Result<T>,
{
    if let Ok(path) = std::env::var(env_var) {
        match load(Path::new(&path)) {
            Ok(config) => {
                info!(path = %path, "Loaded configuration from file");
                return config;
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to load config file, using defaults");
            }
        }
    }

    let default_file = default_file.as_ref();
    if default_file.exists() {
        match load(default_file) {
            Ok(config) => {
                info!(path = %default_file.display(), "Loaded configuration from file");
                return config;
            }
            Err(e) => {
                warn!(
                    path = %default_file.display(),
                    error = %e,
                    "Failed to load config file, using defaults"
                );
            }
        }
    }

    info!("Using default configuration");
    T::default()
}

/// Read a TOML file into any deserializable settings type
pub fn read_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| Error::Configuration(e.to_string()))
}
