//! Builder for a per-process coordinator

use std::collections::HashMap;
use std::sync::Arc;

use super::Coordinator;
use crate::cache::CacheManager;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::prefetch::{PrefetchEngine, PrefetchMonitor};
use crate::registry::ServiceRegistry;
use crate::stats::Statistics;
use crate::store::{connect_with_retry, Connector, DataSpace};

/// Builder for configuring a [`Coordinator`]
pub struct CoordinatorBuilder {
    config: CacheConfig,
    data: Option<DataSpace>,
    statistics: Option<Arc<Statistics>>,
}

impl CoordinatorBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            data: None,
            statistics: None,
        }
    }

    /// Set process configuration
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an already connected data space
    pub fn with_data_space(mut self, data: DataSpace) -> Self {
        self.data = Some(data);
        self
    }

    /// Share a statistics collection with other components
    pub fn with_statistics(mut self, statistics: Arc<Statistics>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Connect through `connector` using the configured retry settings,
    /// then build
    pub async fn connect<C: Connector + ?Sized>(self, connector: &C) -> Result<Coordinator> {
        let data = connect_with_retry(
            connector,
            self.config.connect_retry(),
            self.config.max_connect_attempts,
        )
        .await?;
        self.with_data_space(data).build()
    }

    /// Build the coordinator
    pub fn build(self) -> Result<Coordinator> {
        self.config.validate()?;

        let data = self
            .data
            .ok_or_else(|| Error::Configuration("No data space configured".to_string()))?;

        let stats = self.statistics.unwrap_or_else(|| {
            Arc::new(Statistics::new(
                self.config.component_id.clone(),
                self.config.run_id.clone(),
            ))
        });

        let registry = Arc::new(ServiceRegistry::new(self.config.services.clone()));
        let monitor = PrefetchMonitor::new(self.config.time_horizon, &self.config.links);

        let cache = CacheManager::new(
            data.clone(),
            registry.clone(),
            self.config.scenario_id.clone(),
            self.config.retry_policy(),
            stats.clone(),
        );
        let prefetch = PrefetchEngine::new(
            self.config.prefetch_config(),
            data.clone(),
            registry.clone(),
            self.config.scenario_id.clone(),
            stats.clone(),
        );

        let links: HashMap<String, _> = self
            .config
            .links
            .iter()
            .map(|link| (link.id.clone(), link.clone()))
            .collect();

        Ok(Coordinator {
            config: self.config,
            data,
            registry,
            links,
            monitor,
            cache,
            prefetch,
            stats,
            started: None,
        })
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
