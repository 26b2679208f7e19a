//! Per-process coordinator
//!
//! Owns everything one model process needs to consume and produce value
//! sets through the shared data space:
//!
//! ```text
//!               get_values(link, t)
//!                      │
//!   ┌──────────────────▼───────────────────┐
//!   │ Coordinator                          │
//!   │  1. monitor.update_last_requested    │
//!   │  2. cache.get_values ─────────────────┼──▶ valueSet map / request queue
//!   │  3. monitor.add_fetched_time         │
//!   │  4. prefetch.update ──────────────────┼──▶ request queue (offer)
//!   └──────────────────────────────────────┘
//!
//!   publish_values(link, t, values) ──▶ elementSet map (once) + valueSet queue
//! ```
//!
//! Build one with [`CoordinatorBuilder`], call [`Coordinator::start`] before
//! use and [`Coordinator::finish`] at the end of the run.

mod builder;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;

pub use builder::CoordinatorBuilder;

use crate::cache::CacheManager;
use crate::config::CacheConfig;
use crate::entry::ValueSetEntry;
use crate::error::{Error, Result};
use crate::prefetch::{PrefetchEngine, PrefetchMonitor, PrefetchReport};
use crate::registry::ServiceRegistry;
use crate::stats::{self, Statistics};
use crate::store::{DataSpace, CLIENT_ACTIVE};
use crate::types::{ElementSet, OutputLink, ScalarSet, SimTime, ValueSetKey};

/// Cache, prefetch and publish state of one process
pub struct Coordinator {
    config: CacheConfig,
    data: DataSpace,
    registry: Arc<ServiceRegistry>,
    links: HashMap<String, OutputLink>,
    monitor: PrefetchMonitor,
    cache: CacheManager,
    prefetch: PrefetchEngine,
    stats: Arc<Statistics>,
    started: Option<Instant>,
}

fn lookup<'a>(links: &'a HashMap<String, OutputLink>, link_id: &str) -> Result<&'a OutputLink> {
    links
        .get(link_id)
        .ok_or_else(|| Error::UnknownLink(link_id.to_string()))
}

impl Coordinator {
    /// Start building a coordinator
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Process configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Shared structures in use
    pub fn data_space(&self) -> &DataSpace {
        &self.data
    }

    /// Service routing
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Cadence state of every link
    pub fn monitor(&self) -> &PrefetchMonitor {
        &self.monitor
    }

    /// Run statistics
    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.stats
    }

    /// Configured link by id
    pub fn link(&self, link_id: &str) -> Result<&OutputLink> {
        lookup(&self.links, link_id)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Register this client and publish the service descriptors
    pub async fn start(&mut self) -> Result<()> {
        self.data
            .clients
            .put(&self.config.client_id, &CLIENT_ACTIVE.to_string())
            .await?;
        self.registry.publish(&self.data.services).await?;
        self.started = Some(Instant::now());

        tracing::info!(
            client_id = %self.config.client_id,
            scenario_id = %self.config.scenario_id,
            links = self.links.len(),
            prefetching = self.config.enable_prefetching,
            "Coordinator started"
        );
        Ok(())
    }

    /// Record run time, deregister and return the CSV statistics report
    pub async fn finish(&mut self) -> Result<String> {
        if let Some(started) = self.started.take() {
            self.stats.record_duration(stats::RUNTIME_MS, started.elapsed());
        }
        self.data.clients.remove(&self.config.client_id).await?;

        tracing::info!(client_id = %self.config.client_id, "Coordinator finished");
        tracing::debug!(summary = %self.monitor.summary(), "Final cadence state");
        Ok(self.stats.to_csv())
    }

    // ========================================================================
    // Consumer Path
    // ========================================================================

    /// Values of `link_id` at `time`
    ///
    /// Records the request cadence, waits for the value set, marks the time
    /// fetched and runs a prefetch pass.
    pub async fn get_values(&mut self, link_id: &str, time: SimTime) -> Result<ScalarSet> {
        let link = lookup(&self.links, link_id)?;

        self.monitor.update_last_requested_time(link, time)?;
        let values = self.cache.get_values(time, link, &self.monitor).await?;
        self.monitor.add_fetched_time(link, time)?;

        match self.prefetch.update(link, &mut self.monitor).await {
            Ok(report) if report.requested > 0 || report.saturated => {
                tracing::debug!(
                    link = %link.id,
                    requested = report.requested,
                    discovered = report.discovered,
                    saturated = report.saturated,
                    "Prefetch pass"
                );
            }
            Ok(_) => {}
            // speculative requests never fail a completed read
            Err(e) => {
                tracing::warn!(link = %link.id, error = %e, "Prefetch pass failed");
            }
        }
        Ok(values)
    }

    /// Run a prefetch pass for `link_id` without fetching
    pub async fn prefetch_update(&mut self, link_id: &str) -> Result<PrefetchReport> {
        let link = lookup(&self.links, link_id)?;
        self.prefetch.update(link, &mut self.monitor).await
    }

    /// Record a real request on `link_id`
    pub fn update_last_requested_time(&mut self, link_id: &str, time: SimTime) -> Result<()> {
        let link = lookup(&self.links, link_id)?;
        self.monitor.update_last_requested_time(link, time)
    }

    /// Mark `time` as fetched for `link_id`
    pub fn add_fetched_time(&mut self, link_id: &str, time: SimTime) -> Result<()> {
        let link = lookup(&self.links, link_id)?;
        self.monitor.add_fetched_time(link, time)
    }

    /// Check whether `time` is fetched or requested for `link_id`
    pub fn time_is_fetched(&self, link_id: &str, time: SimTime) -> Result<bool> {
        let link = lookup(&self.links, link_id)?;
        self.monitor.time_is_fetched(link, time)
    }

    // ========================================================================
    // Producer Path
    // ========================================================================

    /// Publish a produced value set through the write-behind queue
    ///
    /// Publishes the element set first (once per process) and waits for
    /// queue capacity.
    pub async fn add_value_set_entry(
        &self,
        entry: &ValueSetEntry,
        element_set: &ElementSet,
    ) -> Result<()> {
        self.cache.publish_element_set(element_set).await?;

        let started = Instant::now();
        self.data.value_queue.put(entry).await?;
        self.stats
            .record_duration(stats::ENTRY_INSERT_TIME_MS, started.elapsed());
        tracing::debug!(key = %entry.key(), bytes = entry.data_len(), "Queued value set");
        Ok(())
    }

    /// Encode and publish `values` of `link_id` at `time`
    pub async fn publish_values(
        &self,
        link_id: &str,
        time: SimTime,
        values: &[f64],
    ) -> Result<ValueSetKey> {
        let link = lookup(&self.links, link_id)?;
        let address = self
            .registry
            .address(link, time, &self.config.scenario_id)?;
        let entry = ValueSetEntry::from_values(address, true, values)?;
        self.add_value_set_entry(&entry, &link.element_set).await?;
        Ok(entry.key())
    }
}
