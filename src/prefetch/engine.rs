//! Prefetch engine: speculative requests ahead of the consumer

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::monitor::PrefetchMonitor;
use crate::entry::ValueSetRequestEntry;
use crate::error::Result;
use crate::registry::ServiceRegistry;
use crate::stats::{self, Statistics};
use crate::store::DataSpace;
use crate::types::OutputLink;

/// Prefetch policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// Issue speculative requests at all
    pub enabled: bool,
    /// Upper bound on extrapolation steps in one pass
    pub max_steps: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_steps: 4096,
        }
    }
}

/// What one prefetch pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    /// Requests enqueued
    pub requested: usize,
    /// Times found already present in the store
    pub discovered: usize,
    /// The request queue refused an offer and the pass stopped
    pub saturated: bool,
}

/// Issues non-blocking requests for the times a link is expected to ask
/// for next, up to the monitor's time limit
pub struct PrefetchEngine {
    config: PrefetchConfig,
    data: DataSpace,
    registry: Arc<ServiceRegistry>,
    scenario_id: String,
    stats: Arc<Statistics>,
}

impl PrefetchEngine {
    /// Create a new engine
    pub fn new(
        config: PrefetchConfig,
        data: DataSpace,
        registry: Arc<ServiceRegistry>,
        scenario_id: impl Into<String>,
        stats: Arc<Statistics>,
    ) -> Self {
        Self {
            config,
            data,
            registry,
            scenario_id: scenario_id.into(),
            stats,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    /// Run one prefetch pass for `link` after a real fetch
    ///
    /// Never waits on the request queue: a refused offer ends the pass.
    pub async fn update(
        &self,
        link: &OutputLink,
        monitor: &mut PrefetchMonitor,
    ) -> Result<PrefetchReport> {
        let mut report = PrefetchReport::default();
        if !self.config.enabled {
            return Ok(report);
        }

        let tracker = monitor.tracker(link)?;
        // zero cadence never advances, so there is nothing ahead to request
        if !tracker.is_seen() || tracker.delta() == 0.0 {
            return Ok(report);
        }
        tracing::debug!(link = %link.id, step = tracker.delta(), "Prefetch:StepLengthEst");

        let limit = monitor.time_limit();
        let horizon = monitor.time_horizon();
        let mut time = tracker.latest_fetch_time();

        for _ in 0..self.config.max_steps {
            let next = monitor.next_est_time_req(link, time)?;
            if next > limit {
                break;
            }
            time = next;

            if monitor.time_is_fetched(link, time)? {
                continue;
            }

            tracing::trace!(
                link = %link.id,
                progress_pct = horizon.progress_percent(time),
                "Prefetch progress"
            );

            let address = self.registry.address(link, time, &self.scenario_id)?;
            let key = address.key();

            if self.data.value_sets.contains_key(key.as_str()).await? {
                monitor.add_fetched_time(link, time)?;
                report.discovered += 1;
                continue;
            }

            let request = ValueSetRequestEntry::new(address);
            if self.data.requests.offer(&request).await? {
                self.stats.increment(stats::PREFETCH_REQUEST_COUNT);
                monitor.add_fetched_time(link, time)?;
                report.requested += 1;
                tracing::debug!(key = %key, "Prefetch:Requested");
            } else {
                self.stats.increment(stats::PREFETCH_REQUEST_OFFER_FAIL);
                report.saturated = true;
                tracing::debug!(key = %key, "Prefetch:RequestOfferFailed");
                break;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{ServiceDescriptorEntry, ValueSetEntry};
    use crate::types::{ElementSet, SimTime, TimeHorizon};
    use std::time::Duration;

    const HOUR: f64 = 1.0 / 24.0;
    const START: f64 = 51544.0;

    struct Fixture {
        link: OutputLink,
        monitor: PrefetchMonitor,
        data: DataSpace,
        stats: Arc<Statistics>,
        engine: PrefetchEngine,
    }

    fn fixture(config: PrefetchConfig, queue_capacity: usize) -> Fixture {
        let link = OutputLink::new("l1", "head", ElementSet::new("wells", vec![]));
        let monitor = PrefetchMonitor::new(
            TimeHorizon::new(SimTime(START), SimTime(START + 1.0)),
            [&link],
        );
        let data = DataSpace::in_memory(queue_capacity, 4);
        let registry = Arc::new(ServiceRegistry::new(vec![ServiceDescriptorEntry::new(
            "ws",
            vec!["head".to_string()],
        )]));
        let stats = Arc::new(Statistics::new("m", "r"));
        let engine = PrefetchEngine::new(config, data.clone(), registry, "S000000", stats.clone());
        Fixture {
            link,
            monitor,
            data,
            stats,
            engine,
        }
    }

    /// Two real requests one hour apart, both fetched
    fn observe_cadence(f: &mut Fixture) {
        for t in [START, START + HOUR] {
            f.monitor.update_last_requested_time(&f.link, SimTime(t)).unwrap();
            f.monitor.add_fetched_time(&f.link, SimTime(t)).unwrap();
        }
    }

    async fn drain(data: &DataSpace) -> Vec<String> {
        let mut stamps = Vec::new();
        while let Some(r) = data.requests.poll(Duration::from_millis(1)).await.unwrap() {
            stamps.push(r.address.timestamp);
        }
        stamps
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let mut f = fixture(
            PrefetchConfig {
                enabled: false,
                ..Default::default()
            },
            8,
        );
        observe_cadence(&mut f);
        let report = f.engine.update(&f.link, &mut f.monitor).await.unwrap();
        assert_eq!(report, PrefetchReport::default());
        assert_eq!(f.data.requests.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unseen_link_is_noop() {
        let mut f = fixture(PrefetchConfig::default(), 8);
        let report = f.engine.update(&f.link, &mut f.monitor).await.unwrap();
        assert_eq!(report.requested, 0);
    }

    #[tokio::test]
    async fn test_single_observation_is_noop() {
        let mut f = fixture(PrefetchConfig::default(), 8);
        f.monitor
            .update_last_requested_time(&f.link, SimTime(START))
            .unwrap();
        f.monitor.add_fetched_time(&f.link, SimTime(START)).unwrap();
        let report = f.engine.update(&f.link, &mut f.monitor).await.unwrap();
        assert_eq!(report.requested, 0);
    }

    #[tokio::test]
    async fn test_repeated_request_time_is_noop() {
        let mut f = fixture(PrefetchConfig::default(), 8);
        // a slower second link keeps the time limit ahead of l1
        let slow = OutputLink::new("l2", "head", ElementSet::new("wells", vec![]));
        f.monitor = PrefetchMonitor::new(
            TimeHorizon::new(SimTime(START), SimTime(START + 1.0)),
            [&f.link, &slow],
        );
        for t in [START, START + 2.0 * HOUR] {
            f.monitor.update_last_requested_time(&slow, SimTime(t)).unwrap();
            f.monitor.add_fetched_time(&slow, SimTime(t)).unwrap();
        }
        for _ in 0..2 {
            f.monitor
                .update_last_requested_time(&f.link, SimTime(START))
                .unwrap();
        }
        f.monitor.add_fetched_time(&f.link, SimTime(START)).unwrap();
        assert_eq!(f.monitor.tracker(&f.link).unwrap().delta(), 0.0);

        let report = f.engine.update(&f.link, &mut f.monitor).await.unwrap();
        assert_eq!(report, PrefetchReport::default());
        assert_eq!(f.data.requests.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_requests_up_to_time_limit() {
        let mut f = fixture(PrefetchConfig::default(), 8);
        observe_cadence(&mut f);

        // latest fetch START+1h, limit START+2h: one step ahead
        let report = f.engine.update(&f.link, &mut f.monitor).await.unwrap();
        assert_eq!(report.requested, 1);
        assert!(!report.saturated);
        assert!(f
            .monitor
            .time_is_fetched(&f.link, SimTime(START + 2.0 * HOUR))
            .unwrap());
        assert_eq!(drain(&f.data).await, vec!["2000-01-01T02:00:00".to_string()]);
        assert_eq!(f.stats.count(stats::PREFETCH_REQUEST_COUNT), 1);
    }

    #[tokio::test]
    async fn test_existing_value_marked_without_request() {
        let mut f = fixture(PrefetchConfig::default(), 8);
        observe_cadence(&mut f);

        let t = SimTime(START + 2.0 * HOUR);
        let address = f
            .engine
            .registry
            .address(&f.link, t, "S000000")
            .unwrap();
        let entry = ValueSetEntry::from_values(address, false, &[1.0]).unwrap();
        f.data
            .value_sets
            .put(entry.key().as_str(), &entry)
            .await
            .unwrap();

        let report = f.engine.update(&f.link, &mut f.monitor).await.unwrap();
        assert_eq!(report.discovered, 1);
        assert_eq!(report.requested, 0);
        assert!(f.monitor.time_is_fetched(&f.link, t).unwrap());
        assert_eq!(f.data.requests.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_saturated_queue_stops_pass() {
        let mut f = fixture(PrefetchConfig::default(), 1);
        observe_cadence(&mut f);
        // occupy the only slot
        let filler = ValueSetRequestEntry::new(
            f.engine
                .registry
                .address(&f.link, SimTime(START), "S000000")
                .unwrap(),
        );
        f.data.requests.put(&filler).await.unwrap();

        let report = f.engine.update(&f.link, &mut f.monitor).await.unwrap();
        assert!(report.saturated);
        assert_eq!(report.requested, 0);
        assert!(!f
            .monitor
            .time_is_fetched(&f.link, SimTime(START + 2.0 * HOUR))
            .unwrap());
        assert_eq!(f.stats.count(stats::PREFETCH_REQUEST_OFFER_FAIL), 1);
    }

    #[tokio::test]
    async fn test_negative_cadence_bounded_by_max_steps() {
        let mut f = fixture(
            PrefetchConfig {
                enabled: true,
                max_steps: 3,
            },
            16,
        );
        f.monitor
            .update_last_requested_time(&f.link, SimTime(START + 10.0 * HOUR))
            .unwrap();
        f.monitor
            .update_last_requested_time(&f.link, SimTime(START + 9.0 * HOUR))
            .unwrap();
        f.monitor
            .add_fetched_time(&f.link, SimTime(START + 10.0 * HOUR))
            .unwrap();

        let report = f.engine.update(&f.link, &mut f.monitor).await.unwrap();
        assert_eq!(report.requested, 3);
        assert_eq!(
            drain(&f.data).await,
            vec![
                "2000-01-01T09:00:00".to_string(),
                "2000-01-01T08:00:00".to_string(),
                "2000-01-01T07:00:00".to_string(),
            ]
        );
    }
}
