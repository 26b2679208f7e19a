//! Cache manager: the blocking read path for value sets

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::retry::RetryPolicy;
use crate::entry::{ElementSetEntry, ValueSetEntry, ValueSetRequestEntry};
use crate::error::{Error, Result};
use crate::prefetch::PrefetchMonitor;
use crate::registry::ServiceRegistry;
use crate::stats::{self, Statistics};
use crate::store::DataSpace;
use crate::types::{ElementSet, OutputLink, ScalarSet, SimTime, ValueSetKey};

/// Looks value sets up in the shared store, requesting and waiting for
/// them on a miss
pub struct CacheManager {
    data: DataSpace,
    registry: Arc<ServiceRegistry>,
    scenario_id: String,
    policy: RetryPolicy,
    stats: Arc<Statistics>,
    published_element_sets: Mutex<HashSet<String>>,
}

impl CacheManager {
    /// Create a new cache manager
    pub fn new(
        data: DataSpace,
        registry: Arc<ServiceRegistry>,
        scenario_id: impl Into<String>,
        policy: RetryPolicy,
        stats: Arc<Statistics>,
    ) -> Self {
        Self {
            data,
            registry,
            scenario_id: scenario_id.into(),
            policy,
            stats,
            published_element_sets: Mutex::new(HashSet::new()),
        }
    }

    /// Retry policy in effect
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Values of `link` at `time`
    ///
    /// On a miss the element set is published, a request is enqueued unless
    /// `prefetch` already recorded one for `time`, and the store is polled
    /// until the value set shows up. Failures are logged and returned.
    pub async fn get_values(
        &self,
        time: SimTime,
        link: &OutputLink,
        prefetch: &PrefetchMonitor,
    ) -> Result<ScalarSet> {
        match self.fetch(time, link, prefetch).await {
            Ok(values) => Ok(values),
            Err(e) => {
                tracing::error!(
                    link = %link.id,
                    time = time.mjd(),
                    error = %e,
                    "GetValues failed"
                );
                Err(e)
            }
        }
    }

    async fn fetch(
        &self,
        time: SimTime,
        link: &OutputLink,
        prefetch: &PrefetchMonitor,
    ) -> Result<ScalarSet> {
        let started = Instant::now();
        self.stats.increment(stats::GET_VALUES_COUNT);

        let address = self.registry.address(link, time, &self.scenario_id)?;
        let key = address.key();
        tracing::debug!(key = %key, "GetValues");

        let entry = match self.data.value_sets.get(key.as_str()).await? {
            Some(entry) => entry,
            None => {
                self.publish_element_set(&link.element_set).await?;
                let request = ValueSetRequestEntry::new(address);
                self.wait_for_value_set(&request, &key, time, link, prefetch, started)
                    .await?
            }
        };
        self.stats
            .record_duration(stats::CACHE_WAIT_TIME_MS, started.elapsed());

        Ok(ScalarSet::new(entry.values()?))
    }

    async fn wait_for_value_set(
        &self,
        request: &ValueSetRequestEntry,
        key: &ValueSetKey,
        time: SimTime,
        link: &OutputLink,
        prefetch: &PrefetchMonitor,
        started: Instant,
    ) -> Result<ValueSetEntry> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if !self.policy.allows_attempt(attempt) {
                return Err(self.timeout(key, started));
            }

            if !prefetch.time_is_fetched(link, time)? {
                let insert_started = Instant::now();
                self.data.requests.put(request).await?;
                self.stats
                    .record_duration(stats::REQUEST_INSERT_TIME_MS, insert_started.elapsed());
                tracing::debug!(key = %key, attempt, "Requesting value set");
            }

            let mut polled = Duration::ZERO;
            while !self.policy.ceiling_reached(polled) {
                tokio::time::sleep(self.policy.poll_interval).await;
                polled += self.policy.poll_interval;

                if let Some(entry) = self.data.value_sets.get(key.as_str()).await? {
                    return Ok(entry);
                }
                if self.policy.deadline_exceeded(started.elapsed()) {
                    return Err(self.timeout(key, started));
                }
                tracing::trace!(
                    key = %key,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Waiting for value set"
                );
            }

            self.stats.increment(stats::REQUEST_RETRY);
            tracing::warn!(
                key = %key,
                polled_secs = polled.as_secs_f64(),
                "Value set not published within poll ceiling, retrying"
            );
        }
    }

    fn timeout(&self, key: &ValueSetKey, started: Instant) -> Error {
        Error::Timeout {
            key: key.to_string(),
            waited: started.elapsed(),
        }
    }

    /// Publish element-set metadata once per process lifetime
    ///
    /// The id is marked before the write, so a failed write is not retried.
    /// Returns `true` when this call published.
    pub async fn publish_element_set(&self, element_set: &ElementSet) -> Result<bool> {
        {
            let mut published = self.published_element_sets.lock();
            if !published.insert(element_set.id.clone()) {
                return Ok(false);
            }
        }

        self.data
            .element_sets
            .put(&element_set.id, &ElementSetEntry::from(element_set))
            .await?;
        tracing::debug!(element_set = %element_set.id, "Published element set");
        Ok(true)
    }

    /// Check whether `element_set_id` was published by this process
    pub fn is_element_set_published(&self, element_set_id: &str) -> bool {
        self.published_element_sets.lock().contains(element_set_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ServiceDescriptorEntry;
    use crate::types::TimeHorizon;
    use bytes::Bytes;

    const T0: f64 = 51544.0;

    struct Fixture {
        link: OutputLink,
        monitor: PrefetchMonitor,
        data: DataSpace,
        stats: Arc<Statistics>,
        registry: Arc<ServiceRegistry>,
    }

    fn fixture() -> Fixture {
        let link = OutputLink::new(
            "l1",
            "head",
            ElementSet::new("wells", vec!["w1".to_string(), "w2".to_string()]),
        );
        let monitor = PrefetchMonitor::new(TimeHorizon::new(SimTime(T0), SimTime(T0 + 1.0)), [&link]);
        Fixture {
            link,
            monitor,
            data: DataSpace::in_memory(4, 4),
            stats: Arc::new(Statistics::new("m", "r")),
            registry: Arc::new(ServiceRegistry::new(vec![ServiceDescriptorEntry::new(
                "ws",
                vec!["head".to_string()],
            )])),
        }
    }

    fn manager(f: &Fixture, policy: RetryPolicy) -> CacheManager {
        CacheManager::new(
            f.data.clone(),
            f.registry.clone(),
            "S000000",
            policy,
            f.stats.clone(),
        )
    }

    fn entry(f: &Fixture, time: SimTime, values: &[f64]) -> ValueSetEntry {
        let address = f.registry.address(&f.link, time, "S000000").unwrap();
        ValueSetEntry::from_values(address, false, values).unwrap()
    }

    /// Answer the next request after `delay`
    fn spawn_fulfiller(data: DataSpace, delay: Duration, values: Vec<f64>) {
        tokio::spawn(async move {
            let request = data
                .requests
                .poll(Duration::from_secs(3600))
                .await
                .unwrap()
                .unwrap();
            tokio::time::sleep(delay).await;
            let entry = ValueSetEntry::from_values(request.address, false, &values).unwrap();
            data.value_sets.put(entry.key().as_str(), &entry).await.unwrap();
        });
    }

    #[tokio::test]
    async fn test_hit_returns_without_request() {
        let f = fixture();
        let cached = entry(&f, SimTime(T0), &[1.0, 2.0]);
        f.data
            .value_sets
            .put(cached.key().as_str(), &cached)
            .await
            .unwrap();

        let cache = manager(&f, RetryPolicy::default());
        let values = cache
            .get_values(SimTime(T0), &f.link, &f.monitor)
            .await
            .unwrap();

        assert_eq!(values.values, vec![1.0, 2.0]);
        assert_eq!(f.data.requests.len().await.unwrap(), 0);
        assert!(!cache.is_element_set_published("wells"));
        assert_eq!(f.stats.count(stats::GET_VALUES_COUNT), 1);
        assert_eq!(f.stats.count(stats::CACHE_WAIT_TIME_MS), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_waits_for_fulfiller() {
        let f = fixture();
        let cache = manager(&f, RetryPolicy::default());
        spawn_fulfiller(f.data.clone(), Duration::from_millis(2500), vec![7.0]);

        let started = Instant::now();
        let values = cache
            .get_values(SimTime(T0), &f.link, &f.monitor)
            .await
            .unwrap();

        assert_eq!(values.values, vec![7.0]);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(f.stats.count(stats::REQUEST_INSERT_TIME_MS), 1);
        let wait = f.stats.get(stats::CACHE_WAIT_TIME_MS).unwrap();
        assert_eq!(wait.count, 1);
        assert!(wait.last >= 2500.0);
        assert_eq!(f.stats.count(stats::REQUEST_RETRY), 0);

        let published = f.data.element_sets.get("wells").await.unwrap().unwrap();
        assert_eq!(published.element_ids, vec!["w1".to_string(), "w2".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_triggers_new_request() {
        let f = fixture();
        let policy = RetryPolicy::default().with_poll_ceiling(Duration::from_secs(5));
        let cache = manager(&f, policy);

        let data = f.data.clone();
        let answer = entry(&f, SimTime(T0), &[3.0]);
        tokio::spawn(async move {
            // ignore the first request, answer after the second
            data.requests.poll(Duration::from_secs(60)).await.unwrap().unwrap();
            data.requests.poll(Duration::from_secs(60)).await.unwrap().unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            data.value_sets.put(answer.key().as_str(), &answer).await.unwrap();
        });

        let values = cache
            .get_values(SimTime(T0), &f.link, &f.monitor)
            .await
            .unwrap();
        assert_eq!(values.values, vec![3.0]);
        assert_eq!(f.stats.count(stats::REQUEST_RETRY), 1);
        assert_eq!(f.stats.count(stats::REQUEST_INSERT_TIME_MS), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetched_time_is_not_requested_again() {
        let mut f = fixture();
        f.monitor.add_fetched_time(&f.link, SimTime(T0)).unwrap();
        let cache = manager(&f, RetryPolicy::default());

        let data = f.data.clone();
        let answer = entry(&f, SimTime(T0), &[4.0]);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            data.value_sets.put(answer.key().as_str(), &answer).await.unwrap();
        });

        cache
            .get_values(SimTime(T0), &f.link, &f.monitor)
            .await
            .unwrap();
        assert_eq!(f.data.requests.len().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_attempts_time_out() {
        let f = fixture();
        let policy = RetryPolicy::default()
            .with_poll_ceiling(Duration::from_secs(2))
            .with_max_attempts(2);
        let cache = manager(&f, policy);

        let result = cache.get_values(SimTime(T0), &f.link, &f.monitor).await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(f.data.requests.len().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_times_out() {
        let f = fixture();
        let policy = RetryPolicy::default().with_deadline(Duration::from_secs(3));
        let cache = manager(&f, policy);

        let result = cache.get_values(SimTime(T0), &f.link, &f.monitor).await;
        match result {
            Err(Error::Timeout { waited, .. }) => assert!(waited >= Duration::from_secs(3)),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_element_set_published_once() {
        let f = fixture();
        let cache = manager(&f, RetryPolicy::default());
        assert!(cache.publish_element_set(&f.link.element_set).await.unwrap());
        assert!(!cache.publish_element_set(&f.link.element_set).await.unwrap());
        assert!(cache.is_element_set_published("wells"));
        assert_eq!(f.data.element_sets.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unroutable_quantity_fails() {
        let f = fixture();
        let cache = manager(&f, RetryPolicy::default());
        let link = OutputLink::new("l1", "salinity", ElementSet::new("wells", vec![]));
        let result = cache.get_values(SimTime(T0), &link, &f.monitor).await;
        assert!(matches!(result, Err(Error::UnroutableQuantity(_))));
    }

    #[tokio::test]
    async fn test_corrupt_payload_fails() {
        let f = fixture();
        let address = f.registry.address(&f.link, SimTime(T0), "S000000").unwrap();
        let bad = ValueSetEntry::new(address, false, Bytes::from_static(&[1, 2, 3]));
        f.data.value_sets.put(bad.key().as_str(), &bad).await.unwrap();

        let cache = manager(&f, RetryPolicy::default());
        let result = cache.get_values(SimTime(T0), &f.link, &f.monitor).await;
        assert!(matches!(result, Err(Error::Codec(_))));
    }
}
