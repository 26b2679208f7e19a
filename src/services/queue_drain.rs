//! Queue Drain Service
//!
//! Moves produced value sets from the write-behind queue into the value-set
//! map, keyed by their address, so waiting consumers can find them.
//!
//! Shutdown can interrupt a queue poll but never a map write, so the
//! queue's `poll` must be cancel-safe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::framework::{RestartPolicy, Service, ServiceError, ServiceStatus};
use crate::entry::ValueSetEntry;
use crate::store::DataSpace;

/// Configuration for the drain service
#[derive(Debug, Clone)]
pub struct QueueDrainConfig {
    /// How long one poll of the queue blocks
    pub poll_timeout: Duration,
}

impl Default for QueueDrainConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(500),
        }
    }
}

/// Drains the `valueSet` queue into the `valueSet` map
pub struct QueueDrainService {
    config: QueueDrainConfig,
    data: DataSpace,
    status: RwLock<ServiceStatus>,
    drained: AtomicU64,
}

impl QueueDrainService {
    /// Create a drain service over `data`
    pub fn new(config: QueueDrainConfig, data: DataSpace) -> Self {
        Self {
            config,
            data,
            status: RwLock::new(ServiceStatus::Stopped),
            drained: AtomicU64::new(0),
        }
    }

    /// Value sets moved so far
    pub fn drained(&self) -> u64 {
        self.drained.load(Ordering::Relaxed)
    }

    /// Move at most one entry; returns whether one was moved
    pub async fn drain_once(&self) -> Result<bool, ServiceError> {
        match self.next_entry().await? {
            Some(entry) => {
                self.store(entry).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn next_entry(&self) -> Result<Option<ValueSetEntry>, ServiceError> {
        Ok(self.data.value_queue.poll(self.config.poll_timeout).await?)
    }

    async fn store(&self, entry: ValueSetEntry) -> Result<(), ServiceError> {
        let key = entry.key();
        self.data.value_sets.put(key.as_str(), &entry).await?;
        self.drained.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "Drained value set");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Service for QueueDrainService {
    async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
        *self.status.write() = ServiceStatus::Running;
        tracing::debug!("Queue drain started");

        loop {
            // only the poll races shutdown; a dequeued entry is always stored
            let polled = tokio::select! {
                result = shutdown.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!("Queue drain received shutdown signal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!(missed = n, "Queue drain broadcast receiver lagged");
                            continue;
                        }
                    }
                }

                result = self.next_entry() => result,
            };

            let result = match polled {
                Ok(Some(entry)) => self.store(entry).await,
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                *self.status.write() = ServiceStatus::Failed(e.to_string());
                return Err(e);
            }
        }

        *self.status.write() = ServiceStatus::Stopped;
        tracing::debug!(drained = self.drained(), "Queue drain stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "queue_drain"
    }

    fn status(&self) -> ServiceStatus {
        self.status.read().clone()
    }

    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::OnFailure {
            max_retries: 5,
            backoff: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{MemoryMap, MemoryQueue, SharedMap};
    use crate::types::ValueSetAddress;
    use bytes::Bytes;
    use std::sync::Arc;

    fn entry(timestamp: &str) -> ValueSetEntry {
        let address = ValueSetAddress {
            service_id: "ws".to_string(),
            quantity_id: "head".to_string(),
            element_set_id: "wells".to_string(),
            timestamp: timestamp.to_string(),
            scenario_id: "S000000".to_string(),
        };
        ValueSetEntry::from_values(address, true, &[1.5]).unwrap()
    }

    #[tokio::test]
    async fn test_drain_once_moves_entry() {
        let data = DataSpace::in_memory(4, 4);
        let service = QueueDrainService::new(QueueDrainConfig::default(), data.clone());
        let queued = entry("2000-01-01T00:00:00");
        data.value_queue.put(&queued).await.unwrap();

        assert!(service.drain_once().await.unwrap());
        let stored = data
            .value_sets
            .get(queued.key().as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.values().unwrap(), vec![1.5]);
        assert_eq!(service.drained(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_once_empty_queue() {
        let data = DataSpace::in_memory(4, 4);
        let service = QueueDrainService::new(QueueDrainConfig::default(), data);
        assert!(!service.drain_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_service_lifecycle() {
        let data = DataSpace::in_memory(4, 4);
        let service = Arc::new(QueueDrainService::new(
            QueueDrainConfig {
                poll_timeout: Duration::from_millis(10),
            },
            data.clone(),
        ));
        assert_eq!(service.status(), ServiceStatus::Stopped);

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn({
            let s = service.clone();
            async move { s.start(rx).await }
        });

        data.value_queue.put(&entry("2000-01-01T00:00:00")).await.unwrap();
        data.value_queue.put(&entry("2000-01-01T01:00:00")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        tx.send(()).unwrap();
        assert!(handle.await.unwrap().is_ok());
        assert_eq!(data.value_sets.len().await.unwrap(), 2);
        assert_eq!(service.status(), ServiceStatus::Stopped);
    }

    /// Value-set map whose writes take a second to land
    struct SlowMap(MemoryMap);

    #[async_trait::async_trait]
    impl SharedMap for SlowMap {
        fn name(&self) -> &str {
            self.0.name()
        }

        async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
            self.0.get(key).await
        }

        async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.0.put(key, value).await
        }

        async fn contains_key(&self, key: &str) -> Result<bool, StoreError> {
            self.0.contains_key(key).await
        }

        async fn remove(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
            self.0.remove(key).await
        }

        async fn len(&self) -> Result<usize, StoreError> {
            self.0.len().await
        }

        async fn keys(&self) -> Result<Vec<String>, StoreError> {
            self.0.keys().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_write_keeps_entry() {
        let data = DataSpace::from_parts(
            Arc::new(SlowMap(MemoryMap::new("valueSet"))),
            Arc::new(MemoryMap::new("elementSet")),
            Arc::new(MemoryMap::new("webService")),
            Arc::new(MemoryMap::new("client")),
            Arc::new(MemoryQueue::new("valueSetRequest", 4)),
            Arc::new(MemoryQueue::new("valueSet", 4)),
        );
        let service = Arc::new(QueueDrainService::new(
            QueueDrainConfig {
                poll_timeout: Duration::from_millis(10),
            },
            data.clone(),
        ));

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn({
            let s = service.clone();
            async move { s.start(rx).await }
        });

        let queued = entry("2000-01-01T00:00:00");
        data.value_queue.put(&queued).await.unwrap();
        // entry dequeued, map write still pending
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(data.value_queue.len().await.unwrap(), 0);

        tx.send(()).unwrap();
        assert!(handle.await.unwrap().is_ok());
        assert!(data
            .value_sets
            .contains_key(queued.key().as_str())
            .await
            .unwrap());
        assert_eq!(service.drained(), 1);
    }
}
