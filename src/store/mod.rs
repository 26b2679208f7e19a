//! Shared Store Module
//!
//! Access layer for the distributed map and queues every process shares.
//! The backing store is an external collaborator; this module only fixes
//! the operations the cache relies on and binds them to named structures.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  blocking put / offer   ┌──────────────────┐   poll   ┌────────────┐
//! │ CacheManager │────────────────────────▶│ valueSetRequest  │─────────▶│ Fulfillers │
//! │ Prefetcher   │                         └──────────────────┘          └─────┬──────┘
//! └──────┬───────┘                                                             │ put
//!        │ get / contains                  ┌──────────────────┐   drain  ┌─────▼──────┐
//!        └────────────────────────────────▶│  valueSet (map)  │◀─────────│ valueSet   │
//!                                          └──────────────────┘          │  (queue)   │
//!                                                                        └────────────┘
//! ```
//!
//! Values cross the store encoded with the wire codec; [`TypedMap`] and
//! [`TypedQueue`] do the encoding so callers work with entries.

pub mod memory;

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::entry::{
    ElementSetEntry, ServiceDescriptorEntry, ValueSetEntry, ValueSetRequestEntry, WireEntry,
};
use crate::error::{Error, Result, StoreError};

pub use memory::{MemoryMap, MemoryQueue};

/// Map of published value sets
pub const VALUE_SET_MAP: &str = "valueSet";
/// Map of published element-set metadata
pub const ELEMENT_SET_MAP: &str = "elementSet";
/// Map of service descriptors
pub const SERVICE_MAP: &str = "webService";
/// Map of registered client processes
pub const CLIENT_MAP: &str = "client";
/// Queue of pending value-set requests
pub const REQUEST_QUEUE: &str = "valueSetRequest";
/// Write-behind queue of produced value sets
pub const VALUE_SET_QUEUE: &str = "valueSet";

/// Value stored against a registered client id
pub const CLIENT_ACTIVE: &str = "active";

// ============================================================================
// Store Traits
// ============================================================================

/// Key-value map shared between processes
///
/// `put` is an upsert. Implementations must tolerate concurrent mutation by
/// other processes.
#[async_trait]
pub trait SharedMap: Send + Sync {
    /// Structure name
    fn name(&self) -> &str;

    /// Fetch the value stored under `key`
    async fn get(&self, key: &str) -> std::result::Result<Option<Bytes>, StoreError>;

    /// Insert or replace the value under `key`
    async fn put(&self, key: &str, value: Bytes) -> std::result::Result<(), StoreError>;

    /// Check whether `key` is present
    async fn contains_key(&self, key: &str) -> std::result::Result<bool, StoreError>;

    /// Remove and return the value under `key`
    async fn remove(&self, key: &str) -> std::result::Result<Option<Bytes>, StoreError>;

    /// Number of entries
    async fn len(&self) -> std::result::Result<usize, StoreError>;

    /// All keys currently stored
    async fn keys(&self) -> std::result::Result<Vec<String>, StoreError>;
}

/// Bounded FIFO-ish queue shared between processes
#[async_trait]
pub trait SharedQueue: Send + Sync {
    /// Structure name
    fn name(&self) -> &str;

    /// Enqueue, waiting until the queue has room
    async fn put(&self, item: Bytes) -> std::result::Result<(), StoreError>;

    /// Enqueue without waiting; `false` when the queue is full
    async fn offer(&self, item: Bytes) -> std::result::Result<bool, StoreError>;

    /// Dequeue, waiting at most `timeout`
    async fn poll(&self, timeout: Duration) -> std::result::Result<Option<Bytes>, StoreError>;

    /// Number of queued items
    async fn len(&self) -> std::result::Result<usize, StoreError>;
}

// ============================================================================
// Typed Wrappers
// ============================================================================

/// Shared map holding encoded entries of one kind
pub struct TypedMap<E> {
    inner: Arc<dyn SharedMap>,
    _entry: PhantomData<fn() -> E>,
}

impl<E> Clone for TypedMap<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _entry: PhantomData,
        }
    }
}

impl<E: WireEntry> TypedMap<E> {
    /// Wrap a raw map
    pub fn new(inner: Arc<dyn SharedMap>) -> Self {
        Self {
            inner,
            _entry: PhantomData,
        }
    }

    /// Underlying raw map
    pub fn raw(&self) -> &Arc<dyn SharedMap> {
        &self.inner
    }

    /// Fetch and decode the entry under `key`
    pub async fn get(&self, key: &str) -> Result<Option<E>> {
        match self.inner.get(key).await? {
            Some(bytes) => Ok(Some(E::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and store `entry` under `key`
    pub async fn put(&self, key: &str, entry: &E) -> Result<()> {
        self.inner.put(key, entry.encode()?).await?;
        Ok(())
    }

    /// Check whether `key` is present
    pub async fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.inner.contains_key(key).await?)
    }

    /// Remove the entry under `key`
    pub async fn remove(&self, key: &str) -> Result<Option<E>> {
        match self.inner.remove(key).await? {
            Some(bytes) => Ok(Some(E::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of entries
    pub async fn len(&self) -> Result<usize> {
        Ok(self.inner.len().await?)
    }
}

/// Shared queue holding encoded entries of one kind
pub struct TypedQueue<E> {
    inner: Arc<dyn SharedQueue>,
    _entry: PhantomData<fn() -> E>,
}

impl<E> Clone for TypedQueue<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _entry: PhantomData,
        }
    }
}

impl<E: WireEntry> TypedQueue<E> {
    /// Wrap a raw queue
    pub fn new(inner: Arc<dyn SharedQueue>) -> Self {
        Self {
            inner,
            _entry: PhantomData,
        }
    }

    /// Underlying raw queue
    pub fn raw(&self) -> &Arc<dyn SharedQueue> {
        &self.inner
    }

    /// Enqueue, waiting for room
    pub async fn put(&self, entry: &E) -> Result<()> {
        self.inner.put(entry.encode()?).await?;
        Ok(())
    }

    /// Enqueue without waiting; `false` when full
    pub async fn offer(&self, entry: &E) -> Result<bool> {
        Ok(self.inner.offer(entry.encode()?).await?)
    }

    /// Dequeue and decode, waiting at most `timeout`
    pub async fn poll(&self, timeout: Duration) -> Result<Option<E>> {
        match self.inner.poll(timeout).await? {
            Some(bytes) => Ok(Some(E::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of queued entries
    pub async fn len(&self) -> Result<usize> {
        Ok(self.inner.len().await?)
    }
}

// ============================================================================
// Data Space
// ============================================================================

/// The named shared structures one deployment uses
#[derive(Clone)]
pub struct DataSpace {
    /// Published value sets by key
    pub value_sets: TypedMap<ValueSetEntry>,
    /// Element-set metadata by element-set id
    pub element_sets: TypedMap<ElementSetEntry>,
    /// Service descriptors by service id
    pub services: TypedMap<ServiceDescriptorEntry>,
    /// Registered client processes
    pub clients: TypedMap<String>,
    /// Pending requests for fulfillers
    pub requests: TypedQueue<ValueSetRequestEntry>,
    /// Produced value sets waiting to be moved into `value_sets`
    pub value_queue: TypedQueue<ValueSetEntry>,
}

impl DataSpace {
    /// Build from raw structures
    pub fn from_parts(
        value_sets: Arc<dyn SharedMap>,
        element_sets: Arc<dyn SharedMap>,
        services: Arc<dyn SharedMap>,
        clients: Arc<dyn SharedMap>,
        requests: Arc<dyn SharedQueue>,
        value_queue: Arc<dyn SharedQueue>,
    ) -> Self {
        Self {
            value_sets: TypedMap::new(value_sets),
            element_sets: TypedMap::new(element_sets),
            services: TypedMap::new(services),
            clients: TypedMap::new(clients),
            requests: TypedQueue::new(requests),
            value_queue: TypedQueue::new(value_queue),
        }
    }

    /// Build a data space held entirely in this process
    pub fn in_memory(request_capacity: usize, value_capacity: usize) -> Self {
        Self::from_parts(
            Arc::new(MemoryMap::new(VALUE_SET_MAP)),
            Arc::new(MemoryMap::new(ELEMENT_SET_MAP)),
            Arc::new(MemoryMap::new(SERVICE_MAP)),
            Arc::new(MemoryMap::new(CLIENT_MAP)),
            Arc::new(MemoryQueue::new(REQUEST_QUEUE, request_capacity)),
            Arc::new(MemoryQueue::new(VALUE_SET_QUEUE, value_capacity)),
        )
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Opens a [`DataSpace`] on some backing store
#[async_trait]
pub trait Connector: Send + Sync {
    /// Attempt one connection
    async fn connect(&self) -> std::result::Result<DataSpace, StoreError>;
}

/// Connector that hands out an existing data space
pub struct StaticConnector(pub DataSpace);

#[async_trait]
impl Connector for StaticConnector {
    async fn connect(&self) -> std::result::Result<DataSpace, StoreError> {
        Ok(self.0.clone())
    }
}

/// Connect, retrying every `retry_interval` until success
///
/// With `max_attempts` unset the loop never gives up.
pub async fn connect_with_retry<C: Connector + ?Sized>(
    connector: &C,
    retry_interval: Duration,
    max_attempts: Option<u32>,
) -> Result<DataSpace> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match connector.connect().await {
            Ok(space) => {
                tracing::info!(attempt, "Connected to data space");
                return Ok(space);
            }
            Err(e) => {
                if max_attempts.is_some_and(|max| attempt >= max) {
                    tracing::error!(attempt, error = %e, "Giving up connecting to data space");
                    return Err(Error::Store(e));
                }
                tracing::warn!(
                    attempt,
                    error = %e,
                    retry_secs = retry_interval.as_secs_f64(),
                    "Unable to connect to data space, retrying"
                );
                tokio::time::sleep(retry_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueSetAddress;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyConnector {
        failures: u32,
        attempts: AtomicU32,
        space: DataSpace,
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        async fn connect(&self) -> std::result::Result<DataSpace, StoreError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                Err(StoreError::Connection("refused".to_string()))
            } else {
                Ok(self.space.clone())
            }
        }
    }

    fn address() -> ValueSetAddress {
        ValueSetAddress {
            service_id: "ws".to_string(),
            quantity_id: "q".to_string(),
            element_set_id: "e".to_string(),
            timestamp: "2000-01-01T00:00:00".to_string(),
            scenario_id: "S000000".to_string(),
        }
    }

    #[tokio::test]
    async fn test_typed_map_encodes_entries() {
        let space = DataSpace::in_memory(4, 4);
        let entry = ValueSetEntry::from_values(address(), false, &[1.0, 2.0]).unwrap();
        let key = entry.key();

        space.value_sets.put(key.as_str(), &entry).await.unwrap();
        let raw = space.value_sets.raw().get(key.as_str()).await.unwrap().unwrap();
        assert_eq!(raw, entry.encode().unwrap());

        let fetched = space.value_sets.get(key.as_str()).await.unwrap().unwrap();
        assert_eq!(fetched, entry);
    }

    #[tokio::test]
    async fn test_corrupt_map_value_is_codec_error() {
        let space = DataSpace::in_memory(4, 4);
        space
            .value_sets
            .raw()
            .put("bad", Bytes::from_static(&[0, 9]))
            .await
            .unwrap();
        assert!(matches!(
            space.value_sets.get("bad").await,
            Err(Error::Codec(_))
        ));
    }

    #[tokio::test]
    async fn test_typed_queue_round_trip() {
        let space = DataSpace::in_memory(1, 1);
        let request = ValueSetRequestEntry::new(address());
        assert!(space.requests.offer(&request).await.unwrap());
        assert!(!space.requests.offer(&request).await.unwrap());

        let polled = space.requests.poll(Duration::from_millis(5)).await.unwrap();
        assert_eq!(polled, Some(request));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_until_success() {
        let connector = FlakyConnector {
            failures: 2,
            attempts: AtomicU32::new(0),
            space: DataSpace::in_memory(1, 1),
        };
        let start = tokio::time::Instant::now();
        connect_with_retry(&connector, Duration::from_secs(5), None)
            .await
            .unwrap();
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_gives_up_after_max_attempts() {
        let connector = FlakyConnector {
            failures: u32::MAX,
            attempts: AtomicU32::new(0),
            space: DataSpace::in_memory(1, 1),
        };
        let result = connect_with_retry(&connector, Duration::from_secs(5), Some(3)).await;
        assert!(matches!(result, Err(Error::Store(StoreError::Connection(_)))));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_static_connector() {
        let space = DataSpace::in_memory(1, 1);
        let connected = StaticConnector(space.clone()).connect().await.unwrap();
        connected.clients.put("c1", &CLIENT_ACTIVE.to_string()).await.unwrap();
        assert_eq!(
            space.clients.get("c1").await.unwrap().as_deref(),
            Some(CLIENT_ACTIVE)
        );
    }
}
