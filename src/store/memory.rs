//! In-process implementations of the shared structures
//!
//! Used by tests and by the store node binary. Maps are a `parking_lot`
//! guarded `HashMap`; queues are bounded tokio channels, so a full queue
//! makes `put` wait and `offer` fail the way a distributed queue does.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};

use super::{SharedMap, SharedQueue};
use crate::error::StoreError;

/// Map held in this process
#[derive(Debug)]
pub struct MemoryMap {
    name: String,
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryMap {
    /// Create an empty map
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SharedMap for MemoryMap {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn contains_key(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.read().contains_key(key))
    }

    async fn remove(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.write().remove(key))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.read().len())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// Bounded FIFO queue held in this process
#[derive(Debug)]
pub struct MemoryQueue {
    name: String,
    sender: mpsc::Sender<Bytes>,
    receiver: Mutex<mpsc::Receiver<Bytes>>,
}

impl MemoryQueue {
    /// Create a queue holding at most `capacity` items
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            name: name.into(),
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Maximum number of queued items
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    fn closed(&self) -> StoreError {
        StoreError::Closed(self.name.clone())
    }
}

#[async_trait]
impl SharedQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, item: Bytes) -> Result<(), StoreError> {
        self.sender.send(item).await.map_err(|_| self.closed())
    }

    async fn offer(&self, item: Bytes) -> Result<bool, StoreError> {
        match self.sender.try_send(item) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(self.closed()),
        }
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<Bytes>, StoreError> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(item)) => Ok(Some(item)),
            Ok(None) => Err(self.closed()),
            Err(_) => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.sender.max_capacity() - self.sender.capacity())
    }
}
