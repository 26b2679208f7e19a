//! Service Framework
//!
//! Lifecycle plumbing shared by background services:
//! - `Service` trait: a long-running task stopped through a broadcast channel
//! - `RestartPolicy`: what the supervisor does when a service exits
//! - `ServiceManager`: spawns, supervises and shuts services down

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::StoreError;

// ============================================================================
// Types
// ============================================================================

/// Errors raised by background services
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Backing store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Cache operation failed
    #[error("{0}")]
    Cache(#[from] crate::error::Error),

    /// Service-specific failure
    #[error("Service {service} failed: {reason}")]
    Failed {
        /// Service name
        service: &'static str,
        /// Failure description
        reason: String,
    },

    /// Shutdown did not complete in time
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Current state of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Not running
    Stopped,
    /// Main loop active
    Running,
    /// Exited with an error
    Failed(String),
}

/// What to do when a service's `start` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart
    Never,
    /// Restart after errors, up to `max_retries` times
    OnFailure {
        /// Restarts allowed
        max_retries: u32,
        /// Delay before each restart
        backoff: Duration,
    },
    /// Restart whenever the service exits before shutdown
    Always {
        /// Delay before each restart
        backoff: Duration,
    },
}

/// A background task with a managed lifecycle
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    /// Run until a shutdown signal arrives or the service fails
    async fn start(&self, shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError>;

    /// Stable service name for logs
    fn name(&self) -> &'static str;

    /// Current status
    fn status(&self) -> ServiceStatus;

    /// Restart behavior
    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::Never
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Service manager settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Time allowed for all services to stop
    pub shutdown_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Starts services, restarts them per policy and stops them together
pub struct ServiceManager {
    config: ServiceConfig,
    services: Vec<Arc<dyn Service>>,
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
    stopping: Arc<AtomicBool>,
}

impl ServiceManager {
    /// Create an empty manager
    pub fn new(config: ServiceConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            services: Vec::new(),
            handles: Vec::new(),
            shutdown_tx,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Add a service; it runs on the next `start_all`
    pub fn register(&mut self, service: Arc<dyn Service>) {
        self.services.push(service);
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Check whether no services are registered
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Status of every registered service
    pub fn statuses(&self) -> Vec<(&'static str, ServiceStatus)> {
        self.services
            .iter()
            .map(|s| (s.name(), s.status()))
            .collect()
    }

    /// Spawn a supervisor task for every registered service
    pub fn start_all(&mut self) {
        for service in &self.services {
            tracing::info!(service = service.name(), "Starting service");
            let handle = tokio::spawn(supervise(
                service.clone(),
                self.shutdown_tx.clone(),
                self.stopping.clone(),
            ));
            self.handles.push(handle);
        }
    }

    /// Signal shutdown and wait for every service to stop
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        self.stopping.store(true, Ordering::SeqCst);
        // no receivers just means nothing is running
        let _ = self.shutdown_tx.send(());

        let handles = std::mem::take(&mut self.handles);
        let wait_all = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Service task panicked");
                }
            }
        };

        tokio::time::timeout(self.config.shutdown_timeout, wait_all)
            .await
            .map_err(|_| ServiceError::ShutdownTimeout(self.config.shutdown_timeout))?;
        tracing::info!("All services stopped");
        Ok(())
    }
}

async fn supervise(
    service: Arc<dyn Service>,
    shutdown_tx: broadcast::Sender<()>,
    stopping: Arc<AtomicBool>,
) {
    let mut restarts: u32 = 0;

    loop {
        let shutdown = shutdown_tx.subscribe();
        if stopping.load(Ordering::SeqCst) {
            return;
        }

        let result = service.start(shutdown).await;
        if stopping.load(Ordering::SeqCst) {
            return;
        }

        let backoff = match (&result, service.restart_policy()) {
            (Ok(()), RestartPolicy::Always { backoff }) => backoff,
            (Ok(()), _) => return,
            (Err(e), RestartPolicy::Never) => {
                tracing::error!(service = service.name(), error = %e, "Service failed");
                return;
            }
            (Err(e), RestartPolicy::OnFailure { max_retries, backoff }) => {
                if restarts >= max_retries {
                    tracing::error!(
                        service = service.name(),
                        error = %e,
                        restarts,
                        "Service failed, restart limit reached"
                    );
                    return;
                }
                backoff
            }
            (Err(_), RestartPolicy::Always { backoff }) => backoff,
        };

        restarts += 1;
        tracing::warn!(
            service = service.name(),
            restarts,
            backoff_ms = backoff.as_millis() as u64,
            "Restarting service"
        );

        let mut shutdown = shutdown_tx.subscribe();
        if stopping.load(Ordering::SeqCst) {
            return;
        }
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use std::sync::atomic::AtomicU32;

    struct FailingService {
        runs: AtomicU32,
        status: RwLock<ServiceStatus>,
        policy: RestartPolicy,
    }

    #[async_trait::async_trait]
    impl Service for FailingService {
        async fn start(&self, _shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            *self.status.write() = ServiceStatus::Failed("boom".to_string());
            Err(ServiceError::Failed {
                service: "failing",
                reason: "boom".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "failing"
        }

        fn status(&self) -> ServiceStatus {
            self.status.read().clone()
        }

        fn restart_policy(&self) -> RestartPolicy {
            self.policy
        }
    }

    struct IdleService {
        status: RwLock<ServiceStatus>,
    }

    #[async_trait::async_trait]
    impl Service for IdleService {
        async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
            *self.status.write() = ServiceStatus::Running;
            let _ = shutdown.recv().await;
            *self.status.write() = ServiceStatus::Stopped;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "idle"
        }

        fn status(&self) -> ServiceStatus {
            self.status.read().clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_failure_restarts_are_bounded() {
        let service = Arc::new(FailingService {
            runs: AtomicU32::new(0),
            status: RwLock::new(ServiceStatus::Stopped),
            policy: RestartPolicy::OnFailure {
                max_retries: 2,
                backoff: Duration::from_secs(1),
            },
        });
        let mut manager = ServiceManager::new(ServiceConfig::default());
        manager.register(service.clone());
        manager.start_all();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(service.runs.load(Ordering::SeqCst), 3);
        assert!(matches!(service.status(), ServiceStatus::Failed(_)));
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_service() {
        let service = Arc::new(IdleService {
            status: RwLock::new(ServiceStatus::Stopped),
        });
        let mut manager = ServiceManager::new(ServiceConfig::default());
        manager.register(service.clone());
        assert_eq!(manager.len(), 1);
        manager.start_all();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.status(), ServiceStatus::Running);

        manager.shutdown().await.unwrap();
        assert_eq!(service.status(), ServiceStatus::Stopped);
        assert_eq!(manager.statuses(), vec![("idle", ServiceStatus::Stopped)]);
    }
}
