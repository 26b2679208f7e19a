//! Background Services Module
//!
//! Long-running tasks of a store node.
//!
//! ```text
//! producer ──▶ valueSet queue ──▶ ┌───────────────┐ ──▶ valueSet map ──▶ consumers
//!                                 │  Queue Drain  │
//!                                 └───────────────┘
//!                                         ▲
//!                                   ServiceManager
//!                               (start, restart, stop)
//! ```
//!
//! - **ServiceManager**: supervises registered services
//! - **QueueDrainService**: write-behind of produced value sets

pub mod framework;
pub mod queue_drain;

pub use framework::{RestartPolicy, Service, ServiceConfig, ServiceError, ServiceManager, ServiceStatus};
pub use queue_drain::{QueueDrainConfig, QueueDrainService};
