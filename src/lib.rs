//! Value-Set Cache
//!
//! A shared cache between linked simulation models. Consumers ask for a
//! value set (a quantity over an element set at one time step) by key; on a
//! miss a request goes to the services that compute it and the consumer
//! waits for the result to appear in the shared store. A prefetcher watches
//! the cadence of real requests and asks for upcoming time steps early.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────── Coordinator (one per process) ──────────────────────┐
//! │                                                                              │
//! │  ┌──────────────┐   ┌────────────────────┐   ┌─────────────────────────────┐ │
//! │  │ CacheManager │   │  PrefetchMonitor   │   │       PrefetchEngine        │ │
//! │  │  get/request │◀─▶│ CadenceTracker × N │◀─▶│ extrapolate, offer requests │ │
//! │  │  poll, retry │   └────────────────────┘   └─────────────────────────────┘ │
//! │  └──────┬───────┘                                          │                 │
//! └─────────┼──────────────────────────────────────────────────┼─────────────────┘
//!           │             entries encoded by `entry` + `codec` │
//!           ▼                                                  ▼
//! ┌──────────────────────────── DataSpace (shared store) ────────────────────────┐
//! │  valueSet map · elementSet map · webService map · client map                 │
//! │  valueSetRequest queue · valueSet write-behind queue                         │
//! └──────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use valueset_cache::{config::load_config, store::DataSpace, Coordinator, SimTime};
//!
//! let config = load_config();
//! let data = DataSpace::in_memory(config.request_queue_capacity, config.value_queue_capacity);
//! let mut coordinator = Coordinator::builder()
//!     .with_config(config)
//!     .with_data_space(data)
//!     .build()?;
//!
//! coordinator.start().await?;
//! let values = coordinator.get_values("l1", SimTime::from_mjd(51544.0)).await?;
//! let report = coordinator.finish().await?;
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod prefetch;
pub mod registry;
pub mod services;
pub mod stats;
pub mod store;
pub mod types;

pub use cache::{CacheManager, RetryPolicy};
pub use config::CacheConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{CodecError, Error, Result, StoreError};
pub use prefetch::{CadenceTracker, PrefetchConfig, PrefetchEngine, PrefetchMonitor};
pub use stats::Statistics;
pub use store::DataSpace;
pub use types::{ElementSet, OutputLink, ScalarSet, SimTime, TimeHorizon, ValueSetKey};
