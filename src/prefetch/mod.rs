//! Prefetching
//!
//! Anticipates value-set requests from the cadence at which each link has
//! asked for them so far:
//!
//! - [`CadenceTracker`]: last request time, step estimate, fetched times
//! - [`PrefetchMonitor`]: all trackers plus the shared prefetch horizon
//! - [`PrefetchEngine`]: turns the estimates into non-blocking requests

pub mod engine;
pub mod monitor;
pub mod tracker;

pub use engine::{PrefetchConfig, PrefetchEngine, PrefetchReport};
pub use monitor::PrefetchMonitor;
pub use tracker::CadenceTracker;
