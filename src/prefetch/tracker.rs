//! Per-link request cadence bookkeeping

use std::collections::BTreeMap;

use crate::types::SimTime;

/// Request cadence and fetched times for one link+quantity
///
/// The first observed request moves the tracker from unseen to seen without
/// producing a cadence. Every later request sets `delta` to the distance from
/// the previous one; the latest observation always wins.
#[derive(Debug, Clone)]
pub struct CadenceTracker {
    id: String,
    last_requested: Option<SimTime>,
    delta: f64,
    /// Fetched times keyed by whole seconds, matching key formatting
    fetched: BTreeMap<i64, SimTime>,
}

impl CadenceTracker {
    /// Create an unseen tracker
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last_requested: None,
            delta: 0.0,
            fetched: BTreeMap::new(),
        }
    }

    /// Tracker identifier (link id + quantity id)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Check if at least one real request was observed
    pub fn is_seen(&self) -> bool {
        self.last_requested.is_some()
    }

    /// Most recent real request time, zero when unseen
    pub fn last_requested_time(&self) -> SimTime {
        self.last_requested.unwrap_or(SimTime::ZERO)
    }

    /// Estimated time between consecutive requests, in days
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Record a real request at `time`
    pub fn update_last_requested_time(&mut self, time: SimTime) {
        if let Some(previous) = self.last_requested {
            self.delta = time - previous;
            if self.delta < 0.0 {
                tracing::warn!(
                    tracker = %self.id,
                    previous = previous.mjd(),
                    current = time.mjd(),
                    delta = self.delta,
                    "Request time moved backwards, cadence is negative"
                );
            }
        }
        self.last_requested = Some(time);
    }

    /// Check if `time` was already fetched or requested
    pub fn time_is_fetched(&self, time: SimTime) -> bool {
        self.fetched.contains_key(&time.seconds())
    }

    /// Mark `time` as fetched
    pub fn add_fetched_time(&mut self, time: SimTime) {
        self.fetched.entry(time.seconds()).or_insert(time);
    }

    /// Latest fetched time, zero when nothing was fetched
    pub fn latest_fetch_time(&self) -> SimTime {
        self.fetched
            .values()
            .next_back()
            .copied()
            .unwrap_or(SimTime::ZERO)
    }

    /// Number of distinct fetched times
    pub fn fetched_count(&self) -> usize {
        self.fetched.len()
    }

    /// Forget all fetched times
    pub fn clear_fetched_times(&mut self) {
        self.fetched.clear();
    }

    /// Next request time the cadence predicts after `time`
    pub fn next_est_time_req(&self, time: SimTime) -> SimTime {
        time + self.delta
    }
}
