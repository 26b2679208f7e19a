//! Prefetch monitor: cadence trackers for every output link

use std::collections::HashMap;
use std::fmt::Write;

use super::tracker::CadenceTracker;
use crate::error::{Error, Result};
use crate::types::{OutputLink, SimTime, TimeHorizon};

/// Owns one [`CadenceTracker`] per link+quantity known at start-up and
/// derives the prefetch horizon from all of them.
#[derive(Debug, Clone)]
pub struct PrefetchMonitor {
    horizon: TimeHorizon,
    trackers: HashMap<String, CadenceTracker>,
}

impl PrefetchMonitor {
    /// Create a monitor tracking `links`
    pub fn new<'a>(horizon: TimeHorizon, links: impl IntoIterator<Item = &'a OutputLink>) -> Self {
        let trackers = links
            .into_iter()
            .map(|link| {
                let id = link.tracker_id();
                (id.clone(), CadenceTracker::new(id))
            })
            .collect();
        Self { horizon, trackers }
    }

    /// Simulation time horizon
    pub fn time_horizon(&self) -> TimeHorizon {
        self.horizon
    }

    /// Number of trackers
    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    /// Check if no link is tracked
    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    /// Tracker for `link`
    pub fn tracker(&self, link: &OutputLink) -> Result<&CadenceTracker> {
        self.trackers
            .get(&link.tracker_id())
            .ok_or_else(|| Error::UnknownLink(link.id.clone()))
    }

    fn tracker_mut(&mut self, link: &OutputLink) -> Result<&mut CadenceTracker> {
        self.trackers
            .get_mut(&link.tracker_id())
            .ok_or_else(|| Error::UnknownLink(link.id.clone()))
    }

    /// Record a real request on `link`
    pub fn update_last_requested_time(&mut self, link: &OutputLink, time: SimTime) -> Result<()> {
        self.tracker_mut(link)?.update_last_requested_time(time);
        Ok(())
    }

    /// Most recent real request time on `link`
    pub fn last_requested_time(&self, link: &OutputLink) -> Result<SimTime> {
        Ok(self.tracker(link)?.last_requested_time())
    }

    /// Estimated request interval of `link`
    pub fn estimated_interval(&self, link: &OutputLink) -> Result<f64> {
        Ok(self.tracker(link)?.delta())
    }

    /// Check if `time` is already fetched on `link`
    pub fn time_is_fetched(&self, link: &OutputLink, time: SimTime) -> Result<bool> {
        Ok(self.tracker(link)?.time_is_fetched(time))
    }

    /// Mark `time` as fetched on `link`
    pub fn add_fetched_time(&mut self, link: &OutputLink, time: SimTime) -> Result<()> {
        self.tracker_mut(link)?.add_fetched_time(time);
        Ok(())
    }

    /// Latest fetched time on `link`
    pub fn latest_fetch_time(&self, link: &OutputLink) -> Result<SimTime> {
        Ok(self.tracker(link)?.latest_fetch_time())
    }

    /// Next request time predicted for `link` after `time`
    pub fn next_est_time_req(&self, link: &OutputLink, time: SimTime) -> Result<SimTime> {
        Ok(self.tracker(link)?.next_est_time_req(time))
    }

    /// Largest cadence across all links, never below zero
    pub fn longest_request_interval(&self) -> f64 {
        self.trackers
            .values()
            .map(CadenceTracker::delta)
            .fold(0.0, f64::max)
    }

    /// Furthest time it is currently safe to prefetch up to
    ///
    /// The earliest latest-fetch across links plus the longest cadence,
    /// clamped to the horizon end. Zero while any link has fetched nothing.
    pub fn time_limit(&self) -> SimTime {
        let earliest = self
            .trackers
            .values()
            .map(CadenceTracker::latest_fetch_time)
            .min_by(|a, b| a.mjd().total_cmp(&b.mjd()));

        match earliest {
            Some(earliest) if !earliest.is_zero() => {
                let limit = earliest + self.longest_request_interval();
                if limit > self.horizon.end {
                    self.horizon.end
                } else {
                    limit
                }
            }
            _ => SimTime::ZERO,
        }
    }

    /// Forget fetched times on every link
    pub fn clear_fetched_times(&mut self) {
        for tracker in self.trackers.values_mut() {
            tracker.clear_fetched_times();
        }
    }

    /// One line per tracker, for logs
    pub fn summary(&self) -> String {
        let mut ids: Vec<&String> = self.trackers.keys().collect();
        ids.sort();

        let mut out = String::new();
        for id in ids {
            let t = &self.trackers[id];
            let _ = writeln!(
                out,
                "{}: last={} delta={} fetched={} latest={}",
                id,
                t.last_requested_time().mjd(),
                t.delta(),
                t.fetched_count(),
                t.latest_fetch_time().mjd()
            );
        }
        let _ = write!(
            out,
            "longest={} limit={}",
            self.longest_request_interval(),
            self.time_limit().mjd()
        );
        out
    }
}
