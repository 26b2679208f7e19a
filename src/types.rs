//! Core data types shared by the cache, the prefetcher and the wire entries

use std::fmt;
use std::ops::{Add, Sub};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Timestamp layout used inside store keys and entries
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const SECONDS_PER_DAY: f64 = 86_400.0;

fn mjd_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1858, 11, 17).and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ============================================================================
// Simulation Time
// ============================================================================

/// Simulation time as a Modified Julian Day number
///
/// Day zero is 1858-11-17T00:00:00. `SimTime::ZERO` doubles as the
/// "nothing yet" marker used by the prefetch bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(pub f64);

impl SimTime {
    /// Time zero
    pub const ZERO: SimTime = SimTime(0.0);

    /// Create from a Modified Julian Day number
    pub fn from_mjd(mjd: f64) -> Self {
        Self(mjd)
    }

    /// Modified Julian Day number
    pub fn mjd(&self) -> f64 {
        self.0
    }

    /// Check for the zero marker
    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    /// Whole seconds since the epoch, rounded to the nearest second
    ///
    /// Two times with equal `seconds()` format to the same timestamp and
    /// therefore address the same store key.
    pub fn seconds(&self) -> i64 {
        (self.0 * SECONDS_PER_DAY).round() as i64
    }

    /// Convert to a calendar date-time
    pub fn to_datetime(&self) -> Result<NaiveDateTime> {
        if !self.0.is_finite() {
            return Err(Error::InvalidTime(format!("non-finite time {}", self.0)));
        }
        let epoch = mjd_epoch().ok_or_else(|| Error::InvalidTime("epoch".to_string()))?;
        TimeDelta::try_seconds(self.seconds())
            .and_then(|offset| epoch.checked_add_signed(offset))
            .ok_or_else(|| Error::InvalidTime(format!("{} is out of range", self.0)))
    }

    /// Render as `yyyy-MM-ddTHH:mm:ss`
    pub fn timestamp(&self) -> Result<String> {
        Ok(self.to_datetime()?.format(TIMESTAMP_FORMAT).to_string())
    }

    /// Create from a calendar date-time
    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        let seconds = match mjd_epoch() {
            Some(epoch) => (datetime - epoch).num_seconds(),
            None => 0,
        };
        Self(seconds as f64 / SECONDS_PER_DAY)
    }

    /// Parse a `yyyy-MM-ddTHH:mm:ss` timestamp
    pub fn parse_timestamp(s: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
            .map(Self::from_datetime)
            .map_err(|e| Error::InvalidTime(format!("{}: {}", s, e)))
    }
}

impl Add<f64> for SimTime {
    type Output = SimTime;

    fn add(self, days: f64) -> SimTime {
        SimTime(self.0 + days)
    }
}

impl Sub for SimTime {
    type Output = f64;

    fn sub(self, other: SimTime) -> f64 {
        self.0 - other.0
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp() {
            Ok(ts) => write!(f, "{}", ts),
            Err(_) => write!(f, "MJD {}", self.0),
        }
    }
}

/// Start and end of the simulation run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeHorizon {
    /// First simulated time
    pub start: SimTime,
    /// Last simulated time
    pub end: SimTime,
}

impl TimeHorizon {
    /// Create a new horizon
    pub fn new(start: SimTime, end: SimTime) -> Self {
        Self { start, end }
    }

    /// Length of the run in days
    pub fn span(&self) -> f64 {
        self.end - self.start
    }

    /// Percentage of the run completed at `time`
    pub fn progress_percent(&self, time: SimTime) -> f64 {
        let span = self.span();
        if span <= 0.0 {
            return 0.0;
        }
        (time - self.start) / span * 100.0
    }
}

impl Default for TimeHorizon {
    fn default() -> Self {
        Self {
            start: SimTime::ZERO,
            end: SimTime(f64::MAX),
        }
    }
}

// ============================================================================
// Links and Element Sets
// ============================================================================

/// Spatial locations a quantity is defined over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSet {
    /// Element set identifier
    pub id: String,
    /// Identifiers of the individual elements
    #[serde(default)]
    pub element_ids: Vec<String>,
}

impl ElementSet {
    /// Create a new element set
    pub fn new(id: impl Into<String>, element_ids: Vec<String>) -> Self {
        Self {
            id: id.into(),
            element_ids,
        }
    }
}

/// One output link of a model component: a quantity over an element set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLink {
    /// Link identifier
    pub id: String,
    /// Quantity carried by the link
    pub quantity_id: String,
    /// Element set the quantity is defined over
    pub element_set: ElementSet,
}

impl OutputLink {
    /// Create a new link
    pub fn new(
        id: impl Into<String>,
        quantity_id: impl Into<String>,
        element_set: ElementSet,
    ) -> Self {
        Self {
            id: id.into(),
            quantity_id: quantity_id.into(),
            element_set,
        }
    }

    /// Identifier of the cadence tracker for this link
    pub fn tracker_id(&self) -> String {
        format!("{}{}", self.id, self.quantity_id)
    }
}

// ============================================================================
// Addressing
// ============================================================================

/// Key of a value set in the shared store
///
/// Plain concatenation of service, quantity, element set, timestamp and
/// scenario, with no separators. Fields that run into each other can
/// collide; the layout is kept for compatibility with existing stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueSetKey(String);

impl ValueSetKey {
    /// Compose a key from its five fields
    pub fn new(
        service_id: &str,
        quantity_id: &str,
        element_set_id: &str,
        timestamp: &str,
        scenario_id: &str,
    ) -> Self {
        let mut key = String::with_capacity(
            service_id.len()
                + quantity_id.len()
                + element_set_id.len()
                + timestamp.len()
                + scenario_id.len(),
        );
        key.push_str(service_id);
        key.push_str(quantity_id);
        key.push_str(element_set_id);
        key.push_str(timestamp);
        key.push_str(scenario_id);
        Self(key)
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValueSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ValueSetKey> for String {
    fn from(key: ValueSetKey) -> Self {
        key.0
    }
}

/// The five logical fields that locate a value set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueSetAddress {
    /// Service that produces the quantity
    pub service_id: String,
    /// Quantity identifier
    pub quantity_id: String,
    /// Element set identifier
    pub element_set_id: String,
    /// Formatted timestamp
    pub timestamp: String,
    /// Scenario (run) identifier
    pub scenario_id: String,
}

impl ValueSetAddress {
    /// Store key for this address
    pub fn key(&self) -> ValueSetKey {
        ValueSetKey::new(
            &self.service_id,
            &self.quantity_id,
            &self.element_set_id,
            &self.timestamp,
            &self.scenario_id,
        )
    }
}

/// Values returned to the orchestration layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScalarSet {
    /// One value per element
    pub values: Vec<f64>,
}

impl ScalarSet {
    /// Wrap a vector of values
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
