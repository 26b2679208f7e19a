//! Wait/retry policy for value-set requests

use std::time::Duration;

/// How long to poll for a requested value set and when to give up
///
/// The default polls every second, re-requests after 20 seconds without an
/// answer and never gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between store checks
    pub poll_interval: Duration,
    /// Accumulated polling after which the request is issued again
    pub poll_ceiling: Duration,
    /// Request rounds before failing (`None` = unlimited)
    pub max_attempts: Option<u32>,
    /// Total wait before failing (`None` = unlimited)
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            poll_ceiling: Duration::from_secs(20),
            max_attempts: None,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    /// Default policy: wait forever
    pub fn forever() -> Self {
        Self::default()
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the poll ceiling
    pub fn with_poll_ceiling(mut self, ceiling: Duration) -> Self {
        self.poll_ceiling = ceiling;
        self
    }

    /// Fail after `attempts` request rounds
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Fail once `deadline` has elapsed
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Check whether another request round is allowed
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Check whether `waited` is past the deadline
    pub fn deadline_exceeded(&self, waited: Duration) -> bool {
        self.deadline.is_some_and(|deadline| waited >= deadline)
    }

    /// Check whether the current round has polled long enough
    pub fn ceiling_reached(&self, polled: Duration) -> bool {
        polled >= self.poll_ceiling
    }
}
