//! Driver configuration.
//!
//! [`DriverConfig`] collects the timing knobs applied to every request:
//! the inactivity timeout and the [`RetryPolicy`] for retryable statuses.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Smallest accepted request timeout.
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(1);

/// Timing configuration shared by every request on a driver.
///
/// # Default Values
/// - `request_timeout`: 30 seconds
/// - `retry`: [`RetryPolicy::default`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverConfig {
    /// Fail a request when no frame arrives for this long.
    pub request_timeout: Duration,
    /// Resubmission policy for `429` and `596`.
    pub retry: RetryPolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl DriverConfig {
    /// Clamp values to sane bounds.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use graphwire::config::DriverConfig;
    ///
    /// let cfg = DriverConfig {
    ///     request_timeout: Duration::ZERO,
    ///     ..DriverConfig::default()
    /// };
    /// assert_eq!(cfg.normalized().request_timeout, Duration::from_millis(1));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.request_timeout = self.request_timeout.max(MIN_REQUEST_TIMEOUT);
        self.retry = self.retry.normalized();
        self
    }
}
