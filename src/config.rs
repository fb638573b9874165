//! Session manager configuration.

use std::time::Duration;

/// Timing and tuning parameters for a [`SessionManager`](crate::SessionManager).
///
/// The defaults match the timings the session manager was designed around:
/// 2 second scan passes with 2 seconds of idle between them, 500ms polling
/// reads, a 100ms notification drain interval, and a 2 second budget for the
/// shutdown unpair sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Timeout for a single discovery pass.
    pub scan_timeout: Duration,
    /// Idle interval between discovery passes.
    pub scan_interval: Duration,
    /// Interval between polling-fallback reads.
    pub poll_interval: Duration,
    /// Interval at which the notification queue is drained.
    pub drain_interval: Duration,
    /// Best-effort wait budget for the shutdown unpair sweep.
    pub cleanup_wait: Duration,
    /// RSSI recorded for devices whose signal strength is unavailable.
    pub default_rssi: i16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(2),
            scan_interval: Duration::from_secs(2),
            poll_interval: Duration::from_millis(500),
            drain_interval: Duration::from_millis(100),
            cleanup_wait: Duration::from_secs(2),
            default_rssi: -50,
        }
    }
}

impl SessionConfig {
    /// A configuration with very short intervals, useful for tests.
    #[cfg(test)]
    pub(crate) fn fast() -> Self {
        Self {
            scan_timeout: Duration::from_millis(1),
            scan_interval: Duration::from_millis(5),
            poll_interval: Duration::from_millis(5),
            drain_interval: Duration::from_millis(5),
            cleanup_wait: Duration::from_millis(100),
            default_rssi: -50,
        }
    }
}
