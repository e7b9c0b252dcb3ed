//! Synchronization timing configuration with named defaults.

use std::time::Duration;

/// Base heartbeat cadence.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 15;

/// Random jitter window added to each heartbeat delay, so a fleet started at
/// the same instant does not heartbeat in synchronized bursts.
pub const DEFAULT_HEARTBEAT_JITTER_MS: u64 = 5_000;

/// Delay before the first heartbeat after an endpoint comes up.
pub const DEFAULT_INITIAL_HEARTBEAT_DELAY_MS: u64 = 500;

/// Timeout for a single Get or Claim request/reply exchange. Distinct from
/// the heartbeat cadence by design: a timed-out Get is simply retried by the
/// next heartbeat.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Connection manager pass cadence.
pub const DEFAULT_CONNECTOR_INTERVAL_SECS: u64 = 30;

/// Shortened cadence after a failed connection manager pass.
pub const DEFAULT_CONNECTOR_RETRY_SECS: u64 = 10;

/// Timing knobs for endpoints and the connection manager.
#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    /// Base delay between heartbeats.
    pub heartbeat_interval: Duration,

    /// Jitter window added on top of `heartbeat_interval`.
    pub heartbeat_jitter: Duration,

    /// Delay before the first heartbeat of a fresh endpoint.
    pub initial_heartbeat_delay: Duration,

    /// Budget for one request/reply exchange.
    pub request_timeout: Duration,

    /// Delay between connection manager passes.
    pub connector_interval: Duration,

    /// Delay before the next pass after a failed one.
    pub connector_retry: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            heartbeat_jitter: Duration::from_millis(DEFAULT_HEARTBEAT_JITTER_MS),
            initial_heartbeat_delay: Duration::from_millis(DEFAULT_INITIAL_HEARTBEAT_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connector_interval: Duration::from_secs(DEFAULT_CONNECTOR_INTERVAL_SECS),
            connector_retry: Duration::from_secs(DEFAULT_CONNECTOR_RETRY_SECS),
        }
    }
}

impl SyncConfig {
    /// Tightened timings for tests: everything in the low-millisecond range.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(50),
            heartbeat_jitter: Duration::from_millis(10),
            initial_heartbeat_delay: Duration::from_millis(5),
            request_timeout: Duration::from_millis(250),
            connector_interval: Duration::from_millis(50),
            connector_retry: Duration::from_millis(20),
        }
    }
}
