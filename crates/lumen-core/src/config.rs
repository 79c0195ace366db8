// ── Runtime controller configuration ──
//
// These types describe *how* to talk to a device: timeouts, retry
// policy, history sizing. They never touch disk. The CLI (or any other
// front end) builds a `ControllerConfig` and hands it in.

use std::time::Duration;

use lumen_transport::TransportSettings;

/// Bounded retry for connects and idempotent sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// How many times a command may be tried. Non-idempotent commands get
    /// exactly one attempt.
    pub fn attempts_for(&self, idempotent: bool) -> u32 {
        if idempotent {
            self.max_attempts.max(1)
        } else {
            1
        }
    }
}

/// Configuration for one controller session.
///
/// Built by the CLI, passed to `Controller` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Upper bound for one transport connect attempt.
    pub connect_timeout: Duration,
    /// Upper bound for one command write + acknowledgement.
    pub command_timeout: Duration,
    pub retry: RetryPolicy,
    /// How long `scan` listens for advertisements.
    pub discovery_window: Duration,
    /// Undo/redo log length.
    pub max_history_size: usize,
    /// Number of point-in-time snapshots kept per device.
    pub snapshot_capacity: usize,
    /// Quiet period after the last mutation before a snapshot is taken.
    pub snapshot_debounce: Duration,
    /// Ask the device for its current state right after connecting.
    pub query_status_on_connect: bool,
    pub transport: TransportSettings,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            discovery_window: Duration::from_secs(5),
            max_history_size: 50,
            snapshot_capacity: 20,
            snapshot_debounce: Duration::from_millis(500),
            query_status_on_connect: true,
            transport: TransportSettings::default(),
        }
    }
}
