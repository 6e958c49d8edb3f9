//! Synchronization tuning parameters
//!
//! The windows below were tuned empirically against real boards. They shape
//! UX smoothness, not correctness, and are therefore carried as configurable
//! values rather than hard-coded invariants.

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Tuning for the status reconciler and connection supervisor
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SyncTuning {
    /// Window after a local settings write during which conflicting remote
    /// reports for the same field are ignored
    pub suppression_window: Duration,
    /// Window after a local speed write during which only an exact echo of
    /// the written value is accepted
    pub echo_window: Duration,
    /// Minimum spacing between identical remote speed readings for the
    /// repetition counter to advance
    pub speed_debounce_interval: Duration,
    /// Number of spaced repeats required before a remote speed reading is
    /// committed
    pub speed_debounce_rounds: u32,
    /// Hold after a fresh connection during which the reported Wi-Fi
    /// connected flag is forced to false
    pub wifi_hold: Duration,
    /// Reconnect delay after a disconnect
    pub reconnect_delay: Duration,
    /// Escalated reconnect delay when the link is flapping
    pub reconnect_delay_flapping: Duration,
    /// Two disconnects closer together than this count as flapping
    pub flapping_threshold: Duration,
    /// Number of raw chip temperature readings retained for smoothing
    pub temperature_window: usize,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            suppression_window: Duration::from_millis(500),
            echo_window: Duration::from_millis(1200),
            speed_debounce_interval: Duration::from_millis(120),
            speed_debounce_rounds: 2,
            wifi_hold: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(1),
            reconnect_delay_flapping: Duration::from_secs(3),
            flapping_threshold: Duration::from_secs(3),
            temperature_window: 10,
        }
    }
}

impl SyncTuning {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the settings suppression window
    pub fn with_suppression_window(mut self, window: Duration) -> Self {
        self.suppression_window = window;
        self
    }

    /// Set the speed echo window
    pub fn with_echo_window(mut self, window: Duration) -> Self {
        self.echo_window = window;
        self
    }

    /// Set the speed debounce spacing and required rounds
    pub fn with_speed_debounce(mut self, interval: Duration, rounds: u32) -> Self {
        self.speed_debounce_interval = interval;
        self.speed_debounce_rounds = rounds;
        self
    }

    /// Set the post-connect Wi-Fi hold
    pub fn with_wifi_hold(mut self, hold: Duration) -> Self {
        self.wifi_hold = hold;
        self
    }

    /// Set the normal and flapping reconnect delays
    pub fn with_reconnect_delays(mut self, normal: Duration, flapping: Duration) -> Self {
        self.reconnect_delay = normal;
        self.reconnect_delay_flapping = flapping;
        self
    }

    /// Set the temperature smoothing window length
    pub fn with_temperature_window(mut self, samples: usize) -> Self {
        self.temperature_window = samples;
        self
    }
}
