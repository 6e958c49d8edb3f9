//! Connection lifecycle supervision
//!
//! Pure state machine over the one transport session: pending-target
//! tracking, post-connect handshake gating, and reconnect backoff. The
//! runtime owns the actual transport handle and timers; this module decides
//! what they should do.

use std::time::Duration;

use serde::Serialize;

use crate::config::SyncTuning;
use crate::types::{DeviceId, TimeSource, Timestamp};

// ----------------------------------------------------------------------------
// Link Phase
// ----------------------------------------------------------------------------

/// Coarse phase of the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkPhase {
    Disconnected,
    Connecting,
    /// Transport session is up, service/characteristic discovery running
    Discovering,
    /// Characteristic subscribed, link carrying traffic
    Ready,
}

// ----------------------------------------------------------------------------
// Session Generation
// ----------------------------------------------------------------------------

/// Monotonic token identifying one connection session.
///
/// Scheduled work captures the generation at schedule time and must no-op
/// when it no longer matches, so a timer can never mutate state for a
/// session that has since been torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionGeneration(u64);

// ----------------------------------------------------------------------------
// Link Supervisor
// ----------------------------------------------------------------------------

/// State machine driving connect/reconnect decisions
pub struct LinkSupervisor<T: TimeSource> {
    time: T,
    tuning: SyncTuning,
    phase: LinkPhase,
    synced: bool,
    pending_target: Option<DeviceId>,
    last_disconnect_at: Option<Timestamp>,
    generation: u64,
}

impl<T: TimeSource> LinkSupervisor<T> {
    pub fn new(time: T, tuning: SyncTuning) -> Self {
        Self {
            time,
            tuning,
            phase: LinkPhase::Disconnected,
            synced: false,
            pending_target: None,
            last_disconnect_at: None,
            generation: 0,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    /// Settings writes are effective only after the first sync
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn pending_target(&self) -> Option<&DeviceId> {
        self.pending_target.as_ref()
    }

    pub fn generation(&self) -> SessionGeneration {
        SessionGeneration(self.generation)
    }

    /// Whether a captured generation still refers to the current session
    pub fn is_current(&self, generation: SessionGeneration) -> bool {
        generation.0 == self.generation
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// A connect was requested; the identifier stays pending until an
    /// explicit disconnect clears it.
    pub fn begin_connect(&mut self, target: DeviceId) {
        self.pending_target = Some(target);
        self.phase = LinkPhase::Connecting;
        self.synced = false;
        self.generation += 1;
    }

    /// Transport reports the session up; discovery is in flight
    pub fn on_connected(&mut self) {
        self.phase = LinkPhase::Discovering;
        self.synced = false;
    }

    /// Characteristic subscribed; local setters become effective
    pub fn on_service_ready(&mut self) {
        self.phase = LinkPhase::Ready;
        self.synced = true;
    }

    /// The session dropped. Returns the reconnect delay to schedule, or
    /// `None` when no target is pending (explicit disconnect already ran).
    ///
    /// Backoff: two disconnects closer together than the flapping threshold
    /// escalate the delay, avoiding a reconnect storm against a flapping
    /// link.
    pub fn on_disconnected(&mut self) -> Option<Duration> {
        let now = self.time.now();
        let flapping = self
            .last_disconnect_at
            .map(|previous| now.duration_since(previous) < self.tuning.flapping_threshold)
            .unwrap_or(false);
        self.last_disconnect_at = Some(now);

        self.phase = LinkPhase::Disconnected;
        self.synced = false;
        self.generation += 1;

        self.pending_target.as_ref()?;
        Some(if flapping {
            self.tuning.reconnect_delay_flapping
        } else {
            self.tuning.reconnect_delay
        })
    }

    /// Explicit disconnect: clear the pending target and invalidate any
    /// scheduled reconnection.
    pub fn cancel(&mut self) {
        self.pending_target = None;
        self.phase = LinkPhase::Disconnected;
        self.synced = false;
        self.generation += 1;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
