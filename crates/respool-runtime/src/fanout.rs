//! Downstream fan-out collaborators
//!
//! The service pushes every reconciled change to a presence/activity
//! publisher and fires one-shot notifications on state-transition edges.
//! Both collaborators are consumed as interfaces; the host environment
//! decides what a "live activity" or a "notification" actually is.

use respool_core::DeviceState;

// ----------------------------------------------------------------------------
// Presence Publishing
// ----------------------------------------------------------------------------

/// The tuple a presence/activity surface renders
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenceUpdate {
    pub state: DeviceState,
    pub is_connected: bool,
    pub progress: Option<f64>,
    pub remaining_time: Option<i32>,
}

/// Receives every reconciled status change, including the disconnect reset
pub trait ActivityPublisher: Send + Sync {
    fn publish(&self, update: PresenceUpdate);
}

/// Publisher that drops everything
#[derive(Debug, Default)]
pub struct NoopPublisher;

impl ActivityPublisher for NoopPublisher {
    fn publish(&self, _update: PresenceUpdate) {}
}

// ----------------------------------------------------------------------------
// Notifications
// ----------------------------------------------------------------------------

/// Invoked once per transition edge into `done` / `autoStop`
pub trait SpoolNotifier: Send + Sync {
    /// The spool finished successfully
    fn spool_done(&self);
    /// The board stopped itself while running
    fn auto_stopped(&self);
}

/// Notifier that drops everything
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl SpoolNotifier for NoopNotifier {
    fn spool_done(&self) {}
    fn auto_stopped(&self) {}
}
