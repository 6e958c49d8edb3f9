//! Cross-process motor-request channel
//!
//! Widgets and background intents run outside the process owning the BLE
//! link. They assert boolean request flags; the service observes, clears,
//! and acts — at most once per assertion. The transport for those flags is
//! host-specific, so the service consumes only this contract. The
//! in-process implementation below is the reference used by tests and by
//! hosts that bridge their own IPC onto it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

// ----------------------------------------------------------------------------
// Contract
// ----------------------------------------------------------------------------

/// A motor action requested from outside the owning process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorRequest {
    Start,
    Stop,
    Pause,
}

/// Flag channel the service polls after each wake-up
#[async_trait]
pub trait MotorRequests: Send + Sync {
    /// Resolves when at least one flag may have been asserted
    async fn changed(&self);

    /// Consume an assertion of the given flag; subsequent calls return
    /// false until it is asserted again
    fn take(&self, request: MotorRequest) -> bool;
}

// ----------------------------------------------------------------------------
// In-Process Implementation
// ----------------------------------------------------------------------------

/// Atomics-backed flag channel for writers living in the same process
#[derive(Debug, Default)]
pub struct LocalMotorRequests {
    start: AtomicBool,
    stop: AtomicBool,
    pause: AtomicBool,
    notify: Notify,
}

impl LocalMotorRequests {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Writer side: assert a request flag
    pub fn request(&self, request: MotorRequest) {
        self.flag(request).store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn flag(&self, request: MotorRequest) -> &AtomicBool {
        match request {
            MotorRequest::Start => &self.start,
            MotorRequest::Stop => &self.stop,
            MotorRequest::Pause => &self.pause,
        }
    }
}

#[async_trait]
impl MotorRequests for LocalMotorRequests {
    async fn changed(&self) {
        self.notify.notified().await;
    }

    fn take(&self, request: MotorRequest) -> bool {
        self.flag(request).swap(false, Ordering::SeqCst)
    }
}

/// Channel that never signals; used when the host has no external writers
#[derive(Debug, Default)]
pub struct NullMotorRequests;

#[async_trait]
impl MotorRequests for NullMotorRequests {
    async fn changed(&self) {
        std::future::pending::<()>().await;
    }

    fn take(&self, _request: MotorRequest) -> bool {
        false
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_is_at_most_once() {
        let requests = LocalMotorRequests::new();
        requests.request(MotorRequest::Start);
        assert!(requests.take(MotorRequest::Start));
        assert!(!requests.take(MotorRequest::Start));
        assert!(!requests.take(MotorRequest::Stop));
    }

    #[tokio::test]
    async fn test_changed_wakes_after_request() {
        let requests = LocalMotorRequests::new();
        requests.request(MotorRequest::Pause);
        // A permit is stored, so this resolves immediately
        requests.changed().await;
        assert!(requests.take(MotorRequest::Pause));
    }
}
