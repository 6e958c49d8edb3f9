//! Transport contract
//!
//! An asynchronous, ordered, reliable byte link to exactly one board at a
//! time. The BLE adapter implements this trait; tests substitute a
//! channel-backed mock. Events are delivered through an mpsc channel handed
//! to the adapter at construction, so the service task remains the single
//! consumer.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::DeviceId;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Link-level failure. Not retried below the connection level; the
/// supervisor's reconnect policy is the only retry path.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no active link")]
    NotConnected,

    #[error("adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("connect to {id} failed: {reason}")]
    ConnectFailed { id: DeviceId, reason: String },

    #[error("write rejected: {0}")]
    WriteRejected(String),

    #[error("control characteristic not found")]
    CharacteristicNotFound,
}

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Lifecycle and data events emitted by a transport, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Session established; discovery begins
    Connected {
        id: DeviceId,
        advertised_name: Option<String>,
    },
    /// Control characteristic subscribed; the link is ready for traffic
    ServiceReady,
    /// One received frame
    Data(Vec<u8>),
    /// Session ended, expectedly or not
    Disconnected { cause: Option<String> },
}

// ----------------------------------------------------------------------------
// Transport Contract
// ----------------------------------------------------------------------------

/// One logical session to one physical board.
///
/// Implementations emit `TransportEvent`s on the channel supplied at
/// construction and must preserve arrival order.
#[async_trait]
pub trait DeviceTransport: Send {
    /// Establish a session with the identified board. Emits `Connected`
    /// followed by `ServiceReady` on success, `Disconnected` on failure
    /// after an initially successful connect.
    async fn connect(&mut self, id: &DeviceId) -> Result<(), TransportError>;

    /// Tear the session down. Emits a final `Disconnected`.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Write one frame. Fails when no session is active or the peripheral
    /// rejects the write.
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
}
