//! Error types for the BLE link

use respool_core::TransportError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the btleplug adapter
#[derive(Debug, Error)]
pub enum BleLinkError {
    #[error("BLE adapter not available: {0}")]
    AdapterNotAvailable(String),

    #[error("board not found within scan timeout")]
    BoardNotFound,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection timeout")]
    ConnectionTimeout,

    #[error("failed to discover services: {0}")]
    ServiceDiscoveryFailed(String),

    #[error("status characteristic not found")]
    CharacteristicNotFound,

    #[error("failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    #[error("failed to write to characteristic: {0}")]
    WriteFailed(String),

    #[error("no active connection")]
    NotConnected,
}

impl From<BleLinkError> for TransportError {
    fn from(err: BleLinkError) -> Self {
        match err {
            BleLinkError::AdapterNotAvailable(reason) => {
                TransportError::AdapterUnavailable(reason)
            }
            BleLinkError::CharacteristicNotFound => TransportError::CharacteristicNotFound,
            BleLinkError::WriteFailed(reason) => TransportError::WriteRejected(reason),
            BleLinkError::NotConnected => TransportError::NotConnected,
            other => TransportError::AdapterUnavailable(other.to_string()),
        }
    }
}
