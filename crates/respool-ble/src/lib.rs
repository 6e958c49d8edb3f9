//! Respool BLE
//!
//! btleplug implementation of the core transport contract. The board
//! exposes one control service with a single bidirectional status
//! characteristic; this crate owns the GATT session and forwards received
//! frames and lifecycle events into the device service's event channel.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod error;
pub mod transport;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{
    BleLinkConfig, RESPOOLER_SERVICE_UUID, RESPOOLER_STATUS_CHARACTERISTIC_UUID,
};
pub use error::BleLinkError;
pub use transport::BleLink;
