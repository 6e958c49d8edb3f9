//! BLE link configuration

use std::time::Duration;

use uuid::Uuid;

// ----------------------------------------------------------------------------
// Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// Respooler control service UUID
pub const RESPOOLER_SERVICE_UUID: Uuid = Uuid::from_u128(0x9E05D06D_68A7_4E1F_A503_AE26713AC101);

/// Status/control characteristic UUID (bidirectional JSON frames)
pub const RESPOOLER_STATUS_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x7CB2F1B4_7E3F_43D2_8C92_DF58C9A7B1A8);

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the BLE link
#[derive(Debug, Clone)]
pub struct BleLinkConfig {
    /// Control service to scan for
    pub service_uuid: Uuid,
    /// Characteristic carrying status frames and commands
    pub status_characteristic_uuid: Uuid,
    /// Maximum time to scan for a board that is not already known
    pub scan_timeout: Duration,
    /// Maximum time to wait for the peripheral connection
    pub connection_timeout: Duration,
    /// Transport event channel capacity
    pub event_buffer: usize,
}

impl Default for BleLinkConfig {
    fn default() -> Self {
        Self {
            service_uuid: RESPOOLER_SERVICE_UUID,
            status_characteristic_uuid: RESPOOLER_STATUS_CHARACTERISTIC_UUID,
            scan_timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
            event_buffer: 64,
        }
    }
}

impl BleLinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan timeout
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}
