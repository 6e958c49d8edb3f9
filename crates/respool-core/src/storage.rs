//! Durable key-value storage contract
//!
//! The host environment provides the actual store (shared app defaults in
//! the mobile host, a file elsewhere). The core only consumes this trait for
//! identifier persistence and the settings cache.

use std::collections::HashMap;
use std::sync::RwLock;

// ----------------------------------------------------------------------------
// Storage Keys
// ----------------------------------------------------------------------------

/// Well-known store keys
pub mod keys {
    pub const LAST_DEVICE_ID: &str = "lastDeviceId";
    pub const SPEED_PERCENT: &str = "speedPercent";
    pub const JINGLE_STYLE: &str = "jingleStyle";
    pub const LED_BRIGHTNESS: &str = "ledBrightness";
    pub const FAN_SPEED: &str = "fanSpeed";
    pub const FAN_ALWAYS: &str = "fanAlways";
    pub const USE_FILAMENT_SENSOR: &str = "useFilamentSensor";
    pub const DIRECTION_REVERSED: &str = "directionReversed";
    pub const MOTOR_STRENGTH: &str = "motorStrength";
    pub const TORQUE_LIMIT: &str = "torqueLimit";
    pub const HIGH_SPEED: &str = "highSpeed";
    pub const DURATION_AT_80: &str = "durationAt80";
    pub const TARGET_WEIGHT: &str = "targetWeight";
    pub const BOARD_VERSION: &str = "boardVersion";
    pub const BOARD_FIRMWARE_VERSION: &str = "boardFirmwareVersion";
    pub const BOARD_VARIANT: &str = "boardVariant";
}

// ----------------------------------------------------------------------------
// Settings Store Contract
// ----------------------------------------------------------------------------

/// Durable key-value store consumed by the device service.
///
/// Implementations must be cheap enough to call from the service task; any
/// slow backing medium belongs behind a write-through cache.
pub trait SettingsStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&self, key: &str, value: &str);
    fn get_i32(&self, key: &str) -> Option<i32>;
    fn set_i32(&self, key: &str, value: i32);
    fn get_bool(&self, key: &str) -> Option<bool>;
    fn set_bool(&self, key: &str, value: bool);
    fn get_f64(&self, key: &str) -> Option<f64>;
    fn set_f64(&self, key: &str, value: f64);
    fn remove(&self, key: &str);
}

// ----------------------------------------------------------------------------
// In-Memory Store
// ----------------------------------------------------------------------------

/// A stored value
#[derive(Debug, Clone, PartialEq)]
enum StoreValue {
    String(String),
    Int(i32),
    Bool(bool),
    Float(f64),
}

/// Process-lifetime store, used in tests and as a default collaborator
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, StoreValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Option<StoreValue> {
        self.values
            .read()
            .ok()
            .and_then(|map| map.get(key).cloned())
    }

    fn set(&self, key: &str, value: StoreValue) {
        if let Ok(mut map) = self.values.write() {
            map.insert(key.to_string(), value);
        }
    }
}

impl SettingsStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(StoreValue::String(s)) => Some(s),
            _ => None,
        }
    }

    fn set_string(&self, key: &str, value: &str) {
        self.set(key, StoreValue::String(value.to_string()));
    }

    fn get_i32(&self, key: &str) -> Option<i32> {
        match self.get(key) {
            Some(StoreValue::Int(v)) => Some(v),
            _ => None,
        }
    }

    fn set_i32(&self, key: &str, value: i32) {
        self.set(key, StoreValue::Int(value));
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(StoreValue::Bool(v)) => Some(v),
            _ => None,
        }
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.set(key, StoreValue::Bool(value));
    }

    fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(StoreValue::Float(v)) => Some(v),
            _ => None,
        }
    }

    fn set_f64(&self, key: &str, value: f64) {
        self.set(key, StoreValue::Float(value));
    }

    fn remove(&self, key: &str) {
        if let Ok(mut map) = self.values.write() {
            map.remove(key);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
