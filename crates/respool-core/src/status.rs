//! Canonical device status model
//!
//! `DeviceStatus` is the single-owner record of everything known about the
//! board. Telemetry fields are device-authoritative; settings fields are
//! bidirectional and subject to the reconciler's suppression policy.

use serde::{Deserialize, Serialize};

use crate::storage::{keys, SettingsStore};

// ----------------------------------------------------------------------------
// Device Status
// ----------------------------------------------------------------------------

/// Everything known about the remote board.
///
/// Owned exclusively by the status reconciler; consumers receive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    // Telemetry (device-authoritative)
    pub has_filament: bool,
    pub progress: Option<f64>,
    pub remaining_time: Option<i32>,
    /// Smoothed over the last readings, see the reconciler
    pub chip_temperature: Option<i32>,
    pub wifi_ssid: Option<String>,
    pub wifi_connected: Option<bool>,
    pub wifi_last_result: Option<bool>,
    pub wifi_connection_result: Option<bool>,
    pub ota_success: Option<bool>,
    pub firmware_version: Option<String>,
    pub board_version: Option<String>,
    pub is_fan_on: bool,

    // Settings (bidirectional, suppression-window guarded)
    pub speed_percent: i32,
    pub jingle_style: i32,
    pub led_brightness: i32,
    pub fan_speed: i32,
    pub fan_always: bool,
    pub use_filament_sensor: bool,
    pub direction_reversed: bool,
    pub motor_strength: i32,
    pub torque_limit: i32,
    pub high_speed: bool,
    pub duration_at_80: i32,
    pub target_weight: i32,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            has_filament: false,
            progress: None,
            remaining_time: None,
            chip_temperature: None,
            wifi_ssid: None,
            wifi_connected: None,
            wifi_last_result: None,
            wifi_connection_result: None,
            ota_success: None,
            firmware_version: None,
            board_version: None,
            is_fan_on: false,

            speed_percent: 85,
            jingle_style: 0,
            led_brightness: 50,
            fan_speed: 60,
            fan_always: false,
            use_filament_sensor: true,
            direction_reversed: false,
            motor_strength: 100,
            torque_limit: 0,
            high_speed: false,
            duration_at_80: 895,
            target_weight: 0,
        }
    }
}

impl DeviceStatus {
    /// Seed the status from the settings cache, falling back to the
    /// defaults for anything the store does not have yet.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        Self {
            firmware_version: store.get_string(keys::BOARD_FIRMWARE_VERSION),
            board_version: store.get_string(keys::BOARD_VERSION),

            speed_percent: store
                .get_i32(keys::SPEED_PERCENT)
                .unwrap_or(defaults.speed_percent),
            jingle_style: store
                .get_i32(keys::JINGLE_STYLE)
                .unwrap_or(defaults.jingle_style),
            led_brightness: store
                .get_i32(keys::LED_BRIGHTNESS)
                .unwrap_or(defaults.led_brightness),
            fan_speed: store.get_i32(keys::FAN_SPEED).unwrap_or(defaults.fan_speed),
            fan_always: store
                .get_bool(keys::FAN_ALWAYS)
                .unwrap_or(defaults.fan_always),
            use_filament_sensor: store
                .get_bool(keys::USE_FILAMENT_SENSOR)
                .unwrap_or(defaults.use_filament_sensor),
            direction_reversed: store
                .get_bool(keys::DIRECTION_REVERSED)
                .unwrap_or(defaults.direction_reversed),
            motor_strength: store
                .get_i32(keys::MOTOR_STRENGTH)
                .unwrap_or(defaults.motor_strength),
            torque_limit: store
                .get_i32(keys::TORQUE_LIMIT)
                .unwrap_or(defaults.torque_limit),
            high_speed: store
                .get_bool(keys::HIGH_SPEED)
                .unwrap_or(defaults.high_speed),
            duration_at_80: store
                .get_i32(keys::DURATION_AT_80)
                .unwrap_or(defaults.duration_at_80),
            target_weight: store
                .get_i32(keys::TARGET_WEIGHT)
                .unwrap_or(defaults.target_weight),
            ..defaults
        }
    }

    /// Write the settings cache (and known board identity) back to the store
    pub fn persist(&self, store: &dyn SettingsStore) {
        store.set_i32(keys::SPEED_PERCENT, self.speed_percent);
        store.set_i32(keys::JINGLE_STYLE, self.jingle_style);
        store.set_i32(keys::LED_BRIGHTNESS, self.led_brightness);
        store.set_i32(keys::FAN_SPEED, self.fan_speed);
        store.set_bool(keys::FAN_ALWAYS, self.fan_always);
        store.set_bool(keys::USE_FILAMENT_SENSOR, self.use_filament_sensor);
        store.set_bool(keys::DIRECTION_REVERSED, self.direction_reversed);
        store.set_i32(keys::MOTOR_STRENGTH, self.motor_strength);
        store.set_i32(keys::TORQUE_LIMIT, self.torque_limit);
        store.set_bool(keys::HIGH_SPEED, self.high_speed);
        store.set_i32(keys::DURATION_AT_80, self.duration_at_80);
        store.set_i32(keys::TARGET_WEIGHT, self.target_weight);
        match &self.board_version {
            Some(version) => store.set_string(keys::BOARD_VERSION, version),
            None => store.remove(keys::BOARD_VERSION),
        }
        if let Some(firmware) = &self.firmware_version {
            store.set_string(keys::BOARD_FIRMWARE_VERSION, firmware);
        }
    }
}

// ----------------------------------------------------------------------------
// Settings Fields
// ----------------------------------------------------------------------------

/// Identity of a bidirectional settings field, used as the key of the
/// pending local-change ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingField {
    SpeedPercent,
    JingleStyle,
    LedBrightness,
    FanSpeed,
    FanAlways,
    UseFilamentSensor,
    DirectionReversed,
    MotorStrength,
    TorqueLimit,
    HighSpeed,
    DurationAt80,
    TargetWeight,
}

/// A locally-initiated settings change.
///
/// `WifiSsid`/`WifiPassword` are send-only credentials; they go out as SET
/// keys but have no canonical field and no ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    SpeedPercent(i32),
    JingleStyle(i32),
    LedBrightness(i32),
    FanSpeed(i32),
    FanAlways(bool),
    UseFilamentSensor(bool),
    DirectionReversed(bool),
    MotorStrength(i32),
    TorqueLimit(i32),
    HighSpeed(bool),
    DurationAt80(i32),
    TargetWeight(i32),
    WifiSsid(String),
    WifiPassword(String),
}

impl Setting {
    /// The SET key this change is sent under
    pub fn wire_key(&self) -> &'static str {
        match self {
            Self::SpeedPercent(_) => "SPD",
            Self::JingleStyle(_) => "JIN",
            Self::LedBrightness(_) => "LED",
            Self::FanSpeed(_) => "FAN_SPD",
            Self::FanAlways(_) => "FAN_ALW",
            Self::UseFilamentSensor(_) => "USE_FIL",
            Self::DirectionReversed(_) => "DIR",
            Self::MotorStrength(_) => "POW",
            Self::TorqueLimit(_) => "TRQ",
            Self::HighSpeed(_) => "HS",
            Self::DurationAt80(_) => "DUR",
            Self::TargetWeight(_) => "WGT",
            Self::WifiSsid(_) => "WIFI_SSID",
            Self::WifiPassword(_) => "WIFI_PASS",
        }
    }

    /// The wire value for the SET mapping
    pub fn wire_value(&self) -> serde_json::Value {
        match self {
            Self::SpeedPercent(v)
            | Self::JingleStyle(v)
            | Self::LedBrightness(v)
            | Self::FanSpeed(v)
            | Self::MotorStrength(v)
            | Self::TorqueLimit(v)
            | Self::DurationAt80(v)
            | Self::TargetWeight(v) => serde_json::Value::from(*v),
            Self::FanAlways(v)
            | Self::UseFilamentSensor(v)
            | Self::DirectionReversed(v)
            | Self::HighSpeed(v) => serde_json::Value::from(*v),
            Self::WifiSsid(s) | Self::WifiPassword(s) => serde_json::Value::from(s.clone()),
        }
    }

    /// The ledger field this change suppresses, if any
    pub fn field(&self) -> Option<SettingField> {
        match self {
            Self::SpeedPercent(_) => Some(SettingField::SpeedPercent),
            Self::JingleStyle(_) => Some(SettingField::JingleStyle),
            Self::LedBrightness(_) => Some(SettingField::LedBrightness),
            Self::FanSpeed(_) => Some(SettingField::FanSpeed),
            Self::FanAlways(_) => Some(SettingField::FanAlways),
            Self::UseFilamentSensor(_) => Some(SettingField::UseFilamentSensor),
            Self::DirectionReversed(_) => Some(SettingField::DirectionReversed),
            Self::MotorStrength(_) => Some(SettingField::MotorStrength),
            Self::TorqueLimit(_) => Some(SettingField::TorqueLimit),
            Self::HighSpeed(_) => Some(SettingField::HighSpeed),
            Self::DurationAt80(_) => Some(SettingField::DurationAt80),
            Self::TargetWeight(_) => Some(SettingField::TargetWeight),
            Self::WifiSsid(_) | Self::WifiPassword(_) => None,
        }
    }

    /// Apply this change optimistically to the canonical status
    pub fn apply_to(&self, status: &mut DeviceStatus) {
        match self {
            Self::SpeedPercent(v) => status.speed_percent = *v,
            Self::JingleStyle(v) => status.jingle_style = *v,
            Self::LedBrightness(v) => status.led_brightness = *v,
            Self::FanSpeed(v) => status.fan_speed = *v,
            Self::FanAlways(v) => status.fan_always = *v,
            Self::UseFilamentSensor(v) => status.use_filament_sensor = *v,
            Self::DirectionReversed(v) => status.direction_reversed = *v,
            Self::MotorStrength(v) => status.motor_strength = *v,
            Self::TorqueLimit(v) => status.torque_limit = *v,
            Self::HighSpeed(v) => status.high_speed = *v,
            Self::DurationAt80(v) => status.duration_at_80 = *v,
            Self::TargetWeight(v) => status.target_weight = *v,
            // Credentials are forwarded to the board, never mirrored
            Self::WifiSsid(_) | Self::WifiPassword(_) => {}
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
