//! Wire protocol codec
//!
//! The board speaks UTF-8 JSON over a single GATT characteristic: one object
//! per message, no extra framing. Encoding and decoding are stateless pure
//! functions; all merge policy lives in the reconciler.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::status::Setting;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Outbound encoding failure.
///
/// Indicates a malformed command construction, not a runtime condition; no
/// well-formed envelope fails to serialize.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("envelope carries neither CMD nor SET")]
    EmptyEnvelope,

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Inbound decoding failure. The frame is dropped, nothing is applied.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("SSID_LIST is not an array of strings")]
    MalformedSsidList,
}

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Command vocabulary understood by the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Pause,
    Ota,
    WifiConnect,
    WifiScan,
}

impl Command {
    /// The CMD string for this command
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::Pause => "PAUSE",
            Self::Ota => "OTA",
            Self::WifiConnect => "WIFI_CONNECT",
            Self::WifiScan => "WIFI_SCAN",
        }
    }
}

// ----------------------------------------------------------------------------
// Outbound Encoding
// ----------------------------------------------------------------------------

/// Encode a command envelope. Either part may be absent, but not both.
pub fn encode_envelope(
    cmd: Option<Command>,
    set: Option<&Setting>,
) -> Result<Vec<u8>, EncodeError> {
    if cmd.is_none() && set.is_none() {
        return Err(EncodeError::EmptyEnvelope);
    }
    let mut payload = Map::new();
    if let Some(cmd) = cmd {
        payload.insert("CMD".to_string(), Value::from(cmd.wire_code()));
    }
    if let Some(setting) = set {
        let mut set_map = Map::new();
        set_map.insert(setting.wire_key().to_string(), setting.wire_value());
        payload.insert("SET".to_string(), Value::Object(set_map));
    }
    Ok(serde_json::to_vec(&Value::Object(payload))?)
}

/// Encode a bare command
pub fn encode_command(cmd: Command) -> Result<Vec<u8>, EncodeError> {
    encode_envelope(Some(cmd), None)
}

/// Encode a single settings change
pub fn encode_setting(setting: &Setting) -> Result<Vec<u8>, EncodeError> {
    encode_envelope(None, Some(setting))
}

// ----------------------------------------------------------------------------
// Inbound Decoding
// ----------------------------------------------------------------------------

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Wi-Fi scan results; mutually exclusive with status fields
    ScanResults(Vec<String>),
    /// A status update to merge into the canonical model
    Status(StatusUpdate),
}

/// Fields carried by one status update frame.
///
/// Every field is optional; firmware only reports what changed. Keys with
/// unexpected value types are treated as absent rather than failing the
/// whole frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub stat: Option<String>,
    pub has_filament: Option<bool>,
    pub progress: Option<f64>,
    pub remaining_time: Option<i32>,
    pub speed_percent: Option<i32>,
    pub chip_temperature: Option<i32>,
    pub wifi_ssid: Option<String>,
    pub wifi_connected: Option<bool>,
    pub wifi_last_result: Option<bool>,
    pub wifi_connection_result: Option<bool>,
    pub ota_success: Option<bool>,
    pub firmware_version: Option<String>,
    pub jingle_style: Option<i32>,
    pub led_brightness: Option<i32>,
    pub fan_speed: Option<i32>,
    pub is_fan_on: Option<bool>,
    pub fan_always: Option<bool>,
    pub direction_reversed: Option<bool>,
    pub motor_strength: Option<i32>,
    pub torque_limit: Option<i32>,
    pub high_speed: Option<bool>,
    pub duration_at_80: Option<i32>,
    pub target_weight: Option<i32>,
}

impl StatusUpdate {
    fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            stat: get_str(map, "STAT"),
            has_filament: get_bool(map, "HAS_FIL"),
            progress: get_f64(map, "PROG"),
            remaining_time: get_i32(map, "REM"),
            speed_percent: get_i32(map, "SPD"),
            chip_temperature: get_i32(map, "TEMP"),
            wifi_ssid: get_str(map, "WIFI_SSID"),
            wifi_connected: get_bool(map, "WIFI_OK"),
            wifi_last_result: get_bool(map, "WIFI_RESULT"),
            wifi_connection_result: get_bool(map, "WIFI_CONN_RESULT"),
            ota_success: get_bool(map, "OTA_OK"),
            firmware_version: get_str(map, "FW"),
            jingle_style: get_i32(map, "JIN"),
            led_brightness: get_i32(map, "LED"),
            fan_speed: get_i32(map, "FAN_SPD"),
            is_fan_on: get_bool(map, "FAN_ON"),
            fan_always: get_bool(map, "FAN_ALW"),
            direction_reversed: get_bool(map, "DIR"),
            motor_strength: get_i32(map, "POW"),
            torque_limit: get_i32(map, "TRQ"),
            high_speed: get_bool(map, "HS"),
            duration_at_80: get_i32(map, "DUR"),
            target_weight: get_i32(map, "WGT"),
        }
    }
}

/// Decode one inbound frame.
///
/// Tolerates an object delivered directly and an object delivered as a
/// JSON-encoded string (one extra decode pass). A `STAT` key whose value is
/// itself an object is the legacy nested form; the nested object is the
/// status update.
pub fn decode_frame(raw: &[u8]) -> Result<Inbound, DecodeError> {
    let value: Value = serde_json::from_slice(raw)?;
    let value = match value {
        Value::String(inner) => serde_json::from_str(&inner)?,
        other => other,
    };
    let map = match value {
        Value::Object(map) => map,
        _ => return Err(DecodeError::NotAnObject),
    };

    if let Some(list) = map.get("SSID_LIST") {
        let ssids = list
            .as_array()
            .ok_or(DecodeError::MalformedSsidList)?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or(DecodeError::MalformedSsidList)?;
        return Ok(Inbound::ScanResults(ssids));
    }

    if let Some(Value::Object(nested)) = map.get("STAT") {
        return Ok(Inbound::Status(StatusUpdate::from_map(nested)));
    }

    Ok(Inbound::Status(StatusUpdate::from_map(&map)))
}

fn get_bool(map: &Map<String, Value>, key: &str) -> Option<bool> {
    map.get(key).and_then(Value::as_bool)
}

fn get_i32(map: &Map<String, Value>, key: &str) -> Option<i32> {
    map.get(key).and_then(Value::as_i64).map(|v| v as i32)
}

fn get_f64(map: &Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(Value::as_f64)
}

fn get_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
