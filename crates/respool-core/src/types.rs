//! Core types for the Respooler device link
//!
//! Newtype wrappers and small enums shared across the codec, reconciler,
//! and connection supervisor.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Device Identifier
// ----------------------------------------------------------------------------

/// Stable external identifier of the one paired board.
///
/// The underlying representation is platform-defined (a peripheral UUID on
/// Apple platforms, a MAC-derived path elsewhere); the core only compares
/// and persists it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device identifier from its string form
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

// ----------------------------------------------------------------------------
// Device State
// ----------------------------------------------------------------------------

/// Operating state reported by the board via the `STAT` code.
///
/// Exactly one value at a time. Initialized to `Idle` on construction and on
/// every disconnect; mutated only by the status reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceState {
    Idle,
    Running,
    Paused,
    Updating,
    AutoStop,
    Done,
}

impl DeviceState {
    /// Map a wire `STAT` code to a state. Unknown codes return `None`
    /// (the current state is kept unchanged).
    pub fn from_wire_code(code: &str) -> Option<Self> {
        match code {
            "I" => Some(Self::Idle),
            "R" => Some(Self::Running),
            "P" => Some(Self::Paused),
            "U" => Some(Self::Updating),
            "A" => Some(Self::AutoStop),
            "D" => Some(Self::Done),
            _ => None,
        }
    }

    /// The wire `STAT` code for this state
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Idle => "I",
            Self::Running => "R",
            Self::Paused => "P",
            Self::Updating => "U",
            Self::AutoStop => "A",
            Self::Done => "D",
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Updating => "updating",
            Self::AutoStop => "autoStop",
            Self::Done => "done",
        };
        write!(f, "{label}")
    }
}

// ----------------------------------------------------------------------------
// Board Variant
// ----------------------------------------------------------------------------

/// Hardware variant of the board, advertised in the manufacturer data blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardVariant {
    Standard,
    Pro,
}

impl BoardVariant {
    /// Decode the variant from the first manufacturer data byte
    pub fn from_manufacturer_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Standard),
            0x02 => Some(Self::Pro),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Pro => "pro",
        }
    }
}

impl FromStr for BoardVariant {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "pro" => Ok(Self::Pro),
            _ => Err(()),
        }
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// The zero timestamp (used as "never")
    pub const ZERO: Self = Self(0);

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Saturating duration since another timestamp
    pub fn duration_since(&self, other: Self) -> core::time::Duration {
        core::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }

    /// This timestamp advanced by a duration
    pub fn advanced_by(&self, duration: core::time::Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis() as u64))
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Trait for providing timestamps to time-dependent merge policy.
///
/// All suppression-window, echo, debounce, and hold decisions read the clock
/// through this trait so that tests can drive it deterministically.
pub trait TimeSource {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Standard library implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::new(duration.as_millis() as u64)
    }
}

// ----------------------------------------------------------------------------
// Mock Time Source
// ----------------------------------------------------------------------------

/// Deterministic, manually-advanced time source for tests.
///
/// Clones share the same underlying clock, so a test can hold one handle
/// while the component under test holds another.
#[derive(Debug, Clone, Default)]
pub struct MockTimeSource {
    now: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl MockTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current time in milliseconds
    pub fn set_time(&self, millis: u64) {
        self.now.store(millis, std::sync::atomic::Ordering::SeqCst);
    }

    /// Advance the current time by milliseconds
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, std::sync::atomic::Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.now.load(std::sync::atomic::Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_code_mapping() {
        assert_eq!(DeviceState::from_wire_code("I"), Some(DeviceState::Idle));
        assert_eq!(DeviceState::from_wire_code("R"), Some(DeviceState::Running));
        assert_eq!(DeviceState::from_wire_code("P"), Some(DeviceState::Paused));
        assert_eq!(DeviceState::from_wire_code("U"), Some(DeviceState::Updating));
        assert_eq!(DeviceState::from_wire_code("A"), Some(DeviceState::AutoStop));
        assert_eq!(DeviceState::from_wire_code("D"), Some(DeviceState::Done));
        assert_eq!(DeviceState::from_wire_code("X"), None);
        assert_eq!(DeviceState::from_wire_code(""), None);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let a = Timestamp::new(1000);
        let b = Timestamp::new(1750);
        assert_eq!(b.duration_since(a).as_millis(), 750);
        // Saturates rather than underflows
        assert_eq!(a.duration_since(b).as_millis(), 0);
        assert_eq!(
            a.advanced_by(core::time::Duration::from_millis(500)).as_millis(),
            1500
        );
    }

    #[test]
    fn test_mock_time_source() {
        let time = MockTimeSource::new();
        time.set_time(5_000);
        assert_eq!(time.now().as_millis(), 5_000);
        time.advance(120);
        assert_eq!(time.now().as_millis(), 5_120);
    }

    #[test]
    fn test_board_variant_from_manufacturer_data() {
        assert_eq!(
            BoardVariant::from_manufacturer_byte(0x01),
            Some(BoardVariant::Standard)
        );
        assert_eq!(
            BoardVariant::from_manufacturer_byte(0x02),
            Some(BoardVariant::Pro)
        );
        assert_eq!(BoardVariant::from_manufacturer_byte(0x03), None);
    }
}
