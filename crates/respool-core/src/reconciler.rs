//! Status reconciliation
//!
//! Merges asynchronous device-reported updates into the canonical
//! `DeviceStatus` under the local-change suppression policy, derives the
//! `DeviceState` machine, and reports transition edges as effects for the
//! runtime to dispatch.
//!
//! Multiple writers race on the settings fields: the local user, the board
//! itself, and background intent requests. The policy here decides, per
//! field, whose value wins and for how long:
//!
//! - telemetry is device-authoritative and always applied;
//! - settings reported by the board are discarded while a local write to the
//!   same field is younger than the suppression window;
//! - the speed setting additionally requires an exact echo inside the echo
//!   window, and debounce-by-repetition outside it, because it changes
//!   continuously during slider interaction and the board reports transient
//!   intermediate values while a change is in flight.

use std::collections::{HashMap, VecDeque};

use smallvec::SmallVec;
use tracing::{debug, error};

use crate::codec::{self, Inbound, StatusUpdate};
use crate::config::SyncTuning;
use crate::status::{DeviceStatus, Setting, SettingField};
use crate::types::{DeviceState, TimeSource, Timestamp};

// ----------------------------------------------------------------------------
// Effects
// ----------------------------------------------------------------------------

/// Side effects produced by a merge, dispatched by the owning service.
/// The merge path itself never performs I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEffect {
    /// The board finished a spool; fire the one-shot done notification
    NotifyDone,
    /// The board auto-stopped while running; fire the one-shot alert
    NotifyAutoStop,
    /// A cached settings field changed; the settings cache should be written
    SettingsDirty,
}

/// Effect list out of the merge path; usually empty or a single entry
pub type SyncEffects = SmallVec<[SyncEffect; 2]>;

// ----------------------------------------------------------------------------
// Snapshot
// ----------------------------------------------------------------------------

/// A consistent, point-in-time view of everything downstream consumers need
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StatusSnapshot {
    pub status: DeviceStatus,
    pub state: DeviceState,
    pub is_connected: bool,
    pub scanning_for_ssids: bool,
    pub available_ssids: Option<Vec<String>>,
}

// ----------------------------------------------------------------------------
// Status Reconciler
// ----------------------------------------------------------------------------

/// Owner of the canonical device status and the pending local-change ledger.
///
/// All mutation happens through `apply_incoming`, `set_local`, and the
/// connection lifecycle hooks, serialized by the owning service task.
pub struct StatusReconciler<T: TimeSource> {
    time: T,
    tuning: SyncTuning,

    status: DeviceStatus,
    state: DeviceState,
    connected: bool,

    /// Last local write per settings field; process-lifetime only
    ledger: HashMap<SettingField, Timestamp>,
    /// Expected speed echo recorded at local write time
    expected_speed_echo: Option<i32>,
    last_remote_speed: Option<i32>,
    last_remote_speed_at: Timestamp,
    speed_repeat_count: u32,

    temperature_window: VecDeque<i32>,
    wifi_hold_until: Option<Timestamp>,
    pending_wifi_connected: Option<bool>,

    scanning_for_ssids: bool,
    available_ssids: Option<Vec<String>>,

    board_version_recorded_this_session: bool,
}

impl<T: TimeSource> StatusReconciler<T> {
    /// Create a reconciler around a seeded status record
    pub fn new(time: T, tuning: SyncTuning, seed: DeviceStatus) -> Self {
        Self {
            time,
            tuning,
            status: seed,
            state: DeviceState::Idle,
            connected: false,
            ledger: HashMap::new(),
            expected_speed_echo: None,
            last_remote_speed: None,
            last_remote_speed_at: Timestamp::ZERO,
            speed_repeat_count: 0,
            temperature_window: VecDeque::new(),
            wifi_hold_until: None,
            pending_wifi_connected: None,
            scanning_for_ssids: false,
            available_ssids: None,
            board_version_recorded_this_session: false,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status.clone(),
            state: self.state,
            is_connected: self.connected,
            scanning_for_ssids: self.scanning_for_ssids,
            available_ssids: self.available_ssids.clone(),
        }
    }

    /// Deadline of the active post-connect Wi-Fi hold, if any
    pub fn wifi_hold_deadline(&self) -> Option<Timestamp> {
        self.wifi_hold_until
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// A fresh transport session is up. Resets the ledger and starts the
    /// Wi-Fi hold; records the advertised name as the board version.
    pub fn on_connected(&mut self, advertised_name: Option<&str>) -> SyncEffects {
        let mut effects = SyncEffects::new();
        let now = self.time.now();

        self.connected = true;
        self.state = DeviceState::Idle;
        self.available_ssids = None;
        self.clear_local_change_tracking();

        self.wifi_hold_until = Some(now.advanced_by(self.tuning.wifi_hold));
        self.pending_wifi_connected = None;
        self.status.wifi_connected = Some(false);

        if let Some(name) = advertised_name.filter(|n| !n.is_empty()) {
            if self.status.board_version.as_deref() != Some(name)
                || !self.board_version_recorded_this_session
            {
                self.status.board_version = Some(name.to_string());
                self.board_version_recorded_this_session = true;
                effects.push(SyncEffect::SettingsDirty);
            }
        }

        effects
    }

    /// The transport session ended. Live telemetry resets to defaults; the
    /// ledger, echo state, and temperature history are cleared.
    pub fn on_disconnected(&mut self) {
        self.connected = false;
        self.state = DeviceState::Idle;

        self.status.progress = Some(0.0);
        self.status.remaining_time = None;
        self.status.has_filament = false;
        self.status.chip_temperature = None;
        self.status.wifi_ssid = None;
        self.status.wifi_connected = None;
        self.status.wifi_last_result = None;
        self.status.wifi_connection_result = None;
        self.status.is_fan_on = false;

        self.wifi_hold_until = None;
        self.pending_wifi_connected = None;
        self.temperature_window.clear();
        self.available_ssids = None;
        self.scanning_for_ssids = false;
        self.clear_local_change_tracking();
        self.board_version_recorded_this_session = false;
    }

    /// Seed a cached firmware version until the board reports one
    pub fn seed_firmware_version(&mut self, firmware: String) {
        if self.status.firmware_version.is_none() && !firmware.is_empty() {
            self.status.firmware_version = Some(firmware);
        }
    }

    fn clear_local_change_tracking(&mut self) {
        self.ledger.clear();
        self.expected_speed_echo = None;
        self.last_remote_speed = None;
        self.last_remote_speed_at = Timestamp::ZERO;
        self.speed_repeat_count = 0;
    }

    // ------------------------------------------------------------------
    // Local writes
    // ------------------------------------------------------------------

    /// Record a locally-initiated settings change: ledger timestamp,
    /// optimistic canonical update, and the encoded SET frame for the
    /// transport. Returns `None` when the change is rejected.
    ///
    /// Gating on link readiness is the supervisor's job; callers must not
    /// invoke this before the first sync.
    pub fn set_local(&mut self, setting: Setting) -> Option<Vec<u8>> {
        if let Setting::FanSpeed(v) = &setting {
            // The fan stalls below this duty cycle
            if *v < 10 {
                debug!(value = v, "rejecting fan speed below floor");
                return None;
            }
        }

        let frame = match codec::encode_setting(&setting) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "failed to encode settings change");
                return None;
            }
        };

        let now = self.time.now();
        if let Some(field) = setting.field() {
            self.ledger.insert(field, now);
            if let Setting::SpeedPercent(v) = &setting {
                self.expected_speed_echo = Some(*v);
            }
        }
        setting.apply_to(&mut self.status);
        Some(frame)
    }

    /// A Wi-Fi scan command went out; set the scanning flag until the
    /// result list arrives
    pub fn mark_scanning(&mut self) {
        self.scanning_for_ssids = true;
    }

    /// Drop a surfaced OTA result after the consumer acknowledged it
    pub fn clear_ota_status(&mut self) {
        self.status.ota_success = None;
    }

    /// Drop the recorded board identity after the pairing is forgotten
    pub fn clear_board_identity(&mut self) {
        self.status.board_version = None;
        self.status.firmware_version = None;
        self.board_version_recorded_this_session = false;
    }

    // ------------------------------------------------------------------
    // Wi-Fi hold
    // ------------------------------------------------------------------

    /// The post-connect hold expired: commit the buffered reported value,
    /// if any. Returns whether the visible value changed.
    pub fn commit_wifi_hold(&mut self) -> bool {
        self.wifi_hold_until = None;
        match self.pending_wifi_connected.take() {
            Some(reported) => {
                let changed = self.status.wifi_connected != Some(reported);
                self.status.wifi_connected = Some(reported);
                changed
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Inbound merge
    // ------------------------------------------------------------------

    /// Merge one received frame. Never fails; malformed frames are dropped
    /// without touching canonical state.
    pub fn apply_incoming(&mut self, raw: &[u8]) -> SyncEffects {
        match codec::decode_frame(raw) {
            Ok(Inbound::ScanResults(ssids)) => {
                self.scanning_for_ssids = false;
                self.available_ssids = Some(ssids);
                SyncEffects::new()
            }
            Ok(Inbound::Status(update)) => self.merge(update),
            Err(e) => {
                debug!(error = %e, len = raw.len(), "dropping malformed frame");
                SyncEffects::new()
            }
        }
    }

    fn merge(&mut self, update: StatusUpdate) -> SyncEffects {
        let mut effects = SyncEffects::new();
        let now = self.time.now();

        // STAT is applied unconditionally; notifications fire on transition
        // edges only, never on repeated identical codes.
        if let Some(code) = update.stat.as_deref() {
            if let Some(new_state) = DeviceState::from_wire_code(code) {
                if new_state != self.state {
                    if new_state == DeviceState::Done {
                        effects.push(SyncEffect::NotifyDone);
                    } else if new_state == DeviceState::AutoStop
                        && self.state == DeviceState::Running
                    {
                        effects.push(SyncEffect::NotifyAutoStop);
                    }
                    self.state = new_state;
                }
            }
        }

        if !self.connected {
            return effects;
        }

        let mut settings_dirty = false;

        // Telemetry: last write wins
        if let Some(v) = update.has_filament {
            self.status.has_filament = v;
        }
        if let Some(v) = update.progress {
            self.status.progress = Some(v);
        }
        if let Some(v) = update.remaining_time {
            self.status.remaining_time = Some(v);
        }
        if let Some(v) = update.is_fan_on {
            self.status.is_fan_on = v;
        }
        if let Some(v) = update.wifi_ssid {
            self.status.wifi_ssid = Some(v);
        }
        if let Some(v) = update.wifi_last_result {
            self.status.wifi_last_result = Some(v);
        }
        if let Some(v) = update.wifi_connection_result {
            self.status.wifi_connection_result = Some(v);
        }
        if let Some(v) = update.ota_success {
            self.status.ota_success = Some(v);
        }
        if let Some(v) = update.firmware_version {
            if self.status.firmware_version.as_deref() != Some(v.as_str()) {
                self.status.firmware_version = Some(v);
                settings_dirty = true;
            }
        }

        if let Some(temp) = update.chip_temperature {
            self.push_temperature(temp);
        }

        if let Some(reported) = update.wifi_connected {
            let holding = self
                .wifi_hold_until
                .map(|until| now < until)
                .unwrap_or(false);
            if holding {
                // Stale pre-reconfiguration state; buffer until the hold ends
                self.status.wifi_connected = Some(false);
                self.pending_wifi_connected = Some(reported);
            } else {
                self.wifi_hold_until = None;
                self.status.wifi_connected = Some(reported);
                self.pending_wifi_connected = None;
            }
        }

        if let Some(spd) = update.speed_percent {
            settings_dirty |= self.merge_speed(spd, now);
        }

        // Settings: the local intent stays authoritative inside the
        // suppression window
        macro_rules! merge_setting {
            ($source:expr, $field:ident, $target:ident) => {
                if let Some(v) = $source {
                    if !self.suppressed(SettingField::$field, now) {
                        self.status.$target = v;
                        settings_dirty = true;
                    }
                }
            };
        }

        merge_setting!(update.use_filament_sensor, UseFilamentSensor, use_filament_sensor);
        merge_setting!(update.jingle_style, JingleStyle, jingle_style);
        merge_setting!(update.led_brightness, LedBrightness, led_brightness);
        merge_setting!(update.fan_speed, FanSpeed, fan_speed);
        merge_setting!(update.fan_always, FanAlways, fan_always);
        merge_setting!(update.direction_reversed, DirectionReversed, direction_reversed);
        merge_setting!(update.motor_strength, MotorStrength, motor_strength);
        merge_setting!(update.torque_limit, TorqueLimit, torque_limit);
        merge_setting!(update.high_speed, HighSpeed, high_speed);
        merge_setting!(update.duration_at_80, DurationAt80, duration_at_80);
        merge_setting!(update.target_weight, TargetWeight, target_weight);

        if settings_dirty {
            effects.push(SyncEffect::SettingsDirty);
        }
        effects
    }

    /// Two-tier anti-oscillation policy for the speed setting. Returns
    /// whether the canonical value was committed.
    fn merge_speed(&mut self, spd: i32, now: Timestamp) -> bool {
        let in_echo_window = self
            .ledger
            .get(&SettingField::SpeedPercent)
            .map(|written| now.duration_since(*written) <= self.tuning.echo_window)
            .unwrap_or(false);

        if in_echo_window {
            // Only the exact echo of the local write is trusted here; any
            // other reading is stale in-flight state.
            if self.expected_speed_echo == Some(spd) {
                self.status.speed_percent = spd;
                self.expected_speed_echo = None;
                self.last_remote_speed = Some(spd);
                self.last_remote_speed_at = now;
                self.speed_repeat_count = 0;
                return true;
            }
            return false;
        }

        if self.last_remote_speed == Some(spd) {
            if now.duration_since(self.last_remote_speed_at) >= self.tuning.speed_debounce_interval
            {
                self.speed_repeat_count += 1;
                self.last_remote_speed_at = now;
            }
        } else {
            self.last_remote_speed = Some(spd);
            self.last_remote_speed_at = now;
            self.speed_repeat_count = 1;
        }

        if self.speed_repeat_count >= self.tuning.speed_debounce_rounds {
            self.status.speed_percent = spd;
            self.expected_speed_echo = None;
            self.speed_repeat_count = 0;
            return true;
        }
        false
    }

    fn suppressed(&self, field: SettingField, now: Timestamp) -> bool {
        self.ledger
            .get(&field)
            .map(|written| now.duration_since(*written) <= self.tuning.suppression_window)
            .unwrap_or(false)
    }

    fn push_temperature(&mut self, reading: i32) {
        self.temperature_window.push_back(reading);
        while self.temperature_window.len() > self.tuning.temperature_window {
            self.temperature_window.pop_front();
        }
        let sum: i64 = self.temperature_window.iter().map(|v| *v as i64).sum();
        self.status.chip_temperature = Some((sum / self.temperature_window.len() as i64) as i32);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
