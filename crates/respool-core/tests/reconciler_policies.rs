//! Merge-policy tests for the status reconciler
//!
//! Drives the reconciler through a deterministic clock and asserts the
//! suppression-window, echo, debounce, smoothing, and hold behaviors that
//! keep the UI free of feedback loops and flicker.

use respool_core::{
    DeviceState, DeviceStatus, MockTimeSource, Setting, StatusReconciler, SyncEffect, SyncTuning,
};

const BASE: u64 = 1_000_000;

fn connected() -> (StatusReconciler<MockTimeSource>, MockTimeSource) {
    let time = MockTimeSource::new();
    time.set_time(BASE);
    let mut reconciler =
        StatusReconciler::new(time.clone(), SyncTuning::default(), DeviceStatus::default());
    reconciler.on_connected(Some("Respooler"));
    (reconciler, time)
}

// ----------------------------------------------------------------------------
// Suppression window (settings fields)
// ----------------------------------------------------------------------------

#[test]
fn remote_setting_within_suppression_window_is_discarded() {
    let (mut r, time) = connected();
    r.set_local(Setting::LedBrightness(30)).unwrap();

    time.advance(400);
    r.apply_incoming(br#"{"LED":80}"#);
    assert_eq!(r.status().led_brightness, 30);
}

#[test]
fn remote_setting_after_suppression_window_is_applied() {
    let (mut r, time) = connected();
    r.set_local(Setting::LedBrightness(30)).unwrap();

    time.advance(600);
    r.apply_incoming(br#"{"LED":80}"#);
    assert_eq!(r.status().led_brightness, 80);
}

#[test]
fn suppression_window_boundary_is_exclusive() {
    let (mut r, time) = connected();
    r.set_local(Setting::MotorStrength(90)).unwrap();

    // Exactly at the window edge the local intent still wins
    time.advance(500);
    r.apply_incoming(br#"{"POW":40}"#);
    assert_eq!(r.status().motor_strength, 90);

    time.advance(1);
    r.apply_incoming(br#"{"POW":40}"#);
    assert_eq!(r.status().motor_strength, 40);
}

#[test]
fn suppression_applies_per_field_not_globally() {
    let (mut r, time) = connected();
    r.set_local(Setting::TorqueLimit(5)).unwrap();

    // A different settings field is not suppressed by that write
    time.advance(100);
    r.apply_incoming(br#"{"DUR":600,"TRQ":9}"#);
    assert_eq!(r.status().duration_at_80, 600);
    assert_eq!(r.status().torque_limit, 5);
}

#[test]
fn unwritten_settings_accept_remote_values_immediately() {
    let (mut r, _) = connected();
    r.apply_incoming(br#"{"JIN":2,"FAN_ALW":true,"HS":true,"USE_FIL":false,"WGT":250}"#);
    assert_eq!(r.status().jingle_style, 2);
    assert!(r.status().fan_always);
    assert!(r.status().high_speed);
    assert!(!r.status().use_filament_sensor);
    assert_eq!(r.status().target_weight, 250);
}

// ----------------------------------------------------------------------------
// Speed echo window
// ----------------------------------------------------------------------------

#[test]
fn speed_echo_match_commits_and_clears_expectation() {
    let (mut r, time) = connected();
    r.set_local(Setting::SpeedPercent(70)).unwrap();

    time.advance(300);
    r.apply_incoming(br#"{"SPD":70}"#);
    assert_eq!(r.status().speed_percent, 70);

    // Expectation is consumed: after the window a fresh single reading is
    // back under debounce rules
    time.advance(2_000);
    r.apply_incoming(br#"{"SPD":40}"#);
    assert_eq!(r.status().speed_percent, 70);
}

#[test]
fn speed_mismatch_inside_echo_window_is_discarded() {
    let (mut r, time) = connected();
    r.set_local(Setting::SpeedPercent(70)).unwrap();

    time.advance(500);
    r.apply_incoming(br#"{"SPD":65}"#);
    assert_eq!(r.status().speed_percent, 70);

    time.advance(500);
    r.apply_incoming(br#"{"SPD":82}"#);
    assert_eq!(r.status().speed_percent, 70);
}

// ----------------------------------------------------------------------------
// Speed debounce-by-repetition
// ----------------------------------------------------------------------------

#[test]
fn single_remote_speed_reading_does_not_commit() {
    let (mut r, _) = connected();
    r.apply_incoming(br#"{"SPD":60}"#);
    assert_eq!(r.status().speed_percent, 85);
}

#[test]
fn repeated_spaced_speed_reading_commits() {
    let (mut r, time) = connected();
    r.apply_incoming(br#"{"SPD":60}"#);
    time.advance(150);
    r.apply_incoming(br#"{"SPD":60}"#);
    assert_eq!(r.status().speed_percent, 60);
}

#[test]
fn repeats_closer_than_debounce_interval_do_not_count() {
    let (mut r, time) = connected();
    r.apply_incoming(br#"{"SPD":60}"#);
    time.advance(50);
    r.apply_incoming(br#"{"SPD":60}"#);
    assert_eq!(r.status().speed_percent, 85);

    // Once enough spacing has accumulated, the repeat counts
    time.advance(100);
    r.apply_incoming(br#"{"SPD":60}"#);
    assert_eq!(r.status().speed_percent, 60);
}

#[test]
fn interleaved_reading_resets_the_repeat_counter() {
    let (mut r, time) = connected();
    r.apply_incoming(br#"{"SPD":60}"#);
    time.advance(150);
    r.apply_incoming(br#"{"SPD":50}"#);
    time.advance(150);
    r.apply_incoming(br#"{"SPD":60}"#);
    assert_eq!(r.status().speed_percent, 85);

    time.advance(150);
    r.apply_incoming(br#"{"SPD":60}"#);
    assert_eq!(r.status().speed_percent, 60);
}

// ----------------------------------------------------------------------------
// Temperature smoothing
// ----------------------------------------------------------------------------

#[test]
fn temperature_is_truncated_mean_of_bounded_window() {
    let (mut r, time) = connected();
    for _ in 0..10 {
        r.apply_incoming(br#"{"TEMP":60}"#);
        time.advance(10);
    }
    assert_eq!(r.status().chip_temperature, Some(60));

    // Eleventh reading evicts the oldest: window is nine 60s and one 70
    r.apply_incoming(br#"{"TEMP":70}"#);
    assert_eq!(r.status().chip_temperature, Some(61));
}

#[test]
fn temperature_mean_truncates_toward_zero() {
    let (mut r, _) = connected();
    r.apply_incoming(br#"{"TEMP":60}"#);
    r.apply_incoming(br#"{"TEMP":61}"#);
    // (60 + 61) / 2 = 60.5 -> 60
    assert_eq!(r.status().chip_temperature, Some(60));
}

#[test]
fn temperature_history_clears_on_disconnect() {
    let (mut r, _) = connected();
    for _ in 0..5 {
        r.apply_incoming(br#"{"TEMP":90}"#);
    }
    r.on_disconnected();
    r.on_connected(Some("Respooler"));
    r.apply_incoming(br#"{"TEMP":30}"#);
    assert_eq!(r.status().chip_temperature, Some(30));
}

// ----------------------------------------------------------------------------
// State transitions
// ----------------------------------------------------------------------------

#[test]
fn done_notification_fires_once_per_edge() {
    let (mut r, _) = connected();
    r.apply_incoming(br#"{"STAT":"R"}"#);

    let effects = r.apply_incoming(br#"{"STAT":"D"}"#);
    assert!(effects.contains(&SyncEffect::NotifyDone));
    assert_eq!(r.state(), DeviceState::Done);

    let effects = r.apply_incoming(br#"{"STAT":"D"}"#);
    assert!(!effects.contains(&SyncEffect::NotifyDone));
}

#[test]
fn auto_stop_notifies_only_from_running() {
    let (mut r, _) = connected();
    r.apply_incoming(br#"{"STAT":"R"}"#);
    let effects = r.apply_incoming(br#"{"STAT":"A"}"#);
    assert!(effects.contains(&SyncEffect::NotifyAutoStop));

    // Paused -> autoStop is not an alert-worthy edge
    r.apply_incoming(br#"{"STAT":"P"}"#);
    let effects = r.apply_incoming(br#"{"STAT":"A"}"#);
    assert!(!effects.contains(&SyncEffect::NotifyAutoStop));
}

// ----------------------------------------------------------------------------
// Wi-Fi hold window
// ----------------------------------------------------------------------------

#[test]
fn wifi_connected_is_forced_false_during_hold() {
    let (mut r, time) = connected();
    time.advance(500);
    r.apply_incoming(br#"{"WIFI_OK":true}"#);
    assert_eq!(r.status().wifi_connected, Some(false));
}

#[test]
fn buffered_wifi_value_commits_at_hold_expiry_without_a_frame() {
    let (mut r, time) = connected();
    time.advance(500);
    r.apply_incoming(br#"{"WIFI_OK":true}"#);
    assert_eq!(r.status().wifi_connected, Some(false));

    time.advance(1_600);
    assert!(r.commit_wifi_hold());
    assert_eq!(r.status().wifi_connected, Some(true));
}

#[test]
fn wifi_value_applies_directly_after_hold_expires() {
    let (mut r, time) = connected();
    time.advance(2_100);
    r.apply_incoming(br#"{"WIFI_OK":true}"#);
    assert_eq!(r.status().wifi_connected, Some(true));
}

#[test]
fn hold_expiry_with_no_buffered_value_changes_nothing() {
    let (mut r, _) = connected();
    assert!(!r.commit_wifi_hold());
    assert_eq!(r.status().wifi_connected, Some(false));
}

// ----------------------------------------------------------------------------
// Malformed input
// ----------------------------------------------------------------------------

#[test]
fn malformed_frames_never_mutate_status() {
    let (mut r, _) = connected();
    let before = r.snapshot();

    r.apply_incoming(b"");
    r.apply_incoming(b"\xff\xfe\x00");
    r.apply_incoming(b"{\"PROG\":");
    r.apply_incoming(b"[1,2,3]");
    r.apply_incoming(b"42");
    r.apply_incoming(br#""just a string""#);

    assert_eq!(r.snapshot(), before);
}

// ----------------------------------------------------------------------------
// Configurable windows
// ----------------------------------------------------------------------------

#[test]
fn tuned_suppression_window_is_honored() {
    let time = MockTimeSource::new();
    time.set_time(BASE);
    let tuning = SyncTuning::default()
        .with_suppression_window(std::time::Duration::from_millis(100));
    let mut r = StatusReconciler::new(time.clone(), tuning, DeviceStatus::default());
    r.on_connected(None);

    r.set_local(Setting::LedBrightness(10)).unwrap();
    time.advance(150);
    r.apply_incoming(br#"{"LED":90}"#);
    assert_eq!(r.status().led_brightness, 90);
}
