//! End-to-end tests for the device service loop
//!
//! A channel-backed mock transport stands in for the BLE adapter; tokio's
//! paused clock drives the reconnect and Wi-Fi hold timers deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use respool_core::storage::keys;
use respool_core::{
    DeviceId, DeviceState, DeviceTransport, MemoryStore, Setting, SettingsStore, TransportError,
    TransportEvent,
};
use respool_runtime::{
    DeviceHandle, DeviceServiceBuilder, LocalMotorRequests, MotorRequest, ServiceSnapshot,
    SpoolNotifier,
};

const WAIT: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// Mock Transport
// ----------------------------------------------------------------------------

/// What the mock does when the service calls `connect`
#[derive(Debug, Clone, Copy, PartialEq)]
enum ConnectScript {
    /// Emit `Connected` followed by `ServiceReady`
    Full,
    /// Emit `Connected` only; discovery never completes
    ConnectedOnly,
}

struct MockTransport {
    script: ConnectScript,
    events: mpsc::Sender<TransportEvent>,
    sent: mpsc::UnboundedSender<Vec<u8>>,
    connects: mpsc::UnboundedSender<DeviceId>,
}

struct MockHarness {
    events: mpsc::Sender<TransportEvent>,
    sent: mpsc::UnboundedReceiver<Vec<u8>>,
    connects: mpsc::UnboundedReceiver<DeviceId>,
}

fn mock_transport(script: ConnectScript) -> (MockTransport, mpsc::Receiver<TransportEvent>, MockHarness) {
    let (event_tx, event_rx) = mpsc::channel(32);
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let (connect_tx, connect_rx) = mpsc::unbounded_channel();
    let transport = MockTransport {
        script,
        events: event_tx.clone(),
        sent: sent_tx,
        connects: connect_tx,
    };
    let harness = MockHarness {
        events: event_tx,
        sent: sent_rx,
        connects: connect_rx,
    };
    (transport, event_rx, harness)
}

#[async_trait]
impl DeviceTransport for MockTransport {
    async fn connect(&mut self, id: &DeviceId) -> Result<(), TransportError> {
        let _ = self.connects.send(id.clone());
        let _ = self
            .events
            .send(TransportEvent::Connected {
                id: id.clone(),
                advertised_name: Some("Respooler".to_string()),
            })
            .await;
        if self.script == ConnectScript::Full {
            let _ = self.events.send(TransportEvent::ServiceReady).await;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let _ = self
            .events
            .send(TransportEvent::Disconnected { cause: None })
            .await;
        Ok(())
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let _ = self.sent.send(frame.to_vec());
        Ok(())
    }
}

impl MockHarness {
    async fn inject(&self, event: TransportEvent) {
        self.events.send(event).await.expect("service is gone");
    }

    async fn inject_frame(&self, frame: &[u8]) {
        self.inject(TransportEvent::Data(frame.to_vec())).await;
    }

    async fn next_sent(&mut self) -> serde_json::Value {
        let frame = timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("sent channel closed");
        serde_json::from_slice(&frame).expect("outbound frame is not JSON")
    }

    async fn next_connect(&mut self) -> DeviceId {
        timeout(WAIT, self.connects.recv())
            .await
            .expect("timed out waiting for a connect attempt")
            .expect("connect channel closed")
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

struct CountingNotifier {
    done: AtomicUsize,
    auto_stopped: AtomicUsize,
}

impl CountingNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            done: AtomicUsize::new(0),
            auto_stopped: AtomicUsize::new(0),
        })
    }
}

impl SpoolNotifier for CountingNotifier {
    fn spool_done(&self) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }

    fn auto_stopped(&self) {
        self.auto_stopped.fetch_add(1, Ordering::SeqCst);
    }
}

async fn wait_for(
    handle: &DeviceHandle,
    predicate: impl FnMut(&ServiceSnapshot) -> bool,
) -> ServiceSnapshot {
    let mut snapshots = handle.subscribe();
    timeout(WAIT, snapshots.wait_for(predicate))
        .await
        .expect("timed out waiting for a snapshot")
        .expect("snapshot channel closed")
        .clone()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn connect_flow_reaches_synced_and_persists_identifier() {
    let (transport, events, mut harness) = mock_transport(ConnectScript::Full);
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let (service, handle) = DeviceServiceBuilder::new(transport, events)
        .store(store.clone())
        .build();
    tokio::spawn(service.run());

    handle.connect(DeviceId::new("board-1")).await.unwrap();
    assert_eq!(harness.next_connect().await, DeviceId::new("board-1"));

    let snapshot = wait_for(&handle, |s| s.synced).await;
    assert!(snapshot.is_connected);
    assert_eq!(snapshot.status.board_version.as_deref(), Some("Respooler"));
    assert_eq!(
        store.get_string(keys::LAST_DEVICE_ID).as_deref(),
        Some("board-1")
    );
}

#[tokio::test(start_paused = true)]
async fn settings_write_is_sent_and_cached() {
    let (transport, events, mut harness) = mock_transport(ConnectScript::Full);
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let (service, handle) = DeviceServiceBuilder::new(transport, events)
        .store(store.clone())
        .build();
    tokio::spawn(service.run());

    handle.connect(DeviceId::new("board-1")).await.unwrap();
    wait_for(&handle, |s| s.synced).await;

    handle.set(Setting::MotorStrength(90)).await.unwrap();
    assert_eq!(
        harness.next_sent().await,
        serde_json::json!({"SET": {"POW": 90}})
    );

    let snapshot = wait_for(&handle, |s| s.status.motor_strength == 90).await;
    assert_eq!(snapshot.status.motor_strength, 90);
    assert_eq!(store.get_i32(keys::MOTOR_STRENGTH), Some(90));
}

#[tokio::test(start_paused = true)]
async fn settings_writes_are_dropped_before_first_sync() {
    let (transport, events, mut harness) = mock_transport(ConnectScript::ConnectedOnly);
    let (service, handle) = DeviceServiceBuilder::new(transport, events).build();
    tokio::spawn(service.run());

    handle.connect(DeviceId::new("board-1")).await.unwrap();
    wait_for(&handle, |s| s.is_connected).await;
    assert!(!handle.current().synced);

    // The settings write must be swallowed; the motor command goes through
    handle.set(Setting::MotorStrength(90)).await.unwrap();
    handle.start_motor().await.unwrap();
    assert_eq!(harness.next_sent().await, serde_json::json!({"CMD": "START"}));
    assert_eq!(handle.current().status.motor_strength, 100);
}

#[tokio::test(start_paused = true)]
async fn wifi_hold_buffers_then_commits_without_a_frame() {
    let (transport, events, harness) = mock_transport(ConnectScript::Full);
    let (service, handle) = DeviceServiceBuilder::new(transport, events).build();
    tokio::spawn(service.run());

    handle.connect(DeviceId::new("board-1")).await.unwrap();
    wait_for(&handle, |s| s.synced).await;

    harness.inject_frame(br#"{"WIFI_OK":true,"HAS_FIL":true}"#).await;
    let snapshot = wait_for(&handle, |s| s.status.has_filament).await;
    assert_eq!(snapshot.status.wifi_connected, Some(false));

    // The hold timer fires on the paused clock; the buffered value becomes
    // visible with no further inbound traffic
    let snapshot = wait_for(&handle, |s| s.status.wifi_connected == Some(true)).await;
    assert!(snapshot.status.wifi_connected.unwrap());
}

#[tokio::test(start_paused = true)]
async fn done_notification_fires_once_for_repeated_stat() {
    let (transport, events, harness) = mock_transport(ConnectScript::Full);
    let notifier = CountingNotifier::new();
    let (service, handle) = DeviceServiceBuilder::new(transport, events)
        .notifier(notifier.clone())
        .build();
    tokio::spawn(service.run());

    handle.connect(DeviceId::new("board-1")).await.unwrap();
    wait_for(&handle, |s| s.synced).await;

    harness.inject_frame(br#"{"STAT":"R"}"#).await;
    harness.inject_frame(br#"{"STAT":"D","PROG":10.0}"#).await;
    harness.inject_frame(br#"{"STAT":"D","PROG":20.0}"#).await;

    let snapshot = wait_for(&handle, |s| s.status.progress == Some(20.0)).await;
    assert_eq!(snapshot.state, DeviceState::Done);
    assert_eq!(notifier.done.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn unexpected_disconnect_triggers_backoff_reconnect() {
    let (transport, events, mut harness) = mock_transport(ConnectScript::Full);
    let (service, handle) = DeviceServiceBuilder::new(transport, events).build();
    tokio::spawn(service.run());

    handle.connect(DeviceId::new("board-1")).await.unwrap();
    harness.next_connect().await;
    wait_for(&handle, |s| s.is_connected).await;

    harness
        .inject(TransportEvent::Disconnected {
            cause: Some("supervision timeout".to_string()),
        })
        .await;
    wait_for(&handle, |s| !s.is_connected).await;

    // The paused clock fast-forwards through the backoff delay
    assert_eq!(harness.next_connect().await, DeviceId::new("board-1"));
    wait_for(&handle, |s| s.is_connected).await;
}

#[tokio::test(start_paused = true)]
async fn explicit_disconnect_suppresses_reconnection() {
    let (transport, events, mut harness) = mock_transport(ConnectScript::Full);
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let (service, handle) = DeviceServiceBuilder::new(transport, events)
        .store(store.clone())
        .build();
    tokio::spawn(service.run());

    handle.connect(DeviceId::new("board-1")).await.unwrap();
    harness.next_connect().await;
    wait_for(&handle, |s| s.is_connected).await;

    harness
        .inject(TransportEvent::Disconnected {
            cause: Some("supervision timeout".to_string()),
        })
        .await;
    handle.disconnect().await.unwrap();
    wait_for(&handle, |s| !s.is_connected).await;

    // Give any (wrongly) scheduled reconnect ample paused-clock time
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.connects.try_recv().is_err());
    assert_eq!(store.get_string(keys::LAST_DEVICE_ID), None);
}

#[tokio::test(start_paused = true)]
async fn external_motor_requests_are_consumed_at_most_once() {
    let (transport, events, mut harness) = mock_transport(ConnectScript::Full);
    let requests = LocalMotorRequests::new();
    let (service, handle) = DeviceServiceBuilder::new(transport, events)
        .motor_requests(requests.clone())
        .build();
    tokio::spawn(service.run());

    handle.connect(DeviceId::new("board-1")).await.unwrap();
    wait_for(&handle, |s| s.synced).await;

    requests.request(MotorRequest::Start);
    assert_eq!(harness.next_sent().await, serde_json::json!({"CMD": "START"}));

    // The assertion was consumed; only a new request produces a new command
    requests.request(MotorRequest::Stop);
    assert_eq!(harness.next_sent().await, serde_json::json!({"CMD": "STOP"}));
}

#[tokio::test(start_paused = true)]
async fn service_reconnects_to_persisted_board_on_startup() {
    let (transport, events, mut harness) = mock_transport(ConnectScript::Full);
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    store.set_string(keys::LAST_DEVICE_ID, "board-7");
    let (service, handle) = DeviceServiceBuilder::new(transport, events)
        .store(store)
        .build();
    tokio::spawn(service.run());

    assert_eq!(harness.next_connect().await, DeviceId::new("board-7"));
    wait_for(&handle, |s| s.is_connected).await;
}

#[tokio::test(start_paused = true)]
async fn forget_clears_pairing_and_board_identity() {
    let (transport, events, mut harness) = mock_transport(ConnectScript::Full);
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let (service, handle) = DeviceServiceBuilder::new(transport, events)
        .store(store.clone())
        .build();
    tokio::spawn(service.run());

    handle.connect(DeviceId::new("board-1")).await.unwrap();
    harness.next_connect().await;
    wait_for(&handle, |s| s.status.board_version.is_some()).await;

    handle.forget().await.unwrap();
    let snapshot = wait_for(&handle, |s| !s.is_connected).await;
    assert_eq!(snapshot.status.board_version, None);
    assert_eq!(store.get_string(keys::LAST_DEVICE_ID), None);
    assert_eq!(store.get_string(keys::BOARD_VERSION), None);
}
