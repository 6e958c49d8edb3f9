//! Device service task
//!
//! The single owner of all mutable device state. Transport events, handle
//! commands, scheduled wake-ups, and cross-process motor requests are all
//! serialized through one select loop, so the reconciler and supervisor
//! never need locks and the merge path stays free of I/O.
//!
//! Scheduled wake-ups (reconnect, Wi-Fi hold) capture the session
//! generation at schedule time and no-op when it has moved on; a timer can
//! never mutate state for a torn-down session.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use respool_core::storage::keys;
use respool_core::{
    codec, Command, DeviceId, DeviceState, DeviceStatus, DeviceTransport, LinkPhase,
    LinkSupervisor, SessionGeneration, Setting, SettingsStore, StatusReconciler, SyncEffect,
    SyncEffects, SyncTuning, SystemTimeSource, TransportEvent,
};

use crate::fanout::{ActivityPublisher, NoopNotifier, NoopPublisher, PresenceUpdate, SpoolNotifier};
use crate::handle::{DeviceHandle, ServiceCommand};
use crate::intents::{MotorRequest, MotorRequests, NullMotorRequests};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

// ----------------------------------------------------------------------------
// Service Snapshot
// ----------------------------------------------------------------------------

/// What the snapshot channel carries: the reconciled status plus the link
/// condition downstream consumers gate on
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ServiceSnapshot {
    pub status: DeviceStatus,
    pub state: DeviceState,
    pub is_connected: bool,
    pub link_phase: LinkPhase,
    /// Settings writes are effective only once this is true
    pub synced: bool,
    pub scanning_for_ssids: bool,
    pub available_ssids: Option<Vec<String>>,
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Assembles a device service around a transport and its event stream
pub struct DeviceServiceBuilder<T: DeviceTransport> {
    transport: T,
    transport_events: mpsc::Receiver<TransportEvent>,
    store: Arc<dyn SettingsStore>,
    publisher: Arc<dyn ActivityPublisher>,
    notifier: Arc<dyn SpoolNotifier>,
    requests: Arc<dyn MotorRequests>,
    tuning: SyncTuning,
}

impl<T: DeviceTransport> DeviceServiceBuilder<T> {
    /// Start from a transport and the event channel it emits into
    pub fn new(transport: T, transport_events: mpsc::Receiver<TransportEvent>) -> Self {
        Self {
            transport,
            transport_events,
            store: Arc::new(respool_core::MemoryStore::new()),
            publisher: Arc::new(NoopPublisher),
            notifier: Arc::new(NoopNotifier),
            requests: Arc::new(NullMotorRequests),
            tuning: SyncTuning::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.store = store;
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn ActivityPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn SpoolNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn motor_requests(mut self, requests: Arc<dyn MotorRequests>) -> Self {
        self.requests = requests;
        self
    }

    pub fn tuning(mut self, tuning: SyncTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Build the service and its handle. The caller spawns `run()`.
    pub fn build(self) -> (DeviceService<T>, DeviceHandle) {
        let time = SystemTimeSource::new();
        let seed = DeviceStatus::load(&*self.store);
        let reconciler = StatusReconciler::new(time, self.tuning.clone(), seed);
        let link = LinkSupervisor::new(time, self.tuning.clone());

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) =
            watch::channel(compose_snapshot(&reconciler, &link));
        let handle = DeviceHandle::new(command_tx, snapshot_rx);

        let service = DeviceService {
            transport: self.transport,
            transport_events: self.transport_events,
            commands: command_rx,
            reconciler,
            link,
            store: self.store,
            publisher: self.publisher,
            notifier: self.notifier,
            requests: self.requests,
            tuning: self.tuning,
            snapshots: snapshot_tx,
            reconnect_at: None,
            wifi_hold_at: None,
            running: true,
        };
        (service, handle)
    }
}

// ----------------------------------------------------------------------------
// Device Service
// ----------------------------------------------------------------------------

/// The single-owner task for one board link
pub struct DeviceService<T: DeviceTransport> {
    transport: T,
    transport_events: mpsc::Receiver<TransportEvent>,
    commands: mpsc::Receiver<ServiceCommand>,
    reconciler: StatusReconciler<SystemTimeSource>,
    link: LinkSupervisor<SystemTimeSource>,
    store: Arc<dyn SettingsStore>,
    publisher: Arc<dyn ActivityPublisher>,
    notifier: Arc<dyn SpoolNotifier>,
    requests: Arc<dyn MotorRequests>,
    tuning: SyncTuning,
    snapshots: watch::Sender<ServiceSnapshot>,
    reconnect_at: Option<(Instant, SessionGeneration)>,
    wifi_hold_at: Option<(Instant, SessionGeneration)>,
    running: bool,
}

impl<T: DeviceTransport> DeviceService<T> {
    /// Run until shutdown. Reconnects to the persisted board first, if any.
    pub async fn run(mut self) {
        info!("device service starting");

        if let Some(stored) = self.store.get_string(keys::LAST_DEVICE_ID) {
            self.connect_to(DeviceId::new(stored)).await;
        }

        while self.running {
            let requests = Arc::clone(&self.requests);
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            info!("command channel closed, shutting down");
                            break;
                        }
                    }
                }

                event = self.transport_events.recv() => {
                    match event {
                        Some(event) => self.handle_transport_event(event).await,
                        None => {
                            warn!("transport event channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = sleep_until_opt(self.reconnect_at.map(|(at, _)| at)),
                    if self.reconnect_at.is_some() =>
                {
                    self.handle_reconnect_due().await;
                }

                _ = sleep_until_opt(self.wifi_hold_at.map(|(at, _)| at)),
                    if self.wifi_hold_at.is_some() =>
                {
                    self.handle_wifi_hold_due();
                }

                _ = requests.changed() => {
                    self.drain_motor_requests().await;
                }
            }
        }

        info!("device service stopped");
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected {
                id,
                advertised_name,
            } => {
                info!(device = %id, "link established");
                self.link.on_connected();
                let effects = self.reconciler.on_connected(advertised_name.as_deref());
                if self.reconciler.status().firmware_version.is_none() {
                    if let Some(cached) = self.store.get_string(keys::BOARD_FIRMWARE_VERSION) {
                        self.reconciler.seed_firmware_version(cached);
                    }
                }
                self.store.set_string(keys::LAST_DEVICE_ID, id.as_str());
                self.reconnect_at = None;
                self.wifi_hold_at = Some((
                    Instant::now() + self.tuning.wifi_hold,
                    self.link.generation(),
                ));
                self.dispatch(effects);
                self.publish();
            }

            TransportEvent::ServiceReady => {
                debug!("control characteristic ready, settings writes enabled");
                self.link.on_service_ready();
                self.publish();
            }

            TransportEvent::Data(bytes) => {
                let effects = self.reconciler.apply_incoming(&bytes);
                self.dispatch(effects);
                self.publish();
            }

            TransportEvent::Disconnected { cause } => {
                match &cause {
                    Some(cause) => info!(%cause, "link dropped"),
                    None => info!("link closed"),
                }
                self.reconciler.on_disconnected();
                self.wifi_hold_at = None;
                if let Some(delay) = self.link.on_disconnected() {
                    debug!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                    self.reconnect_at =
                        Some((Instant::now() + delay, self.link.generation()));
                }
                self.publish();
            }
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn handle_command(&mut self, command: ServiceCommand) {
        match command {
            ServiceCommand::Connect(id) => self.connect_to(id).await,

            ServiceCommand::Disconnect => self.disconnect_and_clear_pairing().await,

            ServiceCommand::Forget => {
                self.disconnect_and_clear_pairing().await;
                self.store.remove(keys::BOARD_VERSION);
                self.store.remove(keys::BOARD_FIRMWARE_VERSION);
                self.reconciler.clear_board_identity();
                self.publish();
            }

            ServiceCommand::StartMotor => self.send_command_frame(Command::Start).await,
            ServiceCommand::StopMotor => self.send_command_frame(Command::Stop).await,
            ServiceCommand::PauseMotor => self.send_command_frame(Command::Pause).await,
            ServiceCommand::TriggerOta => self.send_command_frame(Command::Ota).await,
            ServiceCommand::WifiConnect => self.send_command_frame(Command::WifiConnect).await,

            ServiceCommand::WifiScan => {
                self.reconciler.mark_scanning();
                self.send_command_frame(Command::WifiScan).await;
                self.publish();
            }

            ServiceCommand::SendWifiSsid(ssid) => {
                self.send_setting_frame(Setting::WifiSsid(ssid)).await;
            }
            ServiceCommand::SendWifiPassword(password) => {
                self.send_setting_frame(Setting::WifiPassword(password)).await;
            }

            ServiceCommand::Set(setting) => self.apply_local_setting(setting).await,

            ServiceCommand::ClearOtaStatus => {
                self.reconciler.clear_ota_status();
                self.publish();
            }

            ServiceCommand::SetBoardVariant(variant) => {
                self.store.set_string(keys::BOARD_VARIANT, variant.as_str());
            }

            ServiceCommand::Shutdown => {
                self.running = false;
            }
        }
    }

    async fn apply_local_setting(&mut self, setting: Setting) {
        if !self.link.is_synced() {
            debug!(?setting, "ignoring settings write before first sync");
            return;
        }
        // Optimistic local apply happens before the frame goes out; a fast
        // remote echo therefore cannot race the canonical assignment.
        if let Some(frame) = self.reconciler.set_local(setting) {
            if let Err(e) = self.transport.send(&frame).await {
                warn!(error = %e, "settings write failed");
            }
            self.reconciler.status().persist(&*self.store);
            self.publish();
        }
    }

    async fn connect_to(&mut self, id: DeviceId) {
        info!(device = %id, "connecting");
        self.link.begin_connect(id.clone());
        self.reconnect_at = None;
        if let Err(e) = self.transport.connect(&id).await {
            warn!(error = %e, device = %id, "connect attempt failed");
            if let Some(delay) = self.link.on_disconnected() {
                self.reconnect_at = Some((Instant::now() + delay, self.link.generation()));
            }
        }
    }

    async fn disconnect_and_clear_pairing(&mut self) {
        self.link.cancel();
        self.reconnect_at = None;
        self.wifi_hold_at = None;
        self.store.remove(keys::LAST_DEVICE_ID);
        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "disconnect while not connected");
        }
    }

    async fn send_command_frame(&mut self, command: Command) {
        let frame = match codec::encode_command(command) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to encode command");
                return;
            }
        };
        if let Err(e) = self.transport.send(&frame).await {
            warn!(error = %e, ?command, "command write failed");
        }
    }

    async fn send_setting_frame(&mut self, setting: Setting) {
        let frame = match codec::encode_setting(&setting) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to encode settings frame");
                return;
            }
        };
        if let Err(e) = self.transport.send(&frame).await {
            warn!(error = %e, "settings frame write failed");
        }
    }

    // ------------------------------------------------------------------
    // Scheduled wake-ups
    // ------------------------------------------------------------------

    async fn handle_reconnect_due(&mut self) {
        let Some((_, scheduled_in)) = self.reconnect_at.take() else {
            return;
        };
        if !self.link.is_current(scheduled_in) {
            debug!("dropping stale reconnect timer");
            return;
        }
        let Some(target) = self.link.pending_target().cloned() else {
            return;
        };
        self.connect_to(target).await;
    }

    fn handle_wifi_hold_due(&mut self) {
        let Some((_, scheduled_in)) = self.wifi_hold_at.take() else {
            return;
        };
        if !self.link.is_current(scheduled_in) {
            debug!("dropping stale Wi-Fi hold timer");
            return;
        }
        if self.reconciler.commit_wifi_hold() {
            self.publish();
        }
    }

    // ------------------------------------------------------------------
    // Motor requests
    // ------------------------------------------------------------------

    async fn drain_motor_requests(&mut self) {
        if self.requests.take(MotorRequest::Start) {
            debug!("external start request");
            self.send_command_frame(Command::Start).await;
        }
        if self.requests.take(MotorRequest::Stop) {
            debug!("external stop request");
            self.send_command_frame(Command::Stop).await;
        }
        if self.requests.take(MotorRequest::Pause) {
            debug!("external pause request");
            self.send_command_frame(Command::Pause).await;
        }
    }

    // ------------------------------------------------------------------
    // Fan-out
    // ------------------------------------------------------------------

    fn dispatch(&self, effects: SyncEffects) {
        for effect in effects {
            match effect {
                SyncEffect::NotifyDone => self.notifier.spool_done(),
                SyncEffect::NotifyAutoStop => self.notifier.auto_stopped(),
                SyncEffect::SettingsDirty => self.reconciler.status().persist(&*self.store),
            }
        }
    }

    fn publish(&self) {
        let snapshot = compose_snapshot(&self.reconciler, &self.link);
        self.publisher.publish(PresenceUpdate {
            state: snapshot.state,
            is_connected: snapshot.is_connected,
            progress: snapshot.status.progress,
            remaining_time: snapshot.status.remaining_time,
        });
        self.snapshots.send_replace(snapshot);
    }
}

fn compose_snapshot(
    reconciler: &StatusReconciler<SystemTimeSource>,
    link: &LinkSupervisor<SystemTimeSource>,
) -> ServiceSnapshot {
    let snapshot = reconciler.snapshot();
    ServiceSnapshot {
        status: snapshot.status,
        state: snapshot.state,
        is_connected: snapshot.is_connected,
        link_phase: link.phase(),
        synced: link.is_synced(),
        scanning_for_ssids: snapshot.scanning_for_ssids,
        available_ssids: snapshot.available_ssids,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
