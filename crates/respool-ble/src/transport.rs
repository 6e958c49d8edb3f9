//! btleplug transport adapter
//!
//! Implements the core transport contract against a real GATT link: known
//! peripheral lookup with a scan fallback, connection with timeout, service
//! discovery, characteristic subscription, and background forwarding of
//! notifications and disconnect events into the service's event channel.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use respool_core::{DeviceId, DeviceTransport, TransportError, TransportEvent};

use crate::config::BleLinkConfig;
use crate::error::BleLinkError;

// ----------------------------------------------------------------------------
// BLE Link
// ----------------------------------------------------------------------------

/// One GATT session to one board
pub struct BleLink {
    config: BleLinkConfig,
    events: mpsc::Sender<TransportEvent>,
    adapter: Option<Adapter>,
    session: Option<LinkSession>,
}

struct LinkSession {
    peripheral: Peripheral,
    characteristic: Characteristic,
    workers: Vec<JoinHandle<()>>,
}

impl BleLink {
    /// Create the link and the event channel the service consumes
    pub fn new(config: BleLinkConfig) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        (
            Self {
                config,
                events: event_tx,
                adapter: None,
                session: None,
            },
            event_rx,
        )
    }

    async fn adapter(&mut self) -> Result<Adapter, BleLinkError> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }
        let manager = Manager::new()
            .await
            .map_err(|e| BleLinkError::AdapterNotAvailable(e.to_string()))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| BleLinkError::AdapterNotAvailable(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| BleLinkError::AdapterNotAvailable("no adapters present".to_string()))?;
        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    /// Locate the board: known peripherals first, then a filtered scan
    async fn find_peripheral(
        &self,
        adapter: &Adapter,
        id: &DeviceId,
    ) -> Result<Peripheral, BleLinkError> {
        if let Ok(peripherals) = adapter.peripherals().await {
            if let Some(peripheral) = peripherals
                .into_iter()
                .find(|p| p.id().to_string() == id.as_str())
            {
                return Ok(peripheral);
            }
        }

        debug!(device = %id, "board not known, scanning");
        adapter
            .start_scan(ScanFilter {
                services: vec![self.config.service_uuid],
            })
            .await
            .map_err(|e| BleLinkError::ConnectionFailed(e.to_string()))?;
        let mut central_events = adapter
            .events()
            .await
            .map_err(|e| BleLinkError::ConnectionFailed(e.to_string()))?;

        let deadline = Instant::now() + self.config.scan_timeout;
        let result = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Err(BleLinkError::BoardNotFound);
            }
            match timeout(remaining, central_events.next()).await {
                Ok(Some(
                    CentralEvent::DeviceDiscovered(pid) | CentralEvent::DeviceUpdated(pid),
                )) if pid.to_string() == id.as_str() => {
                    match adapter.peripheral(&pid).await {
                        Ok(peripheral) => break Ok(peripheral),
                        Err(e) => break Err(BleLinkError::ConnectionFailed(e.to_string())),
                    }
                }
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break Err(BleLinkError::BoardNotFound),
            }
        };
        let _ = adapter.stop_scan().await;
        result
    }

    /// Post-connect handshake: discovery, characteristic lookup,
    /// subscription, and the background forwarding workers
    async fn establish_session(
        &self,
        adapter: &Adapter,
        peripheral: &Peripheral,
    ) -> Result<LinkSession, BleLinkError> {
        peripheral
            .discover_services()
            .await
            .map_err(|e| BleLinkError::ServiceDiscoveryFailed(e.to_string()))?;

        let characteristic = peripheral
            .characteristics()
            .iter()
            .find(|c| c.uuid == self.config.status_characteristic_uuid)
            .cloned()
            .ok_or(BleLinkError::CharacteristicNotFound)?;

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(|e| BleLinkError::SubscriptionFailed(e.to_string()))?;

        let mut notifications = peripheral
            .notifications()
            .await
            .map_err(|e| BleLinkError::SubscriptionFailed(e.to_string()))?;
        let events = self.events.clone();
        let status_uuid = self.config.status_characteristic_uuid;
        let notify_worker = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == status_uuid
                    && events
                        .send(TransportEvent::Data(notification.value))
                        .await
                        .is_err()
                {
                    break;
                }
            }
            debug!("notification stream ended");
        });

        let mut central_events = adapter
            .events()
            .await
            .map_err(|e| BleLinkError::SubscriptionFailed(e.to_string()))?;
        let events = self.events.clone();
        let watched = peripheral.id();
        let watch_worker = tokio::spawn(async move {
            while let Some(event) = central_events.next().await {
                if let CentralEvent::DeviceDisconnected(pid) = event {
                    if pid == watched {
                        let _ = events
                            .send(TransportEvent::Disconnected {
                                cause: Some("peripheral disconnected".to_string()),
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(LinkSession {
            peripheral: peripheral.clone(),
            characteristic,
            workers: vec![notify_worker, watch_worker],
        })
    }

    /// Tear down the current session, if any. Workers are aborted first so
    /// a stale watcher cannot emit events for a session being replaced.
    async fn teardown_session(&mut self, emit_event: bool) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        for worker in &session.workers {
            worker.abort();
        }
        let _ = session.peripheral.disconnect().await;
        if emit_event {
            self.emit(TransportEvent::Disconnected { cause: None }).await;
        }
        true
    }

    async fn emit(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            debug!("event channel closed, service is gone");
        }
    }
}

#[async_trait]
impl DeviceTransport for BleLink {
    async fn connect(&mut self, id: &DeviceId) -> Result<(), TransportError> {
        self.teardown_session(false).await;

        let adapter = self.adapter().await.map_err(TransportError::from)?;
        let peripheral = self
            .find_peripheral(&adapter, id)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        match timeout(self.config.connection_timeout, peripheral.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(TransportError::ConnectFailed {
                    id: id.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(TransportError::ConnectFailed {
                    id: id.clone(),
                    reason: "connection timeout".to_string(),
                })
            }
        }

        let advertised_name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|properties| properties.local_name);
        info!(device = %id, name = advertised_name.as_deref().unwrap_or("<unnamed>"), "connected");
        self.emit(TransportEvent::Connected {
            id: id.clone(),
            advertised_name,
        })
        .await;

        // A failure past this point is a session loss, not a connect error;
        // the supervisor recovers it through the reconnect path.
        match self.establish_session(&adapter, &peripheral).await {
            Ok(session) => {
                self.session = Some(session);
                self.emit(TransportEvent::ServiceReady).await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "post-connect setup failed");
                let _ = peripheral.disconnect().await;
                self.emit(TransportEvent::Disconnected {
                    cause: Some(e.to_string()),
                })
                .await;
                Ok(())
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.teardown_session(true).await {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let session = self.session.as_ref().ok_or(TransportError::NotConnected)?;
        session
            .peripheral
            .write(&session.characteristic, frame, WriteType::WithResponse)
            .await
            .map_err(|e| TransportError::WriteRejected(e.to_string()))
    }
}
