//! Service handle
//!
//! Cloneable front door to the device service: commands go in over an mpsc
//! channel, reconciled snapshots come back over a watch channel. Consumers
//! pull `current()` or subscribe for pushes; nothing outside the service
//! task ever touches the canonical state directly.

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use respool_core::{BoardVariant, DeviceId, Setting};

use crate::service::ServiceSnapshot;

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Requests accepted by the service task
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceCommand {
    Connect(DeviceId),
    Disconnect,
    /// Disconnect and clear the persisted pairing and cached board identity
    Forget,
    StartMotor,
    StopMotor,
    PauseMotor,
    TriggerOta,
    WifiConnect,
    WifiScan,
    SendWifiSsid(String),
    SendWifiPassword(String),
    Set(Setting),
    ClearOtaStatus,
    SetBoardVariant(BoardVariant),
    Shutdown,
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

/// The service task is gone; no commands can be delivered
#[derive(Debug, Error)]
#[error("device service has shut down")]
pub struct ServiceClosed;

// ----------------------------------------------------------------------------
// Device Handle
// ----------------------------------------------------------------------------

/// Cloneable handle to a running device service
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    commands: mpsc::Sender<ServiceCommand>,
    snapshots: watch::Receiver<ServiceSnapshot>,
}

impl DeviceHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<ServiceCommand>,
        snapshots: watch::Receiver<ServiceSnapshot>,
    ) -> Self {
        Self { commands, snapshots }
    }

    /// Send a raw command to the service
    pub async fn send(&self, command: ServiceCommand) -> Result<(), ServiceClosed> {
        self.commands.send(command).await.map_err(|_| ServiceClosed)
    }

    /// Latest reconciled snapshot
    pub fn current(&self) -> ServiceSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Subscribe to snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<ServiceSnapshot> {
        self.snapshots.clone()
    }

    // ------------------------------------------------------------------
    // Convenience wrappers
    // ------------------------------------------------------------------

    pub async fn connect(&self, id: DeviceId) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::Connect(id)).await
    }

    pub async fn disconnect(&self) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::Disconnect).await
    }

    pub async fn forget(&self) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::Forget).await
    }

    pub async fn start_motor(&self) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::StartMotor).await
    }

    pub async fn stop_motor(&self) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::StopMotor).await
    }

    pub async fn pause_motor(&self) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::PauseMotor).await
    }

    pub async fn trigger_ota_update(&self) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::TriggerOta).await
    }

    pub async fn trigger_wifi_connect(&self) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::WifiConnect).await
    }

    pub async fn trigger_wifi_scan(&self) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::WifiScan).await
    }

    pub async fn send_wifi_ssid(&self, ssid: impl Into<String>) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::SendWifiSsid(ssid.into())).await
    }

    pub async fn send_wifi_password(
        &self,
        password: impl Into<String>,
    ) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::SendWifiPassword(password.into()))
            .await
    }

    /// Apply a settings change locally and forward it to the board
    pub async fn set(&self, setting: Setting) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::Set(setting)).await
    }

    pub async fn clear_ota_status(&self) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::ClearOtaStatus).await
    }

    pub async fn set_board_variant(&self, variant: BoardVariant) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::SetBoardVariant(variant)).await
    }

    pub async fn shutdown(&self) -> Result<(), ServiceClosed> {
        self.send(ServiceCommand::Shutdown).await
    }
}
