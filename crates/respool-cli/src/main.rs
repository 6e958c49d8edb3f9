//! Respool CLI
//!
//! Connects to a Respooler board over BLE and drives the device service:
//! stream status snapshots, run the motor, change settings, provision
//! Wi-Fi. Doubles as a smoke-test host for the whole stack.

mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::timeout;
use tracing::info;

use respool_ble::{BleLink, BleLinkConfig};
use respool_core::storage::keys;
use respool_core::{DeviceId, Setting, SettingsStore};
use respool_runtime::{DeviceHandle, DeviceServiceBuilder, SpoolNotifier};

use crate::store::JsonFileStore;

const SYNC_WAIT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "respool", about = "Control a Respooler board over BLE")]
struct Cli {
    /// Board identifier; defaults to the last paired board
    #[arg(long)]
    device: Option<String>,

    /// Path of the pairing/settings store
    #[arg(long, default_value = "respool-store.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Connect and stream status snapshots as JSON lines
    Watch,
    /// Start the motor
    Start,
    /// Stop the motor
    Stop,
    /// Pause the motor
    Pause,
    /// Apply one settings change
    Set {
        #[command(subcommand)]
        setting: SetCommand,
    },
    /// Ask the board for visible Wi-Fi networks
    WifiScan,
    /// Push Wi-Fi credentials and trigger a join
    WifiJoin { ssid: String, password: String },
    /// Trigger a firmware OTA update
    Ota,
    /// Drop the pairing and the cached board identity
    Forget,
}

#[derive(Subcommand)]
enum SetCommand {
    Speed { percent: i32 },
    Led { brightness: i32 },
    FanSpeed { speed: i32 },
    FanAlways { on: bool },
    FilamentSensor { on: bool },
    Direction { reversed: bool },
    MotorStrength { strength: i32 },
    TorqueLimit { limit: i32 },
    HighSpeed { on: bool },
    Duration { seconds: i32 },
    TargetWeight { grams: i32 },
    Jingle { style: i32 },
}

impl SetCommand {
    fn into_setting(self) -> Setting {
        match self {
            Self::Speed { percent } => Setting::SpeedPercent(percent),
            Self::Led { brightness } => Setting::LedBrightness(brightness),
            Self::FanSpeed { speed } => Setting::FanSpeed(speed),
            Self::FanAlways { on } => Setting::FanAlways(on),
            Self::FilamentSensor { on } => Setting::UseFilamentSensor(on),
            Self::Direction { reversed } => Setting::DirectionReversed(reversed),
            Self::MotorStrength { strength } => Setting::MotorStrength(strength),
            Self::TorqueLimit { limit } => Setting::TorqueLimit(limit),
            Self::HighSpeed { on } => Setting::HighSpeed(on),
            Self::Duration { seconds } => Setting::DurationAt80(seconds),
            Self::TargetWeight { grams } => Setting::TargetWeight(grams),
            Self::Jingle { style } => Setting::JingleStyle(style),
        }
    }
}

/// Surfaces transition notifications on the terminal
struct ConsoleNotifier;

impl SpoolNotifier for ConsoleNotifier {
    fn spool_done(&self) {
        println!("spool done");
    }

    fn auto_stopped(&self) {
        println!("auto-stop: check whether the motor is blocked");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store: Arc<JsonFileStore> = Arc::new(JsonFileStore::open(&cli.store));

    let device = cli
        .device
        .clone()
        .or_else(|| store.get_string(keys::LAST_DEVICE_ID));
    let Some(device) = device else {
        bail!("no board known yet; pass --device <id> once to pair");
    };
    let device = DeviceId::new(device);

    let (transport, events) = BleLink::new(BleLinkConfig::default());
    let (service, handle) = DeviceServiceBuilder::new(transport, events)
        .store(store)
        .notifier(Arc::new(ConsoleNotifier))
        .build();
    let service_task = tokio::spawn(service.run());

    handle.connect(device).await?;

    let result = run_command(cli.command, &handle).await;

    let _ = handle.shutdown().await;
    let _ = service_task.await;
    result
}

async fn run_command(command: CliCommand, handle: &DeviceHandle) -> Result<()> {
    match command {
        CliCommand::Watch => watch(handle).await,

        CliCommand::Start => {
            wait_for_sync(handle).await?;
            handle.start_motor().await?;
            settle().await;
            Ok(())
        }
        CliCommand::Stop => {
            wait_for_sync(handle).await?;
            handle.stop_motor().await?;
            settle().await;
            Ok(())
        }
        CliCommand::Pause => {
            wait_for_sync(handle).await?;
            handle.pause_motor().await?;
            settle().await;
            Ok(())
        }

        CliCommand::Set { setting } => {
            wait_for_sync(handle).await?;
            handle.set(setting.into_setting()).await?;
            settle().await;
            Ok(())
        }

        CliCommand::WifiScan => {
            wait_for_sync(handle).await?;
            handle.trigger_wifi_scan().await?;
            let mut snapshots = handle.subscribe();
            let snapshot = timeout(
                SYNC_WAIT,
                snapshots.wait_for(|s| s.available_ssids.is_some()),
            )
            .await
            .context("board did not report scan results")?
            .context("device service stopped")?
            .clone();
            for ssid in snapshot.available_ssids.unwrap_or_default() {
                println!("{ssid}");
            }
            Ok(())
        }

        CliCommand::WifiJoin { ssid, password } => {
            wait_for_sync(handle).await?;
            handle.send_wifi_ssid(ssid).await?;
            handle.send_wifi_password(password).await?;
            handle.trigger_wifi_connect().await?;
            let mut snapshots = handle.subscribe();
            let snapshot = timeout(
                SYNC_WAIT,
                snapshots.wait_for(|s| s.status.wifi_connection_result.is_some()),
            )
            .await
            .context("board did not report a join result")?
            .context("device service stopped")?
            .clone();
            match snapshot.status.wifi_connection_result {
                Some(true) => println!("joined"),
                _ => bail!("board failed to join the network"),
            }
            Ok(())
        }

        CliCommand::Ota => {
            wait_for_sync(handle).await?;
            handle.trigger_ota_update().await?;
            info!("OTA triggered; the board reports the result on its next connection");
            settle().await;
            Ok(())
        }

        CliCommand::Forget => {
            handle.forget().await?;
            settle().await;
            println!("pairing cleared");
            Ok(())
        }
    }
}

async fn watch(handle: &DeviceHandle) -> Result<()> {
    let mut snapshots = handle.subscribe();
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    bail!("device service stopped");
                }
                let line = serde_json::to_string(&*snapshots.borrow_and_update())?;
                println!("{line}");
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
        }
    }
}

async fn wait_for_sync(handle: &DeviceHandle) -> Result<()> {
    let mut snapshots = handle.subscribe();
    timeout(SYNC_WAIT, snapshots.wait_for(|s| s.synced))
        .await
        .context("timed out waiting for the board")?
        .context("device service stopped")?;
    Ok(())
}

/// Give queued writes a moment to reach the board before exiting
async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}
