//! Respool Core
//!
//! Sans-io core of the Respooler device link: canonical status model, wire
//! protocol codec, status reconciliation under the local-change suppression
//! policy, and the connection lifecycle state machine. Everything
//! time-dependent reads the clock through [`TimeSource`] so the policy is
//! deterministic under test; the tokio runtime lives in `respool-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod codec;
pub mod config;
pub mod link;
pub mod reconciler;
pub mod status;
pub mod storage;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use codec::{Command, DecodeError, EncodeError, Inbound, StatusUpdate};
pub use config::SyncTuning;
pub use link::{LinkPhase, LinkSupervisor, SessionGeneration};
pub use reconciler::{StatusReconciler, StatusSnapshot, SyncEffect, SyncEffects};
pub use status::{DeviceStatus, Setting, SettingField};
pub use storage::{MemoryStore, SettingsStore};
pub use transport::{DeviceTransport, TransportError, TransportEvent};
pub use types::{
    BoardVariant, DeviceId, DeviceState, MockTimeSource, SystemTimeSource, TimeSource, Timestamp,
};
