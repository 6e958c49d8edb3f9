//! Respool Runtime
//!
//! Tokio orchestration around the sans-io core: a single-owner service task
//! that drives the transport, reconciler, and connection supervisor, plus
//! the fan-out seams (snapshot watch channel, presence publisher, one-shot
//! notifier) and the cross-process motor-request contract.
//!
//! ```no_run
//! use respool_runtime::DeviceServiceBuilder;
//! # async fn example(transport: impl respool_core::DeviceTransport + 'static,
//! #                  events: tokio::sync::mpsc::Receiver<respool_core::TransportEvent>) {
//! let (service, handle) = DeviceServiceBuilder::new(transport, events).build();
//! tokio::spawn(service.run());
//! handle.connect(respool_core::DeviceId::new("XX:XX")).await.unwrap();
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod fanout;
pub mod handle;
pub mod intents;
pub mod service;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use fanout::{ActivityPublisher, NoopNotifier, NoopPublisher, PresenceUpdate, SpoolNotifier};
pub use handle::{DeviceHandle, ServiceClosed, ServiceCommand};
pub use intents::{LocalMotorRequests, MotorRequest, MotorRequests, NullMotorRequests};
pub use service::{DeviceService, DeviceServiceBuilder, ServiceSnapshot};
