//! Device configuration synchronization over MQTT
//!
//! Fetches, edits and pushes protobuf-encoded device configurations and
//! negotiates master/slave topology changes with request/response
//! correlation on top of a publish/subscribe transport.

pub mod codec;
pub mod config;
pub mod correlator;
pub mod device;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod topics;
pub mod topology;
pub mod transport;

pub use config::SyncConfig;
pub use correlator::{CallOptions, Correlator, Resolution};
pub use device::{Ack, ConfigResponse, DeviceChannel, PushKind};
pub use error::SyncError;
pub use model::{
    DeviceConfiguration, DeviceMode, PendingTopologyChange, SensorKind, ThresholdConfig,
    ValueSource,
};
pub use topology::{TopologyCoordinator, TopologyReport};
pub use transport::{MemoryTransport, MqttTransport, Transport};
