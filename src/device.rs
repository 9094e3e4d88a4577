//! Typed access to one device's configuration over the correlator
//!
//! Raw replies are decoded exactly once here; everything above this layer
//! works with [`ConfigResponse`] and [`Ack`] instead of inspecting payloads.

use crate::codec;
use crate::config::CorrelationConfig;
use crate::correlator::{CallOptions, Correlator, Resolution};
use crate::error::SyncError;
use crate::model::DeviceConfiguration;
use crate::reconcile::{self, ConfigEdit};
use crate::topics;
use crate::transport::{handler, Transport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const ACK_MARKER: &str = "OK";
const DATA_FEED_CAPACITY: usize = 100;

/// Decoded reply to a configuration fetch
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigResponse {
    Success(DeviceConfiguration),
    Failure,
    Timeout,
}

/// Decoded reply to a configuration push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Accepted,
    Rejected,
    Timeout,
}

impl Ack {
    fn from_resolution(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Success(reply) if reply.contains(ACK_MARKER) => Ack::Accepted,
            Resolution::Success(reply) => {
                warn!("Unrecognised acknowledgement {:?}, treating as rejection", reply);
                Ack::Rejected
            }
            Resolution::Failure => Ack::Rejected,
            Resolution::Timeout => Ack::Timeout,
        }
    }
}

/// Which retry budget a push uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Device,
    MasterTopology,
}

pub struct DeviceChannel {
    correlator: Correlator,
    correlation: CorrelationConfig,
}

impl DeviceChannel {
    pub fn new(transport: Arc<dyn Transport>, correlation: CorrelationConfig) -> Self {
        Self {
            correlator: Correlator::new(transport),
            correlation,
        }
    }

    pub fn correlation(&self) -> &CorrelationConfig {
        &self.correlation
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        self.correlator.transport()
    }

    fn push_options(&self, kind: PushKind) -> &CallOptions {
        match kind {
            PushKind::Device => &self.correlation.push,
            PushKind::MasterTopology => &self.correlation.master_push,
        }
    }

    /// Asks `via` for the configuration of `target`.
    ///
    /// `via` is `target` itself for a direct fetch, or the master when
    /// addressing a slave through it.
    pub async fn request_config(&self, target: &str, via: &str) -> Result<ConfigResponse, SyncError> {
        let request_topic = topics::config_fetch_topic(via);
        let response_topic = topics::config_fetch_response_topic(via);
        let payload = codec::to_transport_envelope(target.as_bytes());

        debug!("Fetching configuration of {} via {}", target, via);
        let resolution = self
            .correlator
            .call(&request_topic, &response_topic, &payload, &self.correlation.fetch)
            .await?;

        match resolution {
            Resolution::Success(reply) => {
                let mut config = codec::decode_envelope(&reply)?;
                let reported = config.device_id.clone().unwrap_or_default();
                if reported.is_empty() {
                    config.device_id = Some(target.to_string());
                } else if reported != target {
                    return Err(SyncError::PreconditionViolation {
                        device_id: target.to_string(),
                        reason: format!(
                            "reply on {} describes device {}",
                            response_topic, reported
                        ),
                    });
                }
                Ok(ConfigResponse::Success(config))
            }
            Resolution::Failure => Ok(ConfigResponse::Failure),
            Resolution::Timeout => Ok(ConfigResponse::Timeout),
        }
    }

    /// Fetches a fresh configuration snapshot straight from the device.
    pub async fn fetch_config(&self, device_id: &str) -> Result<DeviceConfiguration, SyncError> {
        self.fetch_via(device_id, device_id).await
    }

    /// Fetches a slave's configuration through its master's topic.
    pub async fn fetch_slave_config(
        &self,
        master_id: &str,
        slave_id: &str,
    ) -> Result<DeviceConfiguration, SyncError> {
        self.fetch_via(slave_id, master_id).await
    }

    async fn fetch_via(&self, target: &str, via: &str) -> Result<DeviceConfiguration, SyncError> {
        match self.request_config(target, via).await? {
            ConfigResponse::Success(config) => Ok(config),
            ConfigResponse::Failure => Err(SyncError::CorrelationFailure {
                topic: topics::config_fetch_response_topic(via),
            }),
            ConfigResponse::Timeout => Err(SyncError::CorrelationTimeout {
                topic: topics::config_fetch_response_topic(via),
                attempts: self.correlation.fetch.max_attempts,
            }),
        }
    }

    /// Pushes `config` to the device it names and returns the decoded acknowledgement.
    pub async fn send_config(
        &self,
        config: &DeviceConfiguration,
        kind: PushKind,
    ) -> Result<Ack, SyncError> {
        let device_id = config.id();
        if device_id.is_empty() {
            return Err(SyncError::PreconditionViolation {
                device_id: String::new(),
                reason: "configuration carries no device id".to_string(),
            });
        }

        let request_topic = topics::config_push_topic(device_id);
        let response_topic = topics::config_push_ack_topic(device_id);
        let payload = codec::encode_envelope(config);

        debug!("Pushing configuration to {} ({:?})", device_id, kind);
        let resolution = self
            .correlator
            .call(&request_topic, &response_topic, &payload, self.push_options(kind))
            .await?;
        Ok(Ack::from_resolution(resolution))
    }

    /// Pushes `config` and maps anything but an acceptance to an error.
    pub async fn push_config(
        &self,
        config: &DeviceConfiguration,
        kind: PushKind,
    ) -> Result<(), SyncError> {
        let ack = self.send_config(config, kind).await?;
        self.expect_accepted(config.id(), ack, kind)
    }

    pub(crate) fn expect_accepted(
        &self,
        device_id: &str,
        ack: Ack,
        kind: PushKind,
    ) -> Result<(), SyncError> {
        match ack {
            Ack::Accepted => Ok(()),
            Ack::Rejected => Err(SyncError::CorrelationFailure {
                topic: topics::config_push_ack_topic(device_id),
            }),
            Ack::Timeout => Err(SyncError::CorrelationTimeout {
                topic: topics::config_push_ack_topic(device_id),
                attempts: self.push_options(kind).max_attempts,
            }),
        }
    }

    /// Fetch, edit through the reconciler, push. Returns what was pushed.
    pub async fn apply_edits(
        &self,
        device_id: &str,
        edits: &[ConfigEdit],
    ) -> Result<DeviceConfiguration, SyncError> {
        let current = self.fetch_config(device_id).await?;
        let next = reconcile::apply_edits(&current, edits);

        if next == current {
            info!("Edits leave {} unchanged, nothing to push", device_id);
            return Ok(next);
        }

        self.push_config(&next, PushKind::Device).await?;
        info!("Applied {} edit(s) to {}", edits.len(), device_id);
        Ok(next)
    }

    /// Streams raw payloads from the device's data topic.
    ///
    /// Messages are dropped when the receiver falls behind.
    pub async fn watch_data(&self, device_id: &str) -> Result<mpsc::Receiver<String>, SyncError> {
        let topic = topics::data_topic(device_id);
        let (tx, rx) = mpsc::channel(DATA_FEED_CAPACITY);

        self.transport()
            .subscribe(
                &topic,
                handler(move |topic, payload| {
                    if tx.try_send(payload.to_string()).is_err() {
                        debug!("Data feed for {} is full or closed, dropping message", topic);
                    }
                }),
            )
            .await?;
        info!("Watching {}", topic);
        Ok(rx)
    }

    pub async fn unwatch_data(&self, device_id: &str) -> Result<(), SyncError> {
        self.transport()
            .unsubscribe(&topics::data_topic(device_id))
            .await?;
        Ok(())
    }
}
