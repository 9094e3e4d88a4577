//! Per-device re-parenting handshake with compile-time state safety via statum
//!
//! ```text
//! attach: FetchingTargetConfig ──► Validating ──► Mutating ──► Pushing ──► AwaitingAck ──► Succeeded
//! detach: FetchingSlaveConfig  ──────────────────► Mutating ──► Pushing ──► AwaitingAck ──► Succeeded
//! ```
//!
//! Every fallible step returns `Result<next state, SyncError>`; an `Err` is the
//! FAILED terminal state. Attach fetches from the candidate itself, detach
//! fetches the slave's record through its master.

use crate::device::{Ack, DeviceChannel, PushKind};
use crate::error::SyncError;
use crate::model::DeviceConfiguration;
use statum::{machine, state};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyOperation {
    Attach,
    Detach,
}

impl fmt::Display for TopologyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyOperation::Attach => write!(f, "attach"),
            TopologyOperation::Detach => write!(f, "detach"),
        }
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum HandshakeState {
    FetchingTargetConfig,
    FetchingSlaveConfig,
    Validating(DeviceConfiguration),
    Mutating(DeviceConfiguration),
    Pushing(DeviceConfiguration),
    AwaitingAck(Ack),
    Succeeded,
}

#[machine]
pub struct Handshake<S: HandshakeState> {
    channel: Arc<DeviceChannel>,
    operation: TopologyOperation,
    master_id: String,
    device_id: String,
}

impl<S: HandshakeState> Handshake<S> {
    pub fn operation(&self) -> TopologyOperation {
        self.operation
    }

    pub fn master_id(&self) -> &str {
        &self.master_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn lost_snapshot(&self) -> SyncError {
        SyncError::PreconditionViolation {
            device_id: self.device_id.clone(),
            reason: "handshake lost its configuration snapshot".to_string(),
        }
    }
}

impl Handshake<FetchingTargetConfig> {
    pub fn attach(channel: Arc<DeviceChannel>, master_id: &str, device_id: &str) -> Self {
        info!("Attaching {} to master {}", device_id, master_id);
        Self::new(
            channel,
            TopologyOperation::Attach,
            master_id.to_string(),
            device_id.to_string(),
        )
    }

    /// Requests the candidate's configuration from the candidate itself.
    pub async fn fetch_target(self) -> Result<Handshake<Validating>, SyncError> {
        debug!("[{}] fetching target configuration", self.device_id);
        let config = self.channel.fetch_config(&self.device_id).await?;
        Ok(self.transition_with(config))
    }
}

impl Handshake<FetchingSlaveConfig> {
    pub fn detach(channel: Arc<DeviceChannel>, master_id: &str, device_id: &str) -> Self {
        info!("Detaching {} from master {}", device_id, master_id);
        Self::new(
            channel,
            TopologyOperation::Detach,
            master_id.to_string(),
            device_id.to_string(),
        )
    }

    /// Requests the slave's configuration through the master's topic.
    pub async fn fetch_via_master(self) -> Result<Handshake<Mutating>, SyncError> {
        debug!(
            "[{}] fetching slave configuration via {}",
            self.device_id, self.master_id
        );
        let config = self
            .channel
            .fetch_slave_config(&self.master_id, &self.device_id)
            .await?;
        Ok(self.transition_with(config))
    }
}

impl Handshake<Validating> {
    /// A device that already owns slaves cannot be adopted. Not retryable.
    pub fn validate(self) -> Result<Handshake<Mutating>, SyncError> {
        let config = match self.get_state_data() {
            Some(config) => config.clone(),
            None => return Err(self.lost_snapshot()),
        };

        if config.has_slaves() {
            warn!(
                "[{}] refusing adoption: already master of {}",
                self.device_id,
                config.slave_device_ids.join(", ")
            );
            return Err(SyncError::PreconditionViolation {
                device_id: self.device_id.clone(),
                reason: format!(
                    "device already owns {} slave(s): {}",
                    config.slave_device_ids.len(),
                    config.slave_device_ids.join(", ")
                ),
            });
        }
        if self.device_id == self.master_id {
            return Err(SyncError::PreconditionViolation {
                device_id: self.device_id.clone(),
                reason: "a device cannot be its own slave".to_string(),
            });
        }

        debug!("[{}] preconditions hold", self.device_id);
        Ok(self.transition_with(config))
    }
}

impl Handshake<Mutating> {
    pub fn mutate(self) -> Result<Handshake<Pushing>, SyncError> {
        let mut config = match self.get_state_data() {
            Some(config) => config.clone(),
            None => return Err(self.lost_snapshot()),
        };

        match self.operation {
            TopologyOperation::Attach => config.attach_to(&self.master_id),
            TopologyOperation::Detach => config.detach(),
        }
        debug!(
            "[{}] mutated for {}: mode {:?}, master {:?}",
            self.device_id, self.operation, config.device_mode, config.master_device_id
        );
        Ok(self.transition_with(config))
    }
}

impl Handshake<Pushing> {
    pub async fn push(self) -> Result<Handshake<AwaitingAck>, SyncError> {
        let config = match self.get_state_data() {
            Some(config) => config.clone(),
            None => return Err(self.lost_snapshot()),
        };

        let ack = self.channel.send_config(&config, PushKind::Device).await?;
        debug!("[{}] push resolved with {:?}", self.device_id, ack);
        Ok(self.transition_with(ack))
    }
}

impl Handshake<AwaitingAck> {
    /// A rejection or a missing acknowledgement ends the handshake as failed.
    pub fn await_ack(self) -> Result<Handshake<Succeeded>, SyncError> {
        let ack = self.get_state_data().copied().unwrap_or(Ack::Timeout);
        self.channel
            .expect_accepted(&self.device_id, ack, PushKind::Device)?;

        info!(
            "[{}] {} to {} succeeded",
            self.device_id, self.operation, self.master_id
        );
        Ok(self.transition())
    }
}

/// Runs the full attach handshake for one device.
pub async fn run_attach(
    channel: Arc<DeviceChannel>,
    master_id: &str,
    device_id: &str,
) -> Result<Handshake<Succeeded>, SyncError> {
    let validating = Handshake::attach(channel, master_id, device_id)
        .fetch_target()
        .await?;
    let pushing = validating.validate()?.mutate()?;
    pushing.push().await?.await_ack()
}

/// Runs the full detach handshake for one device.
pub async fn run_detach(
    channel: Arc<DeviceChannel>,
    master_id: &str,
    device_id: &str,
) -> Result<Handshake<Succeeded>, SyncError> {
    let mutating = Handshake::detach(channel, master_id, device_id)
        .fetch_via_master()
        .await?;
    let pushing = mutating.mutate()?;
    pushing.push().await?.await_ack()
}
