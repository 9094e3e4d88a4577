//! # Topology State Machine
//!
//! Re-parents devices under a master. Each device runs its own
//! [`Handshake`]; the [`TopologyCoordinator`] runs them one after another,
//! isolates their failures, and finally saves the master's slave list.
//!
//! The master is saved with the devices that actually succeeded, so the
//! master record never claims a slave that refused the change.

pub mod handshake;
pub mod report;

pub use handshake::{run_attach, run_detach, Handshake, HandshakeState, TopologyOperation};
pub use report::{DeviceFailure, MasterSave, TopologyReport};

use crate::device::{DeviceChannel, PushKind};
use crate::error::SyncError;
use crate::model::{DeviceConfiguration, DeviceMode, PendingTopologyChange};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct TopologyCoordinator {
    channel: Arc<DeviceChannel>,
}

impl TopologyCoordinator {
    pub fn new(channel: Arc<DeviceChannel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Arc<DeviceChannel> {
        &self.channel
    }

    pub async fn attach(&self, master_id: &str, device_id: &str) -> Result<(), SyncError> {
        run_attach(self.channel.clone(), master_id, device_id).await?;
        Ok(())
    }

    pub async fn detach(&self, master_id: &str, device_id: &str) -> Result<(), SyncError> {
        run_detach(self.channel.clone(), master_id, device_id).await?;
        Ok(())
    }

    /// Applies a batch of adds and removes to `master_id`.
    ///
    /// Only the initial master fetch and batch-wide preconditions yield `Err`;
    /// per-device failures and a failed master save are recorded in the report.
    pub async fn apply_topology_change<A, R>(
        &self,
        master_id: &str,
        to_add: A,
        to_remove: R,
    ) -> Result<TopologyReport, SyncError>
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        self.apply_pending(master_id, PendingTopologyChange::from_lists(to_add, to_remove))
            .await
    }

    pub async fn apply_pending(
        &self,
        master_id: &str,
        change: PendingTopologyChange,
    ) -> Result<TopologyReport, SyncError> {
        let master = self.channel.fetch_config(master_id).await?;
        self.apply_to_master(master, change).await
    }

    /// Same as [`apply_pending`](Self::apply_pending) with an already fetched master snapshot.
    pub async fn apply_to_master(
        &self,
        master: DeviceConfiguration,
        change: PendingTopologyChange,
    ) -> Result<TopologyReport, SyncError> {
        let master_id = master.id().to_string();
        if master_id.is_empty() {
            return Err(SyncError::PreconditionViolation {
                device_id: String::new(),
                reason: "master configuration carries no device id".to_string(),
            });
        }

        let requested: Vec<String> = change
            .to_add
            .iter()
            .chain(change.to_remove.iter())
            .cloned()
            .collect();
        let mut normalized = change;
        normalized.normalize(&master);
        let skipped: Vec<String> = requested
            .into_iter()
            .filter(|id| !normalized.to_add.contains(id) && !normalized.to_remove.contains(id))
            .collect();

        if master.mode() == DeviceMode::Slave {
            return Err(SyncError::PreconditionViolation {
                device_id: master_id,
                reason: format!(
                    "device is itself a slave of {}",
                    master.master_device_id.as_deref().unwrap_or("an unknown master")
                ),
            });
        }

        info!(
            "Topology change on {}: {} add(s), {} remove(s), {} skipped",
            master_id,
            normalized.to_add.len(),
            normalized.to_remove.len(),
            skipped.len()
        );

        let mut succeeded_adds = Vec::new();
        let mut succeeded_removes = Vec::new();
        let mut failures = Vec::new();

        for device_id in &normalized.to_add {
            match run_attach(self.channel.clone(), &master_id, device_id).await {
                Ok(_) => succeeded_adds.push(device_id.clone()),
                Err(error) => {
                    warn!("[{}] attach failed: {}", device_id, error);
                    failures.push(DeviceFailure {
                        device_id: device_id.clone(),
                        operation: TopologyOperation::Attach,
                        error,
                    });
                }
            }
        }

        for device_id in &normalized.to_remove {
            match run_detach(self.channel.clone(), &master_id, device_id).await {
                Ok(_) => succeeded_removes.push(device_id.clone()),
                Err(error) => {
                    warn!("[{}] detach failed: {}", device_id, error);
                    failures.push(DeviceFailure {
                        device_id: device_id.clone(),
                        operation: TopologyOperation::Detach,
                        error,
                    });
                }
            }
        }

        let mut master_config = master;
        let mut slaves = master_config.slave_device_ids.clone();
        for id in &succeeded_adds {
            if !slaves.contains(id) {
                slaves.push(id.clone());
            }
        }
        slaves.retain(|id| !succeeded_removes.contains(id));
        master_config.slave_device_ids = slaves;
        master_config.device_mode = Some(DeviceMode::Master);
        master_config.master_device_id = None;

        let master_save = match self.save_master(&master_config).await {
            Ok(()) => MasterSave::Saved,
            Err(error) => {
                error!("Saving topology of master {} failed: {}", master_id, error);
                MasterSave::Failed(error)
            }
        };

        let report = TopologyReport {
            master_id,
            succeeded_adds,
            succeeded_removes,
            failures,
            skipped,
            master_config,
            master_save,
        };
        info!("{}", report.summary());
        Ok(report)
    }

    /// Pushes the master's slave list with the master-topology retry budget.
    pub async fn save_master(&self, master: &DeviceConfiguration) -> Result<(), SyncError> {
        if let Err(reason) = master.check_topology() {
            return Err(SyncError::PreconditionViolation {
                device_id: master.id().to_string(),
                reason,
            });
        }
        self.channel
            .push_config(master, PushKind::MasterTopology)
            .await
    }

    /// Re-sends the master record of a report whose save failed.
    pub async fn retry_master_save(&self, report: &mut TopologyReport) -> Result<(), SyncError> {
        if !report.master_save_failed() {
            return Ok(());
        }
        self.save_master(&report.master_config).await?;
        report.master_save = MasterSave::Saved;
        info!("Master {} saved on retry", report.master_id);
        Ok(())
    }
}
