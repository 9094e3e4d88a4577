use super::TopologyOperation;
use crate::error::SyncError;
use crate::model::{DeviceConfiguration, PendingTopologyChange};
use std::fmt;

/// One device whose handshake ended in the failed state
#[derive(Debug)]
pub struct DeviceFailure {
    pub device_id: String,
    pub operation: TopologyOperation,
    pub error: SyncError,
}

/// Outcome of the final master push
#[derive(Debug)]
pub enum MasterSave {
    Saved,
    Failed(SyncError),
}

/// Result of one batch topology change against a master
///
/// Device handshakes are independent, so a report can carry successes and
/// failures side by side. `master_config` is what was (or should have been)
/// pushed to the master; it lets a failed save be retried without redoing
/// the device handshakes.
#[derive(Debug)]
pub struct TopologyReport {
    pub master_id: String,
    pub succeeded_adds: Vec<String>,
    pub succeeded_removes: Vec<String>,
    pub failures: Vec<DeviceFailure>,
    /// Requested ids that needed no handshake, e.g. already attached
    pub skipped: Vec<String>,
    pub master_config: DeviceConfiguration,
    pub master_save: MasterSave,
}

impl TopologyReport {
    pub fn failed_device_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.device_id.as_str()).collect()
    }

    /// Slave list recorded in the master after this batch
    pub fn master_slaves(&self) -> &[String] {
        &self.master_config.slave_device_ids
    }

    pub fn master_save_failed(&self) -> bool {
        matches!(self.master_save, MasterSave::Failed(_))
    }

    /// The batch only succeeds when the master push went through.
    pub fn is_success(&self) -> bool {
        !self.master_save_failed()
    }

    pub fn is_complete_success(&self) -> bool {
        self.is_success() && self.failures.is_empty()
    }

    /// Pending change containing only the device edits that failed
    pub fn retry_change(&self) -> PendingTopologyChange {
        let mut change = PendingTopologyChange::new();
        for failure in &self.failures {
            match failure.operation {
                TopologyOperation::Attach => change.toggle_add(&failure.device_id, true),
                TopologyOperation::Detach => change.toggle_remove(&failure.device_id, true),
            }
        }
        change
    }

    pub fn summary(&self) -> String {
        let changed = self.succeeded_adds.len() + self.succeeded_removes.len();
        match (&self.master_save, self.failures.is_empty()) {
            (MasterSave::Saved, true) => format!(
                "master {} saved with {} slave(s), {} device(s) updated",
                self.master_id,
                self.master_slaves().len(),
                changed
            ),
            (MasterSave::Saved, false) => format!(
                "master {} saved, {} device(s) updated, {} failed: {}",
                self.master_id,
                changed,
                self.failures.len(),
                self.failed_device_ids().join(", ")
            ),
            (MasterSave::Failed(_), _) => {
                "devices updated individually but master topology save failed; retry master save"
                    .to_string()
            }
        }
    }
}

impl fmt::Display for TopologyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for id in &self.succeeded_adds {
            writeln!(f, "  + {}", id)?;
        }
        for id in &self.succeeded_removes {
            writeln!(f, "  - {}", id)?;
        }
        for failure in &self.failures {
            writeln!(
                f,
                "  ! {} {} failed ({}): {}",
                failure.operation,
                failure.device_id,
                failure.error.kind(),
                failure.error
            )?;
        }
        for id in &self.skipped {
            writeln!(f, "  = {} skipped", id)?;
        }
        if let MasterSave::Failed(error) = &self.master_save {
            writeln!(f, "  ! master save: {}", error)?;
        }
        Ok(())
    }
}
