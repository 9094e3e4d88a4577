use super::DeviceConfiguration;
use std::collections::BTreeSet;

/// Topology edits collected while a configuration screen is open
///
/// Created empty, mutated by checkbox toggles, consumed on submit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTopologyChange {
    pub to_add: BTreeSet<String>,
    pub to_remove: BTreeSet<String>,
}

impl PendingTopologyChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lists<A, R>(to_add: A, to_remove: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            to_add: to_add.into_iter().map(Into::into).collect(),
            to_remove: to_remove.into_iter().map(Into::into).collect(),
        }
    }

    /// Candidate checkbox: checked marks the device for adoption.
    pub fn toggle_add(&mut self, device_id: &str, checked: bool) {
        if checked {
            self.to_remove.remove(device_id);
            self.to_add.insert(device_id.to_string());
        } else {
            self.to_add.remove(device_id);
        }
    }

    /// Current-slave checkbox: checked marks the slave for detaching.
    pub fn toggle_remove(&mut self, device_id: &str, checked: bool) {
        if checked {
            self.to_add.remove(device_id);
            self.to_remove.insert(device_id.to_string());
        } else {
            self.to_remove.remove(device_id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }

    pub fn clear(&mut self) {
        self.to_add.clear();
        self.to_remove.clear();
    }

    /// Hands the collected edits to the submitter and leaves this one empty.
    pub fn take(&mut self) -> PendingTopologyChange {
        std::mem::take(self)
    }

    /// Drops edits that make no sense against `master`.
    ///
    /// The master itself and devices already attached are never add candidates;
    /// only current slaves can be removed.
    pub fn normalize(&mut self, master: &DeviceConfiguration) {
        let current: BTreeSet<&str> = master.slave_device_ids.iter().map(String::as_str).collect();
        let master_id = master.id().to_string();

        self.to_add
            .retain(|id| !id.is_empty() && *id != master_id && !current.contains(id.as_str()));
        self.to_remove.retain(|id| current.contains(id.as_str()));
    }
}
