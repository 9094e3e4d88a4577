//! # Device Configuration Model
//!
//! Typed, in-memory view of the configuration a device persists and exchanges
//! over the wire. Every field mirrors an optional wire field: `None` means the
//! device did not report it and it will not be sent back.
//!
//! Snapshots are owned by whichever handshake step currently holds them; there
//! is no shared cache. Each fetch produces a fresh `DeviceConfiguration`.

pub mod pending;

pub use pending::PendingTopologyChange;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Role of a device in the master/slave topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    Master,
    Slave,
}

impl DeviceMode {
    pub fn wire_value(self) -> u32 {
        match self {
            DeviceMode::Master => 0,
            DeviceMode::Slave => 1,
        }
    }

    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(DeviceMode::Master),
            1 => Some(DeviceMode::Slave),
            _ => None,
        }
    }
}

/// Closed set of sensors a device can carry thresholds for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    TempHumidity,
    Light,
    Co2,
    SoilMoisture,
}

impl SensorKind {
    pub const ALL: [SensorKind; 4] = [
        SensorKind::TempHumidity,
        SensorKind::Light,
        SensorKind::Co2,
        SensorKind::SoilMoisture,
    ];

    /// Key used in the wire-level threshold map
    pub fn wire_value(self) -> u32 {
        match self {
            SensorKind::TempHumidity => 0,
            SensorKind::Light => 1,
            SensorKind::Co2 => 2,
            SensorKind::SoilMoisture => 3,
        }
    }

    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(SensorKind::TempHumidity),
            1 => Some(SensorKind::Light),
            2 => Some(SensorKind::Co2),
            3 => Some(SensorKind::SoilMoisture),
            _ => None,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::TempHumidity => write!(f, "temp_humidity"),
            SensorKind::Light => write!(f, "light"),
            SensorKind::Co2 => write!(f, "co2"),
            SensorKind::SoilMoisture => write!(f, "soil_moisture"),
        }
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "temp_humidity" | "temp" | "humidity" => Ok(SensorKind::TempHumidity),
            "light" => Ok(SensorKind::Light),
            "co2" => Ok(SensorKind::Co2),
            "soil_moisture" | "soil" => Ok(SensorKind::SoilMoisture),
            other => Err(format!("unknown sensor kind: {}", other)),
        }
    }
}

/// Which reading a threshold is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    Raw,
    WindowAverage,
    WindowMax,
}

impl ValueSource {
    pub fn wire_value(self) -> u32 {
        match self {
            ValueSource::Raw => 0,
            ValueSource::WindowAverage => 1,
            ValueSource::WindowMax => 2,
        }
    }

    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(ValueSource::Raw),
            1 => Some(ValueSource::WindowAverage),
            2 => Some(ValueSource::WindowMax),
            _ => None,
        }
    }
}

impl FromStr for ValueSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(ValueSource::Raw),
            "window_average" | "average" | "avg" => Ok(ValueSource::WindowAverage),
            "window_max" | "max" => Ok(ValueSource::WindowMax),
            other => Err(format!("unknown value source: {}", other)),
        }
    }
}

/// Per-sensor alarm thresholds
///
/// For soil moisture the lower threshold switches irrigation on and the upper
/// one switches it off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_source: Option<ValueSource>,
}

impl ThresholdConfig {
    pub fn is_upper_enabled(&self) -> bool {
        self.upper_enabled.unwrap_or(false)
    }

    pub fn is_lower_enabled(&self) -> bool {
        self.lower_enabled.unwrap_or(false)
    }
}

/// Canonical configuration of one device as exchanged with its firmware
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_ssid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_mode: Option<DeviceMode>,
    /// Only meaningful for masters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slave_device_ids: Vec<String>,
    /// Only meaningful for slaves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pir_sensor_enabled: Option<bool>,
    /// PWM duty target for the grow light, 0..=100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_pwm_target: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pwm_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<SensorKind, ThresholdConfig>,
}

impl DeviceConfiguration {
    pub fn for_device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        self.device_id.as_deref().unwrap_or("")
    }

    /// Devices that never reported a mode are treated as standalone masters.
    pub fn mode(&self) -> DeviceMode {
        self.device_mode.unwrap_or(DeviceMode::Master)
    }

    pub fn is_pwm_enabled(&self) -> bool {
        self.pwm_enabled.unwrap_or(false)
    }

    pub fn has_slaves(&self) -> bool {
        !self.slave_device_ids.is_empty()
    }

    pub fn has_master(&self) -> bool {
        self.master_device_id
            .as_deref()
            .is_some_and(|master| !master.is_empty())
    }

    pub fn threshold(&self, kind: SensorKind) -> Option<&ThresholdConfig> {
        self.thresholds.get(&kind)
    }

    /// Re-parents this device under `master_id`.
    pub fn attach_to(&mut self, master_id: &str) {
        self.master_device_id = Some(master_id.to_string());
        self.device_mode = Some(DeviceMode::Slave);
        self.slave_device_ids.clear();
    }

    /// Turns a slave back into a standalone master.
    pub fn detach(&mut self) {
        self.master_device_id = None;
        self.device_mode = Some(DeviceMode::Master);
    }

    /// Checks the mode/topology invariant: slaves own nothing, masters have no master.
    pub fn check_topology(&self) -> Result<(), String> {
        match self.mode() {
            DeviceMode::Slave if self.has_slaves() => Err(format!(
                "slave {} lists {} slave device(s)",
                self.id(),
                self.slave_device_ids.len()
            )),
            DeviceMode::Master if self.has_master() => Err(format!(
                "master {} still references master {}",
                self.id(),
                self.master_device_id.as_deref().unwrap_or_default()
            )),
            _ => Ok(()),
        }
    }
}
