//! Protobuf messages as the device firmware decodes them
//!
//! Every scalar is proto3 `optional` so unset fields never reach the wire.

use std::collections::BTreeMap;

#[derive(Clone, PartialEq, prost::Message)]
pub struct WireThresholdConfig {
    #[prost(float, optional, tag = "1")]
    pub upper_threshold: Option<f32>,
    #[prost(float, optional, tag = "2")]
    pub lower_threshold: Option<f32>,
    #[prost(bool, optional, tag = "3")]
    pub upper_enabled: Option<bool>,
    #[prost(bool, optional, tag = "4")]
    pub lower_enabled: Option<bool>,
    /// 0 = raw, 1 = window average, 2 = window max
    #[prost(uint32, optional, tag = "5")]
    pub value_source: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WireDeviceConfig {
    #[prost(string, optional, tag = "1")]
    pub device_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub wifi_ssid: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub wifi_password: Option<String>,
    /// 0 = master, 1 = slave
    #[prost(uint32, optional, tag = "4")]
    pub device_mode: Option<u32>,
    #[prost(string, repeated, tag = "5")]
    pub slave_device_ids: Vec<String>,
    #[prost(string, optional, tag = "6")]
    pub master_device_id: Option<String>,
    /// Keyed by sensor kind
    #[prost(btree_map = "uint32, message", tag = "7")]
    pub thresholds: BTreeMap<u32, WireThresholdConfig>,
    #[prost(bool, optional, tag = "8")]
    pub pir_sensor_enabled: Option<bool>,
    #[prost(bool, optional, tag = "9")]
    pub pwm_enabled: Option<bool>,
    #[prost(float, optional, tag = "10")]
    pub light_pwm_target: Option<f32>,
}
