//! # Binary Codec
//!
//! Lossless conversion between [`DeviceConfiguration`] and the protobuf wire
//! format the device firmware decodes, plus the base64 envelope used on the bus.
//!
//! ```text
//! DeviceConfiguration ──► WireDeviceConfig ──► protobuf bytes ──► base64 text
//!                     ◄──                  ◄──                ◄──
//! ```
//!
//! Only fields that are set are written. Unknown fields and unknown sensor-kind
//! keys are skipped on decode so newer firmware can add fields freely.

pub mod envelope;
pub mod wire;

pub use envelope::{from_transport_envelope, to_transport_envelope};
pub use wire::{WireDeviceConfig, WireThresholdConfig};

use crate::model::{DeviceConfiguration, DeviceMode, SensorKind, ThresholdConfig, ValueSource};
use prost::Message;
use tracing::debug;

/// Errors raised while decoding wire data. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Bytes are not a valid protobuf message
    #[error("malformed configuration message: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Text payload is not valid base64
    #[error("malformed transport envelope: {0}")]
    Envelope(#[from] base64::DecodeError),

    /// An enum field carries a value outside its closed set
    #[error("invalid value {value} for field {field}")]
    InvalidEnum { field: &'static str, value: u32 },
}

pub fn encode(config: &DeviceConfiguration) -> Vec<u8> {
    WireDeviceConfig::from(config).encode_to_vec()
}

pub fn decode(bytes: &[u8]) -> Result<DeviceConfiguration, CodecError> {
    let wire = WireDeviceConfig::decode(bytes)?;
    DeviceConfiguration::try_from(wire)
}

/// Encodes and wraps a configuration for publishing.
pub fn encode_envelope(config: &DeviceConfiguration) -> String {
    to_transport_envelope(&encode(config))
}

/// Unwraps and decodes a configuration received from the bus.
pub fn decode_envelope(text: &str) -> Result<DeviceConfiguration, CodecError> {
    let bytes = from_transport_envelope(text)?;
    decode(&bytes)
}

impl From<&ThresholdConfig> for WireThresholdConfig {
    fn from(threshold: &ThresholdConfig) -> Self {
        Self {
            upper_threshold: threshold.upper_threshold,
            lower_threshold: threshold.lower_threshold,
            upper_enabled: threshold.upper_enabled,
            lower_enabled: threshold.lower_enabled,
            value_source: threshold.value_source.map(ValueSource::wire_value),
        }
    }
}

impl TryFrom<WireThresholdConfig> for ThresholdConfig {
    type Error = CodecError;

    fn try_from(wire: WireThresholdConfig) -> Result<Self, Self::Error> {
        let value_source = match wire.value_source {
            Some(raw) => Some(ValueSource::from_wire(raw).ok_or(CodecError::InvalidEnum {
                field: "value_source",
                value: raw,
            })?),
            None => None,
        };

        Ok(Self {
            upper_threshold: wire.upper_threshold,
            lower_threshold: wire.lower_threshold,
            upper_enabled: wire.upper_enabled,
            lower_enabled: wire.lower_enabled,
            value_source,
        })
    }
}

impl From<&DeviceConfiguration> for WireDeviceConfig {
    fn from(config: &DeviceConfiguration) -> Self {
        Self {
            device_id: config.device_id.clone(),
            wifi_ssid: config.wifi_ssid.clone(),
            wifi_password: config.wifi_password.clone(),
            device_mode: config.device_mode.map(DeviceMode::wire_value),
            slave_device_ids: config.slave_device_ids.clone(),
            master_device_id: config.master_device_id.clone(),
            thresholds: config
                .thresholds
                .iter()
                .map(|(kind, threshold)| (kind.wire_value(), WireThresholdConfig::from(threshold)))
                .collect(),
            pir_sensor_enabled: config.pir_sensor_enabled,
            pwm_enabled: config.pwm_enabled,
            light_pwm_target: config.light_pwm_target,
        }
    }
}

impl TryFrom<WireDeviceConfig> for DeviceConfiguration {
    type Error = CodecError;

    fn try_from(wire: WireDeviceConfig) -> Result<Self, Self::Error> {
        let device_mode = match wire.device_mode {
            Some(raw) => Some(DeviceMode::from_wire(raw).ok_or(CodecError::InvalidEnum {
                field: "device_mode",
                value: raw,
            })?),
            None => None,
        };

        let mut thresholds = std::collections::BTreeMap::new();
        for (key, threshold) in wire.thresholds {
            match SensorKind::from_wire(key) {
                Some(kind) => {
                    thresholds.insert(kind, ThresholdConfig::try_from(threshold)?);
                }
                None => debug!("Skipping thresholds for unknown sensor kind {}", key),
            }
        }

        Ok(Self {
            device_id: wire.device_id,
            wifi_ssid: wire.wifi_ssid,
            wifi_password: wire.wifi_password,
            device_mode,
            slave_device_ids: wire.slave_device_ids,
            master_device_id: wire.master_device_id,
            pir_sensor_enabled: wire.pir_sensor_enabled,
            light_pwm_target: wire.light_pwm_target,
            pwm_enabled: wire.pwm_enabled,
            thresholds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> DeviceConfiguration {
        let mut config = DeviceConfiguration::for_device("dev-A");
        config.wifi_ssid = Some("greenhouse".into());
        config.wifi_password = Some("s3cret".into());
        config.device_mode = Some(DeviceMode::Master);
        config.slave_device_ids = vec!["dev-B".into(), "dev-C".into()];
        config.pir_sensor_enabled = Some(true);
        config.light_pwm_target = Some(62.5);
        config.pwm_enabled = Some(false);
        config.thresholds.insert(
            SensorKind::SoilMoisture,
            ThresholdConfig {
                upper_threshold: Some(70.0),
                lower_threshold: Some(30.0),
                upper_enabled: Some(true),
                lower_enabled: Some(true),
                value_source: Some(ValueSource::WindowAverage),
            },
        );
        config.thresholds.insert(
            SensorKind::Co2,
            ThresholdConfig {
                upper_threshold: Some(1200.0),
                ..Default::default()
            },
        );
        config
    }

    #[test]
    fn round_trip_full_and_sparse_configs() {
        let sparse = DeviceConfiguration::default();
        let mut slave = DeviceConfiguration::for_device("dev-B");
        slave.attach_to("dev-A");

        for config in [full_config(), sparse, slave] {
            let decoded = decode(&encode(&config)).unwrap();
            assert_eq!(decoded, config);
        }
    }

    #[test]
    fn empty_config_encodes_to_nothing() {
        assert!(encode(&DeviceConfiguration::default()).is_empty());
    }

    #[test]
    fn unset_fields_are_not_defaulted() {
        let config = DeviceConfiguration::for_device("dev-A");
        let decoded = decode(&encode(&config)).unwrap();
        assert_eq!(decoded.pwm_enabled, None);
        assert_eq!(decoded.device_mode, None);
        assert!(decoded.thresholds.is_empty());
    }

    #[test]
    fn envelope_round_trip() {
        let config = full_config();
        let text = encode_envelope(&config);
        assert_eq!(decode_envelope(&text).unwrap(), config);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        // field 1, length-delimited, claims 10 bytes but only 2 follow
        let err = decode(&[0x0a, 0x0a, 0x41, 0x42]).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn unknown_fields_and_sensor_kinds_are_ignored() {
        let mut wire = WireDeviceConfig::from(&full_config());
        wire.thresholds.insert(42, WireThresholdConfig::default());
        let mut bytes = wire.encode_to_vec();
        // field 99, varint 1
        bytes.extend_from_slice(&[0x98, 0x06, 0x01]);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, full_config());
    }

    #[test]
    fn out_of_range_mode_is_rejected() {
        let wire = WireDeviceConfig {
            device_mode: Some(9),
            ..Default::default()
        };
        let err = decode(&wire.encode_to_vec()).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidEnum {
                field: "device_mode",
                value: 9
            }
        ));
    }
}
