//! Edit intents coming from the settings screens and the CLI

use crate::model::{SensorKind, ValueSource};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdEdit {
    UpperThreshold(Option<f32>),
    LowerThreshold(Option<f32>),
    UpperEnabled(bool),
    LowerEnabled(bool),
    ValueSource(ValueSource),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEdit {
    PwmEnabled(bool),
    /// Clamped to 0..=100 when applied
    PwmTarget(f32),
    PirSensorEnabled(bool),
    Wifi { ssid: String, password: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEdit {
    Threshold(SensorKind, ThresholdEdit),
    Device(DeviceEdit),
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        other => Err(format!("expected a boolean, got {}", other)),
    }
}

fn parse_level(value: &str) -> Result<Option<f32>, String> {
    if value.eq_ignore_ascii_case("none") || value.is_empty() {
        return Ok(None);
    }
    let level: f32 = value
        .parse()
        .map_err(|_| format!("expected a number, got {}", value))?;
    if level.is_finite() {
        Ok(Some(level))
    } else {
        Err(format!("threshold must be finite, got {}", value))
    }
}

impl ThresholdEdit {
    /// `field` is one of `upper`, `lower`, `upper_enabled`, `lower_enabled`, `source`.
    pub fn parse(field: &str, value: &str) -> Result<Self, String> {
        match field {
            "upper" | "upper_threshold" => Ok(ThresholdEdit::UpperThreshold(parse_level(value)?)),
            "lower" | "lower_threshold" => Ok(ThresholdEdit::LowerThreshold(parse_level(value)?)),
            "upper_enabled" => Ok(ThresholdEdit::UpperEnabled(parse_bool(value)?)),
            "lower_enabled" => Ok(ThresholdEdit::LowerEnabled(parse_bool(value)?)),
            "source" | "value_source" => Ok(ThresholdEdit::ValueSource(value.parse()?)),
            other => Err(format!("unknown threshold field: {}", other)),
        }
    }
}

/// Parses `key=value`, e.g. `soil.lower_enabled=true`, `pwm_target=40`
/// or `wifi=ssid:password`.
impl FromStr for ConfigEdit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got {}", s))?;
        let (key, value) = (key.trim(), value.trim());

        if let Some((sensor, field)) = key.split_once('.') {
            let kind: SensorKind = sensor.parse()?;
            return Ok(ConfigEdit::Threshold(kind, ThresholdEdit::parse(field, value)?));
        }

        let edit = match key {
            "pwm_enabled" | "pwm" => DeviceEdit::PwmEnabled(parse_bool(value)?),
            "pwm_target" | "light_pwm_target" => DeviceEdit::PwmTarget(
                value
                    .parse()
                    .map_err(|_| format!("expected a number, got {}", value))?,
            ),
            "pir" | "pir_sensor_enabled" => DeviceEdit::PirSensorEnabled(parse_bool(value)?),
            "wifi" => {
                let (ssid, password) = value
                    .split_once(':')
                    .ok_or_else(|| "expected wifi=ssid:password".to_string())?;
                DeviceEdit::Wifi {
                    ssid: ssid.to_string(),
                    password: password.to_string(),
                }
            }
            other => return Err(format!("unknown setting: {}", other)),
        };
        Ok(ConfigEdit::Device(edit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_threshold_and_device_edits() {
        assert_eq!(
            "soil.lower_enabled=true".parse::<ConfigEdit>(),
            Ok(ConfigEdit::Threshold(
                SensorKind::SoilMoisture,
                ThresholdEdit::LowerEnabled(true)
            ))
        );
        assert_eq!(
            "light.upper=350.5".parse::<ConfigEdit>(),
            Ok(ConfigEdit::Threshold(
                SensorKind::Light,
                ThresholdEdit::UpperThreshold(Some(350.5))
            ))
        );
        assert_eq!(
            "co2.source=max".parse::<ConfigEdit>(),
            Ok(ConfigEdit::Threshold(
                SensorKind::Co2,
                ThresholdEdit::ValueSource(ValueSource::WindowMax)
            ))
        );
        assert_eq!(
            "pwm=on".parse::<ConfigEdit>(),
            Ok(ConfigEdit::Device(DeviceEdit::PwmEnabled(true)))
        );
        assert_eq!(
            "wifi=greenhouse:p4ss:word".parse::<ConfigEdit>(),
            Ok(ConfigEdit::Device(DeviceEdit::Wifi {
                ssid: "greenhouse".into(),
                password: "p4ss:word".into()
            }))
        );
    }

    #[test]
    fn rejects_malformed_edits() {
        assert!("soil.lower_enabled".parse::<ConfigEdit>().is_err());
        assert!("soil.upper=warm".parse::<ConfigEdit>().is_err());
        assert!("soil.upper=NaN".parse::<ConfigEdit>().is_err());
        assert!("volume=3".parse::<ConfigEdit>().is_err());
        assert!("rain.upper=3".parse::<ConfigEdit>().is_err());
    }
}
