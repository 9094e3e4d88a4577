//! # Configuration Reconciler
//!
//! Pure functions that apply a UI edit to a configuration snapshot and then
//! re-enforce the cross-field policies:
//!
//! - **Soil moisture**: the lower threshold turns irrigation on, the upper one
//!   turns it off. An enabled lower threshold forces the upper one on, and
//!   disabling the upper threshold disables the lower one with it.
//! - **Light**: PWM dimming and fixed light alarms exclude each other. While
//!   PWM is enabled both light threshold flags stay off.
//!
//! Every function returns a new configuration and is idempotent.

pub mod edit;

pub use edit::{ConfigEdit, DeviceEdit, ThresholdEdit};

use crate::model::{DeviceConfiguration, SensorKind};
use tracing::debug;

const PWM_TARGET_MAX: f32 = 100.0;

pub fn apply_threshold_edit(
    config: &DeviceConfiguration,
    kind: SensorKind,
    edit: &ThresholdEdit,
) -> DeviceConfiguration {
    let mut next = config.clone();
    let threshold = next.thresholds.entry(kind).or_default();

    match edit {
        ThresholdEdit::UpperThreshold(level) => threshold.upper_threshold = *level,
        ThresholdEdit::LowerThreshold(level) => threshold.lower_threshold = *level,
        ThresholdEdit::UpperEnabled(enabled) => {
            threshold.upper_enabled = Some(*enabled);
            if kind == SensorKind::SoilMoisture && !enabled && threshold.is_lower_enabled() {
                debug!("Disabling soil moisture lower threshold together with upper");
                threshold.lower_enabled = Some(false);
            }
        }
        ThresholdEdit::LowerEnabled(enabled) => threshold.lower_enabled = Some(*enabled),
        ThresholdEdit::ValueSource(source) => threshold.value_source = Some(*source),
    }

    enforce_policies(&mut next);
    next
}

pub fn apply_device_edit(config: &DeviceConfiguration, edit: &DeviceEdit) -> DeviceConfiguration {
    let mut next = config.clone();

    match edit {
        DeviceEdit::PwmEnabled(enabled) => next.pwm_enabled = Some(*enabled),
        DeviceEdit::PwmTarget(target) => {
            if target.is_finite() {
                next.light_pwm_target = Some(target.clamp(0.0, PWM_TARGET_MAX));
            } else {
                debug!("Ignoring non-finite PWM target {}", target);
            }
        }
        DeviceEdit::PirSensorEnabled(enabled) => next.pir_sensor_enabled = Some(*enabled),
        DeviceEdit::Wifi { ssid, password } => {
            next.wifi_ssid = Some(ssid.clone());
            next.wifi_password = Some(password.clone());
        }
    }

    enforce_policies(&mut next);
    next
}

pub fn apply_edit(config: &DeviceConfiguration, edit: &ConfigEdit) -> DeviceConfiguration {
    match edit {
        ConfigEdit::Threshold(kind, threshold_edit) => {
            apply_threshold_edit(config, *kind, threshold_edit)
        }
        ConfigEdit::Device(device_edit) => apply_device_edit(config, device_edit),
    }
}

pub fn apply_edits<'a, I>(config: &DeviceConfiguration, edits: I) -> DeviceConfiguration
where
    I: IntoIterator<Item = &'a ConfigEdit>,
{
    edits
        .into_iter()
        .fold(config.clone(), |current, edit| apply_edit(&current, edit))
}

/// Re-establishes the soil-moisture coupling and the light/PWM exclusion in place.
pub fn enforce_policies(config: &mut DeviceConfiguration) {
    if let Some(soil) = config.thresholds.get_mut(&SensorKind::SoilMoisture) {
        if soil.is_lower_enabled() && !soil.is_upper_enabled() {
            debug!("Soil moisture lower threshold enabled, forcing upper threshold on");
            soil.upper_enabled = Some(true);
        }
    }

    if config.is_pwm_enabled() {
        if let Some(light) = config.thresholds.get_mut(&SensorKind::Light) {
            if light.is_upper_enabled() || light.is_lower_enabled() {
                debug!("PWM enabled, switching light threshold alarms off");
            }
            if light.is_upper_enabled() {
                light.upper_enabled = Some(false);
            }
            if light.is_lower_enabled() {
                light.lower_enabled = Some(false);
            }
        }
    }
}

/// True when every policy already holds.
pub fn satisfies_policies(config: &DeviceConfiguration) -> bool {
    let soil_ok = config
        .threshold(SensorKind::SoilMoisture)
        .map_or(true, |soil| !soil.is_lower_enabled() || soil.is_upper_enabled());
    let light_ok = !config.is_pwm_enabled()
        || config
            .threshold(SensorKind::Light)
            .map_or(true, |light| !light.is_upper_enabled() && !light.is_lower_enabled());
    soil_ok && light_ok
}
