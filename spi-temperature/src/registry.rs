//! Sensor type registration.
//!
//! The heater subsystem looks sensors up by the `sensor_type` name in
//! their configuration section. The table below is the only place chip
//! names are bound to constructors; it is fixed at compile time.

use crate::chip::ChipKind;
use crate::config::SensorSection;
use crate::error::{ConfigError, ConfigResult};
use crate::mcu::Mcu;
use crate::session::SensorSession;

/// Builds a session from a sensor section.
pub type SensorFactory = fn(&SensorSection, &mut dyn Mcu) -> ConfigResult<SensorSession>;

/// Every supported sensor, by configuration name.
pub static SENSORS: [(&str, SensorFactory); 4] = [
    ("MAX6675", max6675),
    ("MAX31855", max31855),
    ("MAX31856", max31856),
    ("MAX31865", max31865),
];

fn max6675(section: &SensorSection, mcu: &mut dyn Mcu) -> ConfigResult<SensorSession> {
    build(ChipKind::Max6675, section, mcu)
}

fn max31855(section: &SensorSection, mcu: &mut dyn Mcu) -> ConfigResult<SensorSession> {
    build(ChipKind::Max31855, section, mcu)
}

fn max31856(section: &SensorSection, mcu: &mut dyn Mcu) -> ConfigResult<SensorSession> {
    build(ChipKind::Max31856, section, mcu)
}

fn max31865(section: &SensorSection, mcu: &mut dyn Mcu) -> ConfigResult<SensorSession> {
    build(ChipKind::Max31865, section, mcu)
}

/// Consumer of sensor registrations, e.g. the heater subsystem.
pub trait SensorRegistrar {
    fn add_sensor(&mut self, name: &'static str, factory: SensorFactory);
}

/// Hand every supported sensor to `registrar`.
pub fn register_sensors(registrar: &mut dyn SensorRegistrar) {
    for (name, factory) in SENSORS {
        registrar.add_sensor(name, factory);
    }
}

pub fn lookup(name: &str) -> Option<SensorFactory> {
    SENSORS
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, factory)| *factory)
}

/// Build the session named by `section.sensor_type`.
pub fn create_sensor(section: &SensorSection, mcu: &mut dyn Mcu) -> ConfigResult<SensorSession> {
    let factory = lookup(&section.sensor_type)
        .ok_or_else(|| ConfigError::UnknownSensorType(section.sensor_type.clone()))?;
    factory(section, mcu)
}

/// Validate everything before sending a single command.
fn build(kind: ChipKind, section: &SensorSection, mcu: &mut dyn Mcu) -> ConfigResult<SensorSession> {
    let spi = section.spi()?;
    let chip = section.chip(kind)?;
    Ok(SensorSession::new(&spi, chip, mcu))
}
