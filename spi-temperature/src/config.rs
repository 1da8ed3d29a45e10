//! Sensor configuration.
//!
//! A [`SensorSection`] mirrors one temperature sensor section of the
//! printer configuration. It is deserialized as is and then validated into
//! an [`SpiBusConfig`] and a [`Chip`]; nothing downstream ever sees an
//! unvalidated option.

use serde::Deserialize;

use crate::chip::{Chip, ChipKind, MainsFilter, max31856, max31865};
use crate::error::{ConfigError, ConfigResult};

/// One sensor section, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorSection {
    /// Chip name, e.g. "MAX31856"
    pub sensor_type: String,
    /// Chip-select pin, passed to the MCU verbatim
    pub sensor_pin: String,
    pub spi_mode: u32,
    /// SPI clock rate in Hz
    pub spi_speed: u32,
    #[serde(default)]
    pub spi_bus: u32,

    pub tc_type: Option<String>,
    #[serde(rename = "tc_use_50Hz_filter")]
    pub tc_use_50hz_filter: Option<bool>,
    pub tc_averaging_count: Option<u32>,

    pub rtd_nominal_r: Option<u32>,
    pub rtd_reference_r: Option<f64>,
    pub rtd_num_of_wires: Option<u32>,
    #[serde(rename = "rtd_use_50Hz_filter")]
    pub rtd_use_50hz_filter: Option<bool>,
}

/// Validated SPI bus parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiBusConfig {
    pub bus: u32,
    pub pin: String,
    /// SPI mode, 0-3
    pub mode: u8,
    pub rate: u32,
}

impl SensorSection {
    /// Chip family named by `sensor_type`.
    pub fn chip_kind(&self) -> ConfigResult<ChipKind> {
        self.sensor_type.parse()
    }

    pub fn spi(&self) -> ConfigResult<SpiBusConfig> {
        let mode = match self.spi_mode {
            0..=3 => self.spi_mode as u8,
            other => return Err(ConfigError::SpiMode(other)),
        };
        Ok(SpiBusConfig {
            bus: self.spi_bus,
            pin: self.sensor_pin.clone(),
            mode,
            rate: self.spi_speed,
        })
    }

    /// Build the chip for `kind` from the chip-specific options.
    ///
    /// Options belonging to another chip are rejected rather than ignored.
    pub fn chip(&self, kind: ChipKind) -> ConfigResult<Chip> {
        match kind {
            ChipKind::Max31855 => {
                self.reject_thermocouple_options(kind)?;
                self.reject_rtd_options(kind)?;
                Ok(Chip::Max31855)
            }
            ChipKind::Max6675 => {
                self.reject_thermocouple_options(kind)?;
                self.reject_rtd_options(kind)?;
                Ok(Chip::Max6675)
            }
            ChipKind::Max31856 => {
                self.reject_rtd_options(kind)?;
                Ok(Chip::Max31856(self.max31856_config()?))
            }
            ChipKind::Max31865 => {
                self.reject_thermocouple_options(kind)?;
                Ok(Chip::Max31865(self.max31865_config()?))
            }
        }
    }

    fn max31856_config(&self) -> ConfigResult<max31856::Config> {
        let tc_type = match &self.tc_type {
            Some(letter) => letter.parse()?,
            None => max31856::ThermocoupleType::default(),
        };
        let averaging = match self.tc_averaging_count {
            Some(count) => max31856::Averaging::try_from(count)?,
            None => max31856::Averaging::default(),
        };
        Ok(max31856::Config {
            tc_type,
            averaging,
            filter: MainsFilter::from_50hz_flag(self.tc_use_50hz_filter.unwrap_or(false)),
        })
    }

    fn max31865_config(&self) -> ConfigResult<max31865::Config> {
        let defaults = max31865::Config::default();

        let nominal_r = match self.rtd_nominal_r {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    option: "rtd_nominal_r",
                    value: "0".into(),
                });
            }
            Some(ohms) => f64::from(ohms),
            None => defaults.nominal_r,
        };

        let reference_r = match self.rtd_reference_r {
            Some(ohms) if ohms.is_finite() && ohms > 0.0 => ohms,
            Some(ohms) => {
                return Err(ConfigError::InvalidValue {
                    option: "rtd_reference_r",
                    value: ohms.to_string(),
                });
            }
            None => defaults.reference_r,
        };

        let wires = match self.rtd_num_of_wires {
            Some(count) => max31865::Wires::try_from(count)?,
            None => defaults.wires,
        };

        Ok(max31865::Config {
            nominal_r,
            reference_r,
            wires,
            filter: MainsFilter::from_50hz_flag(self.rtd_use_50hz_filter.unwrap_or(false)),
        })
    }

    fn reject_thermocouple_options(&self, chip: ChipKind) -> ConfigResult<()> {
        let present = [
            ("tc_type", self.tc_type.is_some()),
            ("tc_use_50Hz_filter", self.tc_use_50hz_filter.is_some()),
            ("tc_averaging_count", self.tc_averaging_count.is_some()),
        ];
        reject_present(&present, chip)
    }

    fn reject_rtd_options(&self, chip: ChipKind) -> ConfigResult<()> {
        let present = [
            ("rtd_nominal_r", self.rtd_nominal_r.is_some()),
            ("rtd_reference_r", self.rtd_reference_r.is_some()),
            ("rtd_num_of_wires", self.rtd_num_of_wires.is_some()),
            ("rtd_use_50Hz_filter", self.rtd_use_50hz_filter.is_some()),
        ];
        reject_present(&present, chip)
    }
}

fn reject_present(options: &[(&'static str, bool)], chip: ChipKind) -> ConfigResult<()> {
    match options.iter().find(|(_, present)| *present) {
        Some((option, _)) => Err(ConfigError::UnsupportedOption {
            option: *option,
            chip,
        }),
        None => Ok(()),
    }
}
