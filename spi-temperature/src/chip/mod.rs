//! Supported SPI temperature chips.
//!
//! Each chip module owns its register map, fault table, transfer function
//! and init sequence. [`Chip`] is the closed set of configured chips and
//! dispatches to the right module; [`ChipKind`] is the same set without
//! options, used for naming and wire identifiers.
//!
//! All chips share the same polling protocol: the MCU reads a raw value
//! (and, for chips with a fault-status register, a fault byte) every
//! report interval and sends both to the host.

pub mod max31855;
pub mod max31856;
pub mod max31865;
pub mod max6675;

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, SensorFault};

/// Write flag OR'd into register addresses on the SPI bus.
pub const REG_WRITE: u8 = 0x80;

/// Chip family, without configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipKind {
    Max31855,
    Max31856,
    Max6675,
    Max31865,
}

impl ChipKind {
    /// All supported chips.
    pub const ALL: [ChipKind; 4] = [
        ChipKind::Max6675,
        ChipKind::Max31855,
        ChipKind::Max31856,
        ChipKind::Max31865,
    ];

    /// Identifier sent as `chip_type` in `config_thermocouple`.
    ///
    /// These values are fixed by the MCU firmware.
    pub const fn wire_id(self) -> u8 {
        match self {
            Self::Max31855 => 1,
            Self::Max31856 => 2,
            Self::Max31865 => 4,
            Self::Max6675 => 8,
        }
    }

    /// Name used as `sensor_type` in configuration.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Max31855 => "MAX31855",
            Self::Max31856 => "MAX31856",
            Self::Max6675 => "MAX6675",
            Self::Max31865 => "MAX31865",
        }
    }
}

impl fmt::Display for ChipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChipKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ConfigError::UnknownSensorType(s.to_string()))
    }
}

/// Mains noise rejection filter selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MainsFilter {
    #[default]
    Hz60,
    Hz50,
}

impl MainsFilter {
    /// Filter from the `*_use_50Hz_filter` flag.
    pub fn from_50hz_flag(use_50hz: bool) -> Self {
        if use_50hz { Self::Hz50 } else { Self::Hz60 }
    }
}

/// One raw sample as reported by the MCU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    /// Value read from the chip's data register(s)
    pub value: u32,
    /// Contents of the chip's fault-status register, if it has one
    pub fault: u8,
}

impl RawSample {
    pub fn new(value: u32, fault: u8) -> Self {
        Self { value, fault }
    }
}

/// A configured chip.
///
/// Options are validated when the chip is built from configuration and
/// never change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Chip {
    Max31855,
    Max31856(max31856::Config),
    Max6675,
    Max31865(max31865::Config),
}

impl Chip {
    pub fn kind(&self) -> ChipKind {
        match self {
            Self::Max31855 => ChipKind::Max31855,
            Self::Max31856(_) => ChipKind::Max31856,
            Self::Max6675 => ChipKind::Max6675,
            Self::Max31865(_) => ChipKind::Max31865,
        }
    }

    /// Convert a raw sample to a temperature in degrees Celsius.
    ///
    /// Fault bits are checked before the value is converted; a set fault
    /// bit always wins regardless of the magnitude bits.
    pub fn decode(&self, sample: RawSample) -> Result<f64, SensorFault> {
        match self {
            Self::Max31855 => Ok(max31855::decode(sample.value)?),
            Self::Max31856(_) => Ok(max31856::decode(sample)?),
            Self::Max6675 => Ok(max6675::decode(sample.value)?),
            Self::Max31865(config) => Ok(max31865::decode(config, sample)?),
        }
    }

    /// Convert a temperature to a raw ADC limit.
    ///
    /// The result is signed and increases with temperature, so limits on
    /// either side of 0 C keep their order. It matches the chip's frame
    /// for temperatures at or above zero; fault bits are always clear.
    pub fn encode(&self, temp: f64) -> i32 {
        match self {
            Self::Max31855 => max31855::encode(temp),
            Self::Max31856(_) => max31856::encode(temp),
            Self::Max6675 => max6675::encode(temp),
            Self::Max31865(config) => max31865::encode(config, temp),
        }
    }

    /// Register writes sent once when the MCU is configured.
    pub fn init_bytes(&self) -> Vec<u8> {
        match self {
            Self::Max31855 | Self::Max6675 => Vec::new(),
            Self::Max31856(config) => max31856::init_bytes(config),
            Self::Max31865(config) => max31865::init_bytes(config),
        }
    }
}

/// Signed temperature field of a thermocouple amplifier.
///
/// The field sits above `shift` status bits. When the sign bit is set the
/// magnitude is `-((value & (sign_mask - 1)) + 1)`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SignedField {
    shift: u32,
    sign_mask: u32,
    multiplier: f64,
}

impl SignedField {
    pub(crate) const fn new(shift: u32, sign_mask: u32, multiplier: f64) -> Self {
        Self {
            shift,
            sign_mask,
            multiplier,
        }
    }

    pub(crate) fn decode(&self, value: u32) -> f64 {
        let field = value >> self.shift;
        let counts = if field & self.sign_mask != 0 {
            -(i64::from(field & (self.sign_mask - 1)) + 1)
        } else {
            i64::from(field)
        };
        counts as f64 * self.multiplier
    }

    /// Signed counts shifted into place, saturating at the field's range.
    ///
    /// Inverse of the scaling in [`Self::decode`]. Negative counts stay
    /// negative instead of setting the sign bit.
    pub(crate) fn encode(&self, temp: f64) -> i32 {
        let limit = i64::from(self.sign_mask - 1);
        let counts = ((temp / self.multiplier).round() as i64).clamp(-limit - 1, limit);
        // The widest field (14 bits above 18) still fits in an i32
        (counts << self.shift) as i32
    }
}
