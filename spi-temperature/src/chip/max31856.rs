//! MAX31856 precision thermocouple-to-digital converter.
//!
//! Unlike the read-only amplifiers, the MAX31856 supports eight
//! thermocouple types, sample averaging and a choice of mains filter, all
//! programmed at init. The MCU reads the three linearized temperature
//! bytes (LTCBH..LTCBL) as a 24-bit value and the fault status register
//! (SR) as a separate fault byte.
//!
//! Datasheet: <https://www.analog.com/media/en/technical-documentation/data-sheets/MAX31856.pdf>

use std::str::FromStr;

use thiserror::Error;

use super::{MainsFilter, REG_WRITE, RawSample, SignedField};
use crate::error::ConfigError;

pub mod protocol {
    /// Register addresses
    pub mod regs {
        /// Configuration 0: conversion mode, open-circuit detection, filter
        pub const CR0: u8 = 0x00;
        /// Configuration 1: averaging and thermocouple type
        pub const CR1: u8 = 0x01;
        /// Fault mask
        pub const MASK: u8 = 0x02;
        pub const CJHF: u8 = 0x03;
        pub const CJLF: u8 = 0x04;
        pub const LTHFTH: u8 = 0x05;
        pub const LTHFTL: u8 = 0x06;
        pub const LTLFTH: u8 = 0x07;
        pub const LTLFTL: u8 = 0x08;
        pub const CJTO: u8 = 0x09;
        pub const CJTH: u8 = 0x0A;
        pub const CJTL: u8 = 0x0B;
        pub const LTCBH: u8 = 0x0C;
        pub const LTCBM: u8 = 0x0D;
        pub const LTCBL: u8 = 0x0E;
        /// Fault status
        pub const SR: u8 = 0x0F;
    }

    pub mod cr0 {
        pub const AUTOCONVERT: u8 = 0x80;
        pub const ONE_SHOT: u8 = 0x40;
        pub const OCFAULT1: u8 = 0x20;
        pub const OCFAULT0: u8 = 0x10;
        pub const CJ_DISABLE: u8 = 0x08;
        pub const FAULT_INTERRUPT: u8 = 0x04;
        pub const FAULT_CLEAR: u8 = 0x02;
        pub const FILTER_50HZ: u8 = 0x01;
        pub const FILTER_60HZ: u8 = 0x00;
    }

    pub mod cr1 {
        pub const AVGSEL_1: u8 = 0x00;
        pub const AVGSEL_2: u8 = 0x10;
        pub const AVGSEL_4: u8 = 0x20;
        pub const AVGSEL_8: u8 = 0x30;
        pub const AVGSEL_16: u8 = 0x70;
    }

    /// Fault mask bits; a set bit suppresses the FAULT output
    pub mod mask {
        pub const CJ_HIGH: u8 = 0x20;
        pub const CJ_LOW: u8 = 0x10;
        pub const TC_HIGH: u8 = 0x08;
        pub const TC_LOW: u8 = 0x04;
        pub const OVUV: u8 = 0x02;
        pub const TC_OPEN: u8 = 0x01;
    }

    /// Fault status register bits
    pub mod sr {
        pub const CJ_RANGE: u8 = 0x80;
        pub const TC_RANGE: u8 = 0x40;
        pub const CJ_HIGH: u8 = 0x20;
        pub const CJ_LOW: u8 = 0x10;
        pub const TC_HIGH: u8 = 0x08;
        pub const TC_LOW: u8 = 0x04;
        pub const OVUV: u8 = 0x02;
        pub const OPEN: u8 = 0x01;
    }

    pub const SCALE_SHIFT: u32 = 5;
    pub const SIGN_MASK: u32 = 0x40000;
    pub const MULTIPLIER: f64 = 0.0078125;
}

use protocol::{MULTIPLIER, SCALE_SHIFT, SIGN_MASK, cr0, cr1, mask, regs, sr};

const FIELD: SignedField = SignedField::new(SCALE_SHIFT, SIGN_MASK, MULTIPLIER);

/// Thermocouple type, as programmed into the low nibble of CR1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThermocoupleType {
    B,
    E,
    J,
    #[default]
    K,
    N,
    R,
    S,
    T,
}

impl ThermocoupleType {
    pub const fn code(self) -> u8 {
        match self {
            Self::B => 0b0000,
            Self::E => 0b0001,
            Self::J => 0b0010,
            Self::K => 0b0011,
            Self::N => 0b0100,
            Self::R => 0b0101,
            Self::S => 0b0110,
            Self::T => 0b0111,
        }
    }
}

impl FromStr for ThermocoupleType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "B" => Ok(Self::B),
            "E" => Ok(Self::E),
            "J" => Ok(Self::J),
            "K" => Ok(Self::K),
            "N" => Ok(Self::N),
            "R" => Ok(Self::R),
            "S" => Ok(Self::S),
            "T" => Ok(Self::T),
            _ => Err(ConfigError::InvalidValue {
                option: "tc_type",
                value: s.to_string(),
            }),
        }
    }
}

/// Number of samples averaged per conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Averaging {
    #[default]
    One,
    Two,
    Four,
    Eight,
    Sixteen,
}

impl Averaging {
    pub const fn code(self) -> u8 {
        match self {
            Self::One => cr1::AVGSEL_1,
            Self::Two => cr1::AVGSEL_2,
            Self::Four => cr1::AVGSEL_4,
            Self::Eight => cr1::AVGSEL_8,
            Self::Sixteen => cr1::AVGSEL_16,
        }
    }
}

impl TryFrom<u32> for Averaging {
    type Error = ConfigError;

    fn try_from(count: u32) -> Result<Self, Self::Error> {
        match count {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            8 => Ok(Self::Eight),
            16 => Ok(Self::Sixteen),
            _ => Err(ConfigError::InvalidValue {
                option: "tc_averaging_count",
                value: count.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub tc_type: ThermocoupleType,
    pub averaging: Averaging,
    pub filter: MainsFilter,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("Max31856: Cold Junction Range Fault")]
    ColdJunctionRange,
    #[error("Max31856: Thermocouple Range Fault")]
    ThermocoupleRange,
    #[error("Max31856: Cold Junction High Fault")]
    ColdJunctionHigh,
    #[error("Max31856: Cold Junction Low Fault")]
    ColdJunctionLow,
    #[error("Max31856: Thermocouple High Fault")]
    ThermocoupleHigh,
    #[error("Max31856: Thermocouple Low Fault")]
    ThermocoupleLow,
    #[error("Max31856: Over/Under Voltage Fault")]
    OverUnderVoltage,
    #[error("Max31856: Thermocouple Open Fault")]
    ThermocoupleOpen,
}

/// Status bits in the order they are reported.
const FAULT_TABLE: [(u8, Fault); 8] = [
    (sr::CJ_RANGE, Fault::ColdJunctionRange),
    (sr::TC_RANGE, Fault::ThermocoupleRange),
    (sr::CJ_HIGH, Fault::ColdJunctionHigh),
    (sr::CJ_LOW, Fault::ColdJunctionLow),
    (sr::TC_HIGH, Fault::ThermocoupleHigh),
    (sr::TC_LOW, Fault::ThermocoupleLow),
    (sr::OVUV, Fault::OverUnderVoltage),
    (sr::OPEN, Fault::ThermocoupleOpen),
];

/// Check the fault status register.
pub fn check_faults(status: u8) -> Result<(), Fault> {
    match FAULT_TABLE.iter().find(|(bit, _)| status & bit != 0) {
        Some((_, fault)) => Err(*fault),
        None => Ok(()),
    }
}

pub fn decode(sample: RawSample) -> Result<f64, Fault> {
    check_faults(sample.fault)?;
    Ok(FIELD.decode(sample.value))
}

pub fn encode(temp: f64) -> i32 {
    FIELD.encode(temp)
}

/// CR0, CR1 and MASK writes.
///
/// Conversions run continuously. Over/under-voltage and open-circuit
/// faults are masked from the FAULT pin; everything else is reported.
pub fn init_bytes(config: &Config) -> Vec<u8> {
    let mut cr0_value = cr0::AUTOCONVERT;
    if config.filter == MainsFilter::Hz50 {
        cr0_value |= cr0::FILTER_50HZ;
    }

    let cr1_value = config.tc_type.code() | config.averaging.code();
    let mask_value = mask::OVUV | mask::TC_OPEN;

    vec![
        REG_WRITE | regs::CR0,
        cr0_value,
        REG_WRITE | regs::CR1,
        cr1_value,
        REG_WRITE | regs::MASK,
        mask_value,
    ]
}
