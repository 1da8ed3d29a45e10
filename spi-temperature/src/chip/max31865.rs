//! MAX31865 RTD-to-digital converter.
//!
//! The 15-bit RTD code is the ratio of RTD resistance to the reference
//! resistor, scaled to 2^15, with a fault flag in bit 0. The fault status
//! register is reported separately by the MCU.
//!
//! Temperature is solved from the quadratic Callendar-Van Dusen form
//! `R = R0 * (1 + A*T + B*T^2)` taking only the positive root and ignoring
//! the cubic C term. This is only accurate above 0 C; readings well below
//! freezing will be off. The numbers are kept as they are so existing
//! configurations keep producing identical temperatures.
//!
//! Datasheet: <https://www.analog.com/media/en/technical-documentation/data-sheets/MAX31865.pdf>

use thiserror::Error;

use super::{MainsFilter, REG_WRITE, RawSample};
use crate::error::ConfigError;

pub mod protocol {
    pub mod regs {
        pub const CONFIG: u8 = 0x00;
        pub const RTD_MSB: u8 = 0x01;
        pub const RTD_LSB: u8 = 0x02;
        pub const HIGH_FAULT_MSB: u8 = 0x03;
        pub const HIGH_FAULT_LSB: u8 = 0x04;
        pub const LOW_FAULT_MSB: u8 = 0x05;
        pub const LOW_FAULT_LSB: u8 = 0x06;
        pub const FAULT_STATUS: u8 = 0x07;
    }

    pub mod config {
        pub const BIAS: u8 = 0x80;
        pub const MODE_AUTO: u8 = 0x40;
        pub const ONE_SHOT: u8 = 0x20;
        pub const THREE_WIRE: u8 = 0x10;
        pub const FAULT_CLEAR: u8 = 0x02;
        pub const FILTER_50HZ: u8 = 0x01;
    }

    pub mod fault {
        pub const HIGH_THRESHOLD: u8 = 0x80;
        pub const LOW_THRESHOLD: u8 = 0x40;
        pub const REFIN_HIGH: u8 = 0x20;
        pub const REFIN_LOW: u8 = 0x10;
        pub const RTDIN_LOW: u8 = 0x08;
        pub const OVUV: u8 = 0x04;
        /// Bits the datasheet leaves unassigned
        pub const UNSPECIFIED: u8 = 0x03;
    }

    /// Callendar-Van Dusen coefficients (IEC 60751)
    pub const CVD_A: f64 = 0.00390830;
    pub const CVD_B: f64 = 0.0000005775;
    pub const CVD_C: f64 = -0.00000000000418301;

    /// 2^15, full scale of the RTD code
    pub const ADC_MAX: f64 = 32768.0;
}

use protocol::{ADC_MAX, CVD_A, CVD_B, config, fault, regs};

const CODE_MAX: u32 = 0x7FFF;

/// Number of RTD leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wires {
    #[default]
    Two,
    Three,
    Four,
}

impl TryFrom<u32> for Wires {
    type Error = ConfigError;

    fn try_from(count: u32) -> Result<Self, Self::Error> {
        match count {
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            _ => Err(ConfigError::InvalidValue {
                option: "rtd_num_of_wires",
                value: count.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// RTD resistance at 0 C, in ohms (100 for PT100)
    pub nominal_r: f64,
    /// Reference resistor, in ohms
    pub reference_r: f64,
    pub wires: Wires,
    pub filter: MainsFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nominal_r: 100.0,
            reference_r: 430.0,
            wires: Wires::Two,
            filter: MainsFilter::Hz60,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("Max31865 RTD input is disconnected")]
    Disconnected,
    #[error("Max31865 RTD input is shorted")]
    Shorted,
    #[error("Max31865 VREF- is greater than 0.85 * VBIAS, FORCE- open")]
    RefInHigh,
    #[error("Max31865 VREF- is less than 0.85 * VBIAS, FORCE- open")]
    RefInLow,
    #[error("Max31865 VRTD- is less than 0.85 * VBIAS, FORCE- open")]
    RtdInLow,
    #[error("Max31865 Overvoltage or undervoltage fault")]
    OverUnderVoltage,
    #[error("Max31865 Unspecified error")]
    Unspecified,
}

const FAULT_TABLE: [(u8, Fault); 7] = [
    (fault::HIGH_THRESHOLD, Fault::Disconnected),
    (fault::LOW_THRESHOLD, Fault::Shorted),
    (fault::REFIN_HIGH, Fault::RefInHigh),
    (fault::REFIN_LOW, Fault::RefInLow),
    (fault::RTDIN_LOW, Fault::RtdInLow),
    (fault::OVUV, Fault::OverUnderVoltage),
    (fault::UNSPECIFIED, Fault::Unspecified),
];

pub fn check_faults(status: u8) -> Result<(), Fault> {
    match FAULT_TABLE.iter().find(|(bits, _)| status & bits != 0) {
        Some((_, fault)) => Err(*fault),
        None => Ok(()),
    }
}

/// Temperature for a 15-bit RTD code.
pub fn temperature_from_code(config: &Config, code: u32) -> f64 {
    let n = config.nominal_r;
    let r_rtd = config.reference_r * f64::from(code) / ADC_MAX;
    let discriminant = n * n * CVD_A * CVD_A - 4.0 * n * CVD_B * (n - r_rtd);
    (-n * CVD_A + discriminant.sqrt()) / (2.0 * n * CVD_B)
}

/// 15-bit RTD code for a temperature, saturating at the code range.
pub fn code_from_temperature(config: &Config, temp: f64) -> u32 {
    let n = config.nominal_r;
    let root = temp * 2.0 * n * CVD_B + n * CVD_A;
    let r_rtd = n - (n * n * CVD_A * CVD_A - root * root) / (4.0 * n * CVD_B);
    let code = (r_rtd * ADC_MAX / config.reference_r).round();
    code.clamp(0.0, f64::from(CODE_MAX)) as u32
}

pub fn decode(config: &Config, sample: RawSample) -> Result<f64, Fault> {
    check_faults(sample.fault)?;
    // Bit 0 is the fault flag, already covered by the status register
    Ok(temperature_from_code(config, sample.value >> 1))
}

pub fn encode(config: &Config, temp: f64) -> i32 {
    // Codes are at most 15 bits
    (code_from_temperature(config, temp) << 1) as i32
}

/// Single CONFIG write: bias on, continuous conversion, faults cleared.
pub fn init_bytes(cfg: &Config) -> Vec<u8> {
    let mut value = config::BIAS | config::MODE_AUTO | config::FAULT_CLEAR;
    if cfg.filter == MainsFilter::Hz50 {
        value |= config::FILTER_50HZ;
    }
    if cfg.wires == Wires::Three {
        value |= config::THREE_WIRE;
    }
    vec![REG_WRITE | regs::CONFIG, value]
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALWAYS_ON: u8 = config::BIAS | config::MODE_AUTO | config::FAULT_CLEAR;

    #[test]
    fn zero_code_matches_closed_form() {
        let config = Config::default();
        // R = 0 reduces the formula to (-A + sqrt(A^2 - 4B)) / 2B
        let expected = (-CVD_A + (CVD_A * CVD_A - 4.0 * CVD_B).sqrt()) / (2.0 * CVD_B);
        let temp = decode(&config, RawSample::new(0, 0)).unwrap();
        assert!((temp - expected).abs() < 1e-9);
        assert!(temp < -200.0);
    }

    #[test]
    fn nominal_resistance_is_zero_degrees() {
        let config = Config::default();
        // PT100 at 0 C is 100 ohm, 100/430 of full scale
        let code = (100.0 * ADC_MAX / 430.0).round() as u32;
        let temp = decode(&config, RawSample::new(code << 1, 0)).unwrap();
        assert!(temp.abs() < 0.05, "got {}", temp);
    }

    #[test]
    fn fault_flag_bit_does_not_change_temperature() {
        let config = Config::default();
        let base = decode(&config, RawSample::new(0x4000, 0)).unwrap();
        let flagged = decode(&config, RawSample::new(0x4001, 0)).unwrap();
        assert_eq!(base, flagged);
    }

    #[test]
    fn fault_table_order() {
        assert_eq!(check_faults(0x80), Err(Fault::Disconnected));
        assert_eq!(check_faults(0x40), Err(Fault::Shorted));
        assert_eq!(check_faults(0x20), Err(Fault::RefInHigh));
        assert_eq!(check_faults(0x10), Err(Fault::RefInLow));
        assert_eq!(check_faults(0x08), Err(Fault::RtdInLow));
        assert_eq!(check_faults(0x04), Err(Fault::OverUnderVoltage));
        assert_eq!(check_faults(0x01), Err(Fault::Unspecified));
        assert_eq!(check_faults(0x02), Err(Fault::Unspecified));
        assert_eq!(check_faults(0xC0), Err(Fault::Disconnected));
        assert_eq!(check_faults(0x00), Ok(()));
    }

    #[test]
    fn fault_reported_with_zero_magnitude() {
        let config = Config::default();
        assert_eq!(
            decode(&config, RawSample::new(0, fault::REFIN_LOW)),
            Err(Fault::RefInLow)
        );
    }

    #[test]
    fn default_init_bytes() {
        assert_eq!(init_bytes(&Config::default()), vec![0x80, ALWAYS_ON]);
    }

    #[test]
    fn three_wire_sets_only_three_wire_bit() {
        let cfg = Config {
            wires: Wires::Three,
            ..Default::default()
        };
        assert_eq!(init_bytes(&cfg), vec![0x80, ALWAYS_ON | config::THREE_WIRE]);

        let cfg = Config {
            wires: Wires::Four,
            ..Default::default()
        };
        assert_eq!(init_bytes(&cfg), vec![0x80, ALWAYS_ON]);
    }

    #[test]
    fn filter_50hz_bit() {
        let cfg = Config {
            filter: MainsFilter::Hz50,
            ..Default::default()
        };
        assert_eq!(init_bytes(&cfg)[1], ALWAYS_ON | config::FILTER_50HZ);
    }

    #[test]
    fn round_trip_within_one_lsb() {
        let configs = [
            Config::default(),
            Config {
                nominal_r: 1000.0,
                reference_r: 4300.0,
                ..Default::default()
            },
        ];
        for config in &configs {
            for temp in [0.0, 20.0, 100.0, 250.0, 500.0] {
                let code = code_from_temperature(config, temp);
                let decoded = decode(config, RawSample::new(code << 1, 0)).unwrap();
                let lsb = temperature_from_code(config, code + 1)
                    - temperature_from_code(config, code);
                assert!(
                    (decoded - temp).abs() <= lsb,
                    "{} decoded as {} (lsb {})",
                    temp,
                    decoded,
                    lsb
                );
            }
        }
    }

    #[test]
    fn encode_keeps_fault_bit_clear() {
        let config = Config::default();
        assert_eq!(encode(&config, 150.0) & 1, 0);
    }

    #[test]
    fn encode_saturates() {
        let config = Config::default();
        assert_eq!(encode(&config, 5000.0), (CODE_MAX << 1) as i32);
    }
}
