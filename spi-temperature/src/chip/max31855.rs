//! MAX31855 cold-junction compensated thermocouple-to-digital converter.
//!
//! The chip is read-only: every conversion is a 32-bit frame with the
//! 14-bit thermocouple temperature in bits 31:18 and fault flags in the
//! low three bits. There is nothing to configure at init.
//!
//! Datasheet: <https://www.analog.com/media/en/technical-documentation/data-sheets/MAX31855.pdf>

use thiserror::Error;

use super::SignedField;

/// Frame layout.
pub mod protocol {
    /// Thermocouple input open
    pub const FAULT_OPEN: u32 = 0x01;
    /// Thermocouple shorted to GND
    pub const FAULT_SHORT_GND: u32 = 0x02;
    /// Thermocouple shorted to VCC
    pub const FAULT_SHORT_VCC: u32 = 0x04;

    pub const SCALE_SHIFT: u32 = 18;
    pub const SIGN_MASK: u32 = 0x2000;
    /// Degrees C per LSB
    pub const MULTIPLIER: f64 = 0.25;
}

use protocol::*;

const FIELD: SignedField = SignedField::new(SCALE_SHIFT, SIGN_MASK, MULTIPLIER);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("MAX31855 : Open Circuit")]
    OpenCircuit,
    #[error("MAX31855 : Short to GND")]
    ShortToGnd,
    #[error("MAX31855 : Short to Vcc")]
    ShortToVcc,
}

/// Check the fault flags embedded in a frame.
pub fn check_faults(value: u32) -> Result<(), Fault> {
    if value & FAULT_OPEN != 0 {
        return Err(Fault::OpenCircuit);
    }
    if value & FAULT_SHORT_GND != 0 {
        return Err(Fault::ShortToGnd);
    }
    if value & FAULT_SHORT_VCC != 0 {
        return Err(Fault::ShortToVcc);
    }
    Ok(())
}

pub fn decode(value: u32) -> Result<f64, Fault> {
    check_faults(value)?;
    Ok(FIELD.decode(value))
}

pub fn encode(temp: f64) -> i32 {
    FIELD.encode(temp)
}
