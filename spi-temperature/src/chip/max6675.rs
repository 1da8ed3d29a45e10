//! MAX6675 K-type thermocouple-to-digital converter.
//!
//! Read-only 16-bit frame: temperature in bits 14:3, thermocouple-open
//! flag in bit 2, device ID in bit 1 (always zero on a real chip).

use thiserror::Error;

use super::SignedField;

pub mod protocol {
    /// Device ID bit; reads as one when nothing answers on the bus
    pub const FAULT_DEVICE_ID: u32 = 0x02;
    /// Thermocouple input open
    pub const FAULT_OPEN: u32 = 0x04;

    pub const SCALE_SHIFT: u32 = 3;
    pub const SIGN_MASK: u32 = 0x2000;
    pub const MULTIPLIER: f64 = 0.25;
}

use protocol::*;

const FIELD: SignedField = SignedField::new(SCALE_SHIFT, SIGN_MASK, MULTIPLIER);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("Max6675 : Device ID error")]
    DeviceId,
    #[error("Max6675 : Thermocouple Open Fault")]
    ThermocoupleOpen,
}

pub fn check_faults(value: u32) -> Result<(), Fault> {
    if value & FAULT_DEVICE_ID != 0 {
        return Err(Fault::DeviceId);
    }
    if value & FAULT_OPEN != 0 {
        return Err(Fault::ThermocoupleOpen);
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
