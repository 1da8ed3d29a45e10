//! MCU configuration commands.
//!
//! The text produced here is parsed by the MCU firmware, so the format of
//! every command must not change.

use std::fmt;

use crate::mcu::Oid;

/// Configuration commands sent by a sensor session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Allocate an SPI device on a bus
    ConfigSpi {
        oid: Oid,
        bus: u32,
        pin: String,
        mode: u8,
        rate: u32,
    },
    /// Raw bytes written to the SPI device
    SpiSend { oid: Oid, data: Vec<u8> },
    /// Attach a thermocouple reader to an SPI device
    ConfigThermocouple { oid: Oid, spi_oid: Oid, chip_type: u8 },
    /// Start periodic sampling
    ///
    /// The limits are signed and written as signed decimals.
    QueryThermocouple {
        oid: Oid,
        clock: u64,
        rest_ticks: u64,
        min_value: i32,
        max_value: i32,
    },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigSpi {
                oid,
                bus,
                pin,
                mode,
                rate,
            } => write!(
                f,
                "config_spi oid={} bus={} pin={} mode={} rate={} shutdown_msg=",
                oid, bus, pin, mode, rate
            ),
            Self::SpiSend { oid, data } => {
                write!(f, "spi_send oid={} data=", oid)?;
                for byte in data {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Self::ConfigThermocouple {
                oid,
                spi_oid,
                chip_type,
            } => write!(
                f,
                "config_thermocouple oid={} spi_oid={} chip_type={}",
                oid, spi_oid, chip_type
            ),
            Self::QueryThermocouple {
                oid,
                clock,
                rest_ticks,
                min_value,
                max_value,
            } => write!(
                f,
                "query_thermocouple oid={} clock={} rest_ticks={} min_value={} max_value={}",
                oid, clock, rest_ticks, min_value, max_value
            ),
        }
    }
}
