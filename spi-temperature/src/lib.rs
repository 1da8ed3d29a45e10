//! Host-side drivers for SPI thermocouple and RTD amplifiers.
//!
//! The MCU does the sampling: the host configures the SPI bus and the chip
//! once, tells the MCU how often to read and which raw values are
//! acceptable, and then converts each raw reading it receives into a
//! temperature. Supported chips are the MAX31855, MAX31856 and MAX6675
//! thermocouple amplifiers and the MAX31865 RTD converter.

pub mod bounds;
pub mod chip;
pub mod command;
pub mod config;
pub mod error;
pub mod mcu;
pub mod registry;
pub mod session;
pub mod tracing;
