//! Error types shared across the sensor stack.
//!
//! Configuration problems are fatal and stop a session from ever being
//! created. Sensor faults are per-sample: they are reported, and the next
//! sample is processed normally.

use thiserror::Error;

use crate::chip::{ChipKind, max6675, max31855, max31856, max31865};
use crate::session::SessionState;

/// Invalid or incomplete sensor configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// No sensor of this type is registered
    #[error("Unknown sensor type '{0}'")]
    UnknownSensorType(String),

    /// SPI mode must be 0-3
    #[error("Option 'spi_mode' must be between 0 and 3, got {0}")]
    SpiMode(u32),

    /// Option is only meaningful for another chip
    #[error("Option '{option}' is not supported by {chip}")]
    UnsupportedOption {
        option: &'static str,
        chip: ChipKind,
    },

    /// Option value outside its allowed set or range
    #[error("Invalid value for option '{option}': {value}")]
    InvalidValue {
        option: &'static str,
        value: String,
    },

    /// Temperature range endpoints are not usable numbers
    #[error("Invalid temperature range: min={min} max={max}")]
    InvalidRange { min: f64, max: f64 },

    /// `build_config` was reached before `setup_minmax`
    #[error("Temperature range was not configured before the query was built")]
    BoundsNotSet,

    /// Session is not in the state required by the operation
    #[error("Session is {actual:?}, expected {expected:?}")]
    WrongState {
        expected: SessionState,
        actual: SessionState,
    },
}

/// Fault reported by a chip for a single sample.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    #[error(transparent)]
    Max31855(#[from] max31855::Fault),

    #[error(transparent)]
    Max31856(#[from] max31856::Fault),

    #[error(transparent)]
    Max6675(#[from] max6675::Fault),

    #[error(transparent)]
    Max31865(#[from] max31865::Fault),
}

impl SensorFault {
    /// Chip that raised the fault.
    pub fn chip(&self) -> ChipKind {
        match self {
            Self::Max31855(_) => ChipKind::Max31855,
            Self::Max31856(_) => ChipKind::Max31856,
            Self::Max6675(_) => ChipKind::Max6675,
            Self::Max31865(_) => ChipKind::Max31865,
        }
    }
}

/// Errors from the asynchronous session driver.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Driver was started on a session that is not polling yet
    #[error("Session is not polling (state {0:?})")]
    NotPolling(SessionState),

    /// Message channel was already taken by another driver
    #[error("Session message channel already consumed")]
    ChannelTaken,
}

/// Convenient Result type for configuration-time operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
