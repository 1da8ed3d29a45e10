//! Raw ADC limits for a configured temperature range.
//!
//! The MCU checks every sample against these limits itself and shuts down
//! when a reading leaves the range, without waiting for the host.

use crate::chip::Chip;
use crate::error::{ConfigError, ConfigResult};

/// Raw value limits, always ordered `min <= max`.
///
/// Limits are signed: a range reaching below 0 C has a negative `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcBounds {
    pub min: i32,
    pub max: i32,
}

impl AdcBounds {
    /// Whether an encoded value lies inside the limits.
    pub fn contains(&self, raw: i32) -> bool {
        (self.min..=self.max).contains(&raw)
    }
}

/// Encode both ends of the range and order the results by value.
///
/// Callers may pass the ends in either order.
pub fn compute_bounds(chip: &Chip, min_temp: f64, max_temp: f64) -> ConfigResult<AdcBounds> {
    if !min_temp.is_finite() || !max_temp.is_finite() {
        return Err(ConfigError::InvalidRange {
            min: min_temp,
            max: max_temp,
        });
    }
    let a = chip.encode(min_temp);
    let b = chip.encode(max_temp);
    Ok(AdcBounds {
        min: a.min(b),
        max: a.max(b),
    })
}
