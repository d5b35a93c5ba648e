//! Environment sensor interface.
//!
//! The physical sensors (DHT22 temperature/humidity probe and MQ135 gas
//! sensor) are external collaborators behind [`EnvironmentSensor`]; the
//! reporting cycle only sees one combined [`SensorReading`] per cycle.
//! The MQ135 gas curve math is platform-independent and lives in
//! [`mq135`]; the hardware wiring is in [`esp`] (`esp32` feature).

use std::fmt;

pub mod mq135;

#[cfg(feature = "esp32")]
pub mod esp;

pub use mq135::Mq135;

/// One environment measurement, ephemeral: produced, transmitted, dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Air temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Corrected gas concentration in ppm.
    pub gas_ppm: f32,
    /// Calibration baseline resistance (RZero) in kOhm.
    pub baseline_resistance: f32,
    /// Temperature/humidity corrected baseline resistance in kOhm.
    pub corrected_resistance: f32,
}

impl SensorReading {
    /// Whether every field carries a number.
    ///
    /// The DHT probe occasionally produces NaN mid-conversion; a reading
    /// with any NaN field is discarded and re-acquired.
    pub fn is_well_formed(&self) -> bool {
        !self.temperature.is_nan()
            && !self.humidity.is_nan()
            && !self.gas_ppm.is_nan()
            && !self.baseline_resistance.is_nan()
            && !self.corrected_resistance.is_nan()
    }
}

/// Reads the combined environment measurement.
pub trait EnvironmentSensor {
    /// Acquire one reading.
    fn read_environment(&mut self) -> Result<SensorReading, SensorError>;
}

/// Errors from the sensor collaborators.
#[derive(Debug)]
pub enum SensorError {
    /// The probe did not answer in time.
    NotReady,
    /// Bus-level failure talking to a probe.
    Bus(String),
    /// A probe answered with a value outside its physical range.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "sensor not ready"),
            Self::Bus(msg) => write!(f, "sensor bus error: {}", msg),
            Self::OutOfRange => write!(f, "sensor value out of range"),
        }
    }
}

impl std::error::Error for SensorError {}
