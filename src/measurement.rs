//! One tick's worth of DUT and heatsink readings.

use serde::Serialize;

/// Currents below this magnitude are treated as no current when deriving resistance.
pub const MIN_RESISTANCE_CURRENT_A: f64 = 1e-6;

/// Readings taken at the start of a tick, plus the quantities derived from them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Measurement {
    /// DUT voltage in volts.
    pub voltage: f64,
    /// DUT current in amps.
    pub current: f64,
    /// Power sunk from the DUT in watts.
    pub power: f64,
    /// DUT-side resistance in ohms, `0.0` when no current flows.
    pub resistance: f64,
    /// Heatsink temperature in degrees Celsius.
    pub temperature: f64,
}

impl Measurement {
    pub fn new(voltage: f64, current: f64, temperature: f64) -> Self {
        let resistance = if current > -MIN_RESISTANCE_CURRENT_A && current < MIN_RESISTANCE_CURRENT_A {
            0.0
        } else {
            voltage / current
        };
        Self {
            voltage,
            current,
            power: voltage * current,
            resistance,
            temperature,
        }
    }
}
