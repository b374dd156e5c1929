//! Traits for the hardware and UI collaborators driven by the control loop.
//!
//! The core never talks to a bus or a GPIO itself. Board support code implements
//! these traits on top of the real DAC, ADC, relay, encoder and display drivers.

use fugit::MillisDurationU32;

use crate::{
    editor::EditState,
    error::ActuatorError,
    measurement::Measurement,
    mode::{Mode, SenseMode},
};

/// Regulating front end: the DAC that drives the MOSFET gates and the analog
/// switches that select its feedback path.
///
/// Drive levels are DAC output voltages in millivolts, as computed by the
/// [`Regulator`](crate::regulation::Regulator).
pub trait Actuator {
    /// Drive the current-sense loop. Refuses levels outside the calibrated range.
    fn apply_current(&mut self, drive_mv: f64) -> Result<(), ActuatorError>;

    /// Drive the voltage-sense loop. Refuses levels outside the calibrated range.
    fn apply_voltage(&mut self, drive_mv: f64) -> Result<(), ActuatorError>;

    /// Route current or voltage feedback to the MOSFET input.
    fn select_sense(&mut self, mode: SenseMode);

    /// Power the sense rail. Feedback is invalid until this has been called.
    fn enable_sense_rail(&mut self);

    fn disable_sense_rail(&mut self);
}

/// DUT connection relay. Both calls must be idempotent.
pub trait Relay {
    fn enable(&mut self);
    fn disable(&mut self);
}

/// Live readings of the DUT and heatsink.
///
/// There is no error channel: on a fault an implementation returns its last known or
/// a zero reading.
pub trait MeasurementSource {
    /// DUT voltage in volts.
    fn read_voltage(&mut self) -> f64;
    /// DUT current in amps.
    fn read_current(&mut self) -> f64;
    /// Heatsink temperature in degrees Celsius.
    fn read_temperature(&mut self) -> f64;

    /// Take one full set of readings.
    fn sample(&mut self) -> Measurement {
        let voltage = self.read_voltage();
        let current = self.read_current();
        let temperature = self.read_temperature();
        Measurement::new(voltage, current, temperature)
    }
}

/// Rotary encoder with push button, fed from interrupts.
///
/// The position is clamped by the implementation to the configured `[min, max]`.
/// Positions set through [`RotaryInput::set_position`] do not count as a change.
pub trait RotaryInput {
    fn position(&self) -> i32;

    /// Whether the position moved since the last call. Clears the flag.
    fn has_changed(&mut self) -> bool;

    /// Whether the button was pressed since the last call. Consumes the press.
    fn is_button_pressed(&mut self) -> bool;

    fn set_position(&mut self, position: i32);
    fn set_min(&mut self, min: i32);
    fn set_max(&mut self, max: i32);

    /// Reconfigure the range and seed the position in one go.
    fn configure(&mut self, min: i32, max: i32, position: i32) {
        self.set_min(min);
        self.set_max(max);
        self.set_position(position);
    }
}

/// Everything the display needs to draw one tick.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub mode: Mode,
    /// Highlighted entry of the main menu.
    pub menu_cursor: usize,
    /// Highlighted editor item (digit, output toggle or exit).
    pub selection: usize,
    pub edit_state: EditState,
    /// Setpoint digits with decimal point, empty outside regulation modes.
    pub digits: &'a str,
    pub unit: &'a str,
    pub measurement: &'a Measurement,
    pub output_active: bool,
    /// Formatted output-on time of the session.
    pub uptime: &'a str,
    pub energy_kj: f64,
}

/// Presentation layer. Purely a sink, nothing flows back into the core.
pub trait Display {
    fn render(&mut self, frame: &Frame<'_>);

    /// Pop up a transient warning over the current screen.
    fn show_warning(&mut self, message: &str, duration: MillisDurationU32);
}
