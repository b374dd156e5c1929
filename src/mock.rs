//! Recording peripherals used by the unit tests in place of real hardware.

use fugit::MillisDurationU32;

use crate::{
    editor::EditState,
    error::ActuatorError,
    hal::{Actuator, Display, Frame, MeasurementSource, Relay, RotaryInput},
    mode::{Mode, SenseMode},
};

/// One accepted actuator write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCall {
    Current(f64),
    Voltage(f64),
}

/// Actuator which records every accepted drive level and refuses levels above its limit.
pub struct MockActuator {
    calls: Vec<ActuatorCall>,
    max_mv: f64,
    refused: usize,
    sense: Option<SenseMode>,
    rail_enabled: bool,
}

impl MockActuator {
    /// Actuator with the 500 mV range of the reference DAC.
    pub fn new() -> Self {
        Self::with_limit(500.0)
    }

    pub fn with_limit(max_mv: f64) -> Self {
        Self {
            calls: Vec::new(),
            max_mv,
            refused: 0,
            sense: None,
            rail_enabled: false,
        }
    }

    pub fn calls(&self) -> &[ActuatorCall] {
        &self.calls
    }

    pub fn last_call(&self) -> Option<ActuatorCall> {
        self.calls.last().copied()
    }

    /// Number of writes refused as out of range.
    pub fn refused(&self) -> usize {
        self.refused
    }

    pub fn sense(&self) -> Option<SenseMode> {
        self.sense
    }

    pub fn rail_enabled(&self) -> bool {
        self.rail_enabled
    }

    fn accept(&mut self, drive_mv: f64, call: ActuatorCall) -> Result<(), ActuatorError> {
        if !(0.0..=self.max_mv).contains(&drive_mv) {
            self.refused += 1;
            return Err(ActuatorError::OutOfRange {
                requested_mv: drive_mv,
                max_mv: self.max_mv,
            });
        }
        self.calls.push(call);
        Ok(())
    }
}

impl Actuator for MockActuator {
    fn apply_current(&mut self, drive_mv: f64) -> Result<(), ActuatorError> {
        self.accept(drive_mv, ActuatorCall::Current(drive_mv))
    }

    fn apply_voltage(&mut self, drive_mv: f64) -> Result<(), ActuatorError> {
        self.accept(drive_mv, ActuatorCall::Voltage(drive_mv))
    }

    fn select_sense(&mut self, mode: SenseMode) {
        self.sense = Some(mode);
    }

    fn enable_sense_rail(&mut self) {
        self.rail_enabled = true;
    }

    fn disable_sense_rail(&mut self) {
        self.rail_enabled = false;
    }
}

/// Relay which counts how often it was told to open.
pub struct MockRelay {
    enabled: bool,
    disable_calls: usize,
}

impl MockRelay {
    pub fn new() -> Self {
        Self {
            enabled: false,
            disable_calls: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn disable_calls(&self) -> usize {
        self.disable_calls
    }
}

impl Relay for MockRelay {
    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.disable_calls += 1;
    }
}

/// Measurement source returning whatever the test set last.
#[derive(Default)]
pub struct MockMeasurements {
    pub voltage: f64,
    pub current: f64,
    pub temperature: f64,
}

impl MockMeasurements {
    pub fn new() -> Self {
        Self {
            temperature: 25.0,
            ..Self::default()
        }
    }

    pub fn set(&mut self, voltage: f64, current: f64) {
        self.voltage = voltage;
        self.current = current;
    }
}

impl MeasurementSource for MockMeasurements {
    fn read_voltage(&mut self) -> f64 {
        self.voltage
    }

    fn read_current(&mut self) -> f64 {
        self.current
    }

    fn read_temperature(&mut self) -> f64 {
        self.temperature
    }
}

/// Encoder whose turns and presses are injected by the test.
pub struct MockRotary {
    position: i32,
    min: i32,
    max: i32,
    changed: bool,
    pressed: bool,
}

impl MockRotary {
    pub fn new() -> Self {
        Self {
            position: 0,
            min: 0,
            max: 0,
            changed: false,
            pressed: false,
        }
    }

    /// Turn the knob to `position`, clamped like the real encoder.
    pub fn turn_to(&mut self, position: i32) {
        self.position = position.clamp(self.min, self.max);
        self.changed = true;
    }

    pub fn press(&mut self) {
        self.pressed = true;
    }

    pub fn range(&self) -> (i32, i32) {
        (self.min, self.max)
    }
}

impl RotaryInput for MockRotary {
    fn position(&self) -> i32 {
        self.position
    }

    fn has_changed(&mut self) -> bool {
        core::mem::take(&mut self.changed)
    }

    fn is_button_pressed(&mut self) -> bool {
        core::mem::take(&mut self.pressed)
    }

    fn set_position(&mut self, position: i32) {
        self.position = position.clamp(self.min, self.max);
    }

    fn set_min(&mut self, min: i32) {
        self.min = min;
    }

    fn set_max(&mut self, max: i32) {
        self.max = max;
    }
}

/// Owned copy of the interesting parts of a [`Frame`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFrame {
    pub mode: Mode,
    pub menu_cursor: usize,
    pub selection: usize,
    pub edit_state: EditState,
    pub digits: String,
    pub output_active: bool,
}

/// Display which keeps the last frame and every warning.
pub struct MockDisplay {
    frames: usize,
    last: Option<RenderedFrame>,
    warnings: Vec<(String, MillisDurationU32)>,
}

impl MockDisplay {
    pub fn new() -> Self {
        Self {
            frames: 0,
            last: None,
            warnings: Vec::new(),
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn last_frame(&self) -> Option<&RenderedFrame> {
        self.last.as_ref()
    }

    pub fn warnings(&self) -> &[(String, MillisDurationU32)] {
        &self.warnings
    }
}

impl Display for MockDisplay {
    fn render(&mut self, frame: &Frame<'_>) {
        self.frames += 1;
        self.last = Some(RenderedFrame {
            mode: frame.mode,
            menu_cursor: frame.menu_cursor,
            selection: frame.selection,
            edit_state: frame.edit_state,
            digits: frame.digits.into(),
            output_active: frame.output_active,
        });
    }

    fn show_warning(&mut self, message: &str, duration: MillisDurationU32) {
        self.warnings.push((message.into(), duration));
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MockLinkError {
    /// Simulated transport failure
    #[error("Simulated link error")]
    SimulatedError,
    /// Write buffer full
    #[error("Link buffer overflow")]
    BufferOverflow,
}

impl embedded_io::Error for MockLinkError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockLinkError::SimulatedError => embedded_io::ErrorKind::Other,
            MockLinkError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
        }
    }
}

/// Byte sink standing in for the remote client link.
pub struct MockLink {
    write_buffer: heapless::Vec<u8, 1024>,
    should_error_on_write: bool,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            should_error_on_write: false,
        }
    }

    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }
}

impl embedded_io::ErrorType for MockLink {
    type Error = MockLinkError;
}

impl embedded_io::Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockLinkError::SimulatedError);
        }
        self.write_buffer
            .extend_from_slice(buf)
            .map_err(|_| MockLinkError::BufferOverflow)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockLinkError::SimulatedError);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::Write;

    #[test]
    fn test_actuator_refuses_above_limit() {
        let mut actuator = MockActuator::with_limit(100.0);
        assert!(actuator.apply_current(50.0).is_ok());
        assert!(matches!(
            actuator.apply_voltage(150.0),
            Err(ActuatorError::OutOfRange { .. })
        ));
        assert_eq!(actuator.calls(), &[ActuatorCall::Current(50.0)]);
        assert_eq!(actuator.refused(), 1);
    }

    #[test]
    fn test_rotary_clamps_and_reports_turns_once() {
        let mut rotary = MockRotary::new();
        rotary.configure(0, 6, 2);
        assert!(!rotary.has_changed());

        rotary.turn_to(10);
        assert_eq!(rotary.position(), 6);
        assert!(rotary.has_changed());
        assert!(!rotary.has_changed());

        rotary.press();
        assert!(rotary.is_button_pressed());
        assert!(!rotary.is_button_pressed());
    }

    #[test]
    fn test_link_write_and_error() {
        let mut link = MockLink::new();
        link.write_all(b"hello").unwrap();
        assert_eq!(link.written_data(), b"hello");

        link.set_write_error(true);
        assert!(matches!(link.write(b"x"), Err(MockLinkError::SimulatedError)));
        assert!(link.flush().is_err());
    }
}
