//! Safety supervisor: shuts the load down as soon as a measurement exceeds a hard
//! limit while the output is armed.

use core::fmt::Write;

use modular_bitfield::prelude::*;
use tracing::error;

use crate::{
    hal::{Actuator, Relay},
    measurement::Measurement,
    mode::Mode,
    regulation::Regulator,
};

/// Hard limits of the instrument. Slightly above the largest setpoints so that
/// regulation overshoot does not trip the load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyThresholds {
    /// Volts.
    pub max_voltage: f64,
    /// Amps.
    pub max_current: f64,
    /// Watts.
    pub max_power: f64,
    /// Degrees Celsius.
    pub max_temperature: f64,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            max_voltage: 100.5,
            max_current: 10.5,
            max_power: 260.0,
            max_temperature: 85.0,
        }
    }
}

fn exceeds(reading: f64, limit: f64) -> bool {
    reading.is_nan() || reading > limit
}

/// Which thresholds a measurement exceeds.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripFlags {
    pub over_voltage: bool,
    pub over_current: bool,
    pub over_power: bool,
    pub over_temperature: bool,
    #[skip]
    __: B4,
}

impl TripFlags {
    pub fn any(&self) -> bool {
        self.into_bytes()[0] != 0
    }
}

/// Operator message describing a trip.
pub type TripMessage = heapless::String<64>;

/// A shutdown performed by [`SafetySupervisor::check`].
#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub flags: TripFlags,
    pub message: TripMessage,
}

#[derive(Debug, Clone, Default)]
pub struct SafetySupervisor {
    thresholds: SafetyThresholds,
}

impl SafetySupervisor {
    pub fn new(thresholds: SafetyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SafetyThresholds {
        &self.thresholds
    }

    /// Compare a measurement against every threshold. A reading which is not a number
    /// counts as exceeded.
    pub fn evaluate(&self, m: &Measurement) -> TripFlags {
        let t = &self.thresholds;
        TripFlags::new()
            .with_over_voltage(exceeds(m.voltage, t.max_voltage))
            .with_over_current(exceeds(m.current, t.max_current))
            .with_over_power(exceeds(m.power, t.max_power))
            .with_over_temperature(exceeds(m.temperature, t.max_temperature))
    }

    /// Whether any threshold is exceeded, armed or not.
    pub fn is_breached(&self, m: &Measurement) -> bool {
        self.evaluate(m).any()
    }

    /// Shut the load down if a threshold is exceeded while the output is armed.
    ///
    /// Disarms the output, opens the relay and zeroes the drive, in that order. Does
    /// nothing at all while the output is already disarmed, so repeated calls are safe.
    pub fn check<A: Actuator, R: Relay>(
        &self,
        m: &Measurement,
        output_active: &mut bool,
        mode: Mode,
        regulator: &mut Regulator,
        actuator: &mut A,
        relay: &mut R,
    ) -> Option<Trip> {
        if !*output_active {
            return None;
        }
        let flags = self.evaluate(m);
        if !flags.any() {
            return None;
        }

        *output_active = false;
        relay.disable();
        regulator.zero(mode, actuator);

        let message = self.describe(m, flags);
        error!(
            mode = mode.name(),
            voltage = m.voltage,
            current = m.current,
            power = m.power,
            temperature = m.temperature,
            "Safety trip: {message}"
        );
        Some(Trip { flags, message })
    }

    /// Message naming the last exceeded threshold in voltage, current, power,
    /// temperature order. Readings too large for the message are left out.
    fn describe(&self, m: &Measurement, flags: TripFlags) -> TripMessage {
        let t = &self.thresholds;
        let (label, reading, limit, unit, decimals) = if flags.over_temperature() {
            ("TEMPERATURE", m.temperature, t.max_temperature, "°C", 1)
        } else if flags.over_power() {
            ("POWER", m.power, t.max_power, "W", 3)
        } else if flags.over_current() {
            ("CURRENT", m.current, t.max_current, "A", 3)
        } else {
            ("VOLTAGE", m.voltage, t.max_voltage, "V", 3)
        };

        let mut message = TripMessage::new();
        if write!(
            message,
            "{label} LIMIT EXCEEDED: {reading:.decimals$}{unit} > {limit:.1}{unit}"
        )
        .is_err()
        {
            message.clear();
            let _ = write!(message, "{label} LIMIT EXCEEDED");
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{ActuatorCall, MockActuator, MockRelay},
        regulation::Calibration,
    };

    struct Bench {
        supervisor: SafetySupervisor,
        regulator: Regulator,
        actuator: MockActuator,
        relay: MockRelay,
    }

    impl Bench {
        fn new() -> Self {
            Self {
                supervisor: SafetySupervisor::default(),
                regulator: Regulator::new(Calibration::identity()),
                actuator: MockActuator::new(),
                relay: MockRelay::new(),
            }
        }

        fn check(&mut self, m: &Measurement, output_active: &mut bool) -> Option<Trip> {
            self.supervisor.check(
                m,
                output_active,
                Mode::ConstantCurrent,
                &mut self.regulator,
                &mut self.actuator,
                &mut self.relay,
            )
        }
    }

    #[test]
    fn test_evaluate_flags() {
        let supervisor = SafetySupervisor::default();
        let flags = supervisor.evaluate(&Measurement::new(12.0, 11.0, 30.0));
        assert!(flags.over_current());
        assert!(!flags.over_voltage());
        assert!(!flags.over_power());
        assert!(!flags.over_temperature());

        let flags = supervisor.evaluate(&Measurement::new(30.0, 9.0, 90.0));
        assert!(flags.over_power());
        assert!(flags.over_temperature());

        assert!(!supervisor.is_breached(&Measurement::new(100.0, 2.0, 40.0)));
    }

    #[test]
    fn test_trip_shuts_down_armed_output() {
        let mut bench = Bench::new();
        bench.relay.enable();
        let mut output_active = true;

        let trip = bench
            .check(&Measurement::new(12.0, 11.0, 30.0), &mut output_active)
            .unwrap();
        assert!(!output_active);
        assert!(!bench.relay.is_enabled());
        assert_eq!(bench.actuator.calls(), &[ActuatorCall::Current(0.0)]);
        assert!(trip.flags.over_current());
        assert_eq!(trip.message.as_str(), "CURRENT LIMIT EXCEEDED: 11.000A > 10.5A");
    }

    #[test]
    fn test_check_is_idempotent() {
        let mut bench = Bench::new();
        let m = Measurement::new(12.0, 11.0, 30.0);
        let mut output_active = true;

        assert!(bench.check(&m, &mut output_active).is_some());
        assert!(bench.check(&m, &mut output_active).is_none());
        assert!(bench.check(&m, &mut output_active).is_none());
        assert_eq!(bench.relay.disable_calls(), 1);
        assert_eq!(bench.actuator.calls().len(), 1);
    }

    #[test]
    fn test_disarmed_output_is_left_alone() {
        let mut bench = Bench::new();
        let mut output_active = false;

        assert!(bench.check(&Measurement::new(150.0, 0.0, 99.0), &mut output_active).is_none());
        assert_eq!(bench.relay.disable_calls(), 0);
        assert!(bench.actuator.calls().is_empty());
    }

    #[test]
    fn test_message_names_last_breach() {
        let mut bench = Bench::new();
        let mut output_active = true;

        let trip = bench
            .check(&Measurement::new(101.0, 10.6, 40.0), &mut output_active)
            .unwrap();
        assert!(trip.flags.over_voltage());
        assert!(trip.flags.over_current());
        assert!(trip.flags.over_power());
        assert_eq!(trip.message.as_str(), "POWER LIMIT EXCEEDED: 1070.600W > 260.0W");
    }

    #[test]
    fn test_unreadable_measurement_counts_as_breach() {
        let supervisor = SafetySupervisor::default();
        let mut m = Measurement::new(12.0, 1.0, 30.0);
        m.temperature = f64::NAN;
        let flags = supervisor.evaluate(&m);
        assert!(flags.over_temperature());
        assert!(!flags.over_current());
        assert!(supervisor.is_breached(&m));

        let mut bench = Bench::new();
        let mut output_active = true;
        let trip = bench.check(&m, &mut output_active).unwrap();
        assert!(!output_active);
        assert_eq!(trip.message.as_str(), "TEMPERATURE LIMIT EXCEEDED: NaN°C > 85.0°C");
    }

    #[test]
    fn test_huge_reading_keeps_message_readable() {
        let mut bench = Bench::new();
        let mut output_active = true;
        let mut m = Measurement::new(12.0, 1.0, 30.0);
        m.temperature = 1e300;

        let trip = bench.check(&m, &mut output_active).unwrap();
        assert_eq!(trip.message.as_str(), "TEMPERATURE LIMIT EXCEEDED");
    }
}
