//! Regulation engine: maps a mode setpoint to a bounded actuator drive level.
//!
//! Constant resistance and constant power are derived modes. They compute the current
//! the DUT should deliver from the latest measured DUT voltage and then follow the
//! constant current path.
//!
//! All drive levels are DAC output voltages in millivolts:
//! * current loop: `corrected_amps * sense_mv_per_amp / parallel_mosfets`
//! * voltage loop: `corrected_volts * divider_mv_per_volt`

use tracing::{debug, error, warn};

use crate::{
    hal::Actuator,
    mode::{CC_PROFILE, Mode},
};

/// Below this DUT voltage a constant power target has no defined current.
pub const MIN_DERIVATION_VOLTAGE_V: f64 = 0.01;

/// Below this resistance a constant resistance target has no defined current.
pub const MIN_DERIVATION_RESISTANCE_OHM: f64 = 1e-3;

/// Empirical first-order correction of the analog chain.
///
/// `corrected = raw - (raw * slope + intercept)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCorrection {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearCorrection {
    /// No correction at all.
    pub const NONE: Self = Self::new(0.0, 0.0);

    pub const fn new(slope: f64, intercept: f64) -> Self {
        Self { slope, intercept }
    }

    #[inline]
    pub fn apply(&self, raw: f64) -> f64 {
        raw - (raw * self.slope + self.intercept)
    }
}

/// Calibration of the regulating front end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Correction applied to current targets (CC, CR, CW).
    pub current_correction: LinearCorrection,
    /// Correction applied to voltage targets (CV).
    pub voltage_correction: LinearCorrection,
    /// Shunt transfer in mV per amp. 100 mOhm shunt => `100.0`.
    pub sense_mv_per_amp: f64,
    /// Number of MOSFET stages sharing the current.
    pub parallel_mosfets: u8,
    /// DUT voltage divider transfer in mV per volt. 1:200 divider => `5.0`.
    pub divider_mv_per_volt: f64,
}

/// Bench calibration of the reference hardware.
impl Default for Calibration {
    fn default() -> Self {
        Self {
            current_correction: LinearCorrection::new(0.012, 0.004),
            voltage_correction: LinearCorrection::new(-0.003, 0.05),
            ..Self::identity()
        }
    }
}

impl Calibration {
    /// Reference scaling without any empirical correction.
    pub const fn identity() -> Self {
        Self {
            current_correction: LinearCorrection::NONE,
            voltage_correction: LinearCorrection::NONE,
            sense_mv_per_amp: 100.0,
            parallel_mosfets: 4,
            divider_mv_per_volt: 5.0,
        }
    }

    /// Drive level for a current target, before any range check by the actuator.
    pub fn current_drive_mv(&self, amps: f64) -> f64 {
        let corrected = self.current_correction.apply(amps).max(0.0);
        corrected * self.sense_mv_per_amp / f64::from(self.parallel_mosfets.max(1))
    }

    /// Drive level for a voltage target, before any range check by the actuator.
    pub fn voltage_drive_mv(&self, volts: f64) -> f64 {
        self.voltage_correction.apply(volts).max(0.0) * self.divider_mv_per_volt
    }
}

/// Actuator loop a command was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    Current,
    Voltage,
}

/// A drive level written to the actuator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    pub mode: Mode,
    pub drive: Drive,
    pub drive_mv: f64,
}

impl Command {
    /// Identity used to suppress repeated writes: drive level rounded to 1 uV.
    fn key(&self) -> (Mode, Drive, i64) {
        let uv = self.drive_mv * 1000.0;
        let uv = if uv < 0.0 { uv - 0.5 } else { uv + 0.5 };
        (self.mode, self.drive, uv as i64)
    }
}

/// Result of one regulation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// A new command was written.
    Applied(Command),
    /// Same command as the previous write; nothing was written.
    Unchanged,
    /// Target out of range or refused by the actuator; nothing was written.
    Rejected,
    /// The derived current is undefined; the previous command stays in force.
    Held,
    /// The mode does not regulate.
    Idle,
}

/// Stateful front end of the actuator.
///
/// It remembers the last write so that unchanged commands never reach the (slow) bus,
/// and the last derived current of CR/CW for reporting.
#[derive(Debug, Clone)]
pub struct Regulator {
    calibration: Calibration,
    last: Option<Command>,
    derived_current: Option<f64>,
}

impl Regulator {
    pub fn new(calibration: Calibration) -> Self {
        Self {
            calibration,
            last: None,
            derived_current: None,
        }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Last command successfully written to the actuator.
    pub fn last_command(&self) -> Option<Command> {
        self.last
    }

    /// Current most recently derived in CR or CW, in amps.
    pub fn derived_current(&self) -> Option<f64> {
        self.derived_current
    }

    /// Regulate `mode` to `target`, using `dut_voltage` for the derived modes.
    pub fn regulate<A: Actuator>(
        &mut self,
        mode: Mode,
        target: f64,
        dut_voltage: f64,
        actuator: &mut A,
    ) -> Outcome {
        let Some(profile) = mode.profile() else {
            return Outcome::Idle;
        };
        if !(0.0..=profile.max).contains(&target) {
            warn!(mode = mode.name(), target, max = profile.max, "Target out of range, ignored");
            return Outcome::Rejected;
        }

        match mode {
            Mode::ConstantCurrent => self.drive_current(mode, target, actuator),
            Mode::ConstantVoltage => {
                let drive_mv = self.calibration.voltage_drive_mv(target);
                self.emit(
                    Command {
                        mode,
                        drive: Drive::Voltage,
                        drive_mv,
                    },
                    actuator,
                )
            }
            Mode::ConstantResistance => {
                let ohms = target * 1000.0;
                if ohms < MIN_DERIVATION_RESISTANCE_OHM {
                    debug!(target, "Resistance too small to derive a current, holding");
                    return Outcome::Held;
                }
                let amps = dut_voltage / ohms;
                self.derived_current = Some(amps);
                self.drive_current(mode, amps, actuator)
            }
            Mode::ConstantPower => {
                if dut_voltage > -MIN_DERIVATION_VOLTAGE_V && dut_voltage < MIN_DERIVATION_VOLTAGE_V {
                    debug!(target, dut_voltage, "No DUT voltage to derive a current, holding");
                    return Outcome::Held;
                }
                let amps = target / dut_voltage;
                self.derived_current = Some(amps);
                self.drive_current(mode, amps, actuator)
            }
            Mode::Menu | Mode::Settings => Outcome::Idle,
        }
    }

    /// Write a zero current command, bypassing duplicate suppression.
    pub fn zero<A: Actuator>(&mut self, mode: Mode, actuator: &mut A) -> Outcome {
        let command = Command {
            mode,
            drive: Drive::Current,
            drive_mv: 0.0,
        };
        self.derived_current = None;
        match actuator.apply_current(0.0) {
            Ok(()) => {
                self.last = Some(command);
                Outcome::Applied(command)
            }
            Err(e) => {
                error!(error = %e, "Actuator refused zero command");
                Outcome::Rejected
            }
        }
    }

    fn drive_current<A: Actuator>(&mut self, mode: Mode, amps: f64, actuator: &mut A) -> Outcome {
        if !(0.0..=CC_PROFILE.max).contains(&amps) {
            warn!(mode = mode.name(), amps, max = CC_PROFILE.max, "Current out of range, ignored");
            return Outcome::Rejected;
        }
        let drive_mv = self.calibration.current_drive_mv(amps);
        self.emit(
            Command {
                mode,
                drive: Drive::Current,
                drive_mv,
            },
            actuator,
        )
    }

    fn emit<A: Actuator>(&mut self, command: Command, actuator: &mut A) -> Outcome {
        if self.last.map(|last| last.key()) == Some(command.key()) {
            return Outcome::Unchanged;
        }

        let result = match command.drive {
            Drive::Current => actuator.apply_current(command.drive_mv),
            Drive::Voltage => actuator.apply_voltage(command.drive_mv),
        };
        match result {
            Ok(()) => {
                debug!(
                    mode = command.mode.name(),
                    drive = ?command.drive,
                    drive_mv = command.drive_mv,
                    "Actuator command written"
                );
                self.last = Some(command);
                Outcome::Applied(command)
            }
            Err(e) => {
                warn!(mode = command.mode.name(), error = %e, "Actuator refused command");
                Outcome::Rejected
            }
        }
    }
}
