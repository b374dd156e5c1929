//! The control loop.
//!
//! One [`LoadController::tick`] runs to completion and, in this order:
//! 1. samples the measurements and the encoder
//! 2. applies pending remote requests
//! 3. runs the safety supervisor
//! 4. runs the active mode (entry actions, menu or digit editor input)
//! 5. regulates, if a regulation mode is active and the output is armed
//! 6. updates session statistics, mirrors the state for remote readers, logs, decides whether to
//!    broadcast and renders

use core::fmt::Write as _;
use alloc::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    Instant,
    config::LoadConfig,
    editor::{DigitEditor, EditorAction},
    fsm::ModeMachine,
    hal::{Actuator, Display, Frame, MeasurementSource, Relay, RotaryInput},
    measurement::Measurement,
    mode::{CC_PROFILE, MENU_OPTIONS, Mode, ModeProfile, SenseMode},
    regulation::Regulator,
    safety::{SafetySupervisor, Trip},
    sync::{RemoteInputs, RemoteMailbox, Synchronizer},
    telemetry::{Periodic, SessionStats, StateSnapshot},
};

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Set if the safety supervisor shut the output down.
    pub trip: Option<Trip>,
    /// Set when remote clients should be sent the current state.
    pub snapshot: Option<StateSnapshot>,
}

/// Encoder events, read once at the start of a tick.
#[derive(Debug, Clone, Copy, Default)]
struct Input {
    pressed: bool,
    turned: bool,
    position: i32,
}

impl Input {
    fn read<E: RotaryInput>(rotary: &mut E) -> Self {
        Self {
            pressed: rotary.is_button_pressed(),
            turned: rotary.has_changed(),
            position: rotary.position(),
        }
    }
}

/// Owns every collaborator and all control state of the instrument.
pub struct LoadController<A: Actuator, R: Relay, M: MeasurementSource, E: RotaryInput, D: Display> {
    config: LoadConfig,
    actuator: A,
    relay: R,
    measurements: M,
    rotary: E,
    display: D,

    fsm: ModeMachine,
    editor: DigitEditor,
    regulator: Regulator,
    supervisor: SafetySupervisor,
    sync: Synchronizer,
    stats: SessionStats,
    broadcast: Periodic,
    status: Periodic,

    measurement: Measurement,
    setpoint: f64,
    output_active: bool,
    menu_cursor: usize,
}

impl<A: Actuator, R: Relay, M: MeasurementSource, E: RotaryInput, D: Display> LoadController<A, R, M, E, D> {
    /// Take over the hardware. The DUT relay is opened and the front end put into current sense
    /// before anything else happens.
    pub fn new(config: LoadConfig, mut actuator: A, mut relay: R, measurements: M, rotary: E, display: D) -> Self {
        relay.disable();
        actuator.select_sense(SenseMode::Current);
        actuator.enable_sense_rail();

        Self {
            regulator: Regulator::new(config.calibration),
            supervisor: SafetySupervisor::new(config.thresholds),
            broadcast: Periodic::new(config.broadcast_interval),
            status: Periodic::new(config.status_interval),
            config,
            actuator,
            relay,
            measurements,
            rotary,
            display,
            fsm: ModeMachine::new(),
            editor: DigitEditor::new(CC_PROFILE.layout),
            sync: Synchronizer::new(),
            stats: SessionStats::default(),
            measurement: Measurement::default(),
            setpoint: 0.0,
            output_active: false,
            menu_cursor: 0,
        }
    }

    /// Handle for the remote interface.
    pub fn mailbox(&self) -> Arc<RemoteMailbox> {
        self.sync.mailbox()
    }

    pub fn mode(&self) -> Mode {
        self.fsm.current()
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn output_active(&self) -> bool {
        self.output_active
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    pub fn editor(&self) -> &DigitEditor {
        &self.editor
    }

    pub fn regulator(&self) -> &Regulator {
        &self.regulator
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn rotary(&self) -> &E {
        &self.rotary
    }

    pub fn rotary_mut(&mut self) -> &mut E {
        &mut self.rotary
    }

    pub fn measurements_mut(&mut self) -> &mut M {
        &mut self.measurements
    }

    /// State as served to remote clients.
    pub fn current_state(&self) -> StateSnapshot {
        StateSnapshot::new(
            self.fsm.current(),
            self.setpoint,
            self.output_active,
            &self.measurement,
            &self.stats,
        )
    }

    /// Run one iteration of the control loop.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let before = self.observed();

        self.measurement = self.measurements.sample();
        let input = Input::read(&mut self.rotary);

        let remote = self.sync.drain();
        // Encoder input read before a remote mode change belongs to the old screen.
        let input = if self.apply_remote(&remote) {
            Input::default()
        } else {
            input
        };

        let trip = self.supervisor.check(
            &self.measurement,
            &mut self.output_active,
            self.fsm.current(),
            &mut self.regulator,
            &mut self.actuator,
            &mut self.relay,
        );
        if let Some(trip) = &trip {
            self.display.show_warning(&trip.message, self.config.trip_warning);
        }

        self.dispatch(input);

        let mode = self.fsm.current();
        if self.output_active && mode.is_regulation() {
            self.regulator
                .regulate(mode, self.setpoint, self.measurement.voltage, &mut self.actuator);
        }

        self.stats.update(now, self.output_active, self.measurement.power);
        self.sync.publish(mode, self.setpoint, self.output_active);
        if self.status.poll(now) {
            self.log_status();
        }

        // Remote requests, state requests included, are answered on the same tick.
        let forced = self.observed() != before || trip.is_some() || !remote.is_empty();
        let due = self.broadcast.poll(now);
        let snapshot = if forced || due {
            self.broadcast.restart(now);
            Some(self.current_state())
        } else {
            None
        };

        self.render();
        TickReport { trip, snapshot }
    }

    /// Disarm, open the relay and power down the sense rail. The controller is back in the main
    /// menu afterwards.
    pub fn shutdown(&mut self) {
        self.exit_to_menu();
        self.actuator.disable_sense_rail();
        info!("Load shut down");
    }

    fn observed(&self) -> (Mode, f64, bool) {
        (self.fsm.current(), self.setpoint, self.output_active)
    }

    /// Returns `true` if a mode was entered.
    fn apply_remote(&mut self, remote: &RemoteInputs) -> bool {
        let mut entered = false;
        if remote.exit {
            info!("Remote exit to main menu");
            entered |= self.exit_to_menu();
        }

        if let Some(mode) = remote.mode {
            if mode.is_regulation() {
                self.disarm();
                self.setpoint = 0.0;
                if !self.fsm.change_mode(mode) {
                    self.editor.reseed(0.0, &mut self.rotary);
                }
                entered |= self.enter_if_changed();
            } else {
                debug!(mode = mode.name(), "Ignoring remote request for non regulation mode");
            }
        }

        if let Some(value) = remote.value {
            match self.fsm.current().profile() {
                Some(profile) if value.is_finite() => {
                    self.setpoint = self.limit(profile, value);
                    self.editor.reseed(self.setpoint, &mut self.rotary);
                    info!(setpoint = self.setpoint, "Remote setpoint");
                }
                Some(_) => warn!(value, "Ignoring non finite remote setpoint"),
                None => debug!(
                    value,
                    mode = self.fsm.current().name(),
                    "Discarding remote setpoint outside regulation mode"
                ),
            }
        }

        match remote.output {
            Some(true) => {
                self.arm();
            }
            Some(false) => self.disarm(),
            None => {}
        }
        entered
    }

    fn dispatch(&mut self, input: Input) {
        if !self.enter_if_changed() {
            match self.fsm.current() {
                Mode::Menu => self.run_menu(input),
                Mode::Settings => {
                    if input.pressed {
                        self.fsm.change_mode(Mode::Menu);
                    }
                }
                mode => self.run_regulation(mode, input),
            }
        }
        self.enter_if_changed();
    }

    fn enter_if_changed(&mut self) -> bool {
        if !self.fsm.consume_changed() {
            return false;
        }
        match self.fsm.current() {
            Mode::Menu => self.enter_menu(),
            Mode::Settings => self.enter_settings(),
            mode => self.enter_regulation(mode),
        }
        true
    }

    fn enter_menu(&mut self) {
        self.output_active = false;
        self.setpoint = 0.0;
        self.regulator.zero(Mode::Menu, &mut self.actuator);
        self.actuator.select_sense(SenseMode::Current);
        self.relay.disable();
        self.menu_cursor = 0;
        self.rotary.configure(0, (MENU_OPTIONS.len() - 1) as i32, 0);
        self.stats.reset();
        info!("Entered main menu");
    }

    fn enter_settings(&mut self) {
        self.output_active = false;
        self.rotary.configure(0, 0, 0);
        info!("Entered settings");
    }

    fn enter_regulation(&mut self, mode: Mode) {
        let Some(profile) = mode.profile() else {
            return;
        };
        self.output_active = false;
        self.relay.disable();
        self.setpoint = 0.0;
        self.editor.begin(profile.layout, &mut self.rotary);
        self.stats.reset();
        self.actuator.select_sense(profile.sense);
        self.actuator.enable_sense_rail();
        self.regulator.zero(mode, &mut self.actuator);
        info!(mode = mode.name(), "Entered regulation mode");
    }

    fn run_menu(&mut self, input: Input) {
        if input.pressed {
            if self.fsm.change_mode_by_menu_index(self.menu_cursor) {
                self.setpoint = 0.0;
                self.output_active = false;
            }
        } else if input.turned {
            self.menu_cursor = input.position.clamp(0, (MENU_OPTIONS.len() - 1) as i32) as usize;
        }
    }

    fn run_regulation(&mut self, mode: Mode, input: Input) {
        let action = if input.pressed {
            self.editor.confirm(&mut self.rotary)
        } else if input.turned {
            self.editor.rotate(input.position)
        } else {
            EditorAction::None
        };

        match action {
            EditorAction::None => {}
            EditorAction::ToggleOutput => {
                if self.output_active {
                    self.disarm();
                } else {
                    self.arm();
                }
            }
            EditorAction::Exit => {
                info!(mode = mode.name(), "Exit to main menu");
                self.exit_to_menu();
            }
            EditorAction::SetpointEdited(value) => {
                let Some(profile) = mode.profile() else {
                    return;
                };
                self.setpoint = self.limit(profile, value);
                // Also undoes a reseed by a remote value earlier in this tick.
                self.editor.reseed(self.setpoint, &mut self.rotary);
                debug!(mode = mode.name(), setpoint = self.setpoint, "Setpoint edited");
            }
        }
    }

    /// Clamp a setpoint into the mode's range, warning the operator about values above it.
    fn limit(&mut self, profile: &ModeProfile, value: f64) -> f64 {
        if value > profile.max {
            warn!(value, max = profile.max, "Setpoint above limit, clamped");
            let mut message: heapless::String<32> = heapless::String::new();
            let _ = write!(message, "Limit: {:.2}{}", profile.max, profile.unit);
            self.display.show_warning(&message, self.config.clamp_warning);
            profile.max
        } else if value < 0.0 {
            debug!(value, "Negative setpoint, clamped to zero");
            0.0
        } else {
            value
        }
    }

    /// Returns `true` if the main menu was entered.
    fn exit_to_menu(&mut self) -> bool {
        self.disarm();
        self.setpoint = 0.0;
        self.editor.reset();
        self.fsm.change_mode(Mode::Menu);
        self.enter_if_changed()
    }

    fn arm(&mut self) -> bool {
        let mode = self.fsm.current();
        if !mode.is_regulation() {
            debug!(mode = mode.name(), "No output to arm outside regulation mode");
            return false;
        }
        if self.supervisor.is_breached(&self.measurement) {
            warn!(mode = mode.name(), "Safety limit exceeded, refusing to arm output");
            return false;
        }
        self.output_active = true;
        self.relay.enable();
        info!(mode = mode.name(), setpoint = self.setpoint, "Output armed");
        true
    }

    fn disarm(&mut self) {
        let was_active = core::mem::replace(&mut self.output_active, false);
        self.relay.disable();
        self.regulator.zero(self.fsm.current(), &mut self.actuator);
        if was_active {
            info!(mode = self.fsm.current().name(), "Output disarmed");
        }
    }

    fn log_status(&self) {
        let m = &self.measurement;
        info!(
            mode = self.fsm.current().name(),
            setpoint = self.setpoint,
            output_active = self.output_active,
            voltage = m.voltage,
            current = m.current,
            power = m.power,
            temperature = m.temperature,
            uptime = self.stats.uptime().as_str(),
            energy_kj = self.stats.energy_kj(),
            "Status"
        );
    }

    fn render(&mut self) {
        let mode = self.fsm.current();
        let (digits, unit) = match mode.profile() {
            Some(profile) => (self.editor.digits().render(), profile.unit),
            None => (heapless::String::new(), ""),
        };
        let uptime = self.stats.uptime();
        let frame = Frame {
            mode,
            menu_cursor: self.menu_cursor,
            selection: self.editor.selection(),
            edit_state: self.editor.state(),
            digits: &digits,
            unit,
            measurement: &self.measurement,
            output_active: self.output_active,
            uptime: &uptime,
            energy_kj: self.stats.energy_kj(),
        };
        self.display.render(&frame);
    }
}
