use std::{cell::RefCell, rc::Rc};

use eload_core::{
    Instant,
    config::LoadConfig,
    controller::LoadController,
    error::ActuatorError,
    hal::{Actuator, Display, Frame, MeasurementSource, Relay, RotaryInput},
    mode::{MENU_OPTIONS, SenseMode},
    sync::RemoteCommand,
    telemetry,
};
use fugit::MillisDurationU32;
use inquire::{Confirm, CustomType, Select, Text};

// Simulated DUT: a bench supply with some internal resistance.
const SOURCE_VOLTAGE: f64 = 24.0;
const SOURCE_RESISTANCE_OHM: f64 = 0.5;
const AMBIENT_C: f64 = 25.0;
// Scaling of the simulated front end, matching the default calibration.
const SENSE_MV_PER_AMP: f64 = 100.0;
const PARALLEL_MOSFETS: f64 = 4.0;
const DIVIDER_MV_PER_VOLT: f64 = 5.0;
const DAC_MAX_MV: f64 = 500.0;

const TICK_MS: u64 = 100;

/// Shared state of the simulated analog world.
#[derive(Default)]
struct Plant {
    drive_mv: f64,
    sense: Option<SenseMode>,
    relay_closed: bool,
    rail_on: bool,
}

impl Plant {
    fn operating_point(&self) -> (f64, f64) {
        if !self.relay_closed || !self.rail_on {
            return (SOURCE_VOLTAGE, 0.0);
        }
        let max_current = SOURCE_VOLTAGE / SOURCE_RESISTANCE_OHM;
        match self.sense {
            Some(SenseMode::Voltage) => {
                let voltage = (self.drive_mv / DIVIDER_MV_PER_VOLT).min(SOURCE_VOLTAGE);
                (voltage, (SOURCE_VOLTAGE - voltage) / SOURCE_RESISTANCE_OHM)
            }
            _ => {
                let current = (self.drive_mv * PARALLEL_MOSFETS / SENSE_MV_PER_AMP).min(max_current);
                (SOURCE_VOLTAGE - current * SOURCE_RESISTANCE_OHM, current)
            }
        }
    }
}

struct SimActuator(Rc<RefCell<Plant>>);

impl SimActuator {
    fn drive(&mut self, drive_mv: f64) -> Result<(), ActuatorError> {
        if !(0.0..=DAC_MAX_MV).contains(&drive_mv) {
            return Err(ActuatorError::OutOfRange {
                requested_mv: drive_mv,
                max_mv: DAC_MAX_MV,
            });
        }
        self.0.borrow_mut().drive_mv = drive_mv;
        Ok(())
    }
}

impl Actuator for SimActuator {
    fn apply_current(&mut self, drive_mv: f64) -> Result<(), ActuatorError> {
        self.drive(drive_mv)
    }

    fn apply_voltage(&mut self, drive_mv: f64) -> Result<(), ActuatorError> {
        self.drive(drive_mv)
    }

    fn select_sense(&mut self, mode: SenseMode) {
        self.0.borrow_mut().sense = Some(mode);
    }

    fn enable_sense_rail(&mut self) {
        self.0.borrow_mut().rail_on = true;
    }

    fn disable_sense_rail(&mut self) {
        self.0.borrow_mut().rail_on = false;
    }
}

struct SimRelay(Rc<RefCell<Plant>>);

impl Relay for SimRelay {
    fn enable(&mut self) {
        self.0.borrow_mut().relay_closed = true;
    }

    fn disable(&mut self) {
        self.0.borrow_mut().relay_closed = false;
    }
}

struct SimMeasurements(Rc<RefCell<Plant>>);

impl MeasurementSource for SimMeasurements {
    fn read_voltage(&mut self) -> f64 {
        self.0.borrow().operating_point().0
    }

    fn read_current(&mut self) -> f64 {
        self.0.borrow().operating_point().1
    }

    fn read_temperature(&mut self) -> f64 {
        let (voltage, current) = self.0.borrow().operating_point();
        AMBIENT_C + voltage * current * 0.2
    }
}

#[derive(Default)]
struct Knob {
    position: i32,
    min: i32,
    max: i32,
    changed: bool,
    pressed: bool,
}

impl RotaryInput for Knob {
    fn position(&self) -> i32 {
        self.position
    }

    fn has_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    fn is_button_pressed(&mut self) -> bool {
        std::mem::take(&mut self.pressed)
    }

    fn set_position(&mut self, position: i32) {
        self.position = position.clamp(self.min, self.max.max(self.min));
    }

    fn set_min(&mut self, min: i32) {
        self.min = min;
    }

    fn set_max(&mut self, max: i32) {
        self.max = max;
    }
}

/// Prints a one line summary whenever the screen content changes.
#[derive(Default)]
struct Console {
    last: String,
}

impl Display for Console {
    fn render(&mut self, frame: &Frame<'_>) {
        let m = frame.measurement;
        let line = if frame.mode.is_regulation() {
            format!(
                "[{}] set {} {} | item {} ({:?}) | out {} | {:.3} V {:.3} A {:.2} W | {} {:.3} kJ",
                frame.mode.name(),
                frame.digits,
                frame.unit,
                frame.selection,
                frame.edit_state,
                if frame.output_active { "ON" } else { "off" },
                m.voltage,
                m.current,
                m.power,
                frame.uptime,
                frame.energy_kj,
            )
        } else {
            let cursor = MENU_OPTIONS.get(frame.menu_cursor).map(|mode| mode.name()).unwrap_or("?");
            format!("[{}] > {}", frame.mode.name(), cursor)
        };
        if line != self.last {
            println!("{line}");
            self.last = line;
        }
    }

    fn show_warning(&mut self, message: &str, duration: MillisDurationU32) {
        println!("!! {message} ({} ms)", duration.to_millis());
    }
}

pub struct StdoutWrapper(std::io::Stdout);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for StdoutWrapper {
    type Error = IoError;
}

impl embedded_io::Write for StdoutWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let plant = Rc::new(RefCell::new(Plant::default()));
    let mut load = LoadController::new(
        LoadConfig::default(),
        SimActuator(plant.clone()),
        SimRelay(plant.clone()),
        SimMeasurements(plant.clone()),
        Knob::default(),
        Console::default(),
    );
    let mailbox = load.mailbox();
    let mut link = StdoutWrapper(std::io::stdout());
    let mut now_ms = 0u64;
    let mut show_snapshots = false;

    let mut run = |load: &mut LoadController<_, _, _, _, _>, ticks: u64, show_snapshots: bool| {
        for _ in 0..ticks {
            now_ms += TICK_MS;
            let report = load.tick(Instant::from_ticks(now_ms));
            if let (true, Some(snapshot)) = (show_snapshots, report.snapshot) {
                if let Err(e) = telemetry::publish(&snapshot, &mut link) {
                    eprintln!("Failed to publish snapshot: {e}");
                }
            }
        }
    };
    run(&mut load, 1, show_snapshots);

    loop {
        let options = vec![
            "Turn knob",
            "Press knob",
            "Remote: set mode",
            "Remote: set value",
            "Remote: output on",
            "Remote: output off",
            "Remote: exit",
            "Remote: get state",
            "Run 5 s",
            "Toggle snapshot output",
            "Quit",
        ];
        let Ok(choice) = Select::new("Action:", options).prompt() else {
            break;
        };

        match choice {
            "Turn knob" => {
                let knob = load.rotary();
                let prompt = format!("Position ({}..={}):", knob.min, knob.max);
                if let Ok(position) = CustomType::<i32>::new(&prompt).prompt() {
                    let knob = load.rotary_mut();
                    knob.position = position.clamp(knob.min, knob.max.max(knob.min));
                    knob.changed = true;
                }
                run(&mut load, 1, show_snapshots);
            }
            "Press knob" => {
                load.rotary_mut().pressed = true;
                run(&mut load, 1, show_snapshots);
            }
            "Remote: set mode" => {
                if let Ok(name) = Text::new("Mode (CC, CV, CR, CW):").prompt() {
                    match RemoteCommand::set_mode_by_name(name.trim()) {
                        Some(command) => mailbox.post(command),
                        None => println!("Unknown mode {name}"),
                    }
                }
                run(&mut load, 1, show_snapshots);
            }
            "Remote: set value" => {
                if let Ok(value) = CustomType::<f64>::new("Value:").prompt() {
                    mailbox.post(RemoteCommand::SetValue(value));
                }
                run(&mut load, 1, show_snapshots);
            }
            "Remote: output on" => {
                mailbox.post(RemoteCommand::SetOutput(true));
                run(&mut load, 1, show_snapshots);
            }
            "Remote: output off" => {
                mailbox.post(RemoteCommand::SetOutput(false));
                run(&mut load, 1, show_snapshots);
            }
            "Remote: exit" => {
                mailbox.post(RemoteCommand::Exit);
                run(&mut load, 1, show_snapshots);
            }
            "Remote: get state" => {
                mailbox.post(RemoteCommand::GetState);
                run(&mut load, 1, true);
            }
            "Run 5 s" => run(&mut load, 5000 / TICK_MS, show_snapshots),
            "Toggle snapshot output" => {
                show_snapshots = !show_snapshots;
                println!("Snapshot output {}", if show_snapshots { "on" } else { "off" });
            }
            _ => {
                if Confirm::new("Shut the load down and quit?")
                    .with_default(true)
                    .prompt()
                    .unwrap_or(true)
                {
                    break;
                }
            }
        }
    }

    load.shutdown();
    println!("Load shut down, relay open.");
}
