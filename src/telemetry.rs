//! Session statistics and the state snapshot served to remote clients.

use core::fmt::Write as _;

use serde::Serialize;

use crate::{
    Duration, Instant,
    error::{Error, Result},
    measurement::Measurement,
    mode::Mode,
};

/// `HH:MM:SS` output-on time, `HHH:MM:SS` above 99 hours.
pub type UptimeText = heapless::String<12>;

/// Output-on time and energy sunk during the current mode session.
///
/// Both advance in whole seconds of loop time, and only while the output is armed.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    output_on_secs: u64,
    energy_kj: f64,
    second_mark: Option<Instant>,
}

impl SessionStats {
    /// Zero everything. The next [`SessionStats::update`] starts a new second grid.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Account for every whole second elapsed since the previous call.
    pub fn update(&mut self, now: Instant, output_active: bool, power: f64) {
        let Some(mark) = self.second_mark else {
            self.second_mark = Some(now);
            return;
        };
        let secs = now
            .checked_duration_since(mark)
            .map(|elapsed| elapsed.to_secs())
            .unwrap_or(0);
        if secs == 0 {
            return;
        }

        self.second_mark = Some(mark + Duration::secs(secs));
        if output_active {
            self.output_on_secs += secs;
            // power is W, one second at P watts is P/1000 kJ
            self.energy_kj += power * secs as f64 / 1000.0;
        }
    }

    pub fn output_on_secs(&self) -> u64 {
        self.output_on_secs
    }

    pub fn energy_kj(&self) -> f64 {
        self.energy_kj
    }

    pub fn uptime(&self) -> UptimeText {
        let hours = self.output_on_secs / 3600;
        let minutes = (self.output_on_secs % 3600) / 60;
        let seconds = self.output_on_secs % 60;
        let mut text = UptimeText::new();
        // Fits up to 9 digit hour counts.
        let _ = if hours > 99 {
            write!(text, "{hours:03}:{minutes:02}:{seconds:02}")
        } else {
            write!(text, "{hours:02}:{minutes:02}:{seconds:02}")
        };
        text
    }
}

/// Fires once per `interval` of loop time.
#[derive(Debug, Clone)]
pub struct Periodic {
    interval: Duration,
    last: Option<Instant>,
}

impl Periodic {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether the interval elapsed since the last firing. The first poll only starts
    /// the clock.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.last {
            None => {
                self.last = Some(now);
                false
            }
            Some(last) => {
                let due = now
                    .checked_duration_since(last)
                    .is_some_and(|elapsed| elapsed >= self.interval);
                if due {
                    self.last = Some(now);
                }
                due
            }
        }
    }

    /// Restart the interval from `now`, e.g. after an out-of-band firing.
    pub fn restart(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

/// Measurement part of a [`StateSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementReport {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub resistance: f64,
    pub temperature: f64,
    pub uptime: UptimeText,
    /// kJ.
    pub energy: f64,
}

/// Control part of a [`StateSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlState {
    pub mode: Mode,
    pub output_active: bool,
    pub value: f64,
}

/// What a remote client sees of the instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub measurements: MeasurementReport,
    pub state: ControlState,
}

impl StateSnapshot {
    pub fn new(
        mode: Mode,
        setpoint: f64,
        output_active: bool,
        measurement: &Measurement,
        stats: &SessionStats,
    ) -> Self {
        Self {
            measurements: MeasurementReport {
                voltage: measurement.voltage,
                current: measurement.current,
                power: measurement.power,
                resistance: measurement.resistance,
                temperature: measurement.temperature,
                uptime: stats.uptime(),
                energy: stats.energy_kj(),
            },
            state: ControlState {
                mode,
                output_active,
                value: setpoint,
            },
        }
    }
}

/// Write `snapshot` to `link` as one line of JSON.
pub fn publish<W: embedded_io::Write>(snapshot: &StateSnapshot, link: &mut W) -> Result<(), W::Error> {
    let mut line = serde_json::to_vec(snapshot)?;
    line.push(b'\n');
    link.write_all(&line).map_err(Error::LinkError)?;
    link.flush().map_err(Error::LinkError)
}
