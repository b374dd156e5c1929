//! Hand-over of setpoint, mode and output requests between the control loop and the
//! asynchronous remote interface.
//!
//! The remote side (a network task, a websocket handler, ...) never touches the control
//! loop's state. It posts [`RemoteCommand`]s into a shared [`RemoteMailbox`], and the
//! loop drains that mailbox once at the start of every tick. In the other direction the
//! loop publishes the state it ended the tick with.
//!
//! Every shared cell is a single atomic, `f64` values travel as their bit patterns.
//! Inbound requests and the outbound mirror use separate cells so that publishing a
//! local edit can never overwrite a remote request that has not been consumed yet.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use alloc::sync::Arc;

use tracing::debug;

use crate::mode::Mode;

const NO_MODE: u8 = u8::MAX;

const NO_OUTPUT: u8 = 0;
const OUTPUT_OFF: u8 = 1;
const OUTPUT_ON: u8 = 2;

/// Requests a remote client can make.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    /// Enter a regulation mode, disarming the output and resetting the setpoint.
    SetMode(Mode),
    /// Replace the setpoint of the active regulation mode.
    SetValue(f64),
    /// Arm or disarm the output.
    SetOutput(bool),
    /// Close or open the DUT relay. Output state follows the relay.
    SetRelay(bool),
    /// Leave the active mode for the main menu.
    Exit,
    /// Ask for a state snapshot on the next tick, e.g. for a newly connected client.
    GetState,
}

impl RemoteCommand {
    /// Build a mode request from a wire name. Unknown names and modes which can't be
    /// selected remotely are dropped.
    pub fn set_mode_by_name(name: &str) -> Option<Self> {
        match Mode::parse_remote(name) {
            Ok(mode) => Some(RemoteCommand::SetMode(mode)),
            Err(e) => {
                debug!(name, error = %e, "Dropping remote mode request");
                None
            }
        }
    }
}

/// Everything the remote side requested since the previous drain.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RemoteInputs {
    pub exit: bool,
    pub mode: Option<Mode>,
    pub value: Option<f64>,
    pub output: Option<bool>,
    pub state_requested: bool,
}

impl RemoteInputs {
    pub fn is_empty(&self) -> bool {
        !self.exit
            && !self.state_requested
            && self.mode.is_none()
            && self.value.is_none()
            && self.output.is_none()
    }
}

/// Lock-free cells shared between the control loop and the remote interface.
#[derive(Debug)]
pub struct RemoteMailbox {
    requested_value: AtomicU64,
    value_updated: AtomicBool,
    requested_mode: AtomicU8,
    requested_output: AtomicU8,
    exit_requested: AtomicBool,
    state_requested: AtomicBool,

    observed_value: AtomicU64,
    observed_mode: AtomicU8,
    observed_output: AtomicBool,
}

impl Default for RemoteMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteMailbox {
    pub fn new() -> Self {
        Self {
            requested_value: AtomicU64::new(0f64.to_bits()),
            value_updated: AtomicBool::new(false),
            requested_mode: AtomicU8::new(NO_MODE),
            requested_output: AtomicU8::new(NO_OUTPUT),
            exit_requested: AtomicBool::new(false),
            state_requested: AtomicBool::new(false),
            observed_value: AtomicU64::new(0f64.to_bits()),
            observed_mode: AtomicU8::new(Mode::Menu.into()),
            observed_output: AtomicBool::new(false),
        }
    }

    /// Queue a request for the next tick. A later request of the same kind replaces an
    /// earlier one that has not been consumed.
    pub fn post(&self, command: RemoteCommand) {
        match command {
            RemoteCommand::SetMode(mode) => {
                self.requested_mode.store(mode.into(), Ordering::Release);
            }
            RemoteCommand::SetValue(value) => {
                self.requested_value.store(value.to_bits(), Ordering::Relaxed);
                self.value_updated.store(true, Ordering::Release);
            }
            RemoteCommand::SetOutput(on) | RemoteCommand::SetRelay(on) => {
                let request = if on { OUTPUT_ON } else { OUTPUT_OFF };
                self.requested_output.store(request, Ordering::Release);
            }
            RemoteCommand::Exit => self.exit_requested.store(true, Ordering::Release),
            RemoteCommand::GetState => self.state_requested.store(true, Ordering::Release),
        }
    }

    /// Setpoint the control loop ended its last tick with.
    pub fn observed_value(&self) -> f64 {
        f64::from_bits(self.observed_value.load(Ordering::Acquire))
    }

    /// Mode the control loop ended its last tick in.
    pub fn observed_mode(&self) -> Mode {
        Mode::try_from(self.observed_mode.load(Ordering::Acquire)).unwrap_or(Mode::Menu)
    }

    /// Output state the control loop ended its last tick with.
    pub fn observed_output(&self) -> bool {
        self.observed_output.load(Ordering::Acquire)
    }

    fn take(&self) -> RemoteInputs {
        let value = self
            .value_updated
            .swap(false, Ordering::Acquire)
            .then(|| f64::from_bits(self.requested_value.load(Ordering::Relaxed)));
        let mode = match self.requested_mode.swap(NO_MODE, Ordering::Acquire) {
            NO_MODE => None,
            code => Mode::try_from(code).ok(),
        };
        let output = match self.requested_output.swap(NO_OUTPUT, Ordering::Acquire) {
            OUTPUT_ON => Some(true),
            OUTPUT_OFF => Some(false),
            _ => None,
        };
        RemoteInputs {
            exit: self.exit_requested.swap(false, Ordering::Acquire),
            mode,
            value,
            output,
            state_requested: self.state_requested.swap(false, Ordering::Acquire),
        }
    }

    fn mirror(&self, mode: Mode, value: f64, output_active: bool) {
        self.observed_value.store(value.to_bits(), Ordering::Release);
        self.observed_mode.store(mode.into(), Ordering::Release);
        self.observed_output.store(output_active, Ordering::Release);
    }
}

/// Control loop side of the mailbox.
#[derive(Debug, Clone, Default)]
pub struct Synchronizer {
    mailbox: Arc<RemoteMailbox>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the remote interface.
    pub fn mailbox(&self) -> Arc<RemoteMailbox> {
        Arc::clone(&self.mailbox)
    }

    /// Collect and clear all pending remote requests.
    pub fn drain(&self) -> RemoteInputs {
        let inputs = self.mailbox.take();
        if !inputs.is_empty() {
            debug!(?inputs, "Remote requests received");
        }
        inputs
    }

    /// Mirror the end-of-tick state for remote readers.
    pub fn publish(&self, mode: Mode, setpoint: f64, output_active: bool) {
        self.mailbox.mirror(mode, setpoint, output_active);
    }
}
