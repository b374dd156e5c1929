//! Our error types for the load control core.

use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Errors raised while publishing state snapshots to a remote link.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Link communication error")]
    LinkError(I),
    #[error("Snapshot encoding error: {0}")]
    EncodeError(serde_json::Error),
}

impl<I: embedded_io::Error> From<serde_json::Error> for Error<I> {
    fn from(err: serde_json::Error) -> Self {
        Error::EncodeError(err)
    }
}

/// Refusal reported by an [`Actuator`](crate::hal::Actuator) implementation.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ActuatorError {
    #[error("Drive level {requested_mv:.3} mV outside calibrated range (max {max_mv:.3} mV)")]
    OutOfRange { requested_mv: f64, max_mv: f64 },
    #[error("Actuator not ready")]
    NotReady,
}

/// Mode lookups which fall outside the enumeration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModeError {
    #[error("Unknown mode code: {0}")]
    UnknownCode(u8),
    #[error("Unknown mode name")]
    UnknownName,
    #[error("Mode cannot be selected remotely")]
    NotRemotelySelectable,
}
