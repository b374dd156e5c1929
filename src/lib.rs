//! This crate provides the control core of a bench electronic load: an instrument which sinks a
//! controlled current, voltage, resistance or power from a device under test (DUT).
//!
//! The core is hardware agnostic. Board support code implements the traits in [`hal`] for its DAC,
//! ADC, DUT relay, rotary encoder and display, and then calls
//! [`LoadController::tick`](controller::LoadController::tick) from its main loop.
//!
//! Supported regulation modes:
//! * CC, constant current, 0 to 10 A
//! * CV, constant voltage, 0 to 100 V
//! * CR, constant resistance, 0 to 1000 kΩ
//! * CW, constant power, 0 to 250 W
//!
//! Setpoints are entered digit by digit with the encoder, or set by a remote client through the
//! [`RemoteMailbox`](sync::RemoteMailbox). State snapshots for remote clients are serialised as
//! JSON lines and can be written to any [`embedded_io::Write`] sink.
//!
//! A safety supervisor disarms the output as soon as the DUT voltage, current, power or the
//! heatsink temperature exceeds its hard limit.
//!
//! The core runs without `std` when built with the `no_std` feature flag. It still needs `alloc`
//! for the shared mailbox and snapshot encoding.

#![cfg_attr(all(feature = "no_std", not(test)), no_std)]

extern crate alloc;

pub mod config;
pub mod controller;
pub mod digits;
pub mod editor;
pub mod error;
pub mod fsm;
pub mod hal;
pub mod measurement;
pub mod mode;
pub mod regulation;
pub mod safety;
pub mod sync;
pub mod telemetry;

#[cfg(test)]
mod mock;

/// Monotonic loop time, in milliseconds.
pub type Instant = fugit::TimerInstantU64<1000>;

/// Loop time span, in milliseconds.
pub type Duration = fugit::MillisDurationU64;
