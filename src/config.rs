//! Tunables of the control loop.

use fugit::MillisDurationU32;

use crate::{Duration, regulation::Calibration, safety::SafetyThresholds};

/// Configuration for a [`LoadController`](crate::controller::LoadController).
///
/// `Default` carries the constants of the reference bench; use the `with_*` methods
/// to override single values.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub calibration: Calibration,
    pub thresholds: SafetyThresholds,
    /// Maximum time between two state broadcasts.
    pub broadcast_interval: Duration,
    /// Time between two status log lines.
    pub status_interval: Duration,
    /// How long the setpoint limit warning stays up.
    pub clamp_warning: MillisDurationU32,
    /// How long a safety trip alert stays up.
    pub trip_warning: MillisDurationU32,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            thresholds: SafetyThresholds::default(),
            broadcast_interval: Duration::secs(1),
            status_interval: Duration::secs(30),
            clamp_warning: MillisDurationU32::millis(2000),
            trip_warning: MillisDurationU32::secs(5),
        }
    }
}

impl LoadConfig {
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_thresholds(mut self, thresholds: SafetyThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn with_clamp_warning(mut self, duration: MillisDurationU32) -> Self {
        self.clamp_warning = duration;
        self
    }

    pub fn with_trip_warning(mut self, duration: MillisDurationU32) -> Self {
        self.trip_warning = duration;
        self
    }
}
