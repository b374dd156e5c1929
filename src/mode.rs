//! Operating modes of the load and their fixed per-mode profiles.

use serde::Serialize;
use strum_macros::{EnumCount, EnumIter, EnumString, IntoStaticStr};

use crate::{digits::DigitLayout, error::ModeError};

/// All top-level states of the instrument.
///
/// Exactly one is active at any time. The string forms are the names used on the
/// remote interface.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumCount,
    EnumString,
    IntoStaticStr,
    Serialize,
)]
#[strum(ascii_case_insensitive)]
#[repr(u8)]
pub enum Mode {
    /// Mode selection screen. Output is always off here.
    #[strum(serialize = "MENU")]
    #[serde(rename = "MENU")]
    Menu = 0x00,
    /// Constant current regulation, setpoint in amps.
    #[strum(serialize = "CC")]
    #[serde(rename = "CC")]
    ConstantCurrent = 0x01,
    /// Constant voltage regulation, setpoint in volts.
    #[strum(serialize = "CV")]
    #[serde(rename = "CV")]
    ConstantVoltage = 0x02,
    /// Constant resistance regulation, setpoint in kilo-ohms.
    #[strum(serialize = "CR")]
    #[serde(rename = "CR")]
    ConstantResistance = 0x03,
    /// Constant power regulation, setpoint in watts.
    #[strum(serialize = "CW")]
    #[serde(rename = "CW")]
    ConstantPower = 0x04,
    /// Instrument settings screen.
    #[strum(serialize = "SETTINGS")]
    #[serde(rename = "SETTINGS")]
    Settings = 0x05,
}

/// Entries of the main menu, in cursor order.
///
/// The menu cursor indexes this table; the enum discriminants play no part in it.
pub const MENU_OPTIONS: [Mode; 5] = [
    Mode::ConstantCurrent,
    Mode::ConstantVoltage,
    Mode::ConstantResistance,
    Mode::ConstantPower,
    Mode::Settings,
];

impl Mode {
    /// Look up the mode behind a main menu cursor position.
    pub fn from_menu_index(index: usize) -> Option<Mode> {
        MENU_OPTIONS.get(index).copied()
    }

    /// Name as used on the remote interface, e.g. `"CC"`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Whether this is one of the four regulation modes.
    pub fn is_regulation(self) -> bool {
        self.profile().is_some()
    }

    /// Fixed editing and limit profile of a regulation mode.
    pub fn profile(self) -> Option<&'static ModeProfile> {
        match self {
            Mode::ConstantCurrent => Some(&CC_PROFILE),
            Mode::ConstantVoltage => Some(&CV_PROFILE),
            Mode::ConstantResistance => Some(&CR_PROFILE),
            Mode::ConstantPower => Some(&CW_PROFILE),
            Mode::Menu | Mode::Settings => None,
        }
    }

    /// Parse a mode requested by a remote client. Only regulation modes qualify.
    pub fn parse_remote(name: &str) -> Result<Mode, ModeError> {
        let mode: Mode = name.parse().map_err(|_| ModeError::UnknownName)?;
        if mode.is_regulation() {
            Ok(mode)
        } else {
            Err(ModeError::NotRemotelySelectable)
        }
    }
}

impl From<Mode> for u8 {
    fn from(value: Mode) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for Mode {
    type Error = ModeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Mode::Menu),
            0x01 => Ok(Mode::ConstantCurrent),
            0x02 => Ok(Mode::ConstantVoltage),
            0x03 => Ok(Mode::ConstantResistance),
            0x04 => Ok(Mode::ConstantPower),
            0x05 => Ok(Mode::Settings),
            other => Err(ModeError::UnknownCode(other)),
        }
    }
}

/// Which quantity the analog front end feeds back to the regulating MOSFETs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseMode {
    /// Shunt current feedback. Used by CC, CR and CW.
    Current,
    /// Divided DUT voltage feedback. Used by CV.
    Voltage,
}

/// Editing layout, limit and units of one regulation mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeProfile {
    /// How the setpoint is split into editable digits.
    pub layout: DigitLayout,
    /// Largest accepted setpoint.
    pub max: f64,
    /// Unit shown next to the setpoint.
    pub unit: &'static str,
    /// Front end feedback required by the mode.
    pub sense: SenseMode,
}

pub const CC_PROFILE: ModeProfile = ModeProfile {
    layout: DigitLayout::new(2, 3),
    max: 10.0,
    unit: "A",
    sense: SenseMode::Current,
};

pub const CV_PROFILE: ModeProfile = ModeProfile {
    layout: DigitLayout::new(3, 1),
    max: 100.0,
    unit: "V",
    sense: SenseMode::Voltage,
};

pub const CR_PROFILE: ModeProfile = ModeProfile {
    layout: DigitLayout::new(4, 4),
    max: 1000.0,
    unit: "kΩ",
    sense: SenseMode::Current,
};

pub const CW_PROFILE: ModeProfile = ModeProfile {
    layout: DigitLayout::new(3, 1),
    max: 250.0,
    unit: "W",
    sense: SenseMode::Current,
};

#[cfg(test)]
mod tests {
    use super::*;
    use strum::{EnumCount, IntoEnumIterator};

    #[test]
    fn test_mode_code_conversions() {
        for mode in Mode::iter() {
            let converted = Mode::try_from(u8::from(mode)).unwrap();
            assert_eq!(converted, mode);
        }
        assert_eq!(Mode::try_from(Mode::COUNT as u8), Err(ModeError::UnknownCode(6)));
    }

    #[test]
    fn test_menu_table_lookup() {
        assert_eq!(Mode::from_menu_index(0), Some(Mode::ConstantCurrent));
        assert_eq!(Mode::from_menu_index(3), Some(Mode::ConstantPower));
        assert_eq!(Mode::from_menu_index(4), Some(Mode::Settings));
        assert_eq!(Mode::from_menu_index(5), None);
    }

    #[test]
    fn test_remote_names() {
        assert_eq!(Mode::parse_remote("CC"), Ok(Mode::ConstantCurrent));
        assert_eq!(Mode::parse_remote("cw"), Ok(Mode::ConstantPower));
        assert_eq!(Mode::parse_remote("MENU"), Err(ModeError::NotRemotelySelectable));
        assert_eq!(Mode::parse_remote("XX"), Err(ModeError::UnknownName));
        assert_eq!(Mode::ConstantResistance.name(), "CR");
    }

    #[test]
    fn test_profiles_fit_their_layouts() {
        // Every mode maximum must be representable by its digit layout.
        for mode in Mode::iter().filter(|m| m.is_regulation()) {
            let profile = mode.profile().unwrap();
            assert!(profile.max <= profile.layout.max_value());
        }
        assert!(Mode::Menu.profile().is_none());
        assert!(Mode::Settings.profile().is_none());
    }
}
