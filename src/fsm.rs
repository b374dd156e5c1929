//! Top-level mode state machine.

use tracing::{debug, info};

use crate::mode::Mode;

/// Tracks the active [`Mode`] and whether it changed since it was last looked at.
///
/// The machine starts in [`Mode::Menu`] with the change flag raised so that the menu's
/// entry actions run on the very first tick.
#[derive(Debug, Clone)]
pub struct ModeMachine {
    current: Mode,
    previous: Mode,
    changed: bool,
}

impl Default for ModeMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeMachine {
    pub fn new() -> Self {
        Self {
            current: Mode::Menu,
            previous: Mode::Menu,
            changed: true,
        }
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    /// Mode active before the latest transition.
    pub fn previous(&self) -> Mode {
        self.previous
    }

    /// Switch to `target`. Returns `false` if it was already active.
    pub fn change_mode(&mut self, target: Mode) -> bool {
        if target == self.current {
            return false;
        }
        info!(from = self.current.name(), to = target.name(), "Mode change");
        self.previous = self.current;
        self.current = target;
        self.changed = true;
        true
    }

    /// Switch by numeric mode code, dropping codes outside the enumeration.
    pub fn change_mode_raw(&mut self, code: u8) -> bool {
        match Mode::try_from(code) {
            Ok(mode) => self.change_mode(mode),
            Err(e) => {
                debug!(code, error = %e, "Ignoring mode change");
                false
            }
        }
    }

    /// Switch by wire name, dropping unknown names.
    pub fn change_mode_by_name(&mut self, name: &str) -> bool {
        match name.parse::<Mode>() {
            Ok(mode) => self.change_mode(mode),
            Err(_) => {
                debug!(name, "Ignoring mode change to unknown mode");
                false
            }
        }
    }

    /// Switch to the main menu entry at `index`, dropping indices past the table.
    pub fn change_mode_by_menu_index(&mut self, index: usize) -> bool {
        match Mode::from_menu_index(index) {
            Some(mode) => self.change_mode(mode),
            None => {
                debug!(index, "Ignoring menu selection");
                false
            }
        }
    }

    /// Returns `true` exactly once per transition, then clears the flag.
    pub fn consume_changed(&mut self) -> bool {
        core::mem::take(&mut self.changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_entry_is_reported_once() {
        let mut fsm = ModeMachine::new();
        assert_eq!(fsm.current(), Mode::Menu);
        assert!(fsm.consume_changed());
        assert!(!fsm.consume_changed());
    }

    #[test]
    fn test_transition_records_previous() {
        let mut fsm = ModeMachine::new();
        fsm.consume_changed();

        assert!(fsm.change_mode(Mode::ConstantVoltage));
        assert_eq!(fsm.current(), Mode::ConstantVoltage);
        assert_eq!(fsm.previous(), Mode::Menu);
        assert!(fsm.consume_changed());
    }

    #[test]
    fn test_same_mode_is_not_a_transition() {
        let mut fsm = ModeMachine::new();
        fsm.consume_changed();

        assert!(!fsm.change_mode(Mode::Menu));
        assert!(!fsm.consume_changed());
    }

    #[test]
    fn test_invalid_targets_are_dropped() {
        let mut fsm = ModeMachine::new();
        fsm.consume_changed();

        assert!(!fsm.change_mode_raw(0x17));
        assert!(!fsm.change_mode_by_name("TURBO"));
        assert!(!fsm.change_mode_by_menu_index(5));
        assert_eq!(fsm.current(), Mode::Menu);
        assert!(!fsm.consume_changed());
    }

    #[test]
    fn test_valid_indirect_targets() {
        let mut fsm = ModeMachine::new();
        assert!(fsm.change_mode_raw(0x03));
        assert_eq!(fsm.current(), Mode::ConstantResistance);
        assert!(fsm.change_mode_by_name("cw"));
        assert_eq!(fsm.current(), Mode::ConstantPower);
        assert!(fsm.change_mode_by_menu_index(4));
        assert_eq!(fsm.current(), Mode::Settings);
    }
}
