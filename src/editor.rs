//! Rotary-encoder driven digit-by-digit setpoint editor.
//!
//! The editor walks a selection over the digits of the active mode's layout followed
//! by two command items, output toggle and exit:
//!
//! ```text
//! [d0] [d1] . [d2] [d3] [d4]  [OUTPUT]  [EXIT]
//!   0    1      2    3    4       N       N+1
//! ```
//!
//! Pressing the encoder on a digit enters [`EditState::ModifyingDigit`], where rotation
//! writes the digit directly. Pressing again returns to [`EditState::Selecting`]. The
//! encoder range is reconfigured on every one of these transitions.

use tracing::debug;

use crate::{
    digits::{DigitBuffer, DigitLayout},
    hal::RotaryInput,
};

/// Whether rotation moves the selection or changes the selected digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditState {
    #[default]
    Selecting,
    ModifyingDigit,
}

/// What the caller has to do after feeding an input event to the editor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditorAction {
    None,
    /// The output toggle item was confirmed.
    ToggleOutput,
    /// The exit item was confirmed. Nothing else should be processed this tick.
    Exit,
    /// A digit changed; the digits now hold this value.
    SetpointEdited(f64),
}

#[derive(Debug, Clone)]
pub struct DigitEditor {
    digits: DigitBuffer,
    selection: usize,
    state: EditState,
}

impl DigitEditor {
    pub fn new(layout: DigitLayout) -> Self {
        Self {
            digits: DigitBuffer::zeroed(layout),
            selection: 0,
            state: EditState::Selecting,
        }
    }

    /// Start a fresh session for `layout`: all digits zero, first digit selected.
    pub fn begin<R: RotaryInput>(&mut self, layout: DigitLayout, rotary: &mut R) {
        *self = Self::new(layout);
        rotary.configure(0, self.exit_item() as i32, 0);
    }

    /// Drop back to an all-zero session without touching the encoder.
    pub fn reset(&mut self) {
        *self = Self::new(self.digits.layout());
    }

    pub fn digits(&self) -> &DigitBuffer {
        &self.digits
    }

    pub fn selection(&self) -> usize {
        self.selection
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    /// Selection index of the output toggle item.
    pub fn output_item(&self) -> usize {
        self.digits.len()
    }

    /// Selection index of the exit item.
    pub fn exit_item(&self) -> usize {
        self.digits.len() + 1
    }

    /// Handle an encoder press.
    pub fn confirm<R: RotaryInput>(&mut self, rotary: &mut R) -> EditorAction {
        match self.state {
            EditState::Selecting if self.selection < self.digits.len() => {
                let digit = self.digits.get(self.selection).unwrap_or(0);
                self.state = EditState::ModifyingDigit;
                rotary.configure(0, 9, i32::from(digit));
                debug!(selection = self.selection, digit, "Editing digit");
                EditorAction::None
            }
            EditState::Selecting if self.selection == self.output_item() => {
                EditorAction::ToggleOutput
            }
            EditState::Selecting => EditorAction::Exit,
            EditState::ModifyingDigit => {
                self.state = EditState::Selecting;
                rotary.configure(0, self.exit_item() as i32, self.selection as i32);
                EditorAction::None
            }
        }
    }

    /// Handle a new encoder position.
    pub fn rotate(&mut self, position: i32) -> EditorAction {
        match self.state {
            EditState::Selecting => {
                self.selection = position.clamp(0, self.exit_item() as i32) as usize;
                EditorAction::None
            }
            EditState::ModifyingDigit => {
                if self.digits.set(self.selection, position) {
                    EditorAction::SetpointEdited(self.digits.value())
                } else {
                    EditorAction::None
                }
            }
        }
    }

    /// Replace the digits with `value`, e.g. after clamping.
    pub fn load(&mut self, value: f64) {
        self.digits.load(value);
    }

    /// Replace the digits with `value` and keep the encoder in step with them.
    ///
    /// While a digit is being modified the encoder is reseeded so that the next
    /// rotation continues from the new digit instead of the stale one.
    pub fn reseed<R: RotaryInput>(&mut self, value: f64, rotary: &mut R) {
        self.digits.load(value);
        if self.state == EditState::ModifyingDigit {
            let digit = self.digits.get(self.selection).unwrap_or(0);
            rotary.set_position(i32::from(digit));
        }
    }
}
