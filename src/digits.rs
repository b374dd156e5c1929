//! Conversions between editable digit buffers and physical setpoint values.
//!
//! A setpoint such as `01.500` A is edited as a fixed number of decimal digits, split
//! into an integer prefix and a fractional suffix by a [`DigitLayout`]. Values are
//! aggregated as scaled integers so that converting digits to a number and back is
//! exact for every buffer the layout can hold.

use heapless::{String, Vec};

/// Largest number of digits any layout may use.
pub const MAX_DIGITS: usize = 8;

/// How a setpoint is split into digits before and after the decimal point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitLayout {
    before: u8,
    after: u8,
}

impl DigitLayout {
    /// Create a layout. Panics at compile time for layouts longer than [`MAX_DIGITS`].
    pub const fn new(before: u8, after: u8) -> Self {
        assert!((before as usize + after as usize) <= MAX_DIGITS);
        assert!(before > 0);
        Self { before, after }
    }

    /// Number of digits before the decimal point.
    #[inline]
    pub const fn before(&self) -> usize {
        self.before as usize
    }

    /// Number of digits after the decimal point.
    #[inline]
    pub const fn after(&self) -> usize {
        self.after as usize
    }

    /// Total number of editable digits.
    #[inline]
    pub const fn total(&self) -> usize {
        self.before() + self.after()
    }

    /// Largest value the layout can represent, e.g. `99.999` for a 2.3 layout.
    pub fn max_value(&self) -> f64 {
        (10u64.pow(self.total() as u32) - 1) as f64 / self.fraction_scale()
    }

    fn fraction_scale(&self) -> f64 {
        10u64.pow(self.after() as u32) as f64
    }
}

/// Owned digit buffer for one editing session.
///
/// Its length always equals the layout's digit count and every entry is in `0..=9`.
/// [`DigitBuffer::set`] is the only way to change a single digit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitBuffer {
    layout: DigitLayout,
    digits: Vec<u8, MAX_DIGITS>,
}

impl DigitBuffer {
    /// Buffer of all zeros for `layout`.
    pub fn zeroed(layout: DigitLayout) -> Self {
        Self {
            layout,
            digits: (0..layout.total()).map(|_| 0).collect(),
        }
    }

    /// Build a buffer from explicit digits. Returns `None` if the length does not match
    /// the layout or a digit is above 9.
    pub fn from_digits(layout: DigitLayout, digits: &[u8]) -> Option<Self> {
        if digits.len() != layout.total() || digits.iter().any(|d| *d > 9) {
            return None;
        }
        let digits = Vec::from_slice(digits).ok()?;
        Some(Self { layout, digits })
    }

    pub fn layout(&self) -> DigitLayout {
        self.layout
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.digits
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.digits.get(index).copied()
    }

    /// Overwrite one digit, clamping it to `0..=9`.
    ///
    /// Returns `false` (and leaves the buffer untouched) if `index` is out of range.
    pub fn set(&mut self, index: usize, digit: i32) -> bool {
        match self.digits.get_mut(index) {
            Some(slot) => {
                *slot = digit.clamp(0, 9) as u8;
                true
            }
            None => false,
        }
    }

    /// Physical value held by the buffer.
    pub fn value(&self) -> f64 {
        digits_to_number(&self.digits, self.layout)
    }

    /// Replace every digit with the representation of `value`.
    pub fn load(&mut self, value: f64) {
        *self = number_to_digits(value, self.layout);
    }

    /// Digits with the decimal point inserted, e.g. `"01.500"`.
    pub fn render(&self) -> String<{ MAX_DIGITS + 1 }> {
        // Capacity covers every digit plus the point, pushes cannot fail.
        let mut out = String::new();
        for (index, digit) in self.digits.iter().enumerate() {
            if index == self.layout.before() && self.layout.after() > 0 {
                let _ = out.push('.');
            }
            let _ = out.push(char::from(b'0' + digit));
        }
        out
    }
}

/// Combine digits into a value: integer digits weigh `10^(before-1-i)`, fractional
/// digits weigh `10^(-1-j)`.
pub fn digits_to_number(digits: &[u8], layout: DigitLayout) -> f64 {
    let scaled = digits
        .iter()
        .take(layout.total())
        .fold(0u64, |acc, digit| acc * 10 + u64::from(*digit));
    scaled as f64 / layout.fraction_scale()
}

/// Split a value into digits for `layout`.
///
/// The value is rounded to the layout's resolution. Negative and NaN values give all
/// zeros, values beyond the layout saturate to all nines.
pub fn number_to_digits(value: f64, layout: DigitLayout) -> DigitBuffer {
    let mut buffer = DigitBuffer::zeroed(layout);
    if value.is_nan() || value <= 0.0 {
        return buffer;
    }

    let limit = 10u64.pow(layout.total() as u32);
    // Positive here, so adding a half and truncating rounds to nearest.
    let scaled = value * layout.fraction_scale() + 0.5;
    let mut scaled = if scaled >= limit as f64 {
        limit - 1
    } else {
        scaled as u64
    };

    for index in (0..layout.total()).rev() {
        buffer.set(index, (scaled % 10) as i32);
        scaled /= 10;
    }
    buffer
}
