//! The text frame shown on the display.

use heapless::String;
use joylcd_gpio::joystick::JoystickState;
use joylcd_gpio::lcd::hd44780::driver::LINE_BREAK;
use thiserror::Error;

/// Room for the longest frame plus a terminator.
pub const FRAME_CAPACITY: usize = 20;

/// Number of digits shown per axis.
pub const AXIS_DIGITS: usize = 4;

pub type DisplayFrame = String<FRAME_CAPACITY>;

#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum FrameError {
    #[error("frame is longer than {FRAME_CAPACITY} bytes")]
    Overflow,
    #[error("{0} does not fit in {1} digits")]
    TooManyDigits(u32, usize),
}

/// Splits `value` into `N` decimal digits, most significant first.
///
/// Returns `None` if `value` needs more than `N` digits.
pub fn decimal_digits<const N: usize>(value: u32) -> Option<[u8; N]> {
    let mut digits = [0u8; N];
    let mut rest = value;
    for (i, digit) in digits.iter_mut().enumerate() {
        let power = 10u32.checked_pow((N - 1 - i) as u32)?;
        let d = rest / power;
        if d > 9 {
            return None;
        }
        *digit = d as u8;
        rest -= d * power;
    }
    (rest == 0).then_some(digits)
}

/// Bounds-checked frame assembly. Every push fails instead of truncating.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    frame: DisplayFrame,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, c: char) -> Result<&mut Self, FrameError> {
        self.frame.push(c).map_err(|_| FrameError::Overflow)?;
        Ok(self)
    }

    pub fn push_str(&mut self, s: &str) -> Result<&mut Self, FrameError> {
        self.frame.push_str(s).map_err(|_| FrameError::Overflow)?;
        Ok(self)
    }

    /// Pushes `value` zero-padded to exactly `N` digits.
    pub fn push_padded<const N: usize>(&mut self, value: u32) -> Result<&mut Self, FrameError> {
        let digits = decimal_digits::<N>(value).ok_or(FrameError::TooManyDigits(value, N))?;
        for digit in digits {
            self.push(char::from(b'0' + digit))?;
        }
        Ok(self)
    }

    pub fn finish(self) -> DisplayFrame {
        self.frame
    }
}

/// Renders `"x: DDDD\ny: DDDD BA"`, with a space in place of each released button.
pub fn render(state: &JoystickState) -> Result<DisplayFrame, FrameError> {
    let mut builder = FrameBuilder::new();
    builder
        .push_str("x: ")?
        .push_padded::<AXIS_DIGITS>(state.x.value().into())?
        .push(LINE_BREAK)?
        .push_str("y: ")?
        .push_padded::<AXIS_DIGITS>(state.y.value().into())?
        .push(' ')?
        .push(if state.button_1 { 'A' } else { ' ' })?
        .push(if state.button_2 { 'B' } else { ' ' })?;
    Ok(builder.finish())
}
