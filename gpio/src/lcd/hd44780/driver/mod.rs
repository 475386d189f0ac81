mod gpio;

use crate::{GpioError, GpioResult};
pub use gpio::*;
use log::warn;
use std::fmt::Debug;

/// Character that moves the cursor to the second line instead of being displayed.
pub const LINE_BREAK: char = '\n';

/// DDRAM address of the first character of the second line.
pub const SECOND_LINE_ADDRESS: u8 = 0x40;

pub trait HD44780Driver: Debug {
    /// Brings the controller from an unknown power-on state into 4-bit mode, two lines,
    /// display on, cursor off, left-to-right entry, with a cleared screen.
    fn init(&mut self) -> GpioResult<()>;

    /// Clears the display and sets the cursor to the home position.
    fn clear_display(&mut self) -> GpioResult<()> {
        self.send_command(0b00000001)
    }

    /// Sets the display to the specified entry mode.
    fn set_entry_mode(&mut self, cursor_direction: CursorDirection, shift: bool) -> GpioResult<()> {
        self.send_command(entry_mode_command(cursor_direction, shift))
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    fn set_display_control(
        &mut self,
        display_on: bool,
        cursor_on: bool,
        blink_on: bool,
    ) -> GpioResult<()> {
        let mut command = 0b00001000;
        if display_on {
            command |= 0b00000100;
        }
        if cursor_on {
            command |= 0b00000010;
        }
        if blink_on {
            command |= 0b00000001;
        }
        self.send_command(command)
    }

    /// Sets the interface width (`data_length` is 8-bit when true), line count and font.
    fn function_set(&mut self, data_length: bool, two_lines: bool, font: bool) -> GpioResult<()> {
        let mut command = 0b00100000;
        if data_length {
            command |= 0b00010000;
        }
        if two_lines {
            command |= 0b00001000;
        }
        if font {
            command |= 0b00000100;
        }
        self.send_command(command)
    }

    /// Sets the DDRAM address.
    fn set_ddram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > 0b01111111 {
            return Err(GpioError::InvalidArgument);
        }
        let command = 0b10000000 | address;
        self.send_command(command)
    }

    /// Moves the cursor to the start of the second line.
    fn next_line(&mut self) -> GpioResult<()> {
        self.set_ddram_address(SECOND_LINE_ADDRESS)
    }

    /// Writes text at the cursor, moving to the second line on [LINE_BREAK].
    ///
    /// Non-ASCII characters are shown as `?`.
    /// Returns the number of characters processed, line breaks included.
    fn write_text(&mut self, text: &str) -> GpioResult<usize> {
        let mut count = 0;
        for c in text.chars() {
            if c == LINE_BREAK {
                self.next_line()?;
            } else if c.is_ascii() {
                self.send_data(c as u8)?;
            } else {
                warn!("Non-ASCII character: {}", c);
                self.send_data(b'?')?;
            }
            count += 1;
        }
        Ok(count)
    }

    // Low-level commands
    // These raw commands are used by the high-level functions above.

    /// Sends a command to the HD44780 controller.
    /// Holds the RS pin at 0 (command) for the whole transfer.
    fn send_command(&mut self, command: u8) -> GpioResult<()>;

    /// Sends data to the HD44780 controller.
    /// Holds the RS pin at 1 (data) for the whole transfer.
    fn send_data(&mut self, data: u8) -> GpioResult<()>;
}

/// Encodes the entry mode set command.
pub fn entry_mode_command(cursor_direction: CursorDirection, shift: bool) -> u8 {
    let mut command = 0b00000100;
    if cursor_direction == CursorDirection::Right {
        command |= 0b00000010;
    }
    if shift {
        command |= 0b00000001;
    }
    command
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor to the left after writing data.
    Left,
    /// Moves the cursor to the right after writing data.
    Right,
}
