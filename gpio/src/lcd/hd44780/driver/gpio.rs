use crate::delay::Delay;
use crate::lcd::hd44780::driver::{entry_mode_command, CursorDirection, HD44780Driver};
use crate::{GpioBusOutput, GpioError, GpioOutput, GpioResult};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::time::Duration;

/// Fixed delays of the bit-banged protocol, in microseconds.
///
/// The controller is never polled, so every value must cover the slowest operation it follows.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HD44780Timings {
    /// Settle time after each wake-up and interface-switch nibble during initialization.
    pub wake_hold_us: u64,
    /// Setup time between setting RS and the first enable pulse.
    pub mode_setup_us: u64,
    /// How long E is held high.
    pub enable_hold_us: u64,
    /// Settle time after E falls, before the next nibble.
    pub nibble_settle_us: u64,
    /// Extra settle time after clear and home commands.
    pub long_command_us: u64,
}

impl Default for HD44780Timings {
    fn default() -> Self {
        HD44780Timings {
            wake_hold_us: 5000,
            mode_setup_us: 50,
            enable_hold_us: 10,
            nibble_settle_us: 100,
            long_command_us: 2000,
        }
    }
}

impl HD44780Timings {
    pub fn wake_hold(&self) -> Duration {
        Duration::from_micros(self.wake_hold_us)
    }

    pub fn mode_setup(&self) -> Duration {
        Duration::from_micros(self.mode_setup_us)
    }

    pub fn enable_hold(&self) -> Duration {
        Duration::from_micros(self.enable_hold_us)
    }

    pub fn nibble_settle(&self) -> Duration {
        Duration::from_micros(self.nibble_settle_us)
    }

    pub fn long_command(&self) -> Duration {
        Duration::from_micros(self.long_command_us)
    }
}

/// HD44780 driver bit-banging the 4-bit interface over GPIO outputs.
///
/// The driver owns its RS, E and data line outputs, so nothing else can toggle them mid-transfer.
pub struct GpioHD44780Driver<'a> {
    pin_rs: Box<dyn GpioOutput + 'a>,
    pin_e: Box<dyn GpioOutput + 'a>,
    data_bus: Box<dyn GpioBusOutput<4> + 'a>,
    delay: &'a dyn Delay,
    timings: HD44780Timings,
    entry_mode: u8,
    ready: bool,
}

impl<'a> GpioHD44780Driver<'a> {
    /// Creates a driver for an uninitialized controller. Call [HD44780Driver::init] before
    /// sending anything.
    ///
    /// # Parameters
    ///
    /// - `pin_rs`: Register select output pin.
    /// - `pin_e`: Enable output pin.
    /// - `data_bus`: D4..D7, written LSb first.
    /// - `delay`: Source of every protocol delay.
    pub fn new(
        pin_rs: Box<dyn GpioOutput + 'a>,
        pin_e: Box<dyn GpioOutput + 'a>,
        data_bus: Box<dyn GpioBusOutput<4> + 'a>,
        delay: &'a dyn Delay,
        timings: HD44780Timings,
    ) -> Self {
        GpioHD44780Driver {
            pin_rs,
            pin_e,
            data_bus,
            delay,
            timings,
            entry_mode: entry_mode_command(CursorDirection::Right, false),
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn pulse_e(&self, settle: Duration) -> GpioResult<()> {
        self.pin_e.write(true)?;
        self.delay.hold(self.timings.enable_hold());
        self.pin_e.write(false)?;
        self.delay.hold(settle);
        Ok(())
    }

    fn write_nibble(&self, nibble: u8, settle: Duration) -> GpioResult<()> {
        trace!("Writing nibble: {:04b}", nibble);
        self.data_bus.write_nibble(nibble)?;
        self.pulse_e(settle)
    }

    fn send(&mut self, data: u8, rs: bool) -> GpioResult<()> {
        if !self.ready {
            return Err(GpioError::NotInitialized);
        }
        trace!("Sending data: {:08b}, RS: {}", data, rs);

        self.pin_rs.write(rs)?;
        self.delay.hold(self.timings.mode_setup());

        let settle = self.timings.nibble_settle();
        self.write_nibble((data >> 4) & 0x0F, settle)?;
        self.write_nibble(data & 0x0F, settle)?;

        // Clear and home take over a millisecond to execute
        if !rs && data <= 0b00000011 {
            self.delay.hold(self.timings.long_command());
        }
        Ok(())
    }
}

impl Debug for GpioHD44780Driver<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GpioHD44780Driver(RS: {:?}, E: {:?}, D: {:?})",
            self.pin_rs, self.pin_e, self.data_bus
        )
    }
}

impl HD44780Driver for GpioHD44780Driver<'_> {
    fn init(&mut self) -> GpioResult<()> {
        self.ready = false;
        self.pin_rs.write(false)?;
        self.pin_e.write(false)?;

        // Synchronize: three 8-bit function sets recover a controller left in any state,
        // then a single 4-bit function set switches the interface
        let wake = self.timings.wake_hold();
        for _ in 0..3 {
            self.write_nibble(0b0011, wake)?;
        }
        self.write_nibble(0b0010, wake)?;
        self.ready = true;

        self.function_set(false, true, false)?;
        self.set_display_control(false, false, false)?;
        self.clear_display()?;
        self.set_entry_mode(CursorDirection::Right, false)?;
        self.set_display_control(true, false, false)?;

        debug!("{:?} initialized.", self);
        Ok(())
    }

    fn set_entry_mode(&mut self, cursor_direction: CursorDirection, shift: bool) -> GpioResult<()> {
        let command = entry_mode_command(cursor_direction, shift);
        self.send_command(command)?;
        self.entry_mode = command;
        Ok(())
    }

    fn send_command(&mut self, command: u8) -> GpioResult<()> {
        self.send(command, false)
    }

    /// Sends a character, then re-asserts the entry mode so the cursor keeps advancing in the
    /// configured direction even on controllers that disturb it on data writes.
    fn send_data(&mut self, data: u8) -> GpioResult<()> {
        self.send(data, true)?;
        self.send_command(self.entry_mode)
    }
}
