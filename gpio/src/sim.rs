//! Simulated hardware for running without a board.
//!
//! [SimGpio] records every electrical level change, [Hd44780Model] replays such a recording the
//! way an HD44780 controller would see it, [SimAdc] serves scripted conversion results, and
//! [SimDelay] accounts for held time instead of waiting.

use crate::adc::{AdcChannel, AdcConfig, AnalogSampler};
use crate::delay::Delay;
use crate::soft::SoftGpioBusOutput;
use crate::{
    GpioActiveLevel, GpioBias, GpioBus, GpioBusOutput, GpioDriver, GpioError, GpioInput,
    GpioOutput, GpioPin, GpioResult,
};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use std::time::Duration;

/// A single electrical level change on a simulated line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinEvent {
    pub pin: usize,
    pub level: bool,
}

#[derive(Debug, Default)]
struct SimLine {
    level: Cell<bool>,
    claimed: Cell<bool>,
}

/// Simulated GPIO chip.
pub struct SimGpio {
    lines: Vec<SimLine>,
    events: RefCell<Vec<PinEvent>>,
    recording: bool,
}

impl SimGpio {
    pub fn new(count: usize) -> Self {
        SimGpio {
            lines: (0..count).map(|_| SimLine::default()).collect(),
            events: RefCell::new(Vec::new()),
            recording: true,
        }
    }

    /// Stops keeping the event history, for long-running simulations.
    pub fn without_recording(mut self) -> Self {
        self.recording = false;
        self
    }

    /// Sets the electrical level seen by inputs on the given line.
    pub fn set_level(&self, pin: usize, level: bool) {
        if let Some(line) = self.lines.get(pin) {
            line.level.set(level);
        }
    }

    pub fn level(&self, pin: usize) -> Option<bool> {
        self.lines.get(pin).map(|line| line.level.get())
    }

    pub fn events(&self) -> Vec<PinEvent> {
        self.events.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    fn drive(&self, pin: usize, level: bool) {
        self.lines[pin].level.set(level);
        if self.recording {
            self.events.borrow_mut().push(PinEvent { pin, level });
        }
    }

    fn claim(&self, indices: &[usize]) -> GpioResult<()> {
        if indices.iter().any(|&index| index >= self.lines.len()) {
            return Err(GpioError::InvalidArgument);
        }
        if indices.iter().any(|&index| self.lines[index].claimed.get()) {
            return Err(GpioError::AlreadyInUse);
        }
        for &index in indices {
            self.lines[index].claimed.set(true);
        }
        Ok(())
    }
}

impl Debug for SimGpio {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimGpio({})", self.lines.len())
    }
}

impl GpioDriver for SimGpio {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.lines.len())
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        self.claim(&[index])?;
        Ok(Box::new(SimPin {
            gpio: self,
            index,
            active_level: GpioActiveLevel::High,
            bias: GpioBias::None,
        }))
    }

    fn get_pin_bus<const N: usize>(
        &self,
        indices: [usize; N],
    ) -> GpioResult<Box<dyn GpioBus<N> + '_>> {
        self.claim(&indices)?;
        Ok(Box::new(SimBus {
            gpio: self,
            indices,
            active_level: GpioActiveLevel::High,
        }))
    }
}

#[derive(Debug)]
struct SimPin<'a> {
    gpio: &'a SimGpio,
    index: usize,
    active_level: GpioActiveLevel,
    bias: GpioBias,
}

impl GpioPin for SimPin<'_> {
    fn as_input(&mut self) -> GpioResult<Box<dyn GpioInput + '_>> {
        match self.bias {
            GpioBias::PullUp => self.gpio.set_level(self.index, true),
            GpioBias::PullDown => self.gpio.set_level(self.index, false),
            GpioBias::None => {}
        }
        Ok(Box::new(SimInput {
            gpio: self.gpio,
            index: self.index,
            active_level: self.active_level,
        }))
    }

    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        Ok(Box::new(SimOutput {
            gpio: self.gpio,
            index: self.index,
            active_level: self.active_level,
        }))
    }

    fn supports_active_level(&self) -> bool {
        true
    }

    fn active_level(&self) -> GpioActiveLevel {
        self.active_level
    }

    fn set_active_level(&mut self, level: GpioActiveLevel) -> GpioResult<()> {
        self.active_level = level;
        Ok(())
    }

    fn supports_bias(&self) -> bool {
        true
    }

    fn bias(&self) -> GpioBias {
        self.bias
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        self.bias = bias;
        Ok(())
    }
}

impl Drop for SimPin<'_> {
    fn drop(&mut self) {
        self.gpio.lines[self.index].claimed.set(false);
    }
}

#[derive(Debug)]
struct SimInput<'a> {
    gpio: &'a SimGpio,
    index: usize,
    active_level: GpioActiveLevel,
}

impl GpioInput for SimInput<'_> {
    fn read(&self) -> GpioResult<bool> {
        let level = self.gpio.lines[self.index].level.get();
        Ok(self.active_level.get_state(level))
    }
}

#[derive(Debug)]
struct SimOutput<'a> {
    gpio: &'a SimGpio,
    index: usize,
    active_level: GpioActiveLevel,
}

impl GpioOutput for SimOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.gpio.drive(self.index, self.active_level.get_state(value));
        Ok(())
    }
}

#[derive(Debug)]
struct SimBus<'a, const N: usize> {
    gpio: &'a SimGpio,
    indices: [usize; N],
    active_level: GpioActiveLevel,
}

impl<'a, const N: usize> GpioBus<N> for SimBus<'a, N> {
    fn as_output(&mut self) -> GpioResult<Box<dyn GpioBusOutput<N> + '_>> {
        let gpio = self.gpio;
        let active_level = self.active_level;
        let pins = self.indices.map(|index| -> Box<dyn GpioOutput + 'a> {
            Box::new(SimOutput { gpio, index, active_level })
        });
        Ok(Box::new(SoftGpioBusOutput::new(pins)))
    }

    fn supports_active_level(&self) -> bool {
        true
    }

    fn active_level(&self) -> GpioActiveLevel {
        self.active_level
    }

    fn set_active_level(&mut self, level: GpioActiveLevel) -> GpioResult<()> {
        self.active_level = level;
        Ok(())
    }
}

impl<const N: usize> Drop for SimBus<'_, N> {
    fn drop(&mut self) {
        for &index in &self.indices {
            self.gpio.lines[index].claimed.set(false);
        }
    }
}

/// Delay that only accounts for the requested holds.
#[derive(Debug, Default)]
pub struct SimDelay {
    holds: RefCell<Vec<Duration>>,
}

impl SimDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holds(&self) -> Vec<Duration> {
        self.holds.borrow().clone()
    }

    pub fn total(&self) -> Duration {
        self.holds.borrow().iter().sum()
    }

    pub fn clear(&self) {
        self.holds.borrow_mut().clear();
    }
}

impl Delay for SimDelay {
    fn hold(&self, duration: Duration) {
        self.holds.borrow_mut().push(duration);
    }
}

#[derive(Debug, Default)]
struct SimChannel {
    queue: VecDeque<u16>,
    last: u16,
    drift: u16,
}

impl SimChannel {
    fn next(&mut self) -> u16 {
        match self.queue.pop_front() {
            Some(value) => self.last = value,
            None => self.last = ((u32::from(self.last) + u32::from(self.drift)) % 1024) as u16,
        }
        self.last
    }
}

#[derive(Debug, Default)]
struct SimAdcState {
    config: Option<AdcConfig>,
    channels: HashMap<AdcChannel, SimChannel>,
    selected: Option<AdcChannel>,
    sampling: bool,
    pending: Option<u16>,
    polls_left: u32,
    latency: u32,
    stuck: bool,
    conversions: usize,
}

/// Scripted converter. Clones share state, so a test can keep a handle after handing one out.
///
/// Each channel serves its queued values in order. Once the queue runs dry it repeats the last
/// value, advanced by the channel drift.
#[derive(Clone, Debug, Default)]
pub struct SimAdc {
    state: Rc<RefCell<SimAdcState>>,
}

impl SimAdc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_values(&self, channel: AdcChannel, values: &[u16]) {
        let mut state = self.state.borrow_mut();
        state.channels.entry(channel).or_default().queue.extend(values);
    }

    pub fn set_drift(&self, channel: AdcChannel, step: u16) {
        self.state.borrow_mut().channels.entry(channel).or_default().drift = step % 1024;
    }

    /// Number of "not done" polls before each conversion completes.
    pub fn set_latency(&self, polls: u32) {
        self.state.borrow_mut().latency = polls;
    }

    /// Makes every started conversion never complete.
    pub fn set_stuck(&self, stuck: bool) {
        self.state.borrow_mut().stuck = stuck;
    }

    pub fn conversions(&self) -> usize {
        self.state.borrow().conversions
    }

    pub fn config(&self) -> Option<AdcConfig> {
        self.state.borrow().config
    }
}

impl AnalogSampler for SimAdc {
    fn enable(&mut self, config: &AdcConfig) -> GpioResult<()> {
        self.state.borrow_mut().config = Some(*config);
        Ok(())
    }

    fn select_channel(&mut self, channel: AdcChannel) -> GpioResult<()> {
        let mut state = self.state.borrow_mut();
        if state.config.is_none() {
            return Err(GpioError::Other("converter not enabled".to_string()));
        }
        state.selected = Some(channel);
        Ok(())
    }

    fn start_sample(&mut self) -> GpioResult<()> {
        let mut state = self.state.borrow_mut();
        if state.selected.is_none() {
            return Err(GpioError::InvalidArgument);
        }
        state.sampling = true;
        state.pending = None;
        Ok(())
    }

    fn stop_sample_start_convert(&mut self) -> GpioResult<()> {
        let mut state = self.state.borrow_mut();
        let channel = match state.selected {
            Some(channel) if state.sampling => channel,
            _ => return Err(GpioError::InvalidArgument),
        };
        state.sampling = false;
        state.polls_left = state.latency;
        let value = state.channels.entry(channel).or_default().next();
        state.pending = Some(value);
        state.conversions += 1;
        Ok(())
    }

    fn is_conversion_done(&mut self) -> GpioResult<bool> {
        let mut state = self.state.borrow_mut();
        if state.stuck || state.pending.is_none() {
            return Ok(false);
        }
        if state.polls_left > 0 {
            state.polls_left -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    fn read_result(&mut self) -> GpioResult<u16> {
        self.state
            .borrow()
            .pending
            .ok_or_else(|| GpioError::Other("no finished conversion".to_string()))
    }
}

/// Lines an [Hd44780Model] listens to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Hd44780Pins {
    pub rs: usize,
    pub e: usize,
    /// D4, D5, D6, D7.
    pub data: [usize; 4],
}

/// One latched transfer, as the controller understood it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Hd44780Transfer {
    /// A single nibble latched while the controller was still in 8-bit mode.
    Nibble(u8),
    Command(u8),
    Data(u8),
}

/// Behavioral model of an HD44780 controller listening on a 4-bit wiring.
///
/// Powers up in 8-bit mode, latches on the falling edge of E, and keeps DDRAM so tests can
/// inspect what would be on the glass.
#[derive(Clone, Debug)]
pub struct Hd44780Model {
    pins: Hd44780Pins,
    rs: bool,
    e: bool,
    data: [bool; 4],
    four_bit: bool,
    high_nibble: Option<u8>,
    transfers: Vec<Hd44780Transfer>,
    ddram: [u8; 0x80],
    address: u8,
    increment: bool,
    display_on: bool,
    two_lines: bool,
}

impl Hd44780Model {
    pub fn new(pins: Hd44780Pins) -> Self {
        Hd44780Model {
            pins,
            rs: false,
            e: false,
            data: [false; 4],
            four_bit: false,
            high_nibble: None,
            transfers: Vec::new(),
            ddram: [b' '; 0x80],
            address: 0,
            increment: true,
            display_on: false,
            two_lines: false,
        }
    }

    pub fn decode(pins: Hd44780Pins, events: &[PinEvent]) -> Self {
        let mut model = Self::new(pins);
        model.feed(events);
        model
    }

    pub fn feed(&mut self, events: &[PinEvent]) {
        for event in events {
            if event.pin == self.pins.rs {
                self.rs = event.level;
            } else if event.pin == self.pins.e {
                let falling = self.e && !event.level;
                self.e = event.level;
                if falling {
                    self.latch();
                }
            } else if let Some(bit) = self.pins.data.iter().position(|&pin| pin == event.pin) {
                self.data[bit] = event.level;
            }
        }
    }

    fn latch(&mut self) {
        let nibble = self
            .data
            .iter()
            .enumerate()
            .fold(0u8, |acc, (bit, &level)| acc | ((level as u8) << bit));

        if !self.four_bit {
            self.transfers.push(Hd44780Transfer::Nibble(nibble));
            // D3..D0 are unconnected, so the controller sees a function set with DL from D4
            if nibble & 0b1110 == 0b0010 && nibble & 0b0001 == 0 {
                self.four_bit = true;
            }
            return;
        }

        match self.high_nibble.take() {
            None => self.high_nibble = Some(nibble),
            Some(high) => {
                let byte = (high << 4) | nibble;
                if self.rs {
                    self.transfers.push(Hd44780Transfer::Data(byte));
                    self.write_data(byte);
                } else {
                    self.transfers.push(Hd44780Transfer::Command(byte));
                    self.execute(byte);
                }
            }
        }
    }

    fn execute(&mut self, command: u8) {
        match command {
            0x01 => {
                self.ddram = [b' '; 0x80];
                self.address = 0;
                self.increment = true;
            }
            0x02..=0x03 => self.address = 0,
            0x04..=0x07 => self.increment = command & 0b10 != 0,
            0x08..=0x0F => self.display_on = command & 0b100 != 0,
            0x20..=0x3F => {
                self.two_lines = command & 0b1000 != 0;
                if command & 0b1_0000 != 0 {
                    self.four_bit = false;
                }
            }
            0x80..=0xFF => self.address = command & 0x7F,
            _ => {}
        }
    }

    fn write_data(&mut self, byte: u8) {
        self.ddram[self.address as usize] = byte;
        self.address = if self.increment {
            self.address.wrapping_add(1) & 0x7F
        } else {
            self.address.wrapping_sub(1) & 0x7F
        };
    }

    pub fn transfers(&self) -> &[Hd44780Transfer] {
        &self.transfers
    }

    pub fn commands(&self) -> Vec<u8> {
        self.transfers
            .iter()
            .filter_map(|transfer| match transfer {
                Hd44780Transfer::Command(command) => Some(*command),
                _ => None,
            })
            .collect()
    }

    pub fn data(&self) -> Vec<u8> {
        self.transfers
            .iter()
            .filter_map(|transfer| match transfer {
                Hd44780Transfer::Data(data) => Some(*data),
                _ => None,
            })
            .collect()
    }

    pub fn is_four_bit(&self) -> bool {
        self.four_bit
    }

    /// Whether a transfer is half done, which would shift every following byte.
    pub fn is_mid_byte(&self) -> bool {
        self.high_nibble.is_some()
    }

    pub fn is_display_on(&self) -> bool {
        self.display_on
    }

    pub fn is_two_lines(&self) -> bool {
        self.two_lines
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Text of the given display row (0 or 1), `width` characters wide.
    pub fn line(&self, row: usize, width: usize) -> String {
        let start = if row == 0 { 0x00 } else { 0x40 };
        self.ddram[start..start + width].iter().map(|&byte| byte as char).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claimed_pins_are_exclusive() {
        let gpio = SimGpio::new(8);
        let pin = gpio.get_pin(3).unwrap();
        assert_eq!(gpio.get_pin(3).unwrap_err(), GpioError::AlreadyInUse);
        assert_eq!(gpio.get_pin_bus([2, 3]).unwrap_err(), GpioError::AlreadyInUse);
        drop(pin);
        assert!(gpio.get_pin(3).is_ok());
        assert_eq!(gpio.get_pin(8).unwrap_err(), GpioError::InvalidArgument);
    }

    #[test]
    fn bus_writes_nibble_lsb_first() {
        let gpio = SimGpio::new(8);
        let mut bus = gpio.get_pin_bus([4, 5, 6, 7]).unwrap();
        let output = bus.as_output().unwrap();
        output.write_nibble(0b1010).unwrap();
        assert_eq!(gpio.level(4), Some(false));
        assert_eq!(gpio.level(5), Some(true));
        assert_eq!(gpio.level(6), Some(false));
        assert_eq!(gpio.level(7), Some(true));
        assert_eq!(output.write_nibble(0x10), Err(GpioError::InvalidArgument));
    }

    #[test]
    fn active_low_input_with_pull_up_reads_released() {
        let gpio = SimGpio::new(2);
        let mut pin = gpio.get_pin(0).unwrap();
        pin.set_bias(GpioBias::PullUp).unwrap();
        pin.set_active_level(GpioActiveLevel::Low).unwrap();
        let input = pin.as_input().unwrap();
        assert!(!input.read().unwrap());
        gpio.set_level(0, false);
        assert!(input.read().unwrap());
    }

    #[test]
    fn adc_serves_queue_then_drifts() {
        let mut adc = SimAdc::new();
        let channel = AdcChannel(0);
        assert_eq!(adc.config(), None);
        adc.enable(&AdcConfig::default()).unwrap();
        assert_eq!(adc.config(), Some(AdcConfig::default()));
        adc.push_values(channel, &[1020]);
        adc.set_drift(channel, 3);

        let convert = |adc: &mut SimAdc| {
            adc.select_channel(channel).unwrap();
            adc.start_sample().unwrap();
            adc.stop_sample_start_convert().unwrap();
            assert!(adc.is_conversion_done().unwrap());
            adc.read_result().unwrap()
        };
        assert_eq!(convert(&mut adc), 1020);
        assert_eq!(convert(&mut adc), 1023);
        assert_eq!(convert(&mut adc), 2);
        assert_eq!(adc.conversions(), 3);
    }

    #[test]
    fn adc_large_drift_wraps_without_overflow() {
        let mut adc = SimAdc::new();
        let channel = AdcChannel(2);
        adc.enable(&AdcConfig::default()).unwrap();
        adc.push_values(channel, &[1000]);
        adc.set_drift(channel, u16::MAX);

        let mut convert = || {
            adc.select_channel(channel).unwrap();
            adc.start_sample().unwrap();
            adc.stop_sample_start_convert().unwrap();
            adc.read_result().unwrap()
        };
        assert_eq!(convert(), 1000);
        // u16::MAX % 1024 == 1023, so each step moves back by one
        assert_eq!(convert(), 999);
        assert_eq!(convert(), 998);
    }

    #[test]
    fn delay_accounts_total_hold() {
        let delay = SimDelay::new();
        delay.hold(Duration::from_micros(10));
        delay.hold(Duration::from_millis(2));
        assert_eq!(delay.total(), Duration::from_micros(2010));
        delay.clear();
        assert_eq!(delay.total(), Duration::ZERO);
    }

    #[test]
    fn adc_latency_delays_completion() {
        let mut adc = SimAdc::new();
        adc.enable(&AdcConfig::default()).unwrap();
        adc.set_latency(2);
        adc.select_channel(AdcChannel(1)).unwrap();
        adc.start_sample().unwrap();
        assert!(!adc.is_conversion_done().unwrap());
        adc.stop_sample_start_convert().unwrap();
        assert!(!adc.is_conversion_done().unwrap());
        assert!(!adc.is_conversion_done().unwrap());
        assert!(adc.is_conversion_done().unwrap());
    }

    #[test]
    fn model_ignores_levels_without_strobe() {
        let pins = Hd44780Pins { rs: 0, e: 1, data: [2, 3, 4, 5] };
        let events = [
            PinEvent { pin: 2, level: true },
            PinEvent { pin: 3, level: true },
        ];
        let model = Hd44780Model::decode(pins, &events);
        assert!(model.transfers().is_empty());
        assert!(!model.is_four_bit());
    }
}
