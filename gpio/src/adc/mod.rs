//! Analog sampling capability.
//!
//! A converter is driven through the classic register sequence: select a channel, start
//! sampling, stop sampling (which starts the conversion), poll for completion, then read the
//! result. [crate::joystick::JoystickSampler] owns the sequencing; backends only expose the steps.

mod iio;

use crate::GpioResult;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
pub use iio::*;

/// Index of an analog input channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AdcChannel(pub u8);

impl Display for AdcChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AN{}", self.0)
    }
}

/// Voltage reference used by the converter.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum VoltageReference {
    /// Converter supply rail.
    #[default]
    Supply,
    /// Dedicated external reference pin.
    External,
}

/// One-time converter configuration, applied by [AnalogSampler::enable].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcConfig {
    pub reference: VoltageReference,
    /// Conversion clock divisor relative to the converter's source clock.
    pub clock_divisor: u8,
    /// Native resolution of the converter. Results are mapped onto 10 bits by [AdcConfig::scale].
    pub resolution_bits: u8,
}

impl Default for AdcConfig {
    fn default() -> Self {
        AdcConfig {
            reference: VoltageReference::Supply,
            clock_divisor: 1,
            resolution_bits: 10,
        }
    }
}

impl AdcConfig {
    /// Maps a native result onto the 10-bit range.
    ///
    /// Wider results are shifted down, narrower ones shifted up. Values that still do not fit
    /// saturate at `u16::MAX` and are clamped by the caller.
    pub fn scale(&self, raw: u32) -> u16 {
        let bits = u32::from(self.resolution_bits);
        let scaled = if bits >= 10 {
            raw.checked_shr(bits - 10).unwrap_or(0)
        } else {
            raw << (10 - bits)
        };
        u16::try_from(scaled).unwrap_or(u16::MAX)
    }
}

pub trait AnalogSampler: Debug {
    /// Applies the one-time configuration and powers the converter up.
    fn enable(&mut self, config: &AdcConfig) -> GpioResult<()>;

    /// Routes the given channel to the sample-and-hold stage.
    fn select_channel(&mut self, channel: AdcChannel) -> GpioResult<()>;

    /// Starts acquiring the input voltage.
    fn start_sample(&mut self) -> GpioResult<()>;

    /// Ends acquisition and starts the conversion of the held voltage.
    fn stop_sample_start_convert(&mut self) -> GpioResult<()>;

    /// Checks whether the last started conversion has finished.
    fn is_conversion_done(&mut self) -> GpioResult<bool>;

    /// Reads the result of the last finished conversion, already scaled to `0..=1023`.
    fn read_result(&mut self) -> GpioResult<u16>;
}
