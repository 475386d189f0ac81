//! Two-axis analog joystick with two buttons.
//!
//! Axes are read through an [AnalogSampler], buttons are sampled as plain levels.
//! Converter noise is handled when comparing readings, see [AxisReading::is_near].

use crate::adc::{AdcChannel, AnalogSampler};
use crate::delay::Delay;
use crate::{GpioError, GpioInput, GpioResult};
use log::{error, trace, warn};
use std::fmt::{Debug, Formatter};
use std::hint::spin_loop;
use std::num::NonZeroU32;
use std::time::Duration;

/// Readings that agree after division by this are considered unchanged.
pub const AXIS_QUANTUM: u16 = 10;

/// A 10-bit axis position, `0..=1023`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AxisReading(u16);

impl AxisReading {
    pub const MAX: AxisReading = AxisReading(1023);

    pub fn new(value: u16) -> Option<Self> {
        (value <= Self::MAX.0).then_some(AxisReading(value))
    }

    /// Creates a reading, saturating values above [AxisReading::MAX].
    pub fn clamped(value: u16) -> Self {
        Self::new(value).unwrap_or_else(|| {
            warn!("Axis value {} out of range, clamped", value);
            Self::MAX
        })
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// The coarse bucket used for change detection.
    pub fn bucket(&self) -> u16 {
        self.0 / AXIS_QUANTUM
    }

    /// Whether both readings fall into the same bucket.
    ///
    /// This is not a distance: 10 and 19 are near, 9 and 10 are not.
    pub fn is_near(&self, other: &AxisReading) -> bool {
        self.bucket() == other.bucket()
    }
}

/// One complete sample of the joystick.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct JoystickState {
    pub x: AxisReading,
    pub y: AxisReading,
    pub button_1: bool,
    pub button_2: bool,
}

impl JoystickState {
    /// Axes are compared by bucket, buttons exactly.
    pub fn is_near(&self, other: &JoystickState) -> bool {
        self.x.is_near(&other.x)
            && self.y.is_near(&other.y)
            && self.button_1 == other.button_1
            && self.button_2 == other.button_2
    }
}

/// How long to poll for a finished conversion.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConversionWait {
    /// Poll until the converter reports completion, however long that takes.
    Unbounded,
    /// Give up with [GpioError::NotResponding] after this many unsuccessful polls.
    MaxPolls(NonZeroU32),
}

impl Default for ConversionWait {
    fn default() -> Self {
        ConversionWait::MaxPolls(NonZeroU32::new(100_000).unwrap_or(NonZeroU32::MIN))
    }
}

impl From<Option<u32>> for ConversionWait {
    /// `None` and `Some(0)` both mean unbounded.
    fn from(limit: Option<u32>) -> Self {
        match limit.and_then(NonZeroU32::new) {
            Some(limit) => ConversionWait::MaxPolls(limit),
            None => ConversionWait::Unbounded,
        }
    }
}

/// Samples both axes and both buttons.
pub struct JoystickSampler<'a> {
    adc: Box<dyn AnalogSampler + 'a>,
    x_channel: AdcChannel,
    y_channel: AdcChannel,
    button_1: Box<dyn GpioInput + 'a>,
    button_2: Box<dyn GpioInput + 'a>,
    delay: &'a dyn Delay,
    pub sample_hold: Duration,
    pub conversion_wait: ConversionWait,
}

impl<'a> JoystickSampler<'a> {
    /// Creates a sampler over an already enabled converter.
    pub fn new(
        adc: Box<dyn AnalogSampler + 'a>,
        x_channel: AdcChannel,
        y_channel: AdcChannel,
        button_1: Box<dyn GpioInput + 'a>,
        button_2: Box<dyn GpioInput + 'a>,
        delay: &'a dyn Delay,
    ) -> Self {
        JoystickSampler {
            adc,
            x_channel,
            y_channel,
            button_1,
            button_2,
            delay,
            sample_hold: Duration::from_micros(10),
            conversion_wait: ConversionWait::default(),
        }
    }

    pub fn with_sample_hold(mut self, sample_hold: Duration) -> Self {
        self.sample_hold = sample_hold;
        self
    }

    pub fn with_conversion_wait(mut self, conversion_wait: ConversionWait) -> Self {
        self.conversion_wait = conversion_wait;
        self
    }

    /// Runs one full conversion on the given channel.
    ///
    /// Blocks until the converter reports completion. With [ConversionWait::Unbounded] a
    /// converter that never finishes blocks forever.
    pub fn sample_axis(&mut self, channel: AdcChannel) -> GpioResult<AxisReading> {
        self.adc.select_channel(channel)?;
        self.adc.start_sample()?;
        self.delay.hold(self.sample_hold);
        self.adc.stop_sample_start_convert()?;

        let mut polls: u32 = 0;
        while !self.adc.is_conversion_done()? {
            polls = polls.saturating_add(1);
            if let ConversionWait::MaxPolls(limit) = self.conversion_wait {
                if polls >= limit.get() {
                    error!("Conversion on {} not done after {} polls", channel, polls);
                    return Err(GpioError::NotResponding("adc"));
                }
            }
            spin_loop();
        }

        let raw = self.adc.read_result()?;
        trace!("{}: {} after {} polls", channel, raw, polls);
        Ok(AxisReading::clamped(raw))
    }

    /// Reads the current button levels, button 1 first.
    pub fn sample_buttons(&self) -> GpioResult<(bool, bool)> {
        Ok((self.button_1.read()?, self.button_2.read()?))
    }

    /// Samples X, then Y, then both buttons.
    pub fn sample(&mut self) -> GpioResult<JoystickState> {
        let x = self.sample_axis(self.x_channel)?;
        let y = self.sample_axis(self.y_channel)?;
        let (button_1, button_2) = self.sample_buttons()?;
        Ok(JoystickState { x, y, button_1, button_2 })
    }
}

impl Debug for JoystickSampler<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "JoystickSampler({:?} {}/{}, buttons {:?} {:?})",
            self.adc, self.x_channel, self.y_channel, self.button_1, self.button_2
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adc::AdcConfig;
    use crate::sim::{SimAdc, SimDelay, SimGpio};
    use crate::{GpioActiveLevel, GpioBias, GpioDriver};

    const X: AdcChannel = AdcChannel(0);
    const Y: AdcChannel = AdcChannel(1);

    fn reading(value: u16) -> AxisReading {
        AxisReading::new(value).unwrap()
    }

    fn with_sampler(adc: &SimAdc, f: impl FnOnce(&mut JoystickSampler<'_>, &SimGpio, &SimDelay)) {
        let gpio = SimGpio::new(2);
        let delay = SimDelay::new();
        let mut adc = adc.clone();
        adc.enable(&AdcConfig::default()).unwrap();
        let mut button_1 = gpio.get_pin(0).unwrap();
        let mut button_2 = gpio.get_pin(1).unwrap();
        button_2.set_bias(GpioBias::PullUp).unwrap();
        button_2.set_active_level(GpioActiveLevel::Low).unwrap();
        let mut sampler = JoystickSampler::new(
            Box::new(adc),
            X,
            Y,
            button_1.as_input().unwrap(),
            button_2.as_input().unwrap(),
            &delay,
        );
        f(&mut sampler, &gpio, &delay);
    }

    #[test]
    fn quantized_comparison_boundaries() {
        assert!(reading(512).is_near(&reading(515)));
        assert!(!reading(509).is_near(&reading(510)));
        assert!(!reading(9).is_near(&reading(10)));
        assert!(reading(10).is_near(&reading(19)));
        assert!(reading(1020).is_near(&reading(1023)));
    }

    #[test]
    fn quantized_comparison_matches_integer_division() {
        for a in (0..=1023).step_by(7) {
            for b in 0..=1023 {
                assert_eq!(reading(a).is_near(&reading(b)), a / 10 == b / 10);
            }
        }
    }

    #[test]
    fn drift_inside_bucket_is_invisible_but_single_step_across_is_not() {
        // 10 -> 19 drifts nine units without a change, 19 -> 20 changes after one
        let steps = [10, 13, 16, 19];
        assert!(steps.windows(2).all(|pair| reading(pair[0]).is_near(&reading(pair[1]))));
        assert!(reading(10).is_near(&reading(19)));
        assert!(!reading(19).is_near(&reading(20)));
        assert!(!reading(9).is_near(&reading(19)));
        assert!(!reading(19).is_near(&reading(29)));
    }

    #[test]
    fn buttons_compare_exactly() {
        let state = JoystickState { x: reading(100), y: reading(900), ..Default::default() };
        let pressed = JoystickState { button_2: true, ..state };
        assert!(state.is_near(&JoystickState { x: reading(105), ..state }));
        assert!(!state.is_near(&pressed));
    }

    #[test]
    fn clamps_out_of_range() {
        assert_eq!(AxisReading::new(1024), None);
        assert_eq!(AxisReading::clamped(4000), AxisReading::MAX);
        assert_eq!(AxisReading::clamped(1023).value(), 1023);
    }

    #[test]
    fn samples_x_then_y_then_buttons() {
        let adc = SimAdc::new();
        adc.push_values(X, &[100]);
        adc.push_values(Y, &[900]);
        with_sampler(&adc, |sampler, gpio, delay| {
            gpio.set_level(0, true);
            let state = sampler.sample().unwrap();
            assert_eq!(state.x.value(), 100);
            assert_eq!(state.y.value(), 900);
            assert!(state.button_1);
            // Pulled up and not pressed
            assert!(!state.button_2);
            assert_eq!(delay.holds(), vec![Duration::from_micros(10); 2]);

            gpio.set_level(1, false);
            assert_eq!(sampler.sample_buttons().unwrap(), (true, true));
        });
        assert_eq!(adc.conversions(), 2);
    }

    #[test]
    fn waits_out_slow_conversion() {
        let adc = SimAdc::new();
        adc.push_values(X, &[321]);
        adc.set_latency(50);
        with_sampler(&adc, |sampler, _, _| {
            sampler.conversion_wait = ConversionWait::from(Some(51));
            assert_eq!(sampler.sample_axis(X).unwrap().value(), 321);
        });
    }

    #[test]
    fn stuck_converter_reports_not_responding() {
        let adc = SimAdc::new();
        adc.set_stuck(true);
        with_sampler(&adc, |sampler, _, _| {
            sampler.conversion_wait = ConversionWait::from(Some(1000));
            assert_eq!(sampler.sample_axis(Y), Err(GpioError::NotResponding("adc")));
        });
    }

    #[test]
    fn zero_limit_is_unbounded() {
        assert_eq!(ConversionWait::from(Some(0)), ConversionWait::Unbounded);
        assert_eq!(ConversionWait::from(None), ConversionWait::Unbounded);
    }
}
