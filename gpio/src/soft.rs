use crate::{GpioBusOutput, GpioOutput, GpioResult};
use std::fmt::Debug;

/// A bus output assembled from individually driven lines.
///
/// Lines are written one after another in index order, so the bus is not updated atomically.
/// That is fine for parallel displays, which only latch the data lines on the enable strobe.
pub struct SoftGpioBusOutput<'a, const N: usize> {
    pins: [Box<dyn GpioOutput + 'a>; N],
}

impl<'a, const N: usize> SoftGpioBusOutput<'a, N> {
    pub fn new(pins: [Box<dyn GpioOutput + 'a>; N]) -> Self {
        Self { pins }
    }
}

impl<const N: usize> Debug for SoftGpioBusOutput<'_, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SoftGpioBusOutput({:?})", self.pins)
    }
}

impl<const N: usize> GpioBusOutput<N> for SoftGpioBusOutput<'_, N> {
    fn write(&self, values: &[bool; N]) -> GpioResult<()> {
        for (pin, &value) in self.pins.iter().zip(values) {
            pin.write(value)?;
        }

        Ok(())
    }
}
