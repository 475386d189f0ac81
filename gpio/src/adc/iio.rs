use crate::adc::{AdcChannel, AdcConfig, AnalogSampler};
use crate::{GpioError, GpioResult};
use log::{debug, trace};
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

/// Converter exposed through the Linux industrial I/O subsystem
/// (`/sys/bus/iio/devices/iio:deviceN`).
///
/// The kernel performs sample-and-hold and conversion in a single read of `in_voltageK_raw`,
/// so the read happens when the conversion is started and completion is immediate.
pub struct IioAdc {
    base_path: PathBuf,
    channel: Option<AdcChannel>,
    sampling: bool,
    config: AdcConfig,
    result: Option<u16>,
}

impl IioAdc {
    pub fn count_devices() -> usize {
        let path = Path::new("/sys/bus/iio/devices");
        (0..)
            .take_while(|index| path.join(format!("iio:device{}", index)).exists())
            .count()
    }

    pub fn open(path: impl Into<PathBuf>) -> GpioResult<Self> {
        let base_path = path.into();
        if !base_path.exists() {
            return Err(GpioError::InvalidArgument);
        }
        Ok(IioAdc {
            base_path,
            channel: None,
            sampling: false,
            config: AdcConfig::default(),
            result: None,
        })
    }

    fn raw_path(&self, channel: AdcChannel) -> PathBuf {
        self.base_path.join(format!("in_voltage{}_raw", channel.0))
    }
}

impl Debug for IioAdc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "IioAdc({:?})", self.base_path)
    }
}

impl AnalogSampler for IioAdc {
    fn enable(&mut self, config: &AdcConfig) -> GpioResult<()> {
        // Reference and clock are fixed by the device tree; only the resolution matters here.
        self.config = *config;
        let name = std::fs::read_to_string(self.base_path.join("name")).unwrap_or_default();
        debug!(
            "Enabled IIO converter {:?} ({}), {} bits",
            self.base_path,
            name.trim(),
            config.resolution_bits
        );
        Ok(())
    }

    fn select_channel(&mut self, channel: AdcChannel) -> GpioResult<()> {
        if !self.raw_path(channel).exists() {
            return Err(GpioError::InvalidArgument);
        }
        self.channel = Some(channel);
        Ok(())
    }

    fn start_sample(&mut self) -> GpioResult<()> {
        if self.channel.is_none() {
            return Err(GpioError::InvalidArgument);
        }
        self.sampling = true;
        self.result = None;
        Ok(())
    }

    fn stop_sample_start_convert(&mut self) -> GpioResult<()> {
        let channel = match self.channel {
            Some(channel) if self.sampling => channel,
            _ => return Err(GpioError::InvalidArgument),
        };
        self.sampling = false;

        let content = std::fs::read_to_string(self.raw_path(channel))?;
        let raw: u32 = content
            .trim()
            .parse()
            .map_err(|_| GpioError::Other("parsing IIO raw value failed".to_string()))?;
        trace!("{} raw value {}", channel, raw);
        self.result = Some(self.config.scale(raw));
        Ok(())
    }

    fn is_conversion_done(&mut self) -> GpioResult<bool> {
        Ok(self.result.is_some())
    }

    fn read_result(&mut self) -> GpioResult<u16> {
        self.result
            .ok_or_else(|| GpioError::Other("no finished conversion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_device(name: &str, values: &[(u8, &str)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("joylcd-iio-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("name"), "fake-adc\n").unwrap();
        for (channel, value) in values {
            std::fs::write(dir.join(format!("in_voltage{}_raw", channel)), value).unwrap();
        }
        dir
    }

    #[test]
    fn converts_through_sysfs() {
        let dir = fake_device("convert", &[(0, "812\n"), (1, "4095\n")]);
        let mut adc = IioAdc::open(&dir).unwrap();
        adc.enable(&AdcConfig { resolution_bits: 12, ..AdcConfig::default() }).unwrap();

        adc.select_channel(AdcChannel(1)).unwrap();
        adc.start_sample().unwrap();
        assert!(!adc.is_conversion_done().unwrap());
        adc.stop_sample_start_convert().unwrap();
        assert!(adc.is_conversion_done().unwrap());
        assert_eq!(adc.read_result().unwrap(), 1023);

        adc.select_channel(AdcChannel(0)).unwrap();
        adc.start_sample().unwrap();
        adc.stop_sample_start_convert().unwrap();
        assert_eq!(adc.read_result().unwrap(), 203);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn eight_bit_device_reaches_full_scale() {
        let dir = fake_device("narrow", &[(0, "255\n")]);
        let mut adc = IioAdc::open(&dir).unwrap();
        adc.enable(&AdcConfig { resolution_bits: 8, ..AdcConfig::default() }).unwrap();
        adc.select_channel(AdcChannel(0)).unwrap();
        adc.start_sample().unwrap();
        adc.stop_sample_start_convert().unwrap();
        assert_eq!(adc.read_result().unwrap(), 1020);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn rejects_missing_channel() {
        let dir = fake_device("missing", &[(0, "1\n")]);
        let mut adc = IioAdc::open(&dir).unwrap();
        assert_eq!(adc.select_channel(AdcChannel(3)), Err(GpioError::InvalidArgument));
        assert_eq!(adc.start_sample(), Err(GpioError::InvalidArgument));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
