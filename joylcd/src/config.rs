use dotenv::var;
use eyre::eyre;
use joylcd_gpio::adc::{AdcChannel, AdcConfig};
use joylcd_gpio::delay::{Delay, SleepDelay, SpinDelay};
use joylcd_gpio::joystick::ConversionWait;
use joylcd_gpio::lcd::hd44780::driver::HD44780Timings;
use serde::{Deserialize, Serialize};
use std::env::var_os;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How protocol and pacing delays are held.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DelayKind {
    #[default]
    Sleep,
    Spin,
}

impl DelayKind {
    pub fn build(self) -> Box<dyn Delay> {
        match self {
            DelayKind::Sleep => Box::new(SleepDelay),
            DelayKind::Spin => Box::new(SpinDelay),
        }
    }
}

/// Tunables, stored as JSON.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(default)]
pub struct Config {
    pub timings: HD44780Timings,
    pub adc: AdcConfig,
    pub sample_hold_us: u64,
    pub refresh_interval_ms: u64,
    /// `null` polls a conversion forever.
    pub conversion_poll_limit: Option<u32>,
    pub delay: DelayKind,
    pub splash: String,
}

impl Config {
    fn path() -> PathBuf {
        let config_str = var_os("CONFIG_FILE");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("joylcd.json"));
        PathBuf::from(config_str)
    }

    pub fn try_load() -> Option<Self> {
        let config_path = Self::path();
        if config_path.exists() {
            let file = std::fs::File::open(config_path).ok()?;
            let reader = std::io::BufReader::new(file);
            serde_json::from_reader(reader).ok()
        } else {
            None
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let file = std::fs::File::create(Self::path())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn sample_hold(&self) -> Duration {
        Duration::from_micros(self.sample_hold_us)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn conversion_wait(&self) -> ConversionWait {
        self.conversion_poll_limit.into()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            timings: HD44780Timings::default(),
            adc: AdcConfig::default(),
            sample_hold_us: 10,
            refresh_interval_ms: 50,
            conversion_poll_limit: Some(100_000),
            delay: DelayKind::default(),
            splash: "initializing...".to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Backend {
    /// GPIO character device and IIO converter.
    Gpiod,
    /// Simulated hardware.
    Sim,
}

impl FromStr for Backend {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpiod" => Ok(Backend::Gpiod),
            "sim" => Ok(Backend::Sim),
            other => Err(eyre!("Unknown backend {:?}", other)),
        }
    }
}

/// Which lines and channels the hardware is connected to, read from the environment.
#[derive(Debug, Clone)]
pub struct Wiring {
    pub backend: Backend,
    pub gpio_chip: PathBuf,
    pub lcd_rs: usize,
    pub lcd_e: usize,
    /// D4, D5, D6, D7.
    pub lcd_data: [usize; 4],
    pub buttons: [usize; 2],
    pub buttons_active_low: bool,
    pub adc_device: PathBuf,
    /// X, Y.
    pub adc_channels: [AdcChannel; 2],
}

pub fn parse_pin_bus<const N: usize>(pin_str: &str) -> eyre::Result<[usize; N]> {
    pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?
        .try_into()
        .map_err(|pins: Vec<usize>| eyre!("Expected {} pins, got {}", N, pins.len()))
}

fn parse_flag(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Wiring {
    pub fn from_env() -> eyre::Result<Self> {
        let backend: Backend = var("JOYLCD_BACKEND").unwrap_or_else(|_| "gpiod".to_string()).parse()?;
        let gpio_chip = var("JOYLCD_GPIO_CHIP").unwrap_or_else(|_| "/dev/gpiochip0".to_string());
        let adc_device = var("JOYLCD_ADC_DEVICE")
            .unwrap_or_else(|_| "/sys/bus/iio/devices/iio:device0".to_string());
        let [x, y] = parse_pin_bus::<2>(&var("JOYLCD_ADC_CHANNELS").unwrap_or_else(|_| "0,1".to_string()))?;

        Ok(Wiring {
            backend,
            gpio_chip: PathBuf::from(gpio_chip),
            lcd_rs: var("JOYLCD_LCD_PIN_RS")?.parse()?,
            lcd_e: var("JOYLCD_LCD_PIN_E")?.parse()?,
            lcd_data: parse_pin_bus(&var("JOYLCD_LCD_PINS_DATA")?)?,
            buttons: parse_pin_bus(&var("JOYLCD_BUTTON_PINS")?)?,
            buttons_active_low: var("JOYLCD_BUTTONS_ACTIVE_LOW").map(|s| parse_flag(&s)).unwrap_or(false),
            adc_device: PathBuf::from(adc_device),
            adc_channels: [AdcChannel(u8::try_from(x)?), AdcChannel(u8::try_from(y)?)],
        })
    }
}
