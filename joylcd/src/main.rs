mod app;
mod config;
mod frame;

use crate::app::App;
use crate::config::{Backend, Config, Wiring};
use dotenv::dotenv;
use eyre::eyre;
use joylcd_gpio::adc::{AdcChannel, AnalogSampler, IioAdc};
use joylcd_gpio::gpiod::GpiodDriver;
use joylcd_gpio::joystick::JoystickSampler;
use joylcd_gpio::lcd::hd44780::driver::{GpioHD44780Driver, HD44780Driver};
use joylcd_gpio::sim::{SimAdc, SimGpio};
use joylcd_gpio::{GpioActiveLevel, GpioBias, GpioDriver};
use log::{debug, error, info};
use sysinfo::System;

/// Number of lines exposed by the simulated backend.
const SIM_LINES: usize = 64;

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!("JoyLCD v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Host {} ({}, kernel {}, {})",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR),
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::cpu_arch(),
    );

    debug!("Trying to load config...");
    let config = if let Some(config) = Config::try_load() {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved.");
        config
    };
    debug!("{:?}", config);

    let wiring = Wiring::from_env()?;
    info!(
        "LCD @ RS: {}, E: {}, Data: {:?}",
        wiring.lcd_rs, wiring.lcd_e, wiring.lcd_data
    );
    info!(
        "Joystick @ X: {}, Y: {}, Buttons: {:?}{}",
        wiring.adc_channels[0],
        wiring.adc_channels[1],
        wiring.buttons,
        if wiring.buttons_active_low { " (active low)" } else { "" },
    );

    match wiring.backend {
        Backend::Gpiod => {
            debug!("Initializing GPIO driver...");
            let gpio = GpiodDriver::open(&wiring.gpio_chip)?;
            debug!("{:?} initialized.", gpio);

            if IioAdc::count_devices() == 0 {
                return Err(eyre!("No IIO converter found"));
            }
            let adc = IioAdc::open(&wiring.adc_device)?;
            debug!("{:?} opened.", adc);

            run(&gpio, Box::new(adc), &config, &wiring)
        }
        Backend::Sim => {
            info!("Using simulated hardware.");
            let gpio = SimGpio::new(SIM_LINES).without_recording();
            let adc = SimAdc::new();
            let [x, y] = wiring.adc_channels;
            adc.push_values(x, &[512]);
            adc.push_values(y, &[512]);
            adc.set_drift(x, 3);
            adc.set_drift(y, 7);

            run(&gpio, Box::new(adc), &config, &wiring)
        }
    }
}

fn run<'a, D: GpioDriver>(
    gpio: &'a D,
    mut adc: Box<dyn AnalogSampler + 'a>,
    config: &Config,
    wiring: &Wiring,
) -> eyre::Result<()> {
    let delay = config.delay.build();

    debug!("Initializing LCD driver...");
    let mut lcd_rs_pin = gpio.get_pin(wiring.lcd_rs)?;
    let mut lcd_e_pin = gpio.get_pin(wiring.lcd_e)?;
    let mut lcd_data_bus = gpio.get_pin_bus(wiring.lcd_data)?;
    let mut lcd = GpioHD44780Driver::new(
        lcd_rs_pin.as_output()?,
        lcd_e_pin.as_output()?,
        lcd_data_bus.as_output()?,
        &*delay,
        config.timings,
    );
    lcd.init()?;
    debug!("{:?} initialized.", lcd);

    debug!("Initializing joystick...");
    let mut button_pins = [gpio.get_pin(wiring.buttons[0])?, gpio.get_pin(wiring.buttons[1])?];
    if wiring.buttons_active_low {
        for pin in button_pins.iter_mut() {
            pin.set_bias(GpioBias::PullUp)?;
            pin.set_active_level(GpioActiveLevel::Low)?;
        }
    }
    let [button_1_pin, button_2_pin] = &mut button_pins;

    adc.enable(&config.adc)?;
    let [x, y]: [AdcChannel; 2] = wiring.adc_channels;
    let sampler = JoystickSampler::new(
        adc,
        x,
        y,
        button_1_pin.as_input()?,
        button_2_pin.as_input()?,
        &*delay,
    )
    .with_sample_hold(config.sample_hold())
    .with_conversion_wait(config.conversion_wait());
    debug!("{:?} initialized.", sampler);

    let mut app = App::new(Box::new(lcd), sampler, &*delay, config.refresh_interval());
    app.splash(&config.splash)?;

    info!("Starting main loop...");
    match app.run() {
        Ok(never) => match never {},
        Err(err) => {
            error!("Main loop stopped: {}", err);
            Err(err.into())
        }
    }
}
