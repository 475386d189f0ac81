//! The refresh loop: sample the joystick, and redraw the display when the input moved.

use crate::frame::{self, FrameError};
use joylcd_gpio::delay::Delay;
use joylcd_gpio::joystick::{JoystickSampler, JoystickState};
use joylcd_gpio::lcd::hd44780::driver::HD44780Driver;
use joylcd_gpio::GpioError;
use log::{debug, trace};
use std::convert::Infallible;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("hardware error: {0}")]
    Gpio(#[from] GpioError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// The main app state struct.
pub struct App<'a> {
    /// The display. Only the app writes to it once the loop runs.
    lcd: Box<dyn HD44780Driver + 'a>,
    sampler: JoystickSampler<'a>,
    delay: &'a dyn Delay,
    /// Pause after every iteration, whether or not the display was written.
    refresh_interval: Duration,
    /// The input last shown on the display. `None` until the first refresh.
    previous: Option<JoystickState>,
}

impl<'a> App<'a> {
    /// Creates the app over an initialized display.
    pub fn new(
        lcd: Box<dyn HD44780Driver + 'a>,
        sampler: JoystickSampler<'a>,
        delay: &'a dyn Delay,
        refresh_interval: Duration,
    ) -> App<'a> {
        App {
            lcd,
            sampler,
            delay,
            refresh_interval,
            previous: None,
        }
    }

    pub fn previous(&self) -> Option<JoystickState> {
        self.previous
    }

    /// Shows a message until the first refresh replaces it.
    pub fn splash(&mut self, text: &str) -> Result<(), AppError> {
        self.lcd.clear_display()?;
        self.lcd.write_text(text)?;
        Ok(())
    }

    /// Samples the joystick once and redraws the display if the input changed.
    ///
    /// Returns whether the display was written.
    pub fn update(&mut self) -> Result<bool, AppError> {
        let state = self.sampler.sample()?;

        if let Some(previous) = self.previous {
            if previous.is_near(&state) {
                trace!("Input unchanged: {:?}", state);
                return Ok(false);
            }
        }

        self.previous = Some(state);
        let frame = frame::render(&state)?;
        debug!("Refreshing display: {:?}", frame.as_str());

        self.lcd.clear_display()?;
        self.lcd.write_text(&frame)?;
        Ok(true)
    }

    /// One loop iteration: [App::update] followed by the refresh interval.
    pub fn step(&mut self) -> Result<bool, AppError> {
        let refreshed = self.update()?;
        self.delay.hold(self.refresh_interval);
        Ok(refreshed)
    }

    /// Runs the loop forever. Only returns on a hardware or formatting error.
    pub fn run(&mut self) -> Result<Infallible, AppError> {
        loop {
            self.step()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use joylcd_gpio::adc::{AdcChannel, AdcConfig, AnalogSampler};
    use joylcd_gpio::lcd::hd44780::driver::{GpioHD44780Driver, HD44780Timings};
    use joylcd_gpio::sim::{Hd44780Model, Hd44780Pins, SimAdc, SimDelay, SimGpio};
    use joylcd_gpio::GpioDriver;

    const PINS: Hd44780Pins = Hd44780Pins { rs: 0, e: 1, data: [2, 3, 4, 5] };
    const BUTTON_1: usize = 6;
    const BUTTON_2: usize = 7;
    const X: AdcChannel = AdcChannel(0);
    const Y: AdcChannel = AdcChannel(1);
    const INTERVAL: Duration = Duration::from_millis(50);

    fn with_app(adc: &SimAdc, f: impl FnOnce(&mut App<'_>, &SimGpio, &SimDelay)) {
        let gpio = SimGpio::new(8);
        let delay = SimDelay::new();

        let mut rs = gpio.get_pin(PINS.rs).unwrap();
        let mut e = gpio.get_pin(PINS.e).unwrap();
        let mut bus = gpio.get_pin_bus(PINS.data).unwrap();
        let mut lcd = GpioHD44780Driver::new(
            rs.as_output().unwrap(),
            e.as_output().unwrap(),
            bus.as_output().unwrap(),
            &delay,
            HD44780Timings::default(),
        );
        lcd.init().unwrap();

        let mut converter = adc.clone();
        converter.enable(&AdcConfig::default()).unwrap();
        let mut button_1 = gpio.get_pin(BUTTON_1).unwrap();
        let mut button_2 = gpio.get_pin(BUTTON_2).unwrap();
        let sampler = JoystickSampler::new(
            Box::new(converter),
            X,
            Y,
            button_1.as_input().unwrap(),
            button_2.as_input().unwrap(),
            &delay,
        );

        let mut app = App::new(Box::new(lcd), sampler, &delay, INTERVAL);
        f(&mut app, &gpio, &delay);
    }

    fn screen(gpio: &SimGpio) -> (String, String) {
        let model = Hd44780Model::decode(PINS, &gpio.events());
        (model.line(0, 16), model.line(1, 16))
    }

    #[test]
    fn first_update_always_draws() {
        let adc = SimAdc::new();
        adc.push_values(X, &[512]);
        adc.push_values(Y, &[7]);
        with_app(&adc, |app, gpio, _| {
            gpio.set_level(BUTTON_1, true);
            assert!(app.update().unwrap());
            let (top, bottom) = screen(gpio);
            assert_eq!(top, "x: 0512         ");
            assert_eq!(bottom, "y: 0007 A       ");
        });
    }

    #[test]
    fn small_moves_are_not_redrawn() {
        let adc = SimAdc::new();
        adc.push_values(X, &[100, 105, 110]);
        adc.push_values(Y, &[900, 905, 905]);
        with_app(&adc, |app, gpio, _| {
            assert!(app.update().unwrap());
            let after_first = gpio.events().len();

            assert!(!app.update().unwrap());
            assert_eq!(gpio.events().len(), after_first);
            assert_eq!(app.previous().unwrap().x.value(), 100);

            assert!(app.update().unwrap());
            assert_eq!(screen(gpio).0, "x: 0110         ");
            assert_eq!(screen(gpio).1, "y: 0905         ");
        });
    }

    #[test]
    fn snapshot_matches_last_rendered_input() {
        let adc = SimAdc::new();
        adc.push_values(X, &[300, 301]);
        adc.push_values(Y, &[40, 41]);
        with_app(&adc, |app, gpio, _| {
            app.update().unwrap();
            gpio.set_level(BUTTON_2, true);
            assert!(app.update().unwrap());

            let previous = app.previous().unwrap();
            assert_eq!((previous.x.value(), previous.y.value()), (301, 41));
            assert!(!previous.button_1);
            assert!(previous.button_2);
            assert_eq!(screen(gpio).1, "y: 0041  B      ");
        });
    }

    #[test]
    fn slow_drift_never_redraws_until_bucket_changes() {
        let adc = SimAdc::new();
        adc.push_values(X, &[10, 13, 16, 19, 20]);
        adc.push_values(Y, &[0]);
        with_app(&adc, |app, _, _| {
            let refreshed: Vec<bool> = (0..5).map(|_| app.update().unwrap()).collect();
            assert_eq!(refreshed, vec![true, false, false, false, true]);
        });
    }

    #[test]
    fn every_step_waits_the_refresh_interval() {
        let adc = SimAdc::new();
        adc.push_values(X, &[100, 101]);
        adc.push_values(Y, &[100, 101]);
        with_app(&adc, |app, _, delay| {
            assert!(app.step().unwrap());
            delay.clear();
            assert!(!app.step().unwrap());
            assert_eq!(delay.holds().last(), Some(&INTERVAL));
        });
    }

    #[test]
    fn stuck_converter_stops_the_loop() {
        let adc = SimAdc::new();
        adc.set_stuck(true);
        with_app(&adc, |app, _, _| {
            assert!(matches!(
                app.run(),
                Err(AppError::Gpio(GpioError::NotResponding("adc")))
            ));
        });
    }

    #[test]
    fn splash_is_replaced_by_first_frame() {
        let adc = SimAdc::new();
        adc.push_values(X, &[1]);
        adc.push_values(Y, &[2]);
        with_app(&adc, |app, gpio, _| {
            app.splash("initializing...").unwrap();
            assert_eq!(screen(gpio).0, "initializing... ");
            app.update().unwrap();
            assert_eq!(screen(gpio), ("x: 0001         ".to_string(), "y: 0002         ".to_string()));
        });
    }
}
