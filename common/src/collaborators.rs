//! Seams between the decision engine and the device.
//!
//! Each platform (ESP32 firmware, host simulator, tests) provides its own
//! implementations. Calls are synchronous and must return in bounded time;
//! the HTTP-backed implementations enforce their own timeouts.

use crate::{forecast::ForecastError, notify::NotifyError};

pub trait ClockSource {
    /// Hour of day (0..=23) in the configured timezone, or `None` while the
    /// wall clock has not been synchronised yet.
    fn current_hour(&self) -> Option<u8>;
}

pub trait WindowSensor {
    /// Reads the switch and updates the indicator LED to match.
    fn is_open(&mut self) -> bool;
}

pub trait TemperatureProvider {
    fn fetch_tonight_low(&mut self) -> Result<i32, ForecastError>;
}

pub trait Notifier {
    fn send(&mut self, temperature: i32) -> Result<(), NotifyError>;
}
