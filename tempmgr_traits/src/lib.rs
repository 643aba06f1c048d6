pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::error::Error;

/// Boxed error type used at every fallible hardware boundary.
pub type HwResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Severity of an operator-facing alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
    Info,
    Critical,
}

/// Round-robin ADC delivering single 10-bit conversions per channel.
///
/// The core accumulates `OVERSAMPLES` conversions per channel itself; an
/// implementation only has to produce one conversion per call.
pub trait AdcBank {
    /// Perform one conversion on `channel` and return the 10-bit count.
    fn sample(&mut self, channel: usize) -> HwResult<u16>;
}

/// Digital heater output. Writes must be glitch-free and idempotent; they are
/// issued from the soft-PWM tick at up to ~2 kHz.
pub trait HeaterPin {
    fn set_high(&mut self);
    fn set_low(&mut self);
    fn is_high(&self) -> bool;
}

/// Hardware PWM comparator (bed heater carrier, fan outputs).
pub trait PwmChannel {
    /// Set the 8-bit duty of the carrier.
    fn set_duty(&mut self, duty: u8);
    fn duty(&self) -> u8;
}

/// Beeper line used for thermal-anomaly feedback.
pub trait Beeper {
    fn set(&mut self, on: bool);
    fn toggle(&mut self);
    fn is_on(&self) -> bool;
}

/// User-visible alert sink (status line / LCD).
pub trait AlertSink {
    fn post(&mut self, message: &str, severity: AlertSeverity);
}

/// Persistent key/value store for calibration parameters.
///
/// Keys are short stable identifiers; values are raw little-endian floats or
/// single bytes. Missing keys read as `None`.
pub trait ParamStore {
    fn load_f32(&mut self, key: &str) -> HwResult<Option<f32>>;
    fn store_f32(&mut self, key: &str, value: f32) -> HwResult<()>;
    fn load_u8(&mut self, key: &str) -> HwResult<Option<u8>>;
    fn store_u8(&mut self, key: &str, value: u8) -> HwResult<()>;
}

/// External watchdog; `feed` is called once per foreground pass.
pub trait Watchdog {
    fn feed(&mut self);
}
