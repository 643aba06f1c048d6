//! Raspberry Pi GPIO/PWM outputs (feature `hardware`).

use tracing::trace;

use tempmgr_traits::{Beeper, HeaterPin, PwmChannel};

use crate::error::{HwError, Result};

/// Digital output pin driving a heater SSR/MOSFET gate or the beeper.
pub struct GpioPin {
    pin: rppal::gpio::OutputPin,
}

impl GpioPin {
    pub fn new(bcm_pin: u8) -> Result<Self> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut pin = gpio
            .get(bcm_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        pin.set_low();
        Ok(Self { pin })
    }
}

impl HeaterPin for GpioPin {
    fn set_high(&mut self) {
        self.pin.set_high();
    }

    fn set_low(&mut self) {
        self.pin.set_low();
    }

    fn is_high(&self) -> bool {
        self.pin.is_set_high()
    }
}

impl Beeper for GpioPin {
    fn set(&mut self, on: bool) {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }

    fn toggle(&mut self) {
        self.pin.toggle();
    }

    fn is_on(&self) -> bool {
        self.pin.is_set_high()
    }
}

/// Hardware PWM channel for the bed carrier or a fan.
pub struct HwPwm {
    pwm: rppal::pwm::Pwm,
    duty: u8,
}

impl HwPwm {
    /// ~30 Hz keeps the bed MOSFET out of the audible/EMI range.
    pub fn new(channel: rppal::pwm::Channel, frequency_hz: f64) -> Result<Self> {
        let pwm = rppal::pwm::Pwm::with_frequency(
            channel,
            frequency_hz,
            0.0,
            rppal::pwm::Polarity::Normal,
            true,
        )
        .map_err(|e| HwError::Gpio(e.to_string()))?;
        Ok(Self { pwm, duty: 0 })
    }
}

impl PwmChannel for HwPwm {
    fn set_duty(&mut self, duty: u8) {
        self.duty = duty;
        let cycle = f64::from(duty) / 255.0;
        if let Err(e) = self.pwm.set_duty_cycle(cycle) {
            trace!(error = %e, "pwm duty write failed");
        }
    }

    fn duty(&self) -> u8 {
        self.duty
    }
}
