//! Soft-PWM generation for heater pins and the fan.
//!
//! A 7-bit counter ticks at the soft-PWM rate. At counter 0 every heater's
//! duty register is latched and pins with non-zero duty are asserted; each
//! pin is deasserted when the counter crosses its latched duty. The bed is
//! carried by a hardware PWM comparator written from the regulation path, so
//! the tick does not toggle it in the standard mode. The fan runs the same
//! scheme at a configurable bit depth.

use tempmgr_traits::{Beeper, HeaterPin, PwmChannel};

use crate::types::{DutyRegs, MAX_HOTENDS};

/// Fan drive selected by `fan_soft_pwm_bits`.
pub enum FanDrive {
    /// Digital pin toggled by the soft-PWM tick.
    SoftPwm(Box<dyn HeaterPin>),
    /// Hardware comparator; duty written directly.
    Hardware(Box<dyn PwmChannel>),
}

/// All GPIO the core is allowed to drive.
pub struct Outputs {
    pub hotend_pins: Vec<Box<dyn HeaterPin>>,
    pub bed_pwm: Box<dyn PwmChannel>,
    pub fan: FanDrive,
    pub beeper: Box<dyn Beeper>,
}

impl Outputs {
    /// Force every heater output inactive, bypassing the PWM cycle.
    pub fn all_heaters_off(&mut self) {
        for pin in &mut self.hotend_pins {
            pin.set_low();
        }
        self.bed_pwm.set_duty(0);
    }
}

/// Relay-friendly switching state for one heater (slow mode only).
#[derive(Debug, Clone, Copy, Default)]
struct SlowState {
    on: bool,
    /// Remaining slow periods before the state may change again.
    hold: u8,
}

/// Minimum state time in slow-PWM periods.
const MIN_STATE_TIME: u8 = 16;

pub struct SoftPwm {
    counter: u8,
    latched: [u8; MAX_HOTENDS],
    fan_bits: u8,
    fan_latched: u8,
    slow_mode: bool,
    slow_counter: u8,
    slow_state: [SlowState; MAX_HOTENDS + 1],
}

impl SoftPwm {
    pub fn new(slow_mode: bool, fan_bits: u8) -> Self {
        Self {
            counter: 0,
            latched: [0; MAX_HOTENDS],
            fan_bits: fan_bits.min(8),
            fan_latched: 0,
            slow_mode,
            slow_counter: 0,
            slow_state: [SlowState::default(); MAX_HOTENDS + 1],
        }
    }

    /// One soft-PWM tick. `fan_speed` is the commanded 8-bit fan value.
    pub fn tick(&mut self, duties: &DutyRegs, fan_speed: u8, outputs: &mut Outputs) {
        if self.slow_mode {
            self.tick_slow(duties, outputs);
        } else {
            self.tick_standard(duties, outputs);
        }
        self.tick_fan(fan_speed, outputs);
        self.counter = self.counter.wrapping_add(1) & 0x7f;
        if self.slow_mode && self.counter % 64 == 0 {
            self.slow_counter = self.slow_counter.wrapping_add(1) & 0x7f;
            for st in &mut self.slow_state {
                if st.hold > 0 {
                    st.hold -= 1;
                }
            }
        }
    }

    fn tick_standard(&mut self, duties: &DutyRegs, outputs: &mut Outputs) {
        if self.counter == 0 {
            for (e, pin) in outputs.hotend_pins.iter_mut().enumerate() {
                self.latched[e] = duties.hotend[e];
                if self.latched[e] > 0 {
                    pin.set_high();
                } else {
                    pin.set_low();
                }
            }
        }
        for (e, pin) in outputs.hotend_pins.iter_mut().enumerate() {
            if self.latched[e] < self.counter {
                pin.set_low();
            }
        }
    }

    /// Relay variant: state changes are rate-limited by a minimum hold time
    /// counted in slow periods (one slow period = 64 fast ticks).
    fn tick_slow(&mut self, duties: &DutyRegs, outputs: &mut Outputs) {
        if self.slow_counter == 0 && self.counter == 0 {
            for (e, pin) in outputs.hotend_pins.iter_mut().enumerate() {
                self.latched[e] = duties.hotend[e];
                let want_on = self.latched[e] > 0;
                Self::slow_apply(&mut self.slow_state[e], want_on, |on| {
                    if on {
                        pin.set_high()
                    } else {
                        pin.set_low()
                    }
                });
            }
            let bed_on = duties.bed > 0;
            let bed_pwm = &mut outputs.bed_pwm;
            Self::slow_apply(&mut self.slow_state[MAX_HOTENDS], bed_on, |on| {
                bed_pwm.set_duty(if on { 255 } else { 0 })
            });
        }
        for (e, pin) in outputs.hotend_pins.iter_mut().enumerate() {
            if self.latched[e] < self.slow_counter {
                Self::slow_apply(&mut self.slow_state[e], false, |on| {
                    if on {
                        pin.set_high()
                    } else {
                        pin.set_low()
                    }
                });
            }
        }
        if duties.bed < self.slow_counter {
            let bed_pwm = &mut outputs.bed_pwm;
            Self::slow_apply(&mut self.slow_state[MAX_HOTENDS], false, |on| {
                bed_pwm.set_duty(if on { 255 } else { 0 })
            });
        }
    }

    fn slow_apply(st: &mut SlowState, want_on: bool, mut write: impl FnMut(bool)) {
        if st.on == want_on || st.hold > 0 {
            return;
        }
        st.on = want_on;
        st.hold = MIN_STATE_TIME;
        write(want_on);
    }

    fn tick_fan(&mut self, fan_speed: u8, outputs: &mut Outputs) {
        match &mut outputs.fan {
            FanDrive::SoftPwm(pin) => {
                if self.fan_bits == 0 {
                    return;
                }
                let mask = (1u8 << self.fan_bits) - 1;
                let phase = self.counter & mask;
                if phase == 0 {
                    self.fan_latched = fan_speed / (1 << (8 - self.fan_bits));
                    if self.fan_latched > 0 {
                        pin.set_high();
                    } else {
                        pin.set_low();
                    }
                }
                if self.fan_latched < phase {
                    pin.set_low();
                }
            }
            FanDrive::Hardware(pwm) => {
                if pwm.duty() != fan_speed {
                    pwm.set_duty(fan_speed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{CountingPin, NullBeeper, RecordingPwm};

    fn outputs(pins: usize) -> Outputs {
        Outputs {
            hotend_pins: (0..pins)
                .map(|_| Box::new(CountingPin::default()) as Box<dyn HeaterPin>)
                .collect(),
            bed_pwm: Box::new(RecordingPwm::default()),
            fan: FanDrive::SoftPwm(Box::new(CountingPin::default())),
            beeper: Box::new(NullBeeper),
        }
    }

    fn on_ticks(duty: u8) -> u32 {
        let mut pwm = SoftPwm::new(false, 4);
        let mut out = outputs(1);
        let duties = DutyRegs {
            hotend: [duty, 0, 0],
            bed: 0,
        };
        let mut on = 0;
        for _ in 0..128 {
            pwm.tick(&duties, 0, &mut out);
            if out.hotend_pins[0].is_high() {
                on += 1;
            }
        }
        on
    }

    #[test]
    fn zero_duty_is_strictly_low() {
        assert_eq!(on_ticks(0), 0);
    }

    #[test]
    fn full_duty_is_strictly_high() {
        assert_eq!(on_ticks(127), 128);
    }

    #[test]
    fn fraction_matches_duty_within_one_step() {
        for duty in [1u8, 13, 42, 64, 100, 126] {
            let on = on_ticks(duty) as f32 / 128.0;
            let want = f32::from(duty) / 127.0;
            assert!(
                (on - want).abs() <= 1.0 / 127.0 + 1e-6,
                "duty {duty}: fraction {on} vs {want}"
            );
        }
    }

    #[test]
    fn duty_change_latches_at_cycle_start() {
        let mut pwm = SoftPwm::new(false, 4);
        let mut out = outputs(1);
        let mut duties = DutyRegs {
            hotend: [0, 0, 0],
            bed: 0,
        };
        pwm.tick(&duties, 0, &mut out); // counter 0 latches duty 0
        duties.hotend[0] = 127;
        for _ in 0..127 {
            pwm.tick(&duties, 0, &mut out);
            assert!(!out.hotend_pins[0].is_high(), "new duty applies next cycle");
        }
        pwm.tick(&duties, 0, &mut out); // counter back at 0
        assert!(out.hotend_pins[0].is_high());
    }
}
