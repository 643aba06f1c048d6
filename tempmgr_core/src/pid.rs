//! Closed-loop heater regulation.
//!
//! Derivative is taken on the measurement (and low-pass filtered), not on the
//! error, so set point changes cannot kick the output. Integral windup is
//! handled conditionally: when the output saturates, the error that pushed it
//! over is un-integrated instead of clamping blindly.

use crate::config::{PidCfg, PidGains};
use crate::types::SOFT_PWM_MAX;

/// Per-heater PID runtime state.
#[derive(Debug, Clone, Default)]
pub struct PidState {
    i_sum: f32,
    d_term: f32,
    last_input: f32,
    /// Set when the target drops to zero; the next non-zero target starts
    /// with a clean integral and derivative.
    reset: bool,
}

impl PidState {
    pub fn new() -> Self {
        Self {
            reset: true,
            ..Self::default()
        }
    }

    pub fn integral(&self) -> f32 {
        self.i_sum
    }

    pub fn reset_pending(&self) -> bool {
        self.reset
    }

    /// One regulation step. Returns the soft-PWM duty in [0, SOFT_PWM_MAX].
    ///
    /// `drive_max` bounds the raw output (`PID_MAX` for hotends,
    /// `max_bed_power` for the bed); the duty register holds half of it.
    pub fn update(
        &mut self,
        gains: &PidGains,
        d_filter: f32,
        i_max: f32,
        drive_max: u8,
        current: f32,
        target: i16,
        max_c: i16,
    ) -> u8 {
        let input = current;
        let output;
        if target == 0 {
            output = 0.0;
            self.reset = true;
        } else {
            let error = f32::from(target) - input;
            if self.reset {
                self.i_sum = 0.0;
                self.d_term = 0.0;
                self.reset = false;
            }
            let p_term = gains.kp * error;
            self.i_sum = (self.i_sum + error).clamp(0.0, i_max);
            let i_term = gains.ki * self.i_sum;
            let k2 = 1.0 - d_filter;
            self.d_term = (gains.kd * (input - self.last_input)) * k2 + d_filter * self.d_term;
            // minus: derivative of input, not of error
            let mut u = p_term + i_term - self.d_term;
            if u > f32::from(drive_max) {
                if error > 0.0 {
                    self.i_sum -= error;
                }
                u = f32::from(drive_max);
            } else if u < 0.0 {
                if error < 0.0 {
                    self.i_sum -= error;
                }
                u = 0.0;
            }
            // un-integration can leave the sum outside the band
            self.i_sum = self.i_sum.clamp(0.0, i_max);
            output = u;
        }
        self.last_input = input;

        if current < f32::from(max_c) && target != 0 {
            ((output as i32) >> 1).clamp(0, i32::from(SOFT_PWM_MAX)) as u8
        } else {
            0
        }
    }
}

/// Bang-bang bed regulation used when the bed PID is disabled.
#[derive(Debug, Clone, Default)]
pub struct BedBangBang {
    last_check_ms: Option<u64>,
    duty: u8,
}

impl BedBangBang {
    /// Evaluate at most once per check interval; in between the previous
    /// duty is held.
    pub fn update(
        &mut self,
        cfg: &PidCfg,
        now_ms: u64,
        current: f32,
        target: i16,
        max_c: i16,
    ) -> u8 {
        if let Some(last) = self.last_check_ms {
            if now_ms.saturating_sub(last) < cfg.bed_check_interval_ms {
                return if target == 0 { 0 } else { self.duty };
            }
        }
        self.last_check_ms = Some(now_ms);

        if current < f32::from(max_c) {
            match cfg.bed_bang_hysteresis {
                Some(h) => {
                    if current > f32::from(target) + h {
                        self.duty = 0;
                    } else if current <= f32::from(target) - h {
                        self.duty = cfg.max_bed_power >> 1;
                    }
                }
                None => {
                    self.duty = if current >= f32::from(target) {
                        0
                    } else {
                        cfg.max_bed_power >> 1
                    };
                }
            }
        } else {
            self.duty = 0;
        }
        if target == 0 {
            self.duty = 0;
        }
        self.duty
    }
}

/// Integral clamp upper bound for the given gains.
#[inline]
pub fn integral_max(ki: f32, drive_max: f32) -> f32 {
    if ki > 0.0 {
        drive_max / ki
    } else {
        f32::MAX
    }
}
