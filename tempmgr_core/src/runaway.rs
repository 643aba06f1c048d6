//! Thermal runaway detection.
//!
//! Each heater carries a small state machine sampled on a 2 s gate derived
//! from the manager clock. While preheating, the temperature must keep
//! rising by a minimum delta per check window; once near target, leaving the
//! hysteresis band with the output driven counts towards a timeout.

use crate::fault::FaultKind;

/// Gate between runaway evaluations.
const CHECK_PERIOD_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
pub enum RunawayPhase {
    Inactive,
    Preheat,
    Active,
}

#[derive(Debug, Clone)]
pub struct RunawayRecord {
    phase: RunawayPhase,
    tracked_target: f32,
    preheat_start: f32,
    preheat_counter: u8,
    preheat_errors: u8,
    last_check_ms: u64,
    error_counter: u16,
}

impl Default for RunawayRecord {
    fn default() -> Self {
        Self {
            phase: RunawayPhase::Inactive,
            tracked_target: 0.0,
            preheat_start: 0.0,
            preheat_counter: 0,
            preheat_errors: 0,
            last_check_ms: 0,
            error_counter: 0,
        }
    }
}

/// Per-heater-class tuning of the detector.
#[derive(Debug, Clone, Copy)]
pub struct RunawaySettings {
    pub hysteresis_c: f32,
    pub timeout_s: u16,
    /// Check windows between preheat delta evaluations.
    pub preheat_period: u8,
    /// Consecutive failed windows tolerated before the fault.
    pub preheat_errors_max: u8,
    pub is_bed: bool,
}

impl RunawaySettings {
    pub fn hotend(hysteresis_c: f32, timeout_s: u16) -> Self {
        Self {
            hysteresis_c,
            timeout_s,
            preheat_period: 8,
            preheat_errors_max: 5,
            is_bed: false,
        }
    }

    pub fn bed(hysteresis_c: f32, timeout_s: u16) -> Self {
        Self {
            hysteresis_c,
            timeout_s,
            preheat_period: 16,
            preheat_errors_max: 3,
            is_bed: true,
        }
    }
}

/// Required preheat rise per check window. Bed heat transfer flattens near
/// target, hence the banded schedule.
fn preheat_delta(settings: &RunawaySettings, current: f32) -> f32 {
    if !settings.is_bed {
        return 2.0;
    }
    if current > 105.0 {
        0.6
    } else if current > 90.0 {
        2.0
    } else {
        3.0
    }
}

impl RunawayRecord {
    pub fn phase(&self) -> RunawayPhase {
        self.phase
    }

    /// Evaluate one heater. Returns a fault to raise, if any.
    pub fn check(
        &mut self,
        settings: &RunawaySettings,
        now_ms: u64,
        target: f32,
        current: f32,
        output: u8,
    ) -> Option<FaultKind> {
        if now_ms.saturating_sub(self.last_check_ms) <= CHECK_PERIOD_MS {
            return None;
        }
        self.last_check_ms = now_ms;

        let mut check_active = false;

        if output == 0 {
            self.error_counter = 0;
        }

        if self.tracked_target != target {
            self.tracked_target = target;
            if target > 0.0 {
                self.phase = RunawayPhase::Preheat;
                self.preheat_start = current;
                self.preheat_counter = 0;
                self.preheat_errors = 0;
            } else {
                self.phase = RunawayPhase::Inactive;
            }
        }

        if current < target && self.phase == RunawayPhase::Preheat {
            self.preheat_counter = self.preheat_counter.saturating_add(1);
            if self.preheat_counter > settings.preheat_period {
                let delta = preheat_delta(settings, current);
                if current - self.preheat_start < delta {
                    self.preheat_errors = self.preheat_errors.saturating_add(1);
                } else {
                    self.preheat_errors = 0;
                }
                if self.preheat_errors > settings.preheat_errors_max {
                    return Some(FaultKind::Preheat);
                }
                self.preheat_start = current;
                self.preheat_counter = 0;
            }
        }

        if current > target - settings.hysteresis_c && self.phase == RunawayPhase::Preheat {
            self.phase = RunawayPhase::Active;
            self.error_counter = 0;
        }

        if output > 0 {
            check_active = true;
        }

        if check_active {
            let in_band = current > target - settings.hysteresis_c
                && current < target + settings.hysteresis_c;
            if in_band {
                self.error_counter = 0;
            } else if self.phase == RunawayPhase::Active {
                self.error_counter = self.error_counter.saturating_add(1);
                if u32::from(self.error_counter) * 2 > u32::from(settings.timeout_s) {
                    return Some(FaultKind::Runaway);
                }
            }
        }

        None
    }
}
