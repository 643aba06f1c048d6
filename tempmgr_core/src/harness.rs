//! Cooperative driver for the two periodic contexts.
//!
//! On hardware the soft-PWM and manager ticks are timer interrupts; here a
//! `Harness` schedules them from a single thread against the core's clock.
//! With the monotonic clock this paces in real time; with a test clock the
//! same schedule runs as fast as the CPU allows.
//!
//! The blocking helpers (`wait`, `wait_temp`, `cooldown`) poll a predicate
//! while pumping the machine and bail out as soon as a fault latches; the
//! autotuners run on top of them.

use std::time::Duration;

use crate::error::{Result, TempMgrError};
use crate::fault::{FaultKind, FaultSource};
use crate::manager::TempCore;
use crate::tuner::{PidTuner, PidTuneResult, TuneFailure, TunerStatus};
use crate::types::{HeaterId, PID_MAX};
use crate::util;

/// Consecutive manager ticks allowed to fail (ADC trouble, suspension)
/// before a blocking helper gives up.
const MAX_MISSED_TICKS: u32 = 1000;

pub struct Harness {
    core: TempCore,
    pwm_ticks_per_mgr: u32,
    pwm_period: Duration,
}

impl Harness {
    pub fn new(core: TempCore) -> Self {
        let timing = &core.config().timing;
        let pwm_period_us = util::period_us(timing.pwm_hz);
        let pwm_ticks_per_mgr =
            ((timing.mgr_interval_ms * 1000) / pwm_period_us).max(1) as u32;
        Self {
            core,
            pwm_ticks_per_mgr,
            pwm_period: Duration::from_micros(pwm_period_us),
        }
    }

    pub fn core(&self) -> &TempCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut TempCore {
        &mut self.core
    }

    pub fn into_core(self) -> TempCore {
        self.core
    }

    /// Advance one manager interval: the soft-PWM ticks of the interval,
    /// then one manager tick and one foreground pass. Returns whether the
    /// manager tick ran.
    pub fn pump(&mut self) -> bool {
        let clock = self.core.clock();
        for _ in 0..self.pwm_ticks_per_mgr {
            self.core.soft_pwm_tick();
            clock.sleep(self.pwm_period);
        }
        let ticked = self.core.manager_tick();
        self.core.manage_heater();
        ticked
    }

    /// Pump for a wall-clock span regardless of faults.
    pub fn run_for_ms(&mut self, ms: u64) {
        let deadline = self.core.now_ms() + ms;
        while self.core.now_ms() < deadline {
            self.pump();
        }
    }

    /// Pump for a span, stopping early when a fault latches.
    pub fn wait(&mut self, ms: u64) {
        let deadline = self.core.now_ms() + ms;
        while self.core.now_ms() < deadline {
            if self.core.fault_present() {
                break;
            }
            self.pump();
        }
    }

    /// Pump until a hotend reaches target − hysteresis.
    pub fn wait_temp(&mut self, hotend: usize) {
        loop {
            let target = f32::from(self.core.targets().hotend[hotend]);
            let hyst = self.core.config().limits.hysteresis_c;
            if self.core.temps().hotend[hotend] >= target - hyst {
                break;
            }
            if self.core.fault_present() {
                break;
            }
            self.pump();
        }
    }

    /// Full-fan cooldown of hotend 0 until it drops below `temp` (or gets
    /// stuck close to ambient). Restores the previous fan speed.
    pub fn cooldown(&mut self, temp: f32) {
        let old_fan = self.core.fan_speed();
        self.core.set_fan_speed(255);
        loop {
            if self.core.fault_present() {
                break;
            }
            let temps = self.core.temps();
            if temps.hotend[0] < temp {
                break;
            }
            let ambient = temps.ambient + self.core.model().params.ta_corr;
            let hyst = self.core.config().limits.hysteresis_c;
            if temps.hotend[0] < ambient + hyst {
                // close to ambient there is nothing left to shed
                break;
            }
            self.pump();
        }
        self.core.set_fan_speed(old_fan);
    }

    /// Relay PID autotune (§`M303` analogue). Streams report lines and
    /// returns the computed gains.
    pub fn run_pid_autotune(
        &mut self,
        heater: HeaterId,
        temp: f32,
        cycles: i32,
        report: &mut dyn FnMut(&str),
    ) -> Result<PidTuneResult> {
        if let HeaterId::Hotend(e) = heater {
            if usize::from(e) >= self.core.config().machine.hotend_count {
                report("PID Autotune failed. Bad heater number.");
                return Err(eyre::Report::new(TempMgrError::BadHeater(e)));
            }
        }
        report("PID Autotune start");

        let max_power = match heater {
            HeaterId::Hotend(_) => PID_MAX,
            HeaterId::Bed => self.core.config().pid.max_bed_power,
        };
        self.core.begin_tuning();
        self.core.display_target(heater, temp as i16);
        let mut tuner = PidTuner::new(
            heater,
            temp,
            cycles,
            max_power,
            self.core.config().tune.clone(),
            self.core.now_ms(),
        );
        self.core.force_duty(heater, tuner.duty());

        let mut missed = 0u32;
        let outcome = loop {
            let ticked = self.pump();
            if self.core.fault_present() {
                break Err(eyre::Report::new(TempMgrError::FaultLatched(
                    "thermal fault during autotune".into(),
                )));
            }
            if !ticked {
                missed += 1;
                if missed > MAX_MISSED_TICKS {
                    break Err(eyre::Report::new(TempMgrError::Adc(
                        "no samples while tuning".into(),
                    )));
                }
                continue;
            }
            missed = 0;
            let input = match heater {
                HeaterId::Hotend(e) => self.core.temps_isr().hotend[usize::from(e)],
                HeaterId::Bed => self.core.temps_isr().bed,
            };
            let now = self.core.now_ms();
            let status = tuner.update(input, now, report);
            self.core.force_duty(heater, tuner.duty());
            match status {
                TunerStatus::Running => {}
                TunerStatus::Finished(result) => break Ok(result),
                TunerStatus::Failed(failure) => {
                    if failure == TuneFailure::NoHeating {
                        // a heater that cannot outrun ambient is treated
                        // like a loose heater, not a tuning hiccup
                        let (source, index) = match heater {
                            HeaterId::Hotend(e) => (FaultSource::Hotend, e),
                            HeaterId::Bed => (FaultSource::Bed, 0),
                        };
                        self.core.raise_fault(source, index, FaultKind::Runaway);
                    }
                    break Err(eyre::Report::new(TempMgrError::Tune(match failure {
                        TuneFailure::TooHot => "temperature too high".into(),
                        TuneFailure::Timeout => "timeout".into(),
                        TuneFailure::NoHeating => "no temperature rise".into(),
                    })));
                }
            }
        };

        self.core.end_tuning();
        self.core.display_target(heater, 0);
        self.core.disable_all_heaters();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::manager::TempCore;
    use crate::mocks::{NullBeeper, RecordingPwm, ScriptedAdc, SharedPin, VecAlerts};
    use crate::pwm::{FanDrive, Outputs};
    use crate::table::default_hotend_table;
    use crate::types::channel;
    use tempmgr_traits::clock::test_clock::TestClock;
    use tempmgr_traits::HeaterPin;

    fn test_core(adc: &ScriptedAdc, clock: TestClock) -> TempCore {
        let outputs = Outputs {
            hotend_pins: vec![Box::new(SharedPin::default()) as Box<dyn HeaterPin>],
            bed_pwm: Box::new(RecordingPwm::default()),
            fan: FanDrive::SoftPwm(Box::new(SharedPin::default())),
            beeper: Box::new(NullBeeper),
        };
        TempCore::builder()
            .with_config(CoreConfig::default())
            .with_adc(adc.clone())
            .with_outputs(outputs)
            .with_alerts(VecAlerts::default())
            .with_clock(Box::new(clock))
            .build()
            .expect("core builds")
    }

    #[test]
    fn guard_suspends_the_manager_tick() {
        let clock = TestClock::new();
        let adc = ScriptedAdc::constant(512);
        let mut core = test_core(&adc, clock);
        {
            let mut g = core.guard();
            assert!(!g.manager_tick(), "tick is a no-op while guarded");
        }
        assert!(core.manager_tick(), "tick resumes once the guard drops");
    }

    #[test]
    fn pump_advances_the_manager_clockwork() {
        let clock = TestClock::new();
        let adc = ScriptedAdc::default();
        adc.set_celsius(channel::HOTEND0, &default_hotend_table(), 25.0);
        adc.set_celsius(channel::BED, &crate::table::default_bed_table(), 25.0);
        adc.set_celsius(channel::AMBIENT, &crate::table::default_ambient_table(), 25.0);

        let mut h = Harness::new(test_core(&adc, clock.clone()));
        assert!(h.pump());
        let t = h.core().temps();
        assert!((t.hotend[0] - 25.0).abs() < 2.0, "hotend {}", t.hotend[0]);
        assert!(clock.elapsed_ms() >= 269, "clock advanced by one interval");
    }
}
