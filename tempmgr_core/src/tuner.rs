//! Relay-method PID autotune.
//!
//! The tuner forces bang-bang oscillation around the requested target and
//! measures amplitude and period. Crossings are debounced; per half-cycle
//! the relay bias is re-centred so the asymmetry between heat-up and
//! cool-down time shrinks. After two full cycles the ultimate gain and
//! period feed a Ziegler–Nichols rule.
//!
//! The state machine consumes one measurement per manager tick; the harness
//! owns the blocking loop around it.

use std::f32::consts::PI;

use crate::config::{TuneCfg, TuningRule};
use crate::types::HeaterId;

/// Result of a completed relay tune, operator-facing gain units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidTuneResult {
    pub ku: f32,
    pub tu: f32,
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub cycles: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneFailure {
    /// Input exceeded target + margin.
    TooHot,
    /// Total tune time exceeded the cap.
    Timeout,
    /// Temperature failed to rise above ambient after the warm-up.
    NoHeating,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TunerStatus {
    Running,
    Finished(PidTuneResult),
    Failed(TuneFailure),
}

pub struct PidTuner {
    heater: HeaterId,
    target: f32,
    ncycles: i32,
    max_power: i32,
    cfg: TuneCfg,

    heating: bool,
    t1: u64,
    t2: u64,
    t_high: u64,
    t_low: u64,
    bias: i32,
    d: i32,
    min: f32,
    max: f32,
    cycle: i32,
    duty: u8,
    last_report_ms: u64,
    safety_count: u8,
    ambient: f32,
    result: Option<PidTuneResult>,
    done: Option<TunerStatus>,
}

impl PidTuner {
    pub fn new(heater: HeaterId, target: f32, ncycles: i32, max_power: u8, cfg: TuneCfg, now_ms: u64) -> Self {
        let half = i32::from(max_power) / 2;
        Self {
            heater,
            target,
            ncycles,
            max_power: i32::from(max_power),
            cfg,
            heating: true,
            t1: now_ms,
            t2: now_ms,
            t_high: 0,
            t_low: 0,
            bias: half,
            d: half,
            min: 10_000.0,
            max: 0.0,
            cycle: 0,
            // the initial drive is max/2 expressed directly as a soft duty,
            // which for a 255 ceiling is full power
            duty: half as u8,
            last_report_ms: now_ms,
            safety_count: 0,
            ambient: 0.0,
            result: None,
            done: None,
        }
    }

    pub fn heater(&self) -> HeaterId {
        self.heater
    }

    /// Soft-PWM duty the tuner wants applied right now.
    pub fn duty(&self) -> u8 {
        self.duty
    }

    pub fn result(&self) -> Option<&PidTuneResult> {
        self.result.as_ref()
    }

    fn rule_lines(&self, ku: f32, tu: f32, report: &mut dyn FnMut(&str)) -> (f32, f32, f32) {
        let (label, kp, ki, kd) = match self.cfg.rule {
            TuningRule::Classic => {
                let kp = 0.6 * ku;
                (" Classic PID ", kp, 2.0 * kp / tu, kp * tu / 8.0)
            }
            TuningRule::SomeOvershoot => {
                let kp = 0.33 * ku;
                (" Some overshoot ", kp, kp / tu, kp * tu / 3.0)
            }
            TuningRule::NoOvershoot => {
                let kp = 0.2 * ku;
                (" No overshoot ", kp, 2.0 * kp / tu, kp * tu / 3.0)
            }
        };
        report(label);
        report(&format!(" Kp: {kp:.2}"));
        report(&format!(" Ki: {ki:.2}"));
        report(&format!(" Kd: {kd:.2}"));
        (kp, ki, kd)
    }

    /// Feed one fresh measurement. `now_ms` is the manager clock.
    pub fn update(&mut self, input: f32, now_ms: u64, report: &mut dyn FnMut(&str)) -> TunerStatus {
        if let Some(done) = self.done {
            return done;
        }

        self.max = self.max.max(input);
        self.min = self.min.min(input);

        if self.heating
            && input > self.target
            && now_ms.saturating_sub(self.t2) > self.cfg.debounce_ms
        {
            self.heating = false;
            self.duty = (((self.bias - self.d) >> 1).clamp(0, 127)) as u8;
            self.t1 = now_ms;
            self.t_high = self.t1 - self.t2;
            self.max = self.target;
        }
        if !self.heating
            && input < self.target
            && now_ms.saturating_sub(self.t1) > self.cfg.debounce_ms
        {
            self.heating = true;
            self.t2 = now_ms;
            self.t_low = self.t2 - self.t1;
            if self.cycle > 0 {
                let span = (self.t_low + self.t_high) as i64;
                self.bias += ((self.d as i64 * (self.t_high as i64 - self.t_low as i64)) / span)
                    as i32;
                self.bias = self.bias.clamp(20, self.max_power - 20);
                self.d = if self.bias > self.max_power / 2 {
                    self.max_power - 1 - self.bias
                } else {
                    self.bias
                };
                report(&format!(
                    " bias: {} d: {} min: {:.2} max: {:.2}",
                    self.bias, self.d, self.min, self.max
                ));
                if self.cycle > 2 {
                    let ku = (4.0 * self.d as f32) / (PI * (self.max - self.min) / 2.0);
                    let tu = (self.t_low + self.t_high) as f32 / 1000.0;
                    report(&format!(" Ku: {ku:.2} Tu: {tu:.2}"));
                    let (kp, ki, kd) = self.rule_lines(ku, tu, report);
                    self.result = Some(PidTuneResult {
                        ku,
                        tu,
                        kp,
                        ki,
                        kd,
                        cycles: self.cycle,
                    });
                }
            }
            self.duty = (((self.bias + self.d) >> 1).clamp(0, 127)) as u8;
            self.cycle += 1;
            self.min = self.target;
        }

        if input > self.target + self.cfg.overheat_margin_c {
            report("PID Autotune failed! Temperature too high");
            self.duty = 0;
            let status = TunerStatus::Failed(TuneFailure::TooHot);
            self.done = Some(status);
            return status;
        }

        if now_ms.saturating_sub(self.last_report_ms) > self.cfg.report_interval_ms {
            let prefix = match self.heater {
                HeaterId::Bed => "B",
                HeaterId::Hotend(_) => "T",
            };
            report(&format!("{prefix}:{input:.2} @:{}", self.duty));

            let warmup = match self.heater {
                HeaterId::Bed => self.cfg.warmup_cycles_bed,
                HeaterId::Hotend(_) => self.cfg.warmup_cycles_hotend,
            };
            if self.safety_count == 0 {
                self.ambient = input;
                self.safety_count += 1;
            } else if self.safety_count < warmup {
                self.safety_count += 1;
            } else if self.safety_count == warmup {
                self.safety_count += 1;
                if (input - self.ambient).abs() < self.cfg.min_rise_c {
                    self.duty = 0;
                    let status = TunerStatus::Failed(TuneFailure::NoHeating);
                    self.done = Some(status);
                    return status;
                }
            }
            self.last_report_ms = now_ms;
        }

        if now_ms.saturating_sub(self.t1) + now_ms.saturating_sub(self.t2) > self.cfg.timeout_ms {
            report("PID Autotune failed! timeout");
            self.duty = 0;
            let status = TunerStatus::Failed(TuneFailure::Timeout);
            self.done = Some(status);
            return status;
        }

        if self.cycle > self.ncycles {
            report("PID Autotune finished! Apply the last Kp, Ki and Kd constants above");
            self.duty = 0;
            let status = match self.result {
                Some(r) => TunerStatus::Finished(r),
                // target crossings never produced enough cycles to compute
                None => TunerStatus::Failed(TuneFailure::Timeout),
            };
            self.done = Some(status);
            return status;
        }

        TunerStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the tuner against a crude first-order plant with transport
    /// delay; the relay must settle into oscillation and produce gains.
    #[test]
    fn synthesizes_gains_from_relay_oscillation() {
        let cfg = TuneCfg::default();
        let mut tuner = PidTuner::new(HeaterId::Hotend(0), 210.0, 5, 255, cfg, 0);
        let mut lines: Vec<String> = Vec::new();
        let mut report = |s: &str| lines.push(s.to_string());

        let mut temp = 25.0f32;
        let mut now = 0u64;
        let dt = 0.27f32;
        let mut status = TunerStatus::Running;
        for _ in 0..40_000 {
            now += 270;
            let drive = f32::from(tuner.duty()) / 127.0;
            // plant: 40 W heater, 12 J/K, 20 K/W to a 25 °C room
            temp += ((40.0 * drive) - (temp - 25.0) / 20.0) * dt / 12.0;
            status = tuner.update(temp, now, &mut report);
            if status != TunerStatus::Running {
                break;
            }
        }

        let result = match status {
            TunerStatus::Finished(r) => r,
            other => panic!("tuner did not finish: {other:?}, lines: {lines:?}"),
        };
        assert!(lines.iter().filter(|l| l.starts_with(" bias:")).count() >= 3);
        assert!(lines.iter().any(|l| l.contains("Ku:")));
        assert!(lines.iter().any(|l| l.contains("finished")));
        // classic rule identities
        assert!((result.ki - 2.0 * result.kp / result.tu).abs() < 1e-3);
        assert!((result.kd - result.kp * result.tu / 8.0).abs() < 1e-3);
        assert!((result.kp - 0.6 * result.ku).abs() < 1e-3);
        assert!(result.tu > 0.0);
    }

    #[test]
    fn overheat_aborts_with_message() {
        let cfg = TuneCfg::default();
        let mut tuner = PidTuner::new(HeaterId::Hotend(0), 100.0, 3, 255, cfg, 0);
        let mut lines: Vec<String> = Vec::new();
        let status = tuner.update(130.0, 270, &mut |s| lines.push(s.to_string()));
        assert_eq!(status, TunerStatus::Failed(TuneFailure::TooHot));
        assert!(lines.iter().any(|l| l.contains("temperature too high")));
        assert_eq!(tuner.duty(), 0);
    }

    #[test]
    fn stalled_temperature_fails_the_ambient_rise_check() {
        let cfg = TuneCfg::default();
        let mut tuner = PidTuner::new(HeaterId::Hotend(0), 210.0, 3, 255, cfg, 0);
        let mut now = 0u64;
        let mut status = TunerStatus::Running;
        for _ in 0..200 {
            now += 2100;
            status = tuner.update(25.0, now, &mut |_| {});
            if status != TunerStatus::Running {
                break;
            }
        }
        assert_eq!(status, TunerStatus::Failed(TuneFailure::NoHeating));
    }

    #[test]
    fn wall_clock_cap_times_out() {
        let cfg = TuneCfg {
            // disarm the ambient-rise check so the cap is what fires
            min_rise_c: 0.0,
            ..TuneCfg::default()
        };
        let mut tuner = PidTuner::new(HeaterId::Hotend(0), 210.0, 3, 255, cfg, 0);
        let mut lines: Vec<String> = Vec::new();
        // park just below target so no crossings ever occur
        let mut status = TunerStatus::Running;
        let mut now = 0u64;
        for _ in 0..10_000 {
            now += 2000;
            status = tuner.update(205.0, now, &mut |s| lines.push(s.to_string()));
            if status != TunerStatus::Running {
                break;
            }
        }
        assert_eq!(status, TunerStatus::Failed(TuneFailure::Timeout));
        assert!(lines.iter().any(|l| l.contains("timeout")));
    }
}
