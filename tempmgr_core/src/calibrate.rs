//! Observer self-calibration.
//!
//! Capacity and the fan-indexed resistances are estimated by replaying a
//! recorded temperature/duty trace through the model and minimizing the mean
//! absolute residual with a golden-section search. The fan walk starts from
//! full speed (low-speed fans may not kickstart) and the skipped R entries
//! are interpolated linearly.

use tracing::info;

use crate::config::{CalCfg, ModelCfg};
use crate::error::{Result, TempMgrError};
use crate::harness::Harness;
use crate::model::{ModelParams, ModelRuntime};
use crate::types::{HeaterId, MODEL_R_SIZE};

/// One calibration trace entry.
#[derive(Debug, Clone, Copy)]
pub struct RecSample {
    pub temp: f32,
    pub duty: u8,
}

/// Which parameter an estimation pass mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalTarget {
    Capacity,
    Resistance(usize),
}

fn get(params: &ModelParams, target: CalTarget) -> f32 {
    match target {
        CalTarget::Capacity => params.c,
        CalTarget::Resistance(i) => params.r[i],
    }
}

fn set(params: &mut ModelParams, target: CalTarget, v: f32) {
    match target {
        CalTarget::Capacity => params.c = v,
        CalTarget::Resistance(i) => params.r[i] = v,
    }
}

/// Mean absolute residual of the model over a recorded trace with one
/// parameter overridden.
pub fn trace_cost(
    params: &ModelParams,
    target: CalTarget,
    v: f32,
    model_cfg: &ModelCfg,
    interval_s: f32,
    trace: &[RecSample],
    fan_idx: usize,
    ambient: f32,
) -> f32 {
    let mut p = params.clone();
    set(&mut p, target, v);
    let mut rt = ModelRuntime::default();
    rt.reset(
        &p,
        model_cfg,
        interval_s,
        trace[0].duty,
        fan_idx,
        trace[0].temp,
        ambient,
    );
    let mut err = 0.0f32;
    for s in &trace[1..] {
        rt.step(&p, model_cfg, s.duty, fan_idx, s.temp, ambient);
        err += rt.residual().abs();
    }
    err / (trace.len() - 1) as f32
}

const GOLDEN_RATIO: f32 = 0.618_034;

fn update_section(points: &mut [f32; 2], bounds: &[f32; 2]) {
    let d = GOLDEN_RATIO * (bounds[1] - bounds[0]);
    points[0] = bounds[0] + d;
    points[1] = bounds[1] - d;
}

/// Golden-section minimization of the trace cost over `[min, max]`.
///
/// Iterates until the relative bracket shrinkage drops below `thr` or the
/// iteration cap is reached; on success the winning value is written into
/// `params` and the final shrinkage returned. A minimum pinned to either
/// boundary is rejected, as the true value likely lies outside the bracket.
#[allow(clippy::too_many_arguments)]
pub fn estimate(
    params: &mut ModelParams,
    target: CalTarget,
    min: f32,
    max: f32,
    thr: f32,
    max_itr: u16,
    model_cfg: &ModelCfg,
    interval_s: f32,
    trace: &[RecSample],
    fan_idx: usize,
    ambient: f32,
    report: &mut dyn FnMut(&str),
) -> Option<f32> {
    let orig = get(params, target);
    let mut bounds = [min, max];
    let mut points = [0.0f32; 2];
    update_section(&mut points, &bounds);

    for it in 0..max_itr {
        let c1 = trace_cost(params, target, points[0], model_cfg, interval_s, trace, fan_idx, ambient);
        let c2 = trace_cost(params, target, points[1], model_cfg, interval_s, trace, fan_idx, ambient);
        let dir = usize::from(c2 < c1);
        bounds[dir] = points[1 - dir];
        update_section(&mut points, &bounds);
        let x = points[1 - dir];
        let e = (1.0 - GOLDEN_RATIO) * ((bounds[0] - bounds[1]) / x).abs();

        report(&format!("TM iter:{it} v:{x:.2} e:{e:.3}"));
        if e < thr {
            if x == min || x == max {
                break;
            }
            set(params, target, x);
            return Some(e);
        }
    }

    report("TM estimation did not converge");
    set(params, target, orig);
    None
}

impl Harness {
    /// Record `samples` manager ticks of hotend 0 temperature and duty.
    pub fn record(&mut self, samples: usize) -> Result<Vec<RecSample>> {
        let mut out = Vec::with_capacity(samples);
        let mut missed = 0u32;
        while out.len() < samples {
            if !self.pump() {
                missed += 1;
                if missed > 1000 {
                    return Err(eyre::Report::new(TempMgrError::Adc(
                        "no samples while recording".into(),
                    )));
                }
                continue;
            }
            missed = 0;
            if self.core().fault_present() {
                return Err(eyre::Report::new(TempMgrError::FaultLatched(
                    "thermal fault while recording".into(),
                )));
            }
            out.push(RecSample {
                temp: self.core().temps_isr().hotend[0],
                duty: self.core().duty(HeaterId::Hotend(0)),
            });
        }
        Ok(out)
    }

    /// Full observer calibration (`M310 A` analogue): bootstrap C and R[0]
    /// without fan, refine C, then walk the fan range estimating R entries
    /// and interpolate the rest.
    pub fn run_model_autotune(
        &mut self,
        cal_temp: Option<f32>,
        report: &mut dyn FnMut(&str),
    ) -> Result<()> {
        if self.core().is_busy() {
            report("TM: printer needs to be idle for calibration");
            return Err(eyre::Report::new(TempMgrError::Busy(
                "motion planned or printing",
            )));
        }

        let was_enabled = self.core().model().enabled;
        self.core_mut().model_set_enabled(false);
        report("TM: autotune start");
        info!("model autotune start");

        let cal_temp = cal_temp.unwrap_or(self.core().config().cal.t_high);
        let result = self.model_cal_sequence(cal_temp, report);

        let _ = self.core_mut().set_target_hotend(0, 0);
        match result {
            Err(e) => {
                report("TM: autotune failed");
                if self.core().fault_present() {
                    self.core_mut().set_fan_speed(255);
                }
                Err(e)
            }
            Ok(()) => {
                self.core_mut().set_fan_speed(0);
                self.core_mut().model_set_enabled(was_enabled);
                for line in self.core().model_report().lines() {
                    report(line);
                }
                Ok(())
            }
        }
    }

    fn model_cal_sequence(&mut self, cal_temp: f32, report: &mut dyn FnMut(&str)) -> Result<()> {
        let cal: CalCfg = self.core().config().cal.clone();
        let model_cfg: ModelCfg = self.core().config().model.clone();
        let interval = self.core().config().timing.mgr_interval_s();

        // bootstrap C/R values without fan
        self.core_mut().set_fan_speed(0);

        for i in 0..2 {
            let verb = if i == 0 { "initial" } else { "refining" };

            let _ = self.core_mut().set_target_hotend(0, 0);
            if self.core().temps().hotend[0] >= cal.t_low {
                report(&format!("TM: cooling down to {:.0}C", cal.t_low));
                self.cooldown(cal.t_low);
                self.wait(10_000);
            }

            // a valid R[0] is needed for the initial C guess
            if self.core().model().params.r[0].is_nan() {
                self.core_mut().model_mut().params.r[0] = cal.r_hi;
            }

            report(&format!("TM: {verb} C estimation"));
            let _ = self.core_mut().set_target_hotend(0, cal_temp as i16);
            let trace = self.record(cal.samples)?;
            let ambient = self.core().temps().ambient;
            let e = estimate(
                &mut self.core_mut().model_mut().params,
                CalTarget::Capacity,
                cal.c_lo,
                cal.c_hi,
                cal.c_thr,
                cal.c_iters,
                &model_cfg,
                interval,
                &trace,
                0,
                ambient,
                report,
            );
            if e.is_none() {
                return Err(eyre::Report::new(TempMgrError::Calibration(
                    "C estimation did not converge".into(),
                )));
            }

            self.wait_temp(0);
            if self.core().fault_present() {
                return Err(eyre::Report::new(TempMgrError::FaultLatched(
                    "thermal fault during calibration".into(),
                )));
            }
            if i == 1 {
                break;
            }
            self.wait(cal.settle_ms);

            report(&format!("TM: {verb} R estimation @ {cal_temp:.0}C"));
            let trace = self.record(cal.samples)?;
            let ambient = self.core().temps().ambient;
            let e = estimate(
                &mut self.core_mut().model_mut().params,
                CalTarget::Resistance(0),
                cal.r_lo,
                cal.r_hi,
                cal.r_thr,
                cal.r_iters,
                &model_cfg,
                interval,
                &trace,
                0,
                ambient,
                report,
            );
            if e.is_none() {
                return Err(eyre::Report::new(TempMgrError::Calibration(
                    "R[0] estimation did not converge".into(),
                )));
            }
        }

        // fan losses from full speed down; low speeds come last so the
        // interpolation gets its resolution where the curve bends
        self.core_mut().set_fan_speed(255);
        self.wait(cal.settle_ms);

        let mut i = MODEL_R_SIZE - 1;
        while i > 0 {
            let fan = (256 / MODEL_R_SIZE * (i + 1) - 1) as u8;
            self.core_mut().set_fan_speed(fan);
            self.wait(cal.fan_step_ms);
            if self.core().fault_present() {
                return Err(eyre::Report::new(TempMgrError::FaultLatched(
                    "thermal fault during fan walk".into(),
                )));
            }

            report(&format!("TM: R[{i}] estimation"));
            let trace = self.record(cal.samples)?;
            let ambient = self.core().temps().ambient;
            let r0 = self.core().model().params.r[0];
            // the nominal fan index is used even though the measured duty
            // skews during fan stepping
            let e = estimate(
                &mut self.core_mut().model_mut().params,
                CalTarget::Resistance(i),
                cal.r_lo,
                r0,
                cal.r_thr,
                cal.r_iters,
                &model_cfg,
                interval,
                &trace,
                i,
                ambient,
                report,
            );
            if e.is_none() {
                return Err(eyre::Report::new(TempMgrError::Calibration(format!(
                    "R[{i}] estimation did not converge"
                ))));
            }

            if i <= cal.r_step {
                break;
            }
            i -= cal.r_step;
        }

        interpolate_r(&mut self.core_mut().model_mut().params, cal.r_step);
        Ok(())
    }
}

/// Fill the unmeasured R entries by linear interpolation between the
/// fan-walk samples.
pub fn interpolate_r(params: &mut ModelParams, step: usize) {
    let mut next = MODEL_R_SIZE - 1;
    for i in (1..=MODEL_R_SIZE - 2).rev() {
        if (MODEL_R_SIZE - i - 1) % step == 0 {
            next = i;
            continue;
        }
        let prev = next.saturating_sub(step);
        let f = (i - prev) as f32 / step as f32;
        params.r[i] = crate::util::lerp(params.r[prev], params.r[next], f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelCfg;

    fn synth_trace(params: &ModelParams, cfg: &ModelCfg, dt: f32, ambient: f32) -> Vec<RecSample> {
        // integrate the plant the model describes, full drive then taper
        let mut temp = ambient;
        let corrected = ambient + params.ta_corr;
        let mut out = Vec::new();
        for k in 0..240 {
            let duty: u8 = if k < 150 { 127 } else { 40 };
            let scale = f32::from(duty) / 127.0;
            let leak = (temp - corrected) / params.r[0];
            temp += (params.p * scale - leak) * dt / params.c;
            out.push(RecSample { temp, duty });
        }
        out
    }

    #[test]
    fn golden_section_recovers_capacity() {
        let cfg = ModelCfg::default();
        let mut truth = ModelParams::defaults(&cfg);
        truth.c = 12.0;
        truth.r = [20.0; MODEL_R_SIZE];
        let trace = synth_trace(&truth, &cfg, 0.27, 25.0);

        let mut params = truth.clone();
        params.c = 7.0; // start away from the truth
        let mut lines = Vec::new();
        let e = estimate(
            &mut params,
            CalTarget::Capacity,
            5.0,
            20.0,
            0.01,
            30,
            &cfg,
            0.27,
            &trace,
            0,
            25.0,
            &mut |s: &str| lines.push(s.to_string()),
        );
        assert!(e.is_some(), "estimation converged: {lines:?}");
        assert!(
            (params.c - truth.c).abs() < 1.5,
            "estimated C {} vs true {}",
            params.c,
            truth.c
        );
        assert!(lines.iter().any(|l| l.starts_with("TM iter:0")));
    }

    #[test]
    fn interpolation_fills_between_measured_entries() {
        let cfg = ModelCfg::default();
        let mut params = ModelParams::defaults(&cfg);
        params.r = [0.0; MODEL_R_SIZE];
        params.r[0] = 20.0;
        params.r[3] = 14.0;
        params.r[7] = 10.0;
        params.r[11] = 8.0;
        params.r[15] = 7.0;
        interpolate_r(&mut params, 4);
        // interior points lie between their bracketing measurements
        assert!((params.r[5] - 12.0).abs() < 1e-4);
        assert!((params.r[13] - 7.5).abs() < 1e-4);
        for w in params.r.windows(2) {
            assert!(w[1] <= w[0] + 1e-4, "monotonically falling: {:?}", params.r);
        }
    }
}
