//! Physics-based heater observer.
//!
//! A discrete first-order energy balance runs in parallel with the hotend:
//! heater power in, leakage to ambient out, predicted temperature delta
//! through a lag ring (matching the sensor/heater transport delay) and a
//! one-pole filter. The filtered residual against the measured delta is
//! compared against warning and error rates.

use crate::config::ModelCfg;
use crate::types::{MODEL_LAG_LEN, MODEL_R_SIZE, SOFT_PWM_MAX};

/// Calibration parameters, persisted between sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    /// Heater power at 100% duty (W).
    pub p: f32,
    /// Lumped heat capacity (J/K).
    pub c: f32,
    /// Thermal resistance to ambient vs fan index (K/W).
    pub r: [f32; MODEL_R_SIZE],
    /// Ambient sensor correction (K).
    pub ta_corr: f32,
    /// Warning threshold (K/s).
    pub warn: f32,
    /// Error threshold (K/s).
    pub err: f32,
}

impl ModelParams {
    /// Factory values: capacity and resistances start unknown and the model
    /// stays disabled until calibrated.
    pub fn defaults(cfg: &ModelCfg) -> Self {
        Self {
            p: cfg.p,
            c: f32::NAN,
            r: [f32::NAN; MODEL_R_SIZE],
            ta_corr: cfg.ta_corr,
            warn: cfg.warn,
            err: cfg.err,
        }
    }

    /// A parameter set is usable when every value is finite and physical.
    /// NaN-rejecting comparisons, like the original checks.
    pub fn calibrated(&self) -> bool {
        if !(self.p > 0.0) {
            return false;
        }
        if !(self.c > 0.0) {
            return false;
        }
        for r in &self.r {
            if !(*r >= 0.0) {
                return false;
            }
        }
        if !self.ta_corr.is_finite() {
            return false;
        }
        if !self.warn.is_finite() || !self.err.is_finite() {
            return false;
        }
        true
    }

    /// Resistance entry for a fan soft-PWM index, clamped into range.
    #[inline]
    pub fn r_at(&self, fan_idx: usize) -> f32 {
        self.r[fan_idx.min(MODEL_R_SIZE - 1)]
    }
}

/// Observer runtime, reseeded whenever parameters change.
#[derive(Debug, Clone)]
pub struct ModelRuntime {
    /// Precomputed Δt / C.
    c_inv: f32,
    /// Thresholds converted to per-sample units.
    warn_s: f32,
    err_s: f32,
    lag_buf: [f32; MODEL_LAG_LEN],
    lag_idx: usize,
    t_prev: f32,
    dt_err_prev: f32,
    pub uninitialized: bool,
    pub warning: bool,
    pub error: bool,
}

impl Default for ModelRuntime {
    fn default() -> Self {
        Self {
            c_inv: 0.0,
            warn_s: 0.0,
            err_s: 0.0,
            lag_buf: [0.0; MODEL_LAG_LEN],
            lag_idx: 0,
            t_prev: 0.0,
            dt_err_prev: 0.0,
            uninitialized: true,
            warning: false,
            error: false,
        }
    }
}

impl ModelRuntime {
    /// Reseed invariants and state from the first valid sample, then run a
    /// single step to prime the delta chain.
    #[allow(clippy::too_many_arguments)]
    pub fn reset(
        &mut self,
        params: &ModelParams,
        cfg: &ModelCfg,
        interval_s: f32,
        heater_duty: u8,
        fan_idx: usize,
        heater_temp: f32,
        ambient_temp: f32,
    ) {
        self.c_inv = interval_s / params.c;
        self.warn_s = params.warn * interval_s;
        self.err_s = params.err * interval_s;
        self.lag_buf = [0.0; MODEL_LAG_LEN];
        self.lag_idx = 0;
        self.dt_err_prev = 0.0;
        self.t_prev = heater_temp;
        self.step(params, cfg, heater_duty, fan_idx, heater_temp, ambient_temp);
        self.uninitialized = false;
    }

    /// One observer step at the manager period.
    pub fn step(
        &mut self,
        params: &ModelParams,
        cfg: &ModelCfg,
        heater_duty: u8,
        fan_idx: usize,
        heater_temp: f32,
        ambient_temp: f32,
    ) {
        const DUTY_INV: f32 = 1.0 / (SOFT_PWM_MAX as f32);

        let heater_scale = DUTY_INV * f32::from(heater_duty);
        let cur_ambient = ambient_temp + params.ta_corr;
        let cur_r = params.r_at(fan_idx);

        let d_p = params.p * heater_scale;
        let d_pl = (heater_temp - cur_ambient) / cur_r;
        let d_t = (d_p - d_pl) * self.c_inv;

        // lag and filter the prediction
        let next_idx = if self.lag_idx == MODEL_LAG_LEN - 1 {
            0
        } else {
            self.lag_idx + 1
        };
        let dt_lag = self.lag_buf[next_idx];
        let dt_lag_prev = self.lag_buf[self.lag_idx];
        let dt_f = dt_lag_prev * (1.0 - cfg.filter_s) + d_t * cfg.filter_s;
        self.lag_buf[next_idx] = dt_f;
        self.lag_idx = next_idx;

        // filtered residual against the measured delta
        let dt_err = (heater_temp - self.t_prev) - dt_lag;
        let dt_err_f = self.dt_err_prev * (1.0 - cfg.filter_e) + dt_err * cfg.filter_e;
        self.t_prev = heater_temp;
        self.dt_err_prev = dt_err_f;

        self.error = dt_err_f.abs() > self.err_s;
        self.warning = dt_err_f.abs() > self.warn_s;
    }

    pub fn lag_idx(&self) -> usize {
        self.lag_idx
    }

    pub fn residual(&self) -> f32 {
        self.dt_err_prev
    }
}

/// Warning handoff between the manager tick and the foreground handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarningState {
    /// Warning seen since the foreground last cleared it.
    pub active: bool,
    /// Condition held during the current tick.
    pub asserted: bool,
    /// Residual captured at assertion, per-sample units.
    pub dt_err: f32,
}

/// Observer with its enable/beep switches.
#[derive(Debug, Clone)]
pub struct ModelObserver {
    pub enabled: bool,
    pub warn_beep: bool,
    pub params: ModelParams,
    pub rt: ModelRuntime,
    pub warning_state: WarningState,
}

impl ModelObserver {
    pub fn new(cfg: &ModelCfg) -> Self {
        Self {
            enabled: false,
            warn_beep: true,
            params: ModelParams::defaults(cfg),
            rt: ModelRuntime::default(),
            warning_state: WarningState::default(),
        }
    }

    /// Re-validate calibration and schedule a runtime reseed; called after
    /// any parameter mutation.
    pub fn setup(&mut self) {
        if !self.params.calibrated() {
            self.enabled = false;
        }
        self.rt.uninitialized = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibrated_params(cfg: &ModelCfg) -> ModelParams {
        let mut p = ModelParams::defaults(cfg);
        p.c = 12.0;
        p.r = [20.0; MODEL_R_SIZE];
        p
    }

    #[test]
    fn uncalibrated_defaults_refuse_enable() {
        let cfg = ModelCfg::default();
        let mut obs = ModelObserver::new(&cfg);
        obs.enabled = true;
        obs.setup();
        assert!(!obs.enabled);

        obs.params = calibrated_params(&cfg);
        obs.enabled = true;
        obs.setup();
        assert!(obs.enabled);
    }

    #[test]
    fn nan_and_negative_params_fail_validation() {
        let cfg = ModelCfg::default();
        let mut p = calibrated_params(&cfg);
        assert!(p.calibrated());
        p.r[7] = f32::NAN;
        assert!(!p.calibrated());
        p.r[7] = 20.0;
        p.c = -1.0;
        assert!(!p.calibrated());
        p.c = 12.0;
        p.warn = f32::NAN;
        assert!(!p.calibrated());
    }

    #[test]
    fn lag_index_stays_in_range() {
        let cfg = ModelCfg::default();
        let params = calibrated_params(&cfg);
        let mut rt = ModelRuntime::default();
        rt.reset(&params, &cfg, 0.27, 64, 0, 25.0, 25.0);
        for i in 0..1000 {
            rt.step(&params, &cfg, 64, 0, 25.0 + (i % 7) as f32, 25.0);
            assert!(rt.lag_idx() < MODEL_LAG_LEN);
        }
    }

    #[test]
    fn matching_plant_keeps_residual_small() {
        let cfg = ModelCfg::default();
        let params = calibrated_params(&cfg);
        let dt = 0.27;
        let mut rt = ModelRuntime::default();

        // simulate the exact plant the model describes
        let ambient = 25.0 + params.ta_corr;
        let mut temp = 25.0f32;
        rt.reset(&params, &cfg, dt, 127, 0, temp, 25.0);
        for _ in 0..600 {
            let power = params.p * 127.0 / 127.0;
            let leak = (temp - ambient) / params.r[0];
            temp += (power - leak) * dt / params.c;
            rt.step(&params, &cfg, 127, 0, temp, 25.0);
        }
        assert!(
            rt.residual().abs() < rt.err_s,
            "residual {} err_s {}",
            rt.residual(),
            rt.err_s
        );
    }

    #[test]
    fn stalled_temperature_with_full_drive_trips_error() {
        let cfg = ModelCfg::default();
        let params = calibrated_params(&cfg);
        let mut rt = ModelRuntime::default();
        rt.reset(&params, &cfg, 0.27, 127, 0, 25.0, 25.0);
        let mut tripped = false;
        for _ in 0..100 {
            // heater commanded full on but the temperature never moves
            rt.step(&params, &cfg, 127, 0, 25.0, 25.0);
            if rt.error {
                tripped = true;
                break;
            }
        }
        assert!(tripped);
    }
}
