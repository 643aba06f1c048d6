//! Typed configuration of the thermal core.
//!
//! One compile-time-style record (`MachineConfig`) enumerates every supported
//! hardware option; components receive the record instead of being compiled
//! in and out.

use crate::types::MAX_HOTENDS;

/// Piecewise bed temperature correction curve: two linear segments from
/// `start` to `centre` and from `centre` to 100 °C, then a flat `offset`
/// above 100 °C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BedOffsetCurve {
    pub offset: f32,
    pub centre: f32,
    pub start: f32,
}

/// Hardware options recognized by the core.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Number of hotends, 1..=3.
    pub hotend_count: usize,
    /// Closed-loop PID on the bed; hysteresis bang-bang otherwise.
    pub has_bed_pid: bool,
    pub has_ambient: bool,
    pub has_probe: bool,
    pub bed_offset: Option<BedOffsetCurve>,
    /// Relay-friendly slow switching with a minimum state time.
    pub slow_pwm_heaters: bool,
    /// Fan soft-PWM bit depth, 0..=8; 0 routes the fan to a hardware PWM.
    pub fan_soft_pwm_bits: u8,
    pub has_watchdog: bool,
    pub has_model: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            hotend_count: 1,
            has_bed_pid: true,
            has_ambient: true,
            has_probe: false,
            bed_offset: None,
            slow_pwm_heaters: false,
            fan_soft_pwm_bits: 4,
            has_watchdog: false,
            has_model: true,
        }
    }
}

/// User °C limits per sensor plus the min-guard gating knobs.
#[derive(Debug, Clone)]
pub struct LimitsCfg {
    pub hotend_min_c: [i16; MAX_HOTENDS],
    pub hotend_max_c: [i16; MAX_HOTENDS],
    pub bed_min_c: i16,
    pub bed_max_c: i16,
    pub ambient_min_c: i16,
    pub ambient_max_c: i16,
    /// Tolerance band used by runaway activation, min-guard session latching
    /// and the "fixed" display automaton.
    pub hysteresis_c: f32,
    /// Grace period after switching a hotend on before the min check engages.
    pub heater_min_delay_ms: u64,
    /// Grace period for the bed.
    pub bed_min_delay_ms: u64,
    /// Rooms colder than this get the delayed min logic; warmer rooms are
    /// checked immediately.
    pub min_ambient_c: i16,
}

impl Default for LimitsCfg {
    fn default() -> Self {
        Self {
            hotend_min_c: [10; MAX_HOTENDS],
            hotend_max_c: [305; MAX_HOTENDS],
            bed_min_c: 10,
            bed_max_c: 150,
            ambient_min_c: -30,
            ambient_max_c: 100,
            hysteresis_c: 3.0,
            heater_min_delay_ms: 15_000,
            bed_min_delay_ms: 50_000,
            min_ambient_c: 10,
        }
    }
}

/// PID gains in internal (per-tick) units. Operator-facing values are
/// converted through [`scale_i`]/[`scale_d`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

/// Regulation settings for hotends and bed.
#[derive(Debug, Clone)]
pub struct PidCfg {
    pub hotend: PidGains,
    pub bed: PidGains,
    /// Integral clamp expressed in output units; iMax = drive_max / Ki.
    pub integral_drive_max: f32,
    /// One-pole smoothing coefficient of the derivative term (PID_K1).
    pub d_filter: f32,
    /// Upper bound of the bed PID output range.
    pub max_bed_power: u8,
    /// Bang-bang band when bed PID is disabled; `None` switches at target.
    pub bed_bang_hysteresis: Option<f32>,
    /// Minimum interval between bang-bang evaluations.
    pub bed_check_interval_ms: u64,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            hotend: PidGains {
                kp: 16.13,
                ki: 0.31,
                kd: 208.0,
            },
            bed: PidGains {
                kp: 126.13,
                ki: 1.16,
                kd: 924.0,
            },
            integral_drive_max: 255.0,
            d_filter: 0.95,
            max_bed_power: 255,
            bed_bang_hysteresis: Some(2.0),
            bed_check_interval_ms: 5000,
        }
    }
}

/// Runaway detector settings per heater class.
#[derive(Debug, Clone)]
pub struct RunawayCfg {
    pub hotend_hysteresis_c: f32,
    pub hotend_timeout_s: u16,
    pub bed_hysteresis_c: f32,
    pub bed_timeout_s: u16,
}

impl Default for RunawayCfg {
    fn default() -> Self {
        Self {
            hotend_hysteresis_c: 15.0,
            hotend_timeout_s: 45,
            bed_hysteresis_c: 2.0,
            bed_timeout_s: 360,
        }
    }
}

/// Default model parameters applied on reset, plus filter coefficients.
#[derive(Debug, Clone)]
pub struct ModelCfg {
    /// Nominal heater power at 100% duty (W).
    pub p: f32,
    /// Ambient sensor correction (K).
    pub ta_corr: f32,
    /// Warning threshold (K/s).
    pub warn: f32,
    /// Error threshold (K/s).
    pub err: f32,
    /// One-pole coefficient applied to the predicted delta.
    pub filter_s: f32,
    /// One-pole coefficient applied to the residual.
    pub filter_e: f32,
}

impl Default for ModelCfg {
    fn default() -> Self {
        Self {
            p: 40.0,
            ta_corr: -7.0,
            warn: 1.2,
            err: 1.74,
            filter_s: 0.065,
            filter_e: 0.05,
        }
    }
}

/// Ziegler–Nichols rule applied to the relay tune result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TuningRule {
    /// Kp = 0.6 Ku, Ki = 2 Kp / Tu, Kd = Kp Tu / 8.
    #[default]
    Classic,
    /// Kp = 0.33 Ku, Ki = Kp / Tu, Kd = Kp Tu / 3.
    SomeOvershoot,
    /// Kp = 0.2 Ku, Ki = 2 Kp / Tu, Kd = Kp Tu / 3.
    NoOvershoot,
}

/// Relay autotune settings.
#[derive(Debug, Clone)]
pub struct TuneCfg {
    pub rule: TuningRule,
    /// Crossing debounce.
    pub debounce_ms: u64,
    /// Abort margin above the tuning target.
    pub overheat_margin_c: f32,
    /// Absolute wall-clock cap.
    pub timeout_ms: u64,
    /// Warm-up report cycles (2 s each) before the ambient-rise check.
    pub warmup_cycles_hotend: u8,
    pub warmup_cycles_bed: u8,
    /// Required rise above recorded ambient after warm-up.
    pub min_rise_c: f32,
    pub report_interval_ms: u64,
}

impl Default for TuneCfg {
    fn default() -> Self {
        Self {
            rule: TuningRule::Classic,
            debounce_ms: 5000,
            overheat_margin_c: 20.0,
            timeout_ms: 20 * 60 * 1000,
            warmup_cycles_hotend: 10,
            warmup_cycles_bed: 45,
            min_rise_c: 5.0,
            report_interval_ms: 2000,
        }
    }
}

/// Observer calibration settings.
#[derive(Debug, Clone)]
pub struct CalCfg {
    /// Cooldown set point before each bootstrap pass (°C).
    pub t_low: f32,
    /// Default calibration temperature (°C).
    pub t_high: f32,
    pub c_lo: f32,
    pub c_hi: f32,
    pub r_lo: f32,
    pub r_hi: f32,
    /// Relative bracket shrinkage threshold.
    pub c_thr: f32,
    pub r_thr: f32,
    pub c_iters: u16,
    pub r_iters: u16,
    /// Stride of the fan-stepped R walk.
    pub r_step: usize,
    /// Samples per recorded trace.
    pub samples: usize,
    /// Settling time before R traces.
    pub settle_ms: u64,
    /// Pause between fan steps.
    pub fan_step_ms: u64,
}

impl Default for CalCfg {
    fn default() -> Self {
        Self {
            t_low: 50.0,
            t_high: 230.0,
            c_lo: 5.0,
            c_hi: 20.0,
            r_lo: 4.5,
            r_hi: 25.0,
            c_thr: 0.01,
            r_thr: 0.01,
            c_iters: 30,
            r_iters: 30,
            r_step: 4,
            samples: 120,
            settle_ms: 30_000,
            fan_step_ms: 10_000,
        }
    }
}

/// Aggregate configuration handed to the core builder.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub machine: MachineConfig,
    pub limits: LimitsCfg,
    pub pid: PidCfg,
    pub runaway: RunawayCfg,
    pub model: ModelCfg,
    pub tune: TuneCfg,
    pub cal: CalCfg,
    pub timing: TimingCfg,
}

/// Tick periods of the two periodic contexts.
#[derive(Debug, Clone)]
pub struct TimingCfg {
    /// Temperature manager period (ms); ~3.7 Hz.
    pub mgr_interval_ms: u64,
    /// Soft-PWM tick rate.
    pub pwm_hz: u32,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            mgr_interval_ms: 270,
            pwm_hz: 2000,
        }
    }
}

impl TimingCfg {
    /// Manager period in seconds, the Δt of the regulation loop.
    #[inline]
    pub fn mgr_interval_s(&self) -> f32 {
        self.mgr_interval_ms as f32 / 1000.0
    }
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), crate::error::BuildError> {
        use crate::error::BuildError::InvalidConfig;
        if self.machine.hotend_count == 0 || self.machine.hotend_count > MAX_HOTENDS {
            return Err(InvalidConfig("hotend_count must be 1..=3"));
        }
        if self.machine.fan_soft_pwm_bits > 8 {
            return Err(InvalidConfig("fan_soft_pwm_bits must be 0..=8"));
        }
        if !(0.0..1.0).contains(&self.pid.d_filter) {
            return Err(InvalidConfig("d_filter must be in [0, 1)"));
        }
        if self.timing.mgr_interval_ms == 0 {
            return Err(InvalidConfig("mgr_interval_ms must be > 0"));
        }
        if self.timing.pwm_hz == 0 {
            return Err(InvalidConfig("pwm_hz must be > 0"));
        }
        if self.limits.hysteresis_c < 0.0 {
            return Err(InvalidConfig("hysteresis_c must be >= 0"));
        }
        for e in 0..self.machine.hotend_count {
            if self.limits.hotend_min_c[e] >= self.limits.hotend_max_c[e] {
                return Err(InvalidConfig("hotend min must be below max"));
            }
        }
        if self.limits.bed_min_c >= self.limits.bed_max_c {
            return Err(InvalidConfig("bed min must be below max"));
        }
        Ok(())
    }
}

/// Operator-facing integral gain to internal per-tick units.
#[inline]
pub fn scale_i(i: f32, mgr_interval_s: f32) -> f32 {
    i * mgr_interval_s
}

#[inline]
pub fn unscale_i(i: f32, mgr_interval_s: f32) -> f32 {
    i / mgr_interval_s
}

/// Operator-facing derivative gain to internal per-tick units.
#[inline]
pub fn scale_d(d: f32, mgr_interval_s: f32) -> f32 {
    d / mgr_interval_s
}

#[inline]
pub fn unscale_d(d: f32, mgr_interval_s: f32) -> f32 {
    d * mgr_interval_s
}

impl PidGains {
    /// Build internal gains from operator-facing values.
    pub fn from_user(kp: f32, ki: f32, kd: f32, mgr_interval_s: f32) -> Self {
        Self {
            kp,
            ki: scale_i(ki, mgr_interval_s),
            kd: scale_d(kd, mgr_interval_s),
        }
    }
}
